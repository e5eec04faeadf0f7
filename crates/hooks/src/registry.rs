//! Name→record hook tables.

use dashmap::DashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ErrorHook, ResourceHook};

/// Concurrent registries for resource hooks and error hooks.
///
/// Both tables are independent; names collide only within a table.
/// Registration is rejected on collision rather than replacing the existing
/// record.
#[derive(Debug, Default)]
pub struct HookRegistry {
    resource_hooks: DashMap<String, ResourceHook>,
    error_hooks: DashMap<String, ErrorHook>,
}

impl HookRegistry {
    /// A fresh registry with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource hook.
    ///
    /// # Errors
    ///
    /// Returns an error when the name is empty or already registered.
    pub fn register_resource_hook(&self, hook: ResourceHook) -> Result<()> {
        if hook.name.is_empty() {
            return Err(Error::EmptyName);
        }
        match self.resource_hooks.entry(hook.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::DuplicateName {
                name: hook.name,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(name = %hook.name, "registered resource hook");
                slot.insert(hook);
                Ok(())
            }
        }
    }

    /// Registers an error hook.
    ///
    /// # Errors
    ///
    /// Returns an error when the name is empty or already registered.
    pub fn register_error_hook(&self, hook: ErrorHook) -> Result<()> {
        if hook.name.is_empty() {
            return Err(Error::EmptyName);
        }
        match self.error_hooks.entry(hook.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::DuplicateName {
                name: hook.name,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(name = %hook.name, "registered error hook");
                slot.insert(hook);
                Ok(())
            }
        }
    }

    /// Looks up a resource hook by name.
    ///
    /// # Errors
    ///
    /// Returns an error when no resource hook has that name.
    pub fn resource_hook(&self, name: &str) -> Result<ResourceHook> {
        self.resource_hooks
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| Error::UnknownHook {
                name: name.to_string(),
            })
    }

    /// Looks up an error hook by name.
    ///
    /// # Errors
    ///
    /// Returns an error when no error hook has that name.
    pub fn error_hook(&self, name: &str) -> Result<ErrorHook> {
        self.error_hooks
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| Error::UnknownHook {
                name: name.to_string(),
            })
    }

    /// Resolves a list of resource hook names, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown hook.
    pub fn resource_hooks(&self, names: &[String]) -> Result<Vec<ResourceHook>> {
        names.iter().map(|n| self.resource_hook(n)).collect()
    }

    /// Resolves a list of error hook names, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown hook.
    pub fn error_hooks(&self, names: &[String]) -> Result<Vec<ErrorHook>> {
        names.iter().map(|n| self.error_hook(n)).collect()
    }
}
