//! Provider registry.
//!
//! Maps packages to provider implementations and provider resources to the
//! packages they configure. Default providers are ordinary provider
//! resources whose URN is derived from the package name; the registry itself
//! acts as the provider managing provider resources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{
    CheckFailure, DiffResult, PropertyMap, PropertyPath, ProviderReference, Urn,
};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{CheckOutcome, CreateOutcome, Provider, ProviderError, ProviderResult, ReadOutcome, UpdateOutcome};

/// Package→implementation table plus provider-resource bookkeeping.
#[derive(Default)]
pub struct ProviderRegistry {
    by_package: DashMap<String, Arc<dyn Provider>>,
    /// Inputs of provider resources registered this run, by URN.
    configs: DashMap<Urn, PropertyMap>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("packages", &self.by_package.len())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// A fresh registry with no providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation serving `package`.
    pub fn register(&self, package: impl Into<String>, provider: Arc<dyn Provider>) {
        let package = package.into();
        debug!(%package, "registered provider");
        self.by_package.insert(package, provider);
    }

    /// The implementation serving `package`.
    ///
    /// # Errors
    ///
    /// Returns an error when no implementation is registered.
    pub fn provider_for_package(&self, package: &str) -> Result<Arc<dyn Provider>> {
        self.by_package
            .get(package)
            .map(|p| Arc::clone(&p))
            .ok_or_else(|| Error::UnknownProvider {
                package: package.to_string(),
            })
    }

    /// Resolves a provider reference to its implementation.
    ///
    /// # Errors
    ///
    /// Returns an error when the referenced URN is not a provider resource or
    /// no implementation serves its package.
    pub fn resolve(&self, reference: &ProviderReference) -> Result<Arc<dyn Provider>> {
        let package = reference.urn.provider_package().ok_or_else(|| {
            Error::BadProviderReference {
                urn: reference.urn.to_string(),
                message: "URN does not name a provider resource".to_string(),
            }
        })?;
        self.provider_for_package(package)
    }

    /// The default provider reference for `package` in a stack/project.
    ///
    /// # Errors
    ///
    /// Returns an error when the derived URN is invalid.
    pub fn default_reference(
        &self,
        stack: &str,
        project: &str,
        package: &str,
    ) -> Result<ProviderReference> {
        let urn = Urn::default_provider(stack, project, package)?;
        Ok(ProviderReference::new(urn, "default"))
    }

    /// Records the checked inputs of a provider resource registered this run.
    pub fn record_config(&self, urn: Urn, inputs: PropertyMap) {
        self.configs.insert(urn, inputs);
    }

    /// The recorded inputs of a provider resource registered this run.
    #[must_use]
    pub fn config_of(&self, urn: &Urn) -> Option<PropertyMap> {
        self.configs.get(urn).map(|c| c.clone())
    }
}

/// The provider managing provider resources themselves.
///
/// Create configures the underlying implementation and mints an id; Diff
/// delegates to `DiffConfig`; Delete is a no-op (plugin lifetime is a
/// collaborator concern).
pub struct RegistryProvider {
    registry: Arc<ProviderRegistry>,
    package: String,
}

impl RegistryProvider {
    /// A provider-resource provider for `package`.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, package: impl Into<String>) -> Self {
        Self {
            registry,
            package: package.into(),
        }
    }

    fn underlying(&self) -> ProviderResult<Arc<dyn Provider>> {
        self.registry
            .provider_for_package(&self.package)
            .map_err(|e| ProviderError::fatal(e.to_string()))
    }
}

#[async_trait]
impl Provider for RegistryProvider {
    async fn check(
        &self,
        _urn: &Urn,
        _olds: Option<&PropertyMap>,
        news: &PropertyMap,
        _allow_unknowns: bool,
        _seed: [u8; 32],
    ) -> ProviderResult<CheckOutcome> {
        // Provider configuration is accepted verbatim; the underlying
        // implementation validates on Configure.
        Ok(CheckOutcome {
            inputs: news.clone(),
            failures: Vec::<CheckFailure>::new(),
        })
    }

    async fn diff(
        &self,
        urn: &Urn,
        _id: &str,
        old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        allow_unknowns: bool,
        ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult> {
        self.underlying()?
            .diff_config(urn, old_inputs, new_inputs, allow_unknowns, ignore_changes)
            .await
    }

    async fn diff_config(
        &self,
        urn: &Urn,
        old_inputs: &PropertyMap,
        new_inputs: &PropertyMap,
        allow_unknowns: bool,
        ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult> {
        self.underlying()?
            .diff_config(urn, old_inputs, new_inputs, allow_unknowns, ignore_changes)
            .await
    }

    async fn configure(&self, inputs: &PropertyMap) -> ProviderResult<()> {
        self.underlying()?.configure(inputs).await
    }

    async fn create(
        &self,
        _urn: &Urn,
        inputs: &PropertyMap,
        _timeout: Option<Duration>,
        preview: bool,
    ) -> ProviderResult<CreateOutcome> {
        self.underlying()?.configure(inputs).await?;
        let id = if preview {
            String::new()
        } else {
            Uuid::new_v4().to_string()
        };
        Ok(CreateOutcome {
            id,
            outputs: inputs.clone(),
        })
    }

    async fn update(
        &self,
        _urn: &Urn,
        _id: &str,
        _old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        _timeout: Option<Duration>,
        _ignore_changes: &[PropertyPath],
        _preview: bool,
    ) -> ProviderResult<UpdateOutcome> {
        self.underlying()?.configure(new_inputs).await?;
        Ok(UpdateOutcome {
            outputs: new_inputs.clone(),
        })
    }

    async fn delete(
        &self,
        _urn: &Urn,
        _id: &str,
        _old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        _timeout: Option<Duration>,
    ) -> ProviderResult<()> {
        Ok(())
    }

    async fn read(
        &self,
        _urn: &Urn,
        id: &str,
        inputs: Option<&PropertyMap>,
        state: Option<&PropertyMap>,
    ) -> ProviderResult<ReadOutcome> {
        Ok(ReadOutcome {
            id: id.to_string(),
            inputs: inputs.cloned().unwrap_or_default(),
            outputs: state.cloned().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reference_derives_from_the_package() {
        let registry = ProviderRegistry::new();
        let reference = registry.default_reference("dev", "web", "aws").unwrap();
        assert_eq!(reference.id, "default");
        assert_eq!(reference.urn.provider_package(), Some("aws"));
    }

    #[test]
    fn resolution_fails_without_an_implementation() {
        let registry = ProviderRegistry::new();
        let reference = registry.default_reference("dev", "web", "aws").unwrap();
        assert!(matches!(
            registry.resolve(&reference),
            Err(Error::UnknownProvider { .. })
        ));
    }
}
