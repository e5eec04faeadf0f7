//! Provider capability.
//!
//! A provider is the capability set the engine drives resources through:
//! Check, Diff, Create, Update, Delete, Read, plus DiffConfig/Configure for
//! provider resources themselves. Implementations typically proxy a plugin
//! process; tests use scripted in-memory providers.

mod registry;

pub use registry::{ProviderRegistry, RegistryProvider};

use std::time::Duration;

use async_trait::async_trait;
use converge_core::{CheckFailure, DiffResult, PropertyMap, PropertyPath, Urn};
use thiserror::Error;

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failure of a provider operation.
///
/// `Partial` and `Unknown` mirror the provider-reported resource status: the
/// resource may exist even though the operation failed.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The resource exists but was not fully initialized.
    #[error("partial failure: {}", reasons.first().map_or("initialization incomplete", String::as_str))]
    Partial {
        /// Provider-assigned id, when one was allocated.
        id: String,
        /// Outputs observed before the failure.
        outputs: PropertyMap,
        /// Initialization errors, most recent first.
        reasons: Vec<String>,
    },

    /// The operation's effect on the resource is uncertain.
    #[error("unknown resource status: {message}")]
    Unknown {
        /// Failure detail.
        message: String,
    },

    /// The operation failed cleanly.
    #[error("{message}")]
    Fatal {
        /// Failure detail.
        message: String,
    },

    /// The operation was cancelled through its context.
    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// A fatal error with the given message.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

/// Result of a `Check` call.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// The checked (possibly defaulted) inputs.
    pub inputs: PropertyMap,
    /// Per-property validation failures; non-empty fails the registration.
    pub failures: Vec<CheckFailure>,
}

/// Result of a `Create` call.
#[derive(Debug, Clone, Default)]
pub struct CreateOutcome {
    /// Provider-assigned id; empty during previews.
    pub id: String,
    /// Reported outputs.
    pub outputs: PropertyMap,
}

/// Result of an `Update` call.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Reported outputs.
    pub outputs: PropertyMap,
}

/// Result of a `Read` call.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    /// Canonical id; empty when the resource does not exist.
    pub id: String,
    /// Inputs reconstructed from the live resource.
    pub inputs: PropertyMap,
    /// Live outputs.
    pub outputs: PropertyMap,
}

impl ReadOutcome {
    /// Whether the read found a live resource.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }
}

/// The capability set resource providers implement.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Validates and defaults the inputs for a resource.
    async fn check(
        &self,
        urn: &Urn,
        olds: Option<&PropertyMap>,
        news: &PropertyMap,
        allow_unknowns: bool,
        seed: [u8; 32],
    ) -> ProviderResult<CheckOutcome>;

    /// Diffs old state against desired inputs.
    async fn diff(
        &self,
        urn: &Urn,
        id: &str,
        old_inputs: &PropertyMap,
        old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        allow_unknowns: bool,
        ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult>;

    /// Diffs a provider resource's own configuration.
    async fn diff_config(
        &self,
        urn: &Urn,
        old_inputs: &PropertyMap,
        new_inputs: &PropertyMap,
        allow_unknowns: bool,
        ignore_changes: &[PropertyPath],
    ) -> ProviderResult<DiffResult>;

    /// Configures the provider instance.
    async fn configure(&self, inputs: &PropertyMap) -> ProviderResult<()>;

    /// Creates a resource.
    async fn create(
        &self,
        urn: &Urn,
        inputs: &PropertyMap,
        timeout: Option<Duration>,
        preview: bool,
    ) -> ProviderResult<CreateOutcome>;

    /// Updates a resource in place.
    async fn update(
        &self,
        urn: &Urn,
        id: &str,
        old_inputs: &PropertyMap,
        old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        timeout: Option<Duration>,
        ignore_changes: &[PropertyPath],
        preview: bool,
    ) -> ProviderResult<UpdateOutcome>;

    /// Deletes a resource.
    async fn delete(
        &self,
        urn: &Urn,
        id: &str,
        old_inputs: &PropertyMap,
        old_outputs: &PropertyMap,
        timeout: Option<Duration>,
    ) -> ProviderResult<()>;

    /// Reads the live state of a resource.
    async fn read(
        &self,
        urn: &Urn,
        id: &str,
        inputs: Option<&PropertyMap>,
        state: Option<&PropertyMap>,
    ) -> ProviderResult<ReadOutcome>;
}
