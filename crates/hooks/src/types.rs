//! Hook record and callback types.

use std::fmt;
use std::sync::Arc;

use converge_core::{PropertyMap, Urn};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Arguments handed to a resource hook callback.
#[derive(Debug, Clone)]
pub struct ResourceHookArgs {
    /// Cancellation signal for the enclosing deployment.
    pub cancel: CancellationToken,
    /// The resource the hook fires for.
    pub urn: Urn,
    /// Provider-assigned id; empty before creation.
    pub id: String,
    /// New inputs, when the operation has them.
    pub new_inputs: Option<PropertyMap>,
    /// Old inputs, when the operation has them.
    pub old_inputs: Option<PropertyMap>,
    /// New outputs; populated for after-hooks.
    pub new_outputs: Option<PropertyMap>,
    /// Old outputs, when the operation has them.
    pub old_outputs: Option<PropertyMap>,
}

/// Arguments handed to an error hook callback.
#[derive(Debug, Clone)]
pub struct ErrorHookArgs {
    /// Cancellation signal for the enclosing deployment.
    pub cancel: CancellationToken,
    /// The resource the failed operation targeted.
    pub urn: Urn,
    /// Provider-assigned id; empty before creation.
    pub id: String,
    /// Inputs of the failed operation, when it has them.
    pub inputs: Option<PropertyMap>,
    /// Errors accumulated across attempts, most recent first.
    pub errors: Vec<String>,
}

/// Callback type for resource hooks; an `Err` carries the failure message.
pub type ResourceHookFn =
    Arc<dyn Fn(ResourceHookArgs) -> BoxFuture<'static, std::result::Result<(), String>> + Send + Sync>;

/// Callback type for error hooks; `Ok(true)` requests a retry of the failed
/// operation, `Err` carries a failure of the hook itself.
pub type ErrorHookFn =
    Arc<dyn Fn(ErrorHookArgs) -> BoxFuture<'static, std::result::Result<bool, String>> + Send + Sync>;

/// A named lifecycle hook.
#[derive(Clone)]
pub struct ResourceHook {
    /// Registered name.
    pub name: String,
    /// The callback.
    pub callback: ResourceHookFn,
    /// Whether the hook also runs during previews.
    pub on_dry_run: bool,
}

impl fmt::Debug for ResourceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHook")
            .field("name", &self.name)
            .field("on_dry_run", &self.on_dry_run)
            .finish_non_exhaustive()
    }
}

/// A named error hook with a retry decision.
#[derive(Clone)]
pub struct ErrorHook {
    /// Registered name.
    pub name: String,
    /// The callback.
    pub callback: ErrorHookFn,
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHook")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
