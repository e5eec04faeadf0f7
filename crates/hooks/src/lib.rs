//! # converge-hooks
//!
//! Lifecycle and error hook registries for the converge deployment engine.
//!
//! Programs register named callbacks; resource states reference them by name
//! per lifecycle phase. The step executor resolves names through
//! [`HookRegistry`] and runs the callbacks around provider operations; error
//! hooks additionally decide whether a failed operation is retried.

pub mod error;
pub mod registry;
pub mod types;

pub use error::{Error, Result};
pub use registry::HookRegistry;
pub use types::{
    ErrorHook, ErrorHookArgs, ErrorHookFn, ResourceHook, ResourceHookArgs, ResourceHookFn,
};
