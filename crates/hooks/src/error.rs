//! Error types for hook registration and lookup.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the hooks error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the hook registries.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A hook was registered with an empty name.
    #[error("hook name may not be empty")]
    #[diagnostic(code(converge_hooks::empty_name))]
    EmptyName,

    /// A hook name was registered twice.
    #[error("hook {name:?} is already registered")]
    #[diagnostic(code(converge_hooks::duplicate_name))]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// A resource referenced a hook that was never registered.
    #[error("hook {name:?} is not registered")]
    #[diagnostic(code(converge_hooks::unknown_hook))]
    UnknownHook {
        /// The missing name.
        name: String,
    },
}
