//! Error types for the resource-status side-channel.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the status error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the status registry and server.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A publish referenced a token that was never reserved or was already
    /// released.
    #[error("unknown status token: {token}")]
    #[diagnostic(code(converge_status::unknown_token))]
    UnknownToken {
        /// The offending token.
        token: String,
    },

    /// A token was reserved twice for the same URN.
    #[error("a status token is already reserved for {urn}")]
    #[diagnostic(code(converge_status::token_already_reserved))]
    AlreadyReserved {
        /// The URN with an active token.
        urn: String,
    },

    /// A published view step could not be decoded.
    #[error("invalid view step: {message}")]
    #[diagnostic(code(converge_status::invalid_view_step))]
    InvalidViewStep {
        /// Decode failure detail.
        message: String,
    },

    /// Data model error while materializing a view state.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] converge_core::Error),

    /// gRPC transport error while serving.
    #[error("gRPC transport error: {0}")]
    #[diagnostic(code(converge_status::transport))]
    Transport(#[from] tonic::transport::Error),

    /// IO error while binding the listener.
    #[error("IO error: {0}")]
    #[diagnostic(code(converge_status::io))]
    Io(#[from] std::io::Error),
}
