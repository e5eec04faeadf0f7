//! Error types for the resource data model.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the data model layer.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A URN string did not match the canonical format.
    #[error("invalid URN: {urn}: {message}")]
    #[diagnostic(code(converge_core::invalid_urn))]
    InvalidUrn {
        /// The offending string.
        urn: String,
        /// What was wrong with it.
        message: String,
    },

    /// A property path string could not be parsed.
    #[error("invalid property path {path:?}: {message}")]
    #[diagnostic(code(converge_core::invalid_property_path))]
    InvalidPropertyPath {
        /// The offending path.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// A provider reference string did not match `<urn>::<id>`.
    #[error("invalid provider reference: {reference}: {message}")]
    #[diagnostic(
        code(converge_core::invalid_provider_reference),
        help("provider references have the form <provider-URN>::<provider-id>")
    )]
    InvalidProviderReference {
        /// The offending string.
        reference: String,
        /// What was wrong with it.
        message: String,
    },

    /// An alias declaration could not be resolved to a URN.
    #[error("invalid alias for resource {name}: {message}")]
    #[diagnostic(code(converge_core::invalid_alias))]
    InvalidAlias {
        /// Resource name the alias was declared on.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A textual token did not name any variant of a model enum.
    #[error("unknown {kind}: {token:?}")]
    #[diagnostic(code(converge_core::invalid_enum_token))]
    InvalidEnumToken {
        /// What was being parsed, e.g. "step operation".
        kind: &'static str,
        /// The unrecognized token.
        token: String,
    },

    /// Serialization failure while encoding or decoding model data.
    #[error("serialization error: {0}")]
    #[diagnostic(code(converge_core::serialization_error))]
    Serialization(#[from] serde_json::Error),
}
