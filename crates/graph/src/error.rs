//! Error types for graph queries.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the graph error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while querying a dependency graph.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A resource references a dependency listed after it.
    #[error("resource {resource} depends on {dependency}, which is registered after it")]
    #[diagnostic(
        code(converge_graph::forward_reference),
        help("snapshot order must be a topological order of the dependency relation")
    )]
    ForwardReference {
        /// The offending resource.
        resource: String,
        /// The dependency registered later.
        dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle detected in resource list")]
    #[diagnostic(code(converge_graph::cycle_detected))]
    CycleDetected,
}
