//! Error types for step generation and execution.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the engine error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning and applying a deployment.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A URN was registered twice in one run.
    #[error("duplicate resource URN: {urn}")]
    #[diagnostic(
        code(converge_engine::duplicate_urn),
        help("resource names must be unique per type within one parent")
    )]
    DuplicateUrn {
        /// The colliding URN.
        urn: String,
    },

    /// A goal referenced a parent that was not registered first.
    #[error("resource {name} references unknown parent {parent}")]
    #[diagnostic(code(converge_engine::unknown_parent))]
    UnknownParent {
        /// The resource name.
        name: String,
        /// The unresolved parent URN.
        parent: String,
    },

    /// The root stack resource carried a parent.
    #[error("the root stack resource may not declare a parent")]
    #[diagnostic(code(converge_engine::root_stack_parent))]
    RootStackHasParent,

    /// A provider `Check` call reported input failures.
    #[error("input validation failed for {urn}: {first}")]
    #[diagnostic(code(converge_engine::check_failed))]
    CheckFailed {
        /// The resource being checked.
        urn: String,
        /// The first failure, `property: reason`.
        first: String,
        /// Remaining failures.
        rest: Vec<String>,
    },

    /// A goal carried an unparsable or denied provider reference.
    #[error("bad provider reference for {urn}: {message}")]
    #[diagnostic(code(converge_engine::bad_provider_reference))]
    BadProviderReference {
        /// The resource whose goal is bad.
        urn: String,
        /// What was wrong.
        message: String,
    },

    /// A goal explicitly denied default providers but named none.
    #[error("default provider for package {package} is denied for {urn}")]
    #[diagnostic(
        code(converge_engine::default_provider_denied),
        help("pass an explicit provider for this resource")
    )]
    DefaultProviderDenied {
        /// The resource requiring a provider.
        urn: String,
        /// The package a default was denied for.
        package: String,
    },

    /// No provider implementation is registered for a package.
    #[error("no provider registered for package {package}")]
    #[diagnostic(code(converge_engine::unknown_provider))]
    UnknownProvider {
        /// The package with no provider.
        package: String,
    },

    /// A protected resource would be deleted.
    #[error("cannot delete protected resource {urn}")]
    #[diagnostic(
        code(converge_engine::protected_delete),
        help("unset `protect` on the resource before removing it")
    )]
    ProtectedDelete {
        /// The protected resource.
        urn: String,
    },

    /// A protected resource would be replaced.
    #[error("cannot replace protected resource {urn}")]
    #[diagnostic(
        code(converge_engine::protected_replace),
        help("unset `protect` on the resource before changing replacement-forcing properties")
    )]
    ProtectedReplace {
        /// The protected resource.
        urn: String,
    },

    /// A replacement was requested for a resource with an explicit import id.
    #[error("imported resource {urn} cannot be replaced while its `id` is set")]
    #[diagnostic(code(converge_engine::import_replace))]
    ImportedResourceReplaced {
        /// The imported resource.
        urn: String,
    },

    /// A step contradicts the recorded plan.
    #[error("plan violation for {urn}: {message}")]
    #[diagnostic(code(converge_engine::plan_violation))]
    PlanViolation {
        /// The resource the step targets.
        urn: String,
        /// How the plan was violated.
        message: String,
    },

    /// A mandatory policy violation.
    #[error("policy violation for {urn}: {message}")]
    #[diagnostic(code(converge_engine::policy_violation))]
    PolicyViolation {
        /// The offending resource.
        urn: String,
        /// The analyzer diagnostic.
        message: String,
    },

    /// A provider operation failed.
    #[error("provider error for {urn}: {message}")]
    #[diagnostic(code(converge_engine::provider_error))]
    ProviderError {
        /// The resource the operation targeted.
        urn: String,
        /// Failure detail.
        message: String,
    },

    /// A pre- or post-hook callback failed.
    #[error("hook {hook} failed for {urn}: {message}")]
    #[diagnostic(code(converge_engine::hook_failed))]
    HookFailed {
        /// The failing hook name.
        hook: String,
        /// The resource the hook fired for.
        urn: String,
        /// Failure detail.
        message: String,
    },

    /// A create is required but its URN was excluded by `--target`.
    #[error("resource {urn} must be created but is not targeted")]
    #[diagnostic(
        code(converge_engine::untargeted_create),
        help("add the URN to --target or drop the target restriction")
    )]
    UntargetedCreate {
        /// The untargeted URN.
        urn: String,
    },

    /// A delete is required but its URN was excluded by `--target`.
    #[error("resource {urn} must be deleted but is not targeted")]
    #[diagnostic(code(converge_engine::untargeted_delete))]
    UntargetedDelete {
        /// The untargeted URN.
        urn: String,
    },

    /// A RegisterResourceOutputs event arrived for an unknown registration.
    #[error("no pending registration for {urn}")]
    #[diagnostic(code(converge_engine::no_pending_registration))]
    NoPendingRegistration {
        /// The URN with no pending registration.
        urn: String,
    },

    /// Co-deployed stacks wait on each other in a cycle.
    #[error("circular dependency: stack {waiter} waits for {target}, which transitively waits back")]
    #[diagnostic(code(converge_engine::output_wait_cycle))]
    OutputWaitCycle {
        /// The waiting stack.
        waiter: String,
        /// The stack being waited for.
        target: String,
    },

    /// An output wait was abandoned because the deployment was cancelled.
    #[error("wait for outputs of stack {target} was cancelled")]
    #[diagnostic(code(converge_engine::output_wait_cancelled))]
    OutputWaitCancelled {
        /// The stack being waited for.
        target: String,
    },

    /// A co-deployed stack failed before publishing outputs.
    #[error("stack {target} failed: {message}")]
    #[diagnostic(code(converge_engine::stack_failed))]
    StackFailed {
        /// The failed stack.
        target: String,
        /// Its failure.
        message: String,
    },

    /// A host event callback returned an error.
    #[error("event callback failed: {message}")]
    #[diagnostic(code(converge_engine::event_callback))]
    EventCallback {
        /// The callback's failure message.
        message: String,
    },

    /// The deployment was cancelled before the operation could run.
    #[error("deployment cancelled")]
    #[diagnostic(code(converge_engine::cancelled))]
    Cancelled,

    /// User-directed early termination.
    #[error("deployment aborted: {message}")]
    #[diagnostic(code(converge_engine::bail))]
    Bail {
        /// Why the deployment stopped.
        message: String,
    },

    /// Data model error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] converge_core::Error),

    /// Dependency graph error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] converge_graph::Error),

    /// Hook registry error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Hooks(#[from] converge_hooks::Error),

    /// Status side-channel error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Status(#[from] converge_status::Error),
}

impl Error {
    /// Whether this error is a user-directed bail rather than a failure.
    #[must_use]
    pub fn is_bail(&self) -> bool {
        matches!(self, Self::Bail { .. } | Self::UntargetedCreate { .. })
    }
}
