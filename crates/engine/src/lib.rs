//! # converge-engine
//!
//! The execution core of the converge deployment engine: given a program
//! that registers desired resources and a prior snapshot of deployed state,
//! plan and carry out the minimal sequence of provider operations that
//! converges the live world to the desired state.
//!
//! ## Architecture
//!
//! ```text
//! program events ──► StepGenerator ──► Steps ──► StepExecutor
//!                        │                          │
//!                 prior Snapshot            Provider / Hooks /
//!                 Plan / Analyzers          StatusRegistry / SnapshotSink
//! ```
//!
//! The [`Deployment`] object owns all per-run state and wires the pieces
//! together; [`Importer`] drives the same machinery with synthetic steps;
//! [`OutputWaiterStore`] coordinates co-deployed stacks.

pub mod analyzer;
pub mod deployment;
pub mod error;
pub mod events;
pub mod executor;
pub mod generator;
pub mod importer;
pub mod options;
pub mod plan;
pub mod provider;
pub mod trace;
pub mod waiter;

pub use analyzer::{Analyzer, EnforcementLevel, PolicyViolation};
pub use deployment::{Deployment, DeploymentBuilder, DeploymentSummary};
pub use error::{Error, Result};
pub use events::{
    DiagnosticSink, EventSource, NoopStepEvents, ProgramEvent, ReadResourceEvent, ReadResult,
    RegisterOutputsEvent, RegisterResourceEvent, RegisterResult, StepEventSink, StepPayload,
    TracingDiagnostics,
};
pub use executor::StepExecutor;
pub use generator::StepGenerator;
pub use importer::{ImportRequest, Importer};
pub use options::DeploymentOptions;
pub use plan::{DeploymentPlan, ResourcePlan};
pub use provider::{
    CheckOutcome, CreateOutcome, Provider, ProviderError, ProviderRegistry, ProviderResult,
    ReadOutcome, RegistryProvider, UpdateOutcome,
};
pub use trace::init_tracing;
pub use waiter::OutputWaiterStore;
