//! # converge-core
//!
//! Resource data model for the converge deployment engine.
//!
//! This crate defines the vocabulary the engine crates share:
//!
//! - [`Urn`]: canonical cross-run resource identity
//! - [`ResourceState`] / [`Goal`] / [`Snapshot`]: persisted and desired state
//! - [`Step`] / [`StepOp`]: planned operations as a tagged variant
//! - [`DiffResult`] and friends: provider diff shapes
//! - [`Manifest`]: snapshot metadata
//!
//! It carries no engine behavior: generation and execution live in
//! `converge-engine`, graph algorithms in `converge-graph`.

pub mod diff;
pub mod error;
pub mod manifest;
pub mod property;
pub mod state;
pub mod step;
pub mod urn;

pub use diff::{CheckFailure, DiffChanges, DiffKind, DiffResult, PropertyDiff};
pub use error::{Error, Result};
pub use manifest::{Manifest, PluginInfo, PluginKind, MANIFEST_MAGIC};
pub use property::{PathSegment, PropertyMap, PropertyPath, UNKNOWN_VALUE_SENTINEL};
pub use state::{
    Alias, CustomTimeouts, DeleteBeforeReplace, Goal, HookPhase, InMemorySnapshotSink,
    ProviderReference, ResourceState, Snapshot, SnapshotSink, DENY_DEFAULT_PROVIDER_ID,
};
pub use step::{EventId, ResourceStatus, Step, StepOp, ViewStep, ViewStepState};
pub use urn::{Urn, PROVIDER_TYPE_PREFIX, ROOT_STACK_TYPE, URN_PREFIX};
