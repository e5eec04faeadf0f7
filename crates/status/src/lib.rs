//! # converge-status
//!
//! Resource-status side-channel for the converge deployment engine.
//!
//! While the step executor runs a provider operation for a resource, the
//! provider may report intermediate "view" sub-steps: nested resources whose
//! lifecycle is tied to the enclosing operation. This crate provides
//!
//! - [`StatusRegistry`]: the token table shared by the executor and the gRPC
//!   surface: reserve a token, buffer published steps, drain on release;
//! - [`serve`]: a localhost tonic server exposing ReserveToken /
//!   PublishViewSteps / ReleaseToken to providers;
//! - [`view`]: materialization of published view identities into
//!   [`converge_core::ResourceState`] records.

pub mod convert;
pub mod error;
pub mod proto;
pub mod registry;
pub mod server;
pub mod view;

pub use convert::{map_to_struct, struct_to_map, view_step_from_proto, view_step_to_proto};
pub use error::{Error, Result};
pub use registry::{PublishedViewStep, StatusRegistry, TokenInfo, ViewStepObserver};
pub use server::{serve, StatusServerHandle, StatusService};
pub use view::{materialize_view_state, view_state_urn};
