//! Generated protobuf bindings for the resource-status service.

/// Bindings for `converge.status.v1`.
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    unsafe_code
)]
pub mod v1 {
    include!("converge.status.v1.rs");
}
