//! Whaletalk Core - Shared types for the container-to-IM bridge
//!
//! This crate provides the domain types shared between the daemon seam
//! (whaletalk-docker) and the bridge itself (whaletalkd):
//! container identity and metadata, lifecycle events, the error taxonomy,
//! and the `HostRuntime` trait standing in for the IM engine.
//!
//! Production code follows the panic-free policy: no `.unwrap()`,
//! `.expect()`, `panic!()`, or direct indexing.

pub mod container;
pub mod error;
pub mod event;
pub mod host;

// Re-exports for convenience
pub use container::{ContainerId, ContainerMeta};
pub use error::{OutgoingError, SendError};
pub use event::{ContainerEvent, ContainerEventKind};
pub use host::{AccountHandle, BuddyHandle, HostRuntime};
