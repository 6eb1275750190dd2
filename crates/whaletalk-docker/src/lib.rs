//! Whaletalk Docker - the container daemon seam.
//!
//! This crate defines the `ContainerDaemon` trait the bridge consumes
//! (list, inspect, event subscription, streaming attach) and implements it
//! against the Docker Engine API via `bollard`.
//!
//! The bridge only ever sees the trait; tests substitute an in-memory
//! daemon.

pub mod daemon;
pub mod docker;

pub use daemon::{
    AttachKeepalive, AttachStreams, ContainerDaemon, DaemonError, EventStream,
};
pub use docker::DockerDaemon;
