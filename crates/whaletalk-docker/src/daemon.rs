//! The `ContainerDaemon` trait and its wire types.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use whaletalk_core::{ContainerEvent, ContainerId, ContainerMeta};

/// Errors talking to the container daemon.
///
/// None of these are fatal to an account: client-construction and
/// subscription failures degrade the account to "online but blind to
/// containers", and per-call failures are logged at the call site.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A Docker Engine API call failed.
    #[error("daemon request failed: {0}")]
    Api(#[from] bollard::errors::Error),

    /// The inspect response was missing a field the bridge requires.
    #[error("inspect response for {id} missing {field}")]
    IncompleteInspect { id: String, field: &'static str },

    /// The daemon could not be reached at all.
    #[error("daemon unavailable: {0}")]
    Unavailable(String),
}

/// A live subscription to the daemon's lifecycle events, already filtered
/// to the statuses the bridge tracks. Dropping the stream unsubscribes.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ContainerEvent, DaemonError>> + Send>>;

/// Future that keeps a streaming attach alive, pumping the daemon's framed
/// output into the stdout/stderr readers of an [`AttachStreams`]. Resolves
/// when the daemon ends the attach, errors, or both readers are dropped.
pub type AttachKeepalive = Pin<Box<dyn Future<Output = Result<(), DaemonError>> + Send>>;

/// Endpoints of one streaming attach.
///
/// `stdout` and `stderr` are independent byte streams; each preserves its
/// own ordering but nothing is guaranteed between the two. The caller must
/// drive `keepalive` for bytes to flow.
pub struct AttachStreams {
    /// Write side: bytes sent to the container's stdin.
    pub stdin: Pin<Box<dyn AsyncWrite + Send>>,

    /// Read side: the container's stdout.
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,

    /// Read side: the container's stderr.
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,

    /// Drives the attach call for as long as the session lives.
    pub keepalive: AttachKeepalive,
}

/// The container daemon as the bridge sees it.
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    /// IDs of currently running containers.
    async fn running_containers(&self) -> Result<Vec<ContainerId>, DaemonError>;

    /// Resolves a container's metadata by ID.
    async fn inspect(&self, id: &ContainerId) -> Result<ContainerMeta, DaemonError>;

    /// Subscribes to the live lifecycle event stream, filtered to
    /// container create/start/die.
    async fn subscribe_events(&self) -> Result<EventStream, DaemonError>;

    /// Attaches to a container's stdin/stdout/stderr in streaming mode.
    async fn attach(&self, id: &ContainerId) -> Result<AttachStreams, DaemonError>;
}
