//! Error taxonomy for the send paths.
//!
//! Daemon-side errors live in `whaletalk-docker`; registry-level failures
//! (unknown account) are logged no-ops by design and carry no type here.

use thiserror::Error;

/// Errors writing input to a container's console.
#[derive(Debug, Error)]
pub enum SendError {
    /// The container was created without stdin; it is presence-only.
    #[error("container not interactive: {name}")]
    NotInteractive { name: String },

    /// The container is registered but no attach has completed yet, so
    /// there is no input endpoint to write to.
    #[error("container not attached: {name}")]
    NotAttached { name: String },

    /// The transport accepted fewer bytes than requested.
    #[error("short write to {name}: {written} of {expected} bytes")]
    PartialWrite {
        name: String,
        written: usize,
        expected: usize,
    },

    /// Underlying transport failure.
    #[error("stdin write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors sending an outgoing message through an account.
#[derive(Debug, Error)]
pub enum OutgoingError {
    /// No live container session with that name.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    /// The recipient exists but the write failed.
    #[error(transparent)]
    Send(#[from] SendError),
}
