//! Container lifecycle events consumed from the daemon's event stream.

use std::fmt;

use crate::container::ContainerId;

/// The lifecycle transitions the bridge reacts to.
///
/// The daemon emits many more statuses (pause, restart, exec_create, ...);
/// everything outside this set is dropped at the subscription boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEventKind {
    /// Container was created but has not started.
    Create,
    /// Container started running.
    Start,
    /// Container exited.
    Die,
}

impl ContainerEventKind {
    /// Maps a daemon status string to an event kind, `None` for statuses
    /// the bridge does not track.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "create" => Some(Self::Create),
            "start" => Some(Self::Start),
            "die" => Some(Self::Die),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Die => write!(f, "die"),
        }
    }
}

/// A single container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// What happened.
    pub kind: ContainerEventKind,
    /// Which container it happened to.
    pub id: ContainerId,
}

impl ContainerEvent {
    pub fn new(kind: ContainerEventKind, id: ContainerId) -> Self {
        Self { kind, id }
    }
}
