//! Container identity and metadata.

use std::fmt;

/// Opaque container identifier assigned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened form for log output (first 12 characters,
    /// the daemon's conventional short ID).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Metadata resolved by inspecting a container.
///
/// The display name doubles as the buddy identity: it is unique among the
/// containers an account tracks at any instant, though the daemon may reuse
/// it after a death has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMeta {
    /// Daemon-assigned identifier.
    pub id: ContainerId,

    /// Display name with the daemon's leading separator stripped.
    pub name: String,

    /// Whether the container was created with stdin open. Only
    /// interactive containers support bidirectional attach; the rest are
    /// presence-only.
    pub interactive: bool,
}

impl ContainerMeta {
    /// Builds metadata from raw inspect fields.
    ///
    /// The daemon reports names with a fixed leading `/`; it is stripped
    /// here so the rest of the system only ever sees the bare name.
    pub fn from_inspect(id: ContainerId, raw_name: &str, interactive: bool) -> Self {
        let name = raw_name.strip_prefix('/').unwrap_or(raw_name).to_string();
        Self {
            id,
            name,
            interactive,
        }
    }
}
