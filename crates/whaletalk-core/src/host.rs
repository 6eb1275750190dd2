//! The host runtime seam.
//!
//! The IM engine that displays buddies and conversations is single-threaded
//! and its API is not reentrant-safe from foreign threads. The bridge never
//! holds a reference to it: background workers enqueue deferred calls of
//! type `FnOnce(&mut dyn HostRuntime)`, and whichever thread owns the host
//! passes it in when draining the queue. Only that thread can ever run the
//! calls, so the non-reentrancy rule is enforced by ownership rather than
//! by convention.

use chrono::{DateTime, Utc};

/// Opaque handle identifying an account to the host runtime.
///
/// Replaces the original design's process-wide map keyed on a raw engine
/// pointer; the host picks the value and the bridge treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountHandle(pub u64);

impl std::fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

/// Opaque handle to a buddy-list entry owned by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuddyHandle(pub u64);

/// Operations the bridge performs against the IM engine.
///
/// Every method mutates host-owned state and must only be called from
/// inside a drained deferred call (see `whaletalkd::queue`).
pub trait HostRuntime {
    /// Adds `name` to the buddy list under `group` if absent, without
    /// persisting it, and returns the handle. An existing buddy keeps its
    /// handle.
    fn ensure_buddy(&mut self, name: &str, group: &str, online: bool) -> BuddyHandle;

    /// Toggles a buddy's online/offline presence.
    fn set_buddy_presence(&mut self, name: &str, online: bool);

    /// Writes a received message into the conversation with `from`,
    /// creating the conversation if it does not exist. `received` is the
    /// timestamp captured when the message was queued, not when it was
    /// drained.
    fn deliver_message(&mut self, from: &str, text: &str, received: DateTime<Utc>);

    /// Marks the account's connection as established.
    fn set_connected(&mut self);
}
