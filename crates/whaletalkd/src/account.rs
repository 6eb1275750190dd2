//! Per-account session state and orchestration.
//!
//! An `AccountSession` owns the account lifetime scope, the buddy and
//! container registries, the deferred call queue, and the lazily-created
//! daemon client shared by all of the account's workers.
//!
//! # Thread safety
//!
//! The registries sit behind one read/write lock: lookups (outgoing sends)
//! run concurrently, create/remove are exclusive. Host-side state - buddy
//! handles, presence, conversations - is only ever touched from inside a
//! drained deferred call, so those mutations all happen on the host
//! thread regardless of which worker requested them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use whaletalk_core::{AccountHandle, BuddyHandle, ContainerMeta, HostRuntime, OutgoingError};
use whaletalk_docker::{ContainerDaemon, DaemonError};

use crate::container::ContainerSession;
use crate::events::spawn_event_worker;
use crate::queue::DeferredCallQueue;

/// Creates the daemon client on first use. Shared so every account can
/// carry its own lazily-built client from one injected factory.
pub type DaemonConnector =
    Arc<dyn Fn() -> Result<Arc<dyn ContainerDaemon>, DaemonError> + Send + Sync>;

/// Connection lifecycle of an account. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Online,
    Disconnecting,
    Closed,
}

/// State guarded by the account's single read/write lock.
struct AccountState {
    phase: ConnectionPhase,
    /// Buddy name -> host handle. Mutated only inside drained calls.
    buddies: HashMap<String, BuddyHandle>,
    /// Container name -> live session.
    containers: HashMap<String, Arc<ContainerSession>>,
}

/// One logged-in identity and everything it owns.
pub struct AccountSession {
    handle: AccountHandle,
    scope: CancellationToken,
    group: String,
    connector: DaemonConnector,
    daemon: Mutex<Option<Arc<dyn ContainerDaemon>>>,
    state: RwLock<AccountState>,
    queue: DeferredCallQueue,
}

impl AccountSession {
    /// Creates a session in the `Connecting` phase. `group` is the buddy
    /// group containers are listed under.
    pub fn new(handle: AccountHandle, connector: DaemonConnector, group: String) -> Arc<Self> {
        let scope = CancellationToken::new();
        Arc::new(Self {
            handle,
            queue: DeferredCallQueue::new(scope.clone()),
            scope,
            group,
            connector,
            daemon: Mutex::new(None),
            state: RwLock::new(AccountState {
                phase: ConnectionPhase::Connecting,
                buddies: HashMap::new(),
                containers: HashMap::new(),
            }),
        })
    }

    pub fn handle(&self) -> AccountHandle {
        self.handle
    }

    /// Resolves when the account's lifetime scope ends.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.scope.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.read_state().phase
    }

    pub fn is_online(&self) -> bool {
        self.phase() == ConnectionPhase::Online
    }

    /// Brings the account online: marks the connection established (via
    /// the queue), starts event ingestion, and reconciles against the
    /// daemon's current container snapshot.
    pub async fn login(self: &Arc<Self>) {
        info!(account = %self.handle, "logging in");
        self.write_state().phase = ConnectionPhase::Online;

        self.queue.enqueue(|host| {
            host.set_connected();
        });

        spawn_event_worker(Arc::clone(self));
        self.scan_containers().await;
    }

    /// Ends the account's lifetime. Every container session and worker
    /// observes the cancellation, and deferred calls still pending are
    /// discarded at the next drain.
    pub fn logout(&self) {
        info!(account = %self.handle, "logging out");
        self.write_state().phase = ConnectionPhase::Disconnecting;
        self.scope.cancel();
        self.write_state().phase = ConnectionPhase::Closed;
    }

    /// The shared daemon client, created on first use. Returns `None` and
    /// logs when the daemon cannot be reached; the account then stays
    /// online but blind to containers, and the next call retries.
    pub fn daemon(&self) -> Option<Arc<dyn ContainerDaemon>> {
        let mut guard = match self.daemon.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            match (self.connector)() {
                Ok(client) => *guard = Some(client),
                Err(err) => {
                    error!(account = %self.handle, error = %err, "cannot create daemon client");
                    return None;
                }
            }
        }
        guard.clone()
    }

    /// Registers a container session and schedules creation of its
    /// offline buddy. Must be called once per distinct container identity.
    pub fn register_container(self: &Arc<Self>, meta: ContainerMeta) -> Arc<ContainerSession> {
        let session = ContainerSession::new(meta, &self.scope);
        let name = session.name().to_string();
        debug!(
            account = %self.handle,
            container = %name,
            interactive = session.interactive(),
            "registering container"
        );
        self.write_state()
            .containers
            .insert(name.clone(), Arc::clone(&session));

        let this = Arc::clone(self);
        self.queue.enqueue(move |host| {
            let mut state = this.write_state();
            if state.buddies.contains_key(&name) {
                return;
            }
            let buddy = host.ensure_buddy(&name, &this.group, false);
            state.buddies.insert(name, buddy);
        });

        session
    }

    /// Queues delivery of a line from `from` as an incoming message. The
    /// receive timestamp is captured now, not at drain time. Dropped
    /// silently if the account is no longer online when the queue drains.
    pub fn deliver_incoming(self: &Arc<Self>, from: &str, text: &str) {
        let received = Utc::now();
        let this = Arc::clone(self);
        let from = from.to_string();
        let text = text.to_string();
        self.queue.enqueue(move |host| {
            if !this.is_online() {
                return;
            }
            host.deliver_message(&from, &text, received);
        });
    }

    /// Queues a presence toggle for the named buddy.
    pub fn set_presence(self: &Arc<Self>, name: &str, online: bool) {
        let name = name.to_string();
        self.queue.enqueue(move |host| {
            host.set_buddy_presence(&name, online);
        });
    }

    /// Forwards an outgoing message to the named container's stdin.
    pub async fn send_outgoing(&self, to: &str, text: &str) -> Result<usize, OutgoingError> {
        let session = self
            .read_state()
            .containers
            .get(to)
            .cloned()
            .ok_or_else(|| OutgoingError::UnknownRecipient(to.to_string()))?;
        Ok(session.send_input(text).await?)
    }

    /// Handles a container start: presence online, then attach.
    pub fn container_started(self: &Arc<Self>, name: &str) {
        let session = self.read_state().containers.get(name).cloned();
        match session {
            Some(session) => {
                self.set_presence(name, true);
                session.attach(self);
            }
            None => {
                warn!(account = %self.handle, container = %name, "ignoring start event for unknown container");
            }
        }
    }

    /// Handles a container death: remove from the registry, cancel its
    /// scope, presence offline.
    pub fn container_died(self: &Arc<Self>, name: &str) {
        let session = self.write_state().containers.remove(name);
        match session {
            Some(session) => {
                session.cancel();
                self.set_presence(name, false);
            }
            None => {
                warn!(account = %self.handle, container = %name, "ignoring die event for unknown container");
            }
        }
    }

    /// One full snapshot reconciliation: every currently running container
    /// is registered, marked present, and attached. Per-container inspect
    /// failures are logged and skipped.
    pub async fn scan_containers(self: &Arc<Self>) {
        let Some(daemon) = self.daemon() else {
            return;
        };

        let ids = match daemon.running_containers().await {
            Ok(ids) => ids,
            Err(err) => {
                error!(account = %self.handle, error = %err, "cannot list containers");
                return;
            }
        };

        debug!(account = %self.handle, count = ids.len(), "scanning running containers");
        for id in ids {
            match daemon.inspect(&id).await {
                Ok(meta) => {
                    let name = meta.name.clone();
                    let session = self.register_container(meta);
                    self.set_presence(&name, true);
                    session.attach(self);
                }
                Err(err) => {
                    warn!(container = %id.short(), error = %err, "failed to inspect container");
                }
            }
        }
    }

    /// Drains the deferred call queue. The caller must be the host thread;
    /// owning `&mut host` is what proves it.
    pub fn pump(&self, host: &mut dyn HostRuntime) -> usize {
        self.queue.drain(host)
    }

    /// Looks up a live container session by name.
    pub fn container(&self, name: &str) -> Option<Arc<ContainerSession>> {
        self.read_state().containers.get(name).cloned()
    }

    /// Number of live container sessions.
    pub fn container_count(&self) -> usize {
        self.read_state().containers.len()
    }

    /// Whether a buddy handle exists for `name` (only ever set from a
    /// drained call).
    pub fn has_buddy(&self, name: &str) -> bool {
        self.read_state().buddies.contains_key(name)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, AccountState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AccountState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
