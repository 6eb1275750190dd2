//! End-to-end bridge tests against an in-process mock daemon.
//!
//! The mock stands in for the Docker Engine: lifecycle events arrive
//! through a channel the test controls, and attach endpoints are duplex
//! pipes the test holds the far ends of.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use whaletalk_core::{
    AccountHandle, BuddyHandle, ContainerEvent, ContainerEventKind, ContainerId, ContainerMeta,
    HostRuntime,
};
use whaletalk_docker::{AttachStreams, ContainerDaemon, DaemonError, EventStream};
use whaletalkd::account::DaemonConnector;
use whaletalkd::registry::{AccountRegistry, BridgeConfig};

// ============================================================================
// Mock daemon
// ============================================================================

/// The test-held far ends of one attach.
struct AttachEnds {
    /// Write here to produce container stdout.
    stdout_feed: DuplexStream,
    /// Write here to produce container stderr.
    stderr_feed: DuplexStream,
    /// Read here to observe what was sent to container stdin.
    stdin_sink: DuplexStream,
}

struct MockDaemon {
    metas: Mutex<HashMap<String, ContainerMeta>>,
    running: Mutex<Vec<ContainerId>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<Result<ContainerEvent, DaemonError>>>>,
    attached: Mutex<HashMap<String, AttachEnds>>,
}

impl MockDaemon {
    fn new() -> (
        Arc<Self>,
        mpsc::UnboundedSender<Result<ContainerEvent, DaemonError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = Arc::new(Self {
            metas: Mutex::new(HashMap::new()),
            running: Mutex::new(Vec::new()),
            events: Mutex::new(Some(rx)),
            attached: Mutex::new(HashMap::new()),
        });
        (daemon, tx)
    }

    fn connector(self: &Arc<Self>) -> DaemonConnector {
        let daemon = Arc::clone(self);
        Arc::new(move || Ok(Arc::clone(&daemon) as Arc<dyn ContainerDaemon>))
    }

    fn add_container(&self, meta: ContainerMeta) {
        self.metas
            .lock()
            .unwrap()
            .insert(meta.id.as_str().to_string(), meta);
    }

    fn mark_running(&self, id: &ContainerId) {
        self.running.lock().unwrap().push(id.clone());
    }

    fn is_attached(&self, name: &str) -> bool {
        self.attached.lock().unwrap().contains_key(name)
    }

    fn take_attach(&self, name: &str) -> AttachEnds {
        self.attached
            .lock()
            .unwrap()
            .remove(name)
            .expect("container not attached")
    }
}

#[async_trait]
impl ContainerDaemon for MockDaemon {
    async fn running_containers(&self) -> Result<Vec<ContainerId>, DaemonError> {
        Ok(self.running.lock().unwrap().clone())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerMeta, DaemonError> {
        self.metas
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| DaemonError::Unavailable(format!("no such container: {id}")))
    }

    async fn subscribe_events(&self) -> Result<EventStream, DaemonError> {
        let rx = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DaemonError::Unavailable("already subscribed".to_string()))?;
        Ok(Box::pin(futures_util::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|event| (event, rx)) },
        )))
    }

    async fn attach(&self, id: &ContainerId) -> Result<AttachStreams, DaemonError> {
        let meta = self.inspect(id).await?;
        let (stdout_read, stdout_feed) = tokio::io::duplex(1024);
        let (stderr_read, stderr_feed) = tokio::io::duplex(1024);
        let (stdin_sink, stdin_write) = tokio::io::duplex(1024);

        self.attached.lock().unwrap().insert(
            meta.name,
            AttachEnds {
                stdout_feed,
                stderr_feed,
                stdin_sink,
            },
        );

        Ok(AttachStreams {
            stdin: Box::pin(stdin_write),
            stdout: Box::new(stdout_read),
            stderr: Box::new(stderr_read),
            keepalive: Box::pin(futures_util::future::pending()),
        })
    }
}

// ============================================================================
// Test helpers
// ============================================================================

/// Records every host mutation for assertions.
#[derive(Default)]
struct RecordingHost {
    buddies: Vec<(String, String, bool)>,
    presence: Vec<(String, bool)>,
    messages: Vec<(String, String)>,
    connected: bool,
    next_handle: u64,
}

impl HostRuntime for RecordingHost {
    fn ensure_buddy(&mut self, name: &str, group: &str, online: bool) -> BuddyHandle {
        self.buddies
            .push((name.to_string(), group.to_string(), online));
        self.next_handle += 1;
        BuddyHandle(self.next_handle)
    }
    fn set_buddy_presence(&mut self, name: &str, online: bool) {
        self.presence.push((name.to_string(), online));
    }
    fn deliver_message(&mut self, from: &str, text: &str, _received: DateTime<Utc>) {
        self.messages.push((from.to_string(), text.to_string()));
    }
    fn set_connected(&mut self) {
        self.connected = true;
    }
}

fn meta(id: &str, name: &str, interactive: bool) -> ContainerMeta {
    ContainerMeta::from_inspect(ContainerId::new(id), name, interactive)
}

fn event(kind: ContainerEventKind, id: &str) -> Result<ContainerEvent, DaemonError> {
    Ok(ContainerEvent::new(kind, ContainerId::new(id)))
}

/// Polls `cond` until it holds, panicking after two seconds.
async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

const ACCOUNT: AccountHandle = AccountHandle(1);

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_created_container_becomes_buddy_and_start_brings_it_online() {
    let (mock, events) = MockDaemon::new();
    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    let session = registry.login(ACCOUNT).await;

    let mut host = RecordingHost::default();
    registry.pump(ACCOUNT, &mut host);
    assert!(host.connected);

    mock.add_container(meta("c0ffee000001", "web", true));
    events.send(event(ContainerEventKind::Create, "c0ffee000001")).unwrap();
    wait_for("container registration", || session.container_count() == 1).await;

    // After create: offline buddy, no presence change yet, no attach.
    registry.pump(ACCOUNT, &mut host);
    assert_eq!(
        host.buddies,
        vec![("web".to_string(), "containers".to_string(), false)]
    );
    assert!(host.presence.is_empty());
    assert!(!mock.is_attached("web"));

    events.send(event(ContainerEventKind::Start, "c0ffee000001")).unwrap();
    wait_for("attach", || mock.is_attached("web")).await;

    registry.pump(ACCOUNT, &mut host);
    assert!(host.presence.contains(&("web".to_string(), true)));

    registry.logout(ACCOUNT);
}

#[tokio::test]
async fn test_console_output_arrives_as_messages() {
    let (mock, events) = MockDaemon::new();
    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    registry.login(ACCOUNT).await;

    mock.add_container(meta("c0ffee000002", "web", true));
    events.send(event(ContainerEventKind::Create, "c0ffee000002")).unwrap();
    events.send(event(ContainerEventKind::Start, "c0ffee000002")).unwrap();
    wait_for("attach", || mock.is_attached("web")).await;

    let mut ends = mock.take_attach("web");
    ends.stdout_feed.write_all(b"hello\n").await.unwrap();
    ends.stderr_feed.write_all(b"oops\n").await.unwrap();

    // Messages surface only through a pump once the receive workers have
    // queued them.
    let mut host = RecordingHost::default();
    wait_for_messages(&registry, &mut host, 2).await;

    assert!(host.messages.contains(&("web".to_string(), "hello".to_string())));
    assert!(host.messages.contains(&("web".to_string(), "oops".to_string())));

    registry.logout(ACCOUNT);
}

#[tokio::test]
async fn test_outgoing_message_reaches_container_stdin() {
    let (mock, events) = MockDaemon::new();
    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    registry.login(ACCOUNT).await;

    mock.add_container(meta("c0ffee000003", "web", true));
    events.send(event(ContainerEventKind::Create, "c0ffee000003")).unwrap();
    events.send(event(ContainerEventKind::Start, "c0ffee000003")).unwrap();
    wait_for("attach", || mock.is_attached("web")).await;
    let mut ends = mock.take_attach("web");

    // Stdin is installed shortly after the mock registers the attach;
    // until then the send reports the zero sentinel and writes nothing.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if registry.send_outgoing(ACCOUNT, "web", "ping").await == "ping".len() {
            break;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for stdin to come up");
        }
        sleep(Duration::from_millis(10)).await;
    }

    let mut buf = vec![0u8; 5];
    ends.stdin_sink.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping\n");

    registry.logout(ACCOUNT);
}

#[tokio::test]
async fn test_dead_container_goes_offline_and_rejects_sends() {
    let (mock, events) = MockDaemon::new();
    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    let session = registry.login(ACCOUNT).await;

    mock.add_container(meta("c0ffee000004", "web", true));
    events.send(event(ContainerEventKind::Create, "c0ffee000004")).unwrap();
    events.send(event(ContainerEventKind::Start, "c0ffee000004")).unwrap();
    wait_for("attach", || mock.is_attached("web")).await;
    let container = session.container("web").expect("container registered");

    events.send(event(ContainerEventKind::Die, "c0ffee000004")).unwrap();
    wait_for("container removal", || session.container("web").is_none()).await;

    assert!(container.is_cancelled());

    let mut host = RecordingHost::default();
    registry.pump(ACCOUNT, &mut host);
    assert!(host.presence.contains(&("web".to_string(), false)));

    // Unknown recipient now, reported as the zero sentinel.
    assert_eq!(registry.send_outgoing(ACCOUNT, "web", "hi").await, 0);

    registry.logout(ACCOUNT);
}

#[tokio::test]
async fn test_snapshot_scan_attaches_already_running_containers() {
    let (mock, _events) = MockDaemon::new();
    mock.add_container(meta("c0ffee000005", "web", true));
    mock.add_container(meta("c0ffee000006", "db", false));
    mock.mark_running(&ContainerId::new("c0ffee000005"));
    mock.mark_running(&ContainerId::new("c0ffee000006"));

    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    let session = registry.login(ACCOUNT).await;

    assert_eq!(session.container_count(), 2);
    wait_for("attach", || mock.is_attached("web")).await;
    // Non-interactive containers are presence-only.
    assert!(!mock.is_attached("db"));

    let mut host = RecordingHost::default();
    registry.pump(ACCOUNT, &mut host);
    assert_eq!(host.buddies.len(), 2);
    assert!(host.presence.contains(&("web".to_string(), true)));
    assert!(host.presence.contains(&("db".to_string(), true)));

    registry.logout(ACCOUNT);
}

#[tokio::test]
async fn test_logout_ends_every_container_scope_and_discards_pending_calls() {
    let (mock, events) = MockDaemon::new();
    let registry = AccountRegistry::new(mock.connector(), BridgeConfig::default());
    let session = registry.login(ACCOUNT).await;

    for (id, name) in [
        ("c0ffee00000a", "web"),
        ("c0ffee00000b", "db"),
        ("c0ffee00000c", "cache"),
    ] {
        mock.add_container(meta(id, name, true));
        events.send(event(ContainerEventKind::Create, id)).unwrap();
        events.send(event(ContainerEventKind::Start, id)).unwrap();
    }
    wait_for("attaches", || {
        mock.is_attached("web") && mock.is_attached("db") && mock.is_attached("cache")
    })
    .await;

    let containers: Vec<_> = ["web", "db", "cache"]
        .iter()
        .filter_map(|name| session.container(name))
        .collect();
    assert_eq!(containers.len(), 3);

    // A message still queued at logout must never reach the host.
    session.deliver_incoming("web", "too late");
    registry.logout(ACCOUNT);

    assert!(session.is_cancelled());
    for container in &containers {
        assert!(container.is_cancelled());
    }

    let mut host = RecordingHost::default();
    assert_eq!(session.pump(&mut host), 0);
    assert!(host.messages.is_empty());
    assert!(registry.is_empty());
}

/// Pumps the registry until `count` messages arrived, panicking after two
/// seconds.
async fn wait_for_messages(registry: &AccountRegistry, host: &mut RecordingHost, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while host.messages.len() < count {
        registry.pump(ACCOUNT, host);
        if Instant::now() > deadline {
            panic!(
                "timed out waiting for {count} messages, got {:?}",
                host.messages
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
}
