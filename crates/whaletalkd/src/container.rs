//! Per-container sessions.
//!
//! A `ContainerSession` owns one container's lifetime scope and, once
//! attached, its console endpoints. Attach spawns two workers: the monitor
//! keeps the daemon attach call alive, the receiver merges stdout and
//! stderr lines and hands them to the account. Both stop when the session
//! scope is cancelled, which happens no later than account logout because
//! the scope is a child of the account's.

use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use whaletalk_core::{ContainerId, ContainerMeta, SendError};

use crate::account::AccountSession;
use crate::lines::LineReader;

type StdinEndpoint = Pin<Box<dyn AsyncWrite + Send>>;

/// One tracked container, keyed by name within its account.
pub struct ContainerSession {
    id: ContainerId,
    name: String,
    interactive: bool,
    scope: CancellationToken,
    // Present only after a successful attach on an interactive session.
    // Held across the write await, hence the async mutex.
    stdin: Mutex<Option<StdinEndpoint>>,
}

impl ContainerSession {
    /// Creates a session whose scope is a child of `parent` (the account
    /// scope), so account cancellation propagates here.
    pub fn new(meta: ContainerMeta, parent: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id: meta.id,
            name: meta.name,
            interactive: meta.interactive,
            scope: parent.child_token(),
            stdin: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Ends the session's lifetime scope, stopping its workers. Idempotent.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Starts the attach workers for an interactive session; a no-op for
    /// presence-only containers.
    ///
    /// Attach failures are logged and leave the session registered but
    /// presence-only; they never propagate to the account.
    pub fn attach(self: &Arc<Self>, account: &Arc<AccountSession>) {
        if !self.interactive {
            debug!(container = %self.name, "not interactive, skipping attach");
            return;
        }

        let session = Arc::clone(self);
        let account = Arc::clone(account);
        tokio::spawn(async move {
            session.monitor(account).await;
        });
    }

    /// The attach-keepalive worker: performs the attach call, wires up the
    /// endpoints, spawns the receiver, and holds the attach open until the
    /// daemon ends it or the session scope is cancelled.
    async fn monitor(self: Arc<Self>, account: Arc<AccountSession>) {
        let Some(daemon) = account.daemon() else {
            return;
        };

        debug!(container = %self.name, "attaching to interactive container");
        let streams = match daemon.attach(&self.id).await {
            Ok(streams) => streams,
            Err(err) => {
                warn!(container = %self.name, error = %err, "attach failed");
                return;
            }
        };

        *self.stdin.lock().await = Some(streams.stdin);

        let receiver = Arc::clone(&self);
        tokio::spawn(async move {
            receiver.receive(account, streams.stdout, streams.stderr).await;
        });

        tokio::select! {
            _ = self.scope.cancelled() => {}
            result = streams.keepalive => {
                if let Err(err) = result {
                    warn!(container = %self.name, error = %err, "attach ended with error");
                }
            }
        }
        debug!(container = %self.name, "detached from container");
    }

    /// The receive worker: merges stdout and stderr into incoming
    /// messages. Order is preserved within each stream but not across
    /// them.
    async fn receive<O, E>(self: Arc<Self>, account: Arc<AccountSession>, stdout: O, stderr: E)
    where
        O: tokio::io::AsyncRead + Unpin,
        E: tokio::io::AsyncRead + Unpin,
    {
        let mut stdout = LineReader::new(stdout, "stdout");
        let mut stderr = LineReader::new(stderr, "stderr");
        debug!(container = %self.name, "receiving from container");

        loop {
            tokio::select! {
                biased;

                _ = self.scope.cancelled() => break,

                line = stdout.next_line(), if !stdout.is_done() => {
                    if let Some(line) = line {
                        account.deliver_incoming(&self.name, &line);
                    }
                }

                line = stderr.next_line(), if !stderr.is_done() => {
                    if let Some(line) = line {
                        account.deliver_incoming(&self.name, &line);
                    }
                }
            }

            if stdout.is_done() && stderr.is_done() {
                break;
            }
        }
        debug!(container = %self.name, "receive loop stopped");
    }

    /// Writes `text` plus a newline to the container's stdin, returning
    /// the byte count written.
    pub async fn send_input(&self, text: &str) -> Result<usize, SendError> {
        if !self.interactive {
            return Err(SendError::NotInteractive {
                name: self.name.clone(),
            });
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| SendError::NotAttached {
            name: self.name.clone(),
        })?;

        let payload = format!("{text}\n");
        let written = stdin.write(payload.as_bytes()).await?;
        if written != payload.len() {
            return Err(SendError::PartialWrite {
                name: self.name.clone(),
                written,
                expected: payload.len(),
            });
        }
        stdin.flush().await?;
        Ok(written)
    }

    #[cfg(test)]
    pub(crate) async fn install_stdin(&self, endpoint: StdinEndpoint) {
        *self.stdin.lock().await = Some(endpoint);
    }
}
