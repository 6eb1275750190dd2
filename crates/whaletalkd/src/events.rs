//! Event ingestion - translating daemon lifecycle events into account
//! operations.
//!
//! One worker per account, alive for the account scope. Dropping the
//! subscription stream is what unsubscribes, so the worker simply exits
//! its loop on cancellation.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use whaletalk_core::{ContainerEvent, ContainerEventKind};
use whaletalk_docker::ContainerDaemon;

use crate::account::AccountSession;

/// Spawns the per-account event worker.
///
/// Daemon-connectivity failures degrade rather than crash: if the client
/// cannot be created or the subscription fails, the worker logs and exits,
/// leaving the account online but blind to containers.
pub fn spawn_event_worker(account: Arc<AccountSession>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(daemon) = account.daemon() else {
            return;
        };

        let mut events = match daemon.subscribe_events().await {
            Ok(stream) => stream,
            Err(err) => {
                error!(
                    account = %account.handle(),
                    error = %err,
                    "unable to subscribe to daemon events"
                );
                return;
            }
        };

        debug!(account = %account.handle(), "event listener starting");
        loop {
            tokio::select! {
                biased;

                _ = account.cancelled() => break,

                event = events.next() => {
                    match event {
                        Some(Ok(event)) => handle_event(&account, &daemon, event).await,
                        Some(Err(err)) => {
                            warn!(account = %account.handle(), error = %err, "daemon event stream error");
                            break;
                        }
                        None => {
                            debug!(account = %account.handle(), "daemon event stream ended");
                            break;
                        }
                    }
                }
            }
        }
        debug!(account = %account.handle(), "event listener stopped");
    })
}

/// Applies one lifecycle event. Metadata lookups that fail (the container
/// vanished between event and inspect) drop the event; they are never
/// fatal to the worker.
async fn handle_event(
    account: &Arc<AccountSession>,
    daemon: &Arc<dyn ContainerDaemon>,
    event: ContainerEvent,
) {
    debug!(
        account = %account.handle(),
        kind = %event.kind,
        container = %event.id.short(),
        "daemon event"
    );

    let meta = match daemon.inspect(&event.id).await {
        Ok(meta) => meta,
        Err(err) => {
            warn!(
                container = %event.id.short(),
                error = %err,
                "failed to inspect container, dropping event"
            );
            return;
        }
    };

    match event.kind {
        ContainerEventKind::Create => {
            account.register_container(meta);
        }
        ContainerEventKind::Start => account.container_started(&meta.name),
        ContainerEventKind::Die => account.container_died(&meta.name),
    }
}
