//! Whaletalk daemon - container console chat from a terminal.
//!
//! Bridges the local Docker daemon to a console "IM client": running
//! containers appear as buddies, their stdout/stderr arrives as messages,
//! and lines you type are written to a container's stdin.
//!
//! # Usage
//!
//! ```bash
//! # Run against the local Docker daemon
//! whaletalkd
//!
//! # Custom buddy group and a faster pump
//! whaletalkd --group fleet --pump-interval-ms 250
//!
//! # Enable debug logging
//! RUST_LOG=whaletalkd=debug whaletalkd
//! ```
//!
//! Type `name: text` to send `text` to container `name`'s stdin.
//!
//! The main task plays the role of the host thread: it owns the
//! `ConsoleHost` and is the only place deferred calls ever run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use whaletalk_core::{AccountHandle, BuddyHandle, HostRuntime};
use whaletalk_docker::{ContainerDaemon, DockerDaemon};
use whaletalkd::account::DaemonConnector;
use whaletalkd::registry::{AccountRegistry, BridgeConfig};

/// Whaletalk - chat with your containers
#[derive(Parser, Debug)]
#[command(name = "whaletalkd", version, about)]
struct Args {
    /// Buddy group containers are listed under
    #[arg(long, default_value = "containers")]
    group: String,

    /// How often the host pumps the deferred call queue, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pump_interval_ms: u64,
}

/// Terminal-backed host runtime: buddies and conversations rendered as
/// log lines on stdout.
#[derive(Default)]
struct ConsoleHost {
    buddies: HashMap<String, (BuddyHandle, bool)>,
    next_handle: u64,
}

impl HostRuntime for ConsoleHost {
    fn ensure_buddy(&mut self, name: &str, group: &str, online: bool) -> BuddyHandle {
        if let Some((handle, _)) = self.buddies.get(name) {
            return *handle;
        }
        self.next_handle += 1;
        let handle = BuddyHandle(self.next_handle);
        self.buddies.insert(name.to_string(), (handle, online));
        println!("* {name} joined the {group} group");
        handle
    }

    fn set_buddy_presence(&mut self, name: &str, online: bool) {
        if let Some((_, current)) = self.buddies.get_mut(name) {
            *current = online;
        }
        let state = if online { "online" } else { "offline" };
        println!("* {name} is now {state}");
    }

    fn deliver_message(&mut self, from: &str, text: &str, received: DateTime<Utc>) {
        println!("[{}] {from}: {text}", received.format("%H:%M:%S"));
    }

    fn set_connected(&mut self) {
        println!("* connected");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let connector: DaemonConnector = Arc::new(|| {
        DockerDaemon::connect().map(|daemon| Arc::new(daemon) as Arc<dyn ContainerDaemon>)
    });
    let registry = AccountRegistry::new(connector, BridgeConfig { group: args.group });

    let account = AccountHandle(1);
    registry.login(account).await;
    info!(%account, "bridge started");

    let mut host = ConsoleHost::default();
    let mut ticker = interval(Duration::from_millis(args.pump_interval_ms.max(1)));
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                registry.logout(account);
                break;
            }

            _ = ticker.tick() => {
                registry.pump(account, &mut host);
            }

            line = input.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some((to, text)) = parse_outgoing(&line) {
                            let sent = registry.send_outgoing(account, to, text).await;
                            if sent == 0 {
                                warn!(recipient = %to, "message not sent");
                            } else {
                                debug!(recipient = %to, bytes = sent, "message sent");
                            }
                        } else if !line.trim().is_empty() {
                            eprintln!("usage: <container>: <text>");
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        registry.logout(account);
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        registry.logout(account);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Splits `name: text` into recipient and message.
fn parse_outgoing(line: &str) -> Option<(&str, &str)> {
    let (to, text) = line.split_once(':')?;
    let to = to.trim();
    if to.is_empty() {
        return None;
    }
    Some((to, text.trim_start()))
}
