//! The reachable-account registry.
//!
//! An explicit process-level object rather than an ambient global: the
//! host embedding the bridge constructs one registry, injects the daemon
//! connector, and addresses accounts through opaque handles. Once an
//! account is logged out it leaves the registry and no further dispatch
//! can reach it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use whaletalk_core::{AccountHandle, HostRuntime};

use crate::account::{AccountSession, DaemonConnector};

/// Bridge-wide configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Buddy group containers are listed under.
    pub group: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            group: "containers".to_string(),
        }
    }
}

/// All accounts currently reachable by the host.
pub struct AccountRegistry {
    accounts: RwLock<HashMap<AccountHandle, Arc<AccountSession>>>,
    connector: DaemonConnector,
    config: BridgeConfig,
}

impl AccountRegistry {
    pub fn new(connector: DaemonConnector, config: BridgeConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            connector,
            config,
        }
    }

    /// Logs an account in, creating its session on first sight. A handle
    /// that is already logged in gets its existing session back.
    pub async fn login(&self, handle: AccountHandle) -> Arc<AccountSession> {
        let session = {
            let mut accounts = self.write_accounts();
            if let Some(existing) = accounts.get(&handle) {
                debug!(account = %handle, "already logged in");
                return Arc::clone(existing);
            }
            let session = AccountSession::new(
                handle,
                Arc::clone(&self.connector),
                self.config.group.clone(),
            );
            accounts.insert(handle, Arc::clone(&session));
            session
        };

        session.login().await;
        session
    }

    /// Removes the account and ends its lifetime. Unknown handles are
    /// logged and ignored.
    pub fn logout(&self, handle: AccountHandle) {
        let removed = self.write_accounts().remove(&handle);
        match removed {
            Some(session) => session.logout(),
            None => warn!(account = %handle, "cannot close unknown account"),
        }
    }

    /// Drains the account's deferred call queue on the caller's (host)
    /// thread. Unknown handles are logged and drain nothing.
    pub fn pump(&self, handle: AccountHandle, host: &mut dyn HostRuntime) -> usize {
        match self.get(handle) {
            Some(session) => session.pump(host),
            None => {
                warn!(account = %handle, "cannot run deferred calls for unknown account");
                0
            }
        }
    }

    /// Sends an outgoing message, returning the byte count of `text` on
    /// success and the zero-length sentinel on any failure.
    pub async fn send_outgoing(&self, handle: AccountHandle, to: &str, text: &str) -> usize {
        let Some(session) = self.get(handle) else {
            warn!(account = %handle, "cannot send for unknown account");
            return 0;
        };
        match session.send_outgoing(to, text).await {
            Ok(_) => text.len(),
            Err(err) => {
                warn!(account = %handle, recipient = %to, error = %err, "cannot send message");
                0
            }
        }
    }

    /// Looks up a live account session.
    pub fn get(&self, handle: AccountHandle) -> Option<Arc<AccountSession>> {
        match self.accounts.read() {
            Ok(guard) => guard.get(&handle).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&handle).cloned(),
        }
    }

    /// Number of reachable accounts.
    pub fn len(&self) -> usize {
        match self.accounts.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_accounts(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<AccountHandle, Arc<AccountSession>>> {
        match self.accounts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
