// ABOUTME: Registry of live sessions keyed by account identifier
// ABOUTME: Creates sessions on login, removes them on disconnect or fatal teardown

use crate::config::Config;
use crate::error::RegistryError;
use crate::session::{Session, SessionDeps};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

struct RegisteredSession {
    session: Arc<Session>,
    task: JoinHandle<()>,
}

/// Owns every active session.
/// A session's event loop removes its own entry when it ends.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, RegisteredSession>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a session for `account` and start its event loop
    pub fn login(
        self: &Arc<Self>,
        account: &str,
        config: Arc<Config>,
        deps: SessionDeps,
    ) -> Result<Arc<Session>, RegistryError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(account) {
            return Err(RegistryError::AlreadyConnected(account.to_string()));
        }

        let session = Session::new(account, config, deps);
        let registry: Weak<Self> = Arc::downgrade(self);
        let runner = session.clone();
        let key = account.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = runner.clone().run().await {
                tracing::warn!(account = %key, error = %e, "Session ended with error");
            }
            if let Some(registry) = registry.upgrade() {
                registry.remove_if_current(&key, &runner);
            }
        });

        tracing::info!(account = %account, "Session registered");
        sessions.insert(
            account.to_string(),
            RegisteredSession {
                session: session.clone(),
                task,
            },
        );
        Ok(session)
    }

    /// Get the session for an account.
    pub fn get(&self, account: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(account)
            .map(|entry| entry.session.clone())
    }

    /// Tear down an account's session and wait for its event loop to finish
    pub async fn disconnect(&self, account: &str) -> Result<(), RegistryError> {
        let entry = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(account)
            .ok_or_else(|| RegistryError::UnknownAccount(account.to_string()))?;

        entry.session.teardown().await;
        if let Err(e) = entry.task.await {
            tracing::warn!(account = %account, error = %e, "Session task panicked");
        }
        entry.session.join_worker().await;
        tracing::info!(account = %account, "Session disconnected");
        Ok(())
    }

    /// Check if any sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Get all registered account identifiers.
    pub fn accounts(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Disconnect every session with a 10-second timeout.
    pub async fn shutdown(&self) {
        let accounts = self.accounts();
        let futures: Vec<_> = accounts
            .iter()
            .map(|account| self.disconnect(account))
            .collect();

        if tokio::time::timeout(
            Duration::from_secs(10),
            futures_util::future::join_all(futures),
        )
        .await
        .is_err()
        {
            tracing::warn!("Timed out waiting for sessions to shut down");
        }
    }

    fn remove_if_current(&self, account: &str, session: &Arc<Session>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let is_current = sessions
            .get(account)
            .map(|entry| Arc::ptr_eq(&entry.session, session))
            .unwrap_or(false);
        if is_current {
            sessions.remove(account);
            tracing::info!(account = %account, "Session removed after teardown");
        }
    }
}
