// ABOUTME: Connection/pairing state machine and the idempotent "connected" announcement.
// ABOUTME: Several event kinds converge on announce_connected; it re-announces only on change.

use crate::traits::HostCallbacks;
use mdbridge_engine::{PresenceState, ProtocolClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingPairing,
    Paired,
    Connected,
    LoggedOut,
    Fatal,
}

impl ConnectionState {
    /// LoggedOut and Fatal end the session; no signal leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::Fatal)
    }

    /// State reached from `self` on `signal`
    pub fn next(self, signal: LifecycleSignal) -> ConnectionState {
        if self.is_terminal() {
            return self;
        }
        match signal {
            LifecycleSignal::ConnectRequested => Self::Connecting,
            LifecycleSignal::QrShown => Self::AwaitingPairing,
            LifecycleSignal::PairSucceeded => Self::Paired,
            LifecycleSignal::Connected | LifecycleSignal::CriticalSyncComplete => Self::Connected,
            LifecycleSignal::Disconnected | LifecycleSignal::StreamReplaced => Self::Disconnected,
            LifecycleSignal::LoggedOut => Self::LoggedOut,
            LifecycleSignal::FatalError => Self::Fatal,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Paired => "paired",
            Self::Connected => "connected",
            Self::LoggedOut => "logged_out",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Inputs that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    ConnectRequested,
    QrShown,
    PairSucceeded,
    Connected,
    CriticalSyncComplete,
    Disconnected,
    StreamReplaced,
    LoggedOut,
    FatalError,
}

/// Result of one announce_connected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// Presence sent and host notified
    Announced,
    /// Same name already announced since the last disconnect
    AlreadyAnnounced,
    /// No display name set; nothing to announce
    NoDisplayName,
    /// Presence could not be sent; logged only
    PresenceFailed,
    /// Session has ended
    Terminated,
}

#[derive(Debug)]
struct LifecycleInner {
    state: ConnectionState,
    display_name: String,
    announced_name: Option<String>,
}

/// Per-session connection state plus the self display name
#[derive(Debug)]
pub struct ConnectionLifecycle {
    inner: Mutex<LifecycleInner>,
}

impl ConnectionLifecycle {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(LifecycleInner {
                state: ConnectionState::Disconnected,
                display_name: display_name.into(),
                announced_name: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Apply a signal and return the new state
    pub fn apply(&self, signal: LifecycleSignal) -> ConnectionState {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = previous.next(signal);
        if matches!(
            signal,
            LifecycleSignal::Disconnected | LifecycleSignal::StreamReplaced
        ) {
            // presence has to be re-announced after the engine reconnects
            inner.announced_name = None;
        }
        if previous != inner.state {
            tracing::info!(from = %previous, to = %inner.state, ?signal, "Connection state changed");
        }
        inner.state
    }

    pub fn display_name(&self) -> String {
        self.lock().display_name.clone()
    }

    /// Replace the self display name; returns true if it changed
    pub fn set_display_name(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if inner.display_name == name {
            return false;
        }
        inner.display_name = name.to_string();
        true
    }

    /// Announce availability and tell the host we are online.
    ///
    /// Idempotent: repeated calls with an unchanged display name produce a
    /// single presence announcement and a single `notify_connected`.
    pub async fn announce_connected(
        &self,
        engine: &dyn ProtocolClient,
        host: &dyn HostCallbacks,
    ) -> AnnounceOutcome {
        let name = {
            let inner = self.lock();
            if inner.state.is_terminal() {
                return AnnounceOutcome::Terminated;
            }
            if inner.display_name.is_empty() {
                tracing::debug!("No display name set, skipping presence announcement");
                return AnnounceOutcome::NoDisplayName;
            }
            if inner.announced_name.as_deref() == Some(inner.display_name.as_str()) {
                return AnnounceOutcome::AlreadyAnnounced;
            }
            inner.display_name.clone()
        };

        if let Err(e) = engine.send_presence(PresenceState::Available).await {
            tracing::warn!(error = %e, "Failed to send presence");
            return AnnounceOutcome::PresenceFailed;
        }

        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return AnnounceOutcome::Terminated;
            }
            if inner.announced_name.as_deref() == Some(name.as_str()) {
                return AnnounceOutcome::AlreadyAnnounced;
            }
            inner.announced_name = Some(name.clone());
        }

        tracing::info!(display_name = %name, "Announced presence");
        host.notify_connected();
        AnnounceOutcome::Announced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_flow() {
        let mut state = ConnectionState::Disconnected;
        for (signal, expected) in [
            (LifecycleSignal::ConnectRequested, ConnectionState::Connecting),
            (LifecycleSignal::QrShown, ConnectionState::AwaitingPairing),
            (LifecycleSignal::PairSucceeded, ConnectionState::Paired),
            (LifecycleSignal::Connected, ConnectionState::Connected),
            (LifecycleSignal::CriticalSyncComplete, ConnectionState::Connected),
        ] {
            state = state.next(signal);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_transient_drops_keep_session_alive() {
        let state = ConnectionState::Connected.next(LifecycleSignal::StreamReplaced);
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(!state.is_terminal());
        assert_eq!(
            state.next(LifecycleSignal::Connected),
            ConnectionState::Connected
        );
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for terminal in [ConnectionState::LoggedOut, ConnectionState::Fatal] {
            assert_eq!(terminal.next(LifecycleSignal::Connected), terminal);
            assert_eq!(terminal.next(LifecycleSignal::ConnectRequested), terminal);
        }
        assert_eq!(
            ConnectionState::Connected.next(LifecycleSignal::LoggedOut),
            ConnectionState::LoggedOut
        );
    }

    #[test]
    fn test_set_display_name_reports_change() {
        let lifecycle = ConnectionLifecycle::new("Alice");
        assert!(!lifecycle.set_display_name("Alice"));
        assert!(lifecycle.set_display_name("Alicia"));
        assert_eq!(lifecycle.display_name(), "Alicia");
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::AwaitingPairing.to_string(), "awaiting_pairing");
    }
}
