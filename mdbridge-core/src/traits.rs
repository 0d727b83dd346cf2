// ABOUTME: Host-facing callback trait and credential store trait consumed by sessions.
// ABOUTME: The host runtime implements HostCallbacks; persistence implements CredentialStore.

use crate::error::ErrorSeverity;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdbridge_engine::{DeviceIdentity, Jid};
use serde::{Deserialize, Serialize};

/// Message handed to the host for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub chat: Jid,
    pub is_group: bool,
    /// Sent by us from another device
    pub is_self: bool,
    pub sender: Jid,
    pub sender_display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    /// Text of the quoted message; empty if none or no longer cached
    pub quoted_body: String,
    /// Imported from history sync rather than received live
    pub historical: bool,
}

/// Typing indicator state shown for a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingState {
    Composing,
    Paused,
    Idle,
}

/// Callbacks into the synchronous chat host.
///
/// All calls are one-way notifications and must return quickly; the bridge
/// never holds locks while invoking them.
pub trait HostCallbacks: Send + Sync {
    fn display_text_message(&self, message: &DisplayMessage);

    fn update_contact_name(&self, jid: &str, name: &str);

    /// User-visible error; not a logging sink
    fn report_error(&self, severity: ErrorSeverity, message: &str);

    fn notify_connected(&self);

    fn notify_pairing_succeeded(&self);

    fn update_typing_state(&self, chat: &Jid, sender: &Jid, state: TypingState);

    fn update_presence(&self, jid: &Jid, online: bool, last_seen: Option<DateTime<Utc>>);

    fn update_avatar(&self, jid: &Jid, image: &[u8]);

    /// Raw pairing code; the host renders it
    fn display_qr_code(&self, code: &str);
}

/// A device record kept by the credential store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    pub jid: Jid,
    pub paired_at: DateTime<Utc>,
}

/// Persistent credential and device storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the identity of a freshly paired device for an account
    async fn set_credentials(&self, account: &str, device: &DeviceIdentity) -> Result<()>;

    /// All device records known to the store
    async fn list_devices(&self) -> Result<Vec<StoredDevice>>;

    async fn delete_device(&self, jid: &Jid) -> Result<()>;
}
