// ABOUTME: Test doubles for the host, credential store and avatar downloads.
// ABOUTME: RecordingHost captures every callback; MemoryCredentialStore keeps devices in memory.

use crate::avatar::AvatarFetcher;
use crate::error::ErrorSeverity;
use crate::session::SessionDeps;
use crate::traits::{CredentialStore, DisplayMessage, HostCallbacks, StoredDevice, TypingState};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdbridge_engine::{DeviceIdentity, Jid, ProtocolClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A host callback, as recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    DisplayTextMessage(DisplayMessage),
    UpdateContactName { jid: String, name: String },
    ReportError { severity: ErrorSeverity, message: String },
    NotifyConnected,
    NotifyPairingSucceeded,
    UpdateTypingState { chat: Jid, sender: Jid, state: TypingState },
    UpdatePresence { jid: Jid, online: bool, last_seen: Option<DateTime<Utc>> },
    UpdateAvatar { jid: Jid, size: usize },
    DisplayQrCode(String),
}

/// Host that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages passed to display_text_message
    pub fn messages(&self) -> Vec<DisplayMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::DisplayTextMessage(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Errors passed to report_error
    pub fn errors(&self) -> Vec<(ErrorSeverity, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::ReportError { severity, message } => Some((severity, message)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, f: impl Fn(&HostCall) -> bool) -> usize {
        self.calls().iter().filter(|c| f(c)).count()
    }

    fn push(&self, call: HostCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl HostCallbacks for RecordingHost {
    fn display_text_message(&self, message: &DisplayMessage) {
        self.push(HostCall::DisplayTextMessage(message.clone()));
    }

    fn update_contact_name(&self, jid: &str, name: &str) {
        self.push(HostCall::UpdateContactName {
            jid: jid.to_string(),
            name: name.to_string(),
        });
    }

    fn report_error(&self, severity: ErrorSeverity, message: &str) {
        self.push(HostCall::ReportError {
            severity,
            message: message.to_string(),
        });
    }

    fn notify_connected(&self) {
        self.push(HostCall::NotifyConnected);
    }

    fn notify_pairing_succeeded(&self) {
        self.push(HostCall::NotifyPairingSucceeded);
    }

    fn update_typing_state(&self, chat: &Jid, sender: &Jid, state: TypingState) {
        self.push(HostCall::UpdateTypingState {
            chat: chat.clone(),
            sender: sender.clone(),
            state,
        });
    }

    fn update_presence(&self, jid: &Jid, online: bool, last_seen: Option<DateTime<Utc>>) {
        self.push(HostCall::UpdatePresence {
            jid: jid.clone(),
            online,
            last_seen,
        });
    }

    fn update_avatar(&self, jid: &Jid, image: &[u8]) {
        self.push(HostCall::UpdateAvatar {
            jid: jid.clone(),
            size: image.len(),
        });
    }

    fn display_qr_code(&self, code: &str) {
        self.push(HostCall::DisplayQrCode(code.to_string()));
    }
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Vec<(String, DeviceIdentity)>>,
    devices: Mutex<Vec<StoredDevice>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a device record
    pub fn with_device(self, jid: Jid, paired_at: DateTime<Utc>) -> Self {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StoredDevice { jid, paired_at });
        self
    }

    pub fn credentials(&self) -> Vec<(String, DeviceIdentity)> {
        self.credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn devices(&self) -> Vec<StoredDevice> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn set_credentials(&self, account: &str, device: &DeviceIdentity) -> Result<()> {
        self.credentials
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((account.to_string(), device.clone()));
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        if !devices.iter().any(|d| d.jid == device.jid) {
            devices.push(StoredDevice {
                jid: device.jid.clone(),
                paired_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<StoredDevice>> {
        Ok(self.devices())
    }

    async fn delete_device(&self, jid: &Jid) -> Result<()> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| &d.jid != jid);
        Ok(())
    }
}

/// Avatar fetcher serving canned bytes per URL
#[derive(Debug, Default)]
pub struct StubAvatarFetcher {
    images: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
}

impl StubAvatarFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(url.into(), bytes);
        self
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AvatarFetcher for StubAvatarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no stub image at {}", url))
    }
}

/// Wire a session to the given engine and host with in-memory storage
pub fn session_deps(engine: Arc<dyn ProtocolClient>, host: Arc<dyn HostCallbacks>) -> SessionDeps {
    SessionDeps {
        engine,
        host,
        store: Arc::new(MemoryCredentialStore::new()),
        fetcher: Arc::new(StubAvatarFetcher::new()),
    }
}
