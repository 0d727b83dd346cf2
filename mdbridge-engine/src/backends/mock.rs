// ABOUTME: Mock protocol engine for testing - scripted events and recorded calls.
// ABOUTME: Allows deterministic bridge tests without a live connection.
//!
//! # Example
//!
//! ```no_run
//! use mdbridge_engine::backends::mock::{EngineCall, FailPoint, MockEngine};
//! use mdbridge_engine::{Jid, OutboundMessage, ProtocolClient, ProtocolEvent};
//!
//! # async fn example() {
//! let engine = MockEngine::new()
//!     .with_events(vec![ProtocolEvent::Connected])
//!     .fail_on(FailPoint::Upload);
//!
//! engine
//!     .send_message(&Jid::user("123"), OutboundMessage::text("hi"))
//!     .await
//!     .unwrap();
//! assert!(matches!(engine.calls()[0], EngineCall::SendMessage { .. }));
//! # }
//! ```

use crate::event::{MediaRef, ProtocolEvent};
use crate::jid::Jid;
use crate::message::{
    MediaKind, OutboundMessage, PresenceState, ProfilePictureInfo, SendResponse, UploadResponse,
};
use crate::traits::{DeviceIdentity, EventStream, ProtocolClient};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A call made against the mock, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Connect,
    Disconnect,
    Subscribe,
    SendMessage {
        to: Jid,
        message: OutboundMessage,
    },
    Upload {
        len: usize,
        kind: MediaKind,
    },
    Download {
        direct_path: String,
    },
    SendPresence(PresenceState),
    MarkRead {
        message_ids: Vec<String>,
        chat: Jid,
        sender: Jid,
    },
    ProfilePicture {
        jid: Jid,
        known_id: Option<String>,
    },
}

/// Operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    SendMessage,
    Upload,
    Download,
    SendPresence,
    MarkRead,
    ProfilePicture,
}

/// Mock engine with scripted events and failures
pub struct MockEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    failures: HashSet<FailPoint>,
    device: Option<DeviceIdentity>,
    pictures: HashMap<Jid, ProfilePictureInfo>,
    media: HashMap<String, Vec<u8>>,
    stall_downloads: bool,
    events_tx: Mutex<Option<mpsc::UnboundedSender<ProtocolEvent>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ProtocolEvent>>>,
    counter: AtomicU64,
}

impl MockEngine {
    /// Create a mock with no scripted events and no failures
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: HashSet::new(),
            device: None,
            pictures: HashMap::new(),
            media: HashMap::new(),
            stall_downloads: false,
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue events to be delivered once subscribed
    pub fn with_events(self, events: Vec<ProtocolEvent>) -> Self {
        for event in events {
            self.push_event(event);
        }
        self
    }

    /// Make every call of the given kind fail
    pub fn fail_on(mut self, point: FailPoint) -> Self {
        self.failures.insert(point);
        self
    }

    /// Report this identity from `own_device`
    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = Some(device);
        self
    }

    /// Serve a profile picture for a contact
    pub fn with_profile_picture(mut self, jid: Jid, info: ProfilePictureInfo) -> Self {
        self.pictures.insert(jid, info);
        self
    }

    /// Serve downloadable media under a direct path
    pub fn with_media(mut self, direct_path: impl Into<String>, data: Vec<u8>) -> Self {
        self.media.insert(direct_path.into(), data);
        self
    }

    /// Make downloads hang forever, like an unresponsive media server
    pub fn stall_downloads(mut self) -> Self {
        self.stall_downloads = true;
        self
    }

    /// Inject an event into the stream
    pub fn push_event(&self, event: ProtocolEvent) {
        let guard = self.events_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }

    /// End the event stream after everything queued so far
    pub fn close_events(&self) {
        self.events_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Snapshot of all recorded calls
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded calls matching a predicate
    pub fn calls_where(&self, f: impl Fn(&EngineCall) -> bool) -> Vec<EngineCall> {
        self.calls().into_iter().filter(|c| f(c)).collect()
    }

    fn record(&self, call: EngineCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failures.contains(&point) {
            anyhow::bail!("mock failure: {:?}", point);
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<()> {
        self.record(EngineCall::Connect);
        self.check(FailPoint::Connect)
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(EngineCall::Disconnect);
        self.close_events();
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream> {
        self.record(EngineCall::Subscribe);
        let rx = self
            .events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| anyhow::anyhow!("mock event stream already subscribed"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send_message(&self, to: &Jid, message: OutboundMessage) -> Result<SendResponse> {
        self.record(EngineCall::SendMessage {
            to: to.clone(),
            message,
        });
        self.check(FailPoint::SendMessage)?;
        Ok(SendResponse {
            id: format!("mock-msg-{}", self.next_id()),
            timestamp: Utc::now(),
        })
    }

    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<UploadResponse> {
        self.record(EngineCall::Upload {
            len: data.len(),
            kind,
        });
        self.check(FailPoint::Upload)?;
        let n = self.next_id();
        Ok(UploadResponse {
            url: format!("https://mock.invalid/{:?}/{}", kind, n).to_lowercase(),
            direct_path: format!("/mock/{}", n),
            media_key: vec![n as u8; 32],
            file_enc_sha256: vec![0xe0; 32],
            file_sha256: vec![0x5a; 32],
            file_length: data.len() as u64,
        })
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>> {
        self.record(EngineCall::Download {
            direct_path: media.direct_path.clone(),
        });
        self.check(FailPoint::Download)?;
        if self.stall_downloads {
            std::future::pending::<()>().await;
        }
        self.media
            .get(&media.direct_path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no mock media at {}", media.direct_path))
    }

    async fn send_presence(&self, state: PresenceState) -> Result<()> {
        self.record(EngineCall::SendPresence(state));
        self.check(FailPoint::SendPresence)
    }

    async fn mark_read(
        &self,
        message_ids: &[String],
        _timestamp: DateTime<Utc>,
        chat: &Jid,
        sender: &Jid,
    ) -> Result<()> {
        self.record(EngineCall::MarkRead {
            message_ids: message_ids.to_vec(),
            chat: chat.clone(),
            sender: sender.clone(),
        });
        self.check(FailPoint::MarkRead)
    }

    async fn profile_picture(
        &self,
        jid: &Jid,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePictureInfo>> {
        self.record(EngineCall::ProfilePicture {
            jid: jid.clone(),
            known_id: known_id.map(str::to_string),
        });
        self.check(FailPoint::ProfilePicture)?;
        Ok(self
            .pictures
            .get(jid)
            .filter(|info| Some(info.id.as_str()) != known_id)
            .cloned())
    }

    fn own_device(&self) -> Option<DeviceIdentity> {
        self.device.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_scripted_events_are_delivered_in_order() {
        let engine = MockEngine::new().with_events(vec![
            ProtocolEvent::Connected,
            ProtocolEvent::Disconnected,
        ]);
        engine.close_events();

        let stream = engine.subscribe().await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![ProtocolEvent::Connected, ProtocolEvent::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let engine = MockEngine::new();
        engine.subscribe().await.unwrap();
        assert!(engine.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn test_fail_point_records_call_then_errors() {
        let engine = MockEngine::new().fail_on(FailPoint::Upload);
        let result = engine.upload(vec![1, 2, 3], MediaKind::Image).await;
        assert!(result.is_err());
        assert_eq!(
            engine.calls(),
            vec![EngineCall::Upload {
                len: 3,
                kind: MediaKind::Image
            }]
        );
    }

    #[tokio::test]
    async fn test_profile_picture_unchanged_returns_none() {
        let jid = Jid::user("1");
        let engine = MockEngine::new().with_profile_picture(
            jid.clone(),
            ProfilePictureInfo {
                id: "p1".to_string(),
                url: "https://pps.example/p1".to_string(),
            },
        );
        assert!(engine.profile_picture(&jid, None).await.unwrap().is_some());
        assert!(engine
            .profile_picture(&jid, Some("p1"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mock_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockEngine>();
    }
}
