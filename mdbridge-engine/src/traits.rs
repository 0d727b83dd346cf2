// ABOUTME: ProtocolClient trait that every protocol engine backend implements.
// ABOUTME: Covers connection, event subscription, sending, media and presence calls.

use crate::event::{MediaRef, ProtocolEvent};
use crate::jid::Jid;
use crate::message::{
    MediaKind, OutboundMessage, PresenceState, ProfilePictureInfo, SendResponse, UploadResponse,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Boxed stream of engine events
pub type EventStream = Pin<Box<dyn Stream<Item = ProtocolEvent> + Send>>;

/// Identity of the device this client is logged in as
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub jid: Jid,
    pub registration_id: u32,
}

/// Client handle to the multi-device protocol engine.
///
/// Implementations own transport, encryption and wire encoding. The bridge
/// only reacts to [`ProtocolClient::subscribe`] and drives the other calls.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open the connection; pairing codes or `Connected` arrive as events
    async fn connect(&self) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Subscribe to the engine's event stream
    async fn subscribe(&self) -> Result<EventStream>;

    /// Send an encoded message to a chat
    async fn send_message(&self, to: &Jid, message: OutboundMessage) -> Result<SendResponse>;

    /// Encrypt and upload media, returning its location and keys
    async fn upload(&self, data: Vec<u8>, kind: MediaKind) -> Result<UploadResponse>;

    /// Download and decrypt inbound media
    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>>;

    /// Announce our own presence
    async fn send_presence(&self, state: PresenceState) -> Result<()>;

    /// Send read receipts for messages from `sender` in `chat`
    async fn mark_read(
        &self,
        message_ids: &[String],
        timestamp: DateTime<Utc>,
        chat: &Jid,
        sender: &Jid,
    ) -> Result<()>;

    /// Resolve a contact's current profile picture.
    ///
    /// Returns `None` when the contact has no picture or it still matches `known_id`.
    async fn profile_picture(
        &self,
        jid: &Jid,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePictureInfo>>;

    /// Device identity from the engine's store, if paired
    fn own_device(&self) -> Option<DeviceIdentity>;
}
