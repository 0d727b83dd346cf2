// ABOUTME: Boundary crate for the multi-device protocol engine.
// ABOUTME: Identifiers, inbound events, outbound encodings and the ProtocolClient trait.

pub mod event;
pub mod jid;
pub mod message;
pub mod traits;

pub mod backends;

pub use event::{
    CallMeta, ChatPresenceState, Conversation, HistorySyncData, MediaRef, MessageContent,
    MessageEvent, MessageInfo, ProtocolEvent, PushNameEntry, ReceiptKind, CRITICAL_BLOCK,
};
pub use jid::{Jid, JidError, DEFAULT_USER_SERVER, GROUP_SERVER};
pub use message::{
    DocumentMessage, ImageMessage, MediaFields, MediaKind, OutboundMessage, PresenceState,
    ProfilePictureInfo, SendResponse, UploadResponse,
};
pub use traits::{DeviceIdentity, EventStream, ProtocolClient};
