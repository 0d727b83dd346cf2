// ABOUTME: Inbound event set emitted by the protocol engine's event stream.
// ABOUTME: Closed tagged enum with an explicit Unknown variant for kinds we do not model.

use crate::jid::Jid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// App-state patch name that marks the end of the critical initial sync
pub const CRITICAL_BLOCK: &str = "critical_block";

/// Events emitted by the protocol engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Transport is up and authenticated
    Connected,
    /// Transport dropped; the engine reconnects on its own
    Disconnected,
    /// Another connection replaced this stream
    StreamReplaced,
    /// The primary device removed this companion device
    LoggedOut {
        #[serde(default)]
        reason: String,
    },
    /// Pairing codes to render for the user
    Qr { codes: Vec<String> },
    /// Pairing finished on the primary device
    PairSuccess {
        id: Jid,
        #[serde(default)]
        business_name: String,
        #[serde(default)]
        platform: String,
    },
    /// An app-state patch finished syncing
    AppStateSyncComplete { name: String },
    /// Raw app-state mutation
    AppState {
        #[serde(default)]
        index: Vec<String>,
        #[serde(default)]
        action: Value,
    },
    /// Our own display name was changed from another device
    PushNameSetting { name: String },
    /// A contact's display name changed
    PushName {
        jid: Jid,
        #[serde(default)]
        old_push_name: String,
        #[serde(default)]
        new_push_name: String,
    },
    /// Inbound chat message
    Message(MessageEvent),
    /// Delivery/read receipt for messages we sent
    Receipt {
        kind: ReceiptKind,
        chat: Jid,
        sender: Jid,
        message_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// Contact online/offline
    Presence {
        from: Jid,
        unavailable: bool,
        #[serde(default)]
        last_seen: Option<DateTime<Utc>>,
    },
    /// Typing state inside a chat
    ChatPresence {
        chat: Jid,
        sender: Jid,
        state: ChatPresenceState,
    },
    /// Initial history sync payload
    HistorySync(HistorySyncData),
    CallOffer(CallMeta),
    /// Call offer inside a group
    CallOfferNotice(CallMeta),
    CallRelayLatency(CallMeta),
    CallTerminate(CallMeta),
    OfflineSyncCompleted {
        #[serde(default)]
        count: u32,
    },
    JoinedGroup {
        jid: Jid,
        #[serde(default)]
        name: String,
    },
    /// Any event kind not modelled above
    Unknown {
        kind: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Tags of every modelled event kind, in declaration order
pub const EVENT_KINDS: &[&str] = &[
    "connected",
    "disconnected",
    "stream_replaced",
    "logged_out",
    "qr",
    "pair_success",
    "app_state_sync_complete",
    "app_state",
    "push_name_setting",
    "push_name",
    "message",
    "receipt",
    "presence",
    "chat_presence",
    "history_sync",
    "call_offer",
    "call_offer_notice",
    "call_relay_latency",
    "call_terminate",
    "offline_sync_completed",
    "joined_group",
    "unknown",
];

impl ProtocolEvent {
    /// Event kind name for logging and metrics
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::StreamReplaced => "stream_replaced",
            Self::LoggedOut { .. } => "logged_out",
            Self::Qr { .. } => "qr",
            Self::PairSuccess { .. } => "pair_success",
            Self::AppStateSyncComplete { .. } => "app_state_sync_complete",
            Self::AppState { .. } => "app_state",
            Self::PushNameSetting { .. } => "push_name_setting",
            Self::PushName { .. } => "push_name",
            Self::Message(_) => "message",
            Self::Receipt { .. } => "receipt",
            Self::Presence { .. } => "presence",
            Self::ChatPresence { .. } => "chat_presence",
            Self::HistorySync(_) => "history_sync",
            Self::CallOffer(_) => "call_offer",
            Self::CallOfferNotice(_) => "call_offer_notice",
            Self::CallRelayLatency(_) => "call_relay_latency",
            Self::CallTerminate(_) => "call_terminate",
            Self::OfflineSyncCompleted { .. } => "offline_sync_completed",
            Self::JoinedGroup { .. } => "joined_group",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Decode one JSON event.
    ///
    /// Objects whose `type` is not a modelled kind become [`ProtocolEvent::Unknown`]
    /// carrying the whole object; malformed payloads of a known kind are errors.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(input)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if EVENT_KINDS.contains(&kind.as_str()) {
            return serde_json::from_value(value);
        }
        Ok(Self::Unknown {
            kind: if kind.is_empty() {
                "untyped".to_string()
            } else {
                kind
            },
            payload: value,
        })
    }
}

/// Metadata common to every inbound message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub content: MessageContent,
}

/// Payload of an inbound message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
        #[serde(default)]
        quoted_id: Option<String>,
    },
    Image {
        #[serde(default)]
        caption: Option<String>,
        media: MediaRef,
        #[serde(default)]
        quoted_id: Option<String>,
    },
    Document {
        #[serde(default)]
        title: Option<String>,
        media: MediaRef,
    },
    Reaction { target_id: String, emoji: String },
    Unsupported { name: String },
}

impl MessageContent {
    /// Identifier of the message this one quotes, if any
    pub fn quoted_id(&self) -> Option<&str> {
        match self {
            Self::Text { quoted_id, .. } | Self::Image { quoted_id, .. } => quoted_id.as_deref(),
            _ => None,
        }
    }
}

/// Location and keys needed to download an inbound media payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub direct_path: String,
    #[serde(default)]
    pub media_key: Vec<u8>,
    pub mimetype: String,
    #[serde(default)]
    pub file_length: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
    ReadSelf,
    Played,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatPresenceState {
    Composing,
    Paused,
}

/// Call signalling metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallMeta {
    pub from: Jid,
    pub call_creator: Jid,
    #[serde(default)]
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Contents of a history sync blob
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistorySyncData {
    #[serde(default)]
    pub push_names: Vec<PushNameEntry>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

/// Contact name entry; both fields are optional on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PushNameEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Jid,
    #[serde(default)]
    pub messages: Vec<MessageEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_known_kind() {
        let event = ProtocolEvent::from_json(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(event, ProtocolEvent::Connected);
        assert_eq!(event.kind(), "connected");
    }

    #[test]
    fn test_from_json_message() {
        let json = r#"{
            "type": "message",
            "info": {
                "id": "M1",
                "chat": "111@s.whatsapp.net",
                "sender": "111@s.whatsapp.net",
                "push_name": "Alice",
                "timestamp": "2024-05-01T12:00:00Z"
            },
            "content": {"kind": "text", "body": "hello"}
        }"#;
        let event = ProtocolEvent::from_json(json).unwrap();
        let ProtocolEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert_eq!(msg.info.id, "M1");
        assert!(!msg.info.is_from_me);
        assert_eq!(
            msg.content,
            MessageContent::Text {
                body: "hello".to_string(),
                quoted_id: None
            }
        );
    }

    #[test]
    fn test_from_json_unknown_kind_is_captured() {
        let event = ProtocolEvent::from_json(r#"{"type":"blocklist","changes":[]}"#).unwrap();
        match event {
            ProtocolEvent::Unknown { kind, payload } => {
                assert_eq!(kind, "blocklist");
                assert!(payload.get("changes").is_some());
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_untyped_object() {
        let event = ProtocolEvent::from_json(r#"{"foo":1}"#).unwrap();
        assert_eq!(event.kind(), "untyped");
    }

    #[test]
    fn test_from_json_malformed_known_kind_is_error() {
        assert!(ProtocolEvent::from_json(r#"{"type":"qr"}"#).is_err());
    }

    #[test]
    fn test_event_kinds_cover_kind_names() {
        let samples = vec![
            ProtocolEvent::Connected,
            ProtocolEvent::StreamReplaced,
            ProtocolEvent::Qr { codes: vec![] },
            ProtocolEvent::OfflineSyncCompleted { count: 0 },
        ];
        for event in samples {
            assert!(EVENT_KINDS.contains(&event.kind()));
        }
    }

    #[test]
    fn test_quoted_id_accessor() {
        let text = MessageContent::Text {
            body: "hi".to_string(),
            quoted_id: Some("M1".to_string()),
        };
        assert_eq!(text.quoted_id(), Some("M1"));
        let reaction = MessageContent::Reaction {
            target_id: "M1".to_string(),
            emoji: "👍".to_string(),
        };
        assert_eq!(reaction.quoted_id(), None);
    }
}
