// ABOUTME: Outbound message encodings and media upload/download results.
// ABOUTME: Mirrors the wire distinction between inline images and generic documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media class used to pick upload endpoints and encryption info
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Result of uploading encrypted media to the media servers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Fields shared by every uploaded-media message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaFields {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub mimetype: String,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MediaFields {
    /// Populate media fields from an upload result.
    ///
    /// `file_length` is the plaintext length, not the upload's encrypted size.
    pub fn from_upload(upload: &UploadResponse, mimetype: &str, plaintext_len: usize) -> Self {
        Self {
            url: upload.url.clone(),
            direct_path: upload.direct_path.clone(),
            media_key: upload.media_key.clone(),
            mimetype: mimetype.to_string(),
            file_enc_sha256: upload.file_enc_sha256.clone(),
            file_sha256: upload.file_sha256.clone(),
            file_length: plaintext_len as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageMessage {
    #[serde(flatten)]
    pub media: MediaFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMessage {
    pub title: String,
    #[serde(flatten)]
    pub media: MediaFields,
}

/// Encoded message ready for `send_message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { body: String },
    Image(ImageMessage),
    Document(DocumentMessage),
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image(_) => "image",
            Self::Document(_) => "document",
        }
    }
}

/// Server acknowledgement of a sent message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Own presence as announced to contacts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Unavailable,
}

/// Current profile picture of a contact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePictureInfo {
    pub id: String,
    pub url: String,
}
