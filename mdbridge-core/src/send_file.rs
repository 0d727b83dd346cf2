// ABOUTME: Outbound send pipeline: address parsing, file read, sniffing, upload and send.
// ABOUTME: JPEG goes out as an inline image; every other type as a generic document.

use crate::error::SendError;
use crate::metrics;
use crate::sniff::sniff_content_type;
use mdbridge_engine::{
    DocumentMessage, ImageMessage, Jid, MediaFields, MediaKind, OutboundMessage, ProtocolClient,
    SendResponse,
};
use mime_guess::mime::{self, Mime};
use std::path::Path;

/// Wire encoding chosen for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Image,
    Document,
}

impl FileEncoding {
    /// Only JPEG is sent as an inline image
    pub fn for_content_type(content_type: &Mime) -> Self {
        if content_type.essence_str() == mime::IMAGE_JPEG.essence_str() {
            Self::Image
        } else {
            Self::Document
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Image => MediaKind::Image,
            Self::Document => MediaKind::Document,
        }
    }
}

/// Title shown for a document: the file's base name
pub fn document_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Upload `data` and build the matching outbound message
pub async fn upload_file(
    engine: &dyn ProtocolClient,
    data: Vec<u8>,
    path: &Path,
) -> Result<OutboundMessage, SendError> {
    let content_type = sniff_content_type(&data);
    let encoding = FileEncoding::for_content_type(&content_type);
    let mimetype = content_type.essence_str().to_string();
    let len = data.len();

    tracing::debug!(
        path = %path.display(),
        content_type = %content_type,
        ?encoding,
        size = len,
        "Uploading file"
    );

    let upload = engine
        .upload(data, encoding.media_kind())
        .await
        .map_err(SendError::UploadFailed)?;
    let media = MediaFields::from_upload(&upload, &mimetype, len);

    Ok(match encoding {
        FileEncoding::Image => OutboundMessage::Image(ImageMessage { media }),
        FileEncoding::Document => OutboundMessage::Document(DocumentMessage {
            title: document_title(path),
            media,
        }),
    })
}

/// Send a file to `recipient`, returning the server acknowledgement
pub async fn send_file(
    engine: &dyn ProtocolClient,
    recipient: &str,
    path: &Path,
) -> Result<SendResponse, SendError> {
    let result = send_file_inner(engine, recipient, path).await;
    record_outcome(&result);
    result
}

async fn send_file_inner(
    engine: &dyn ProtocolClient,
    recipient: &str,
    path: &Path,
) -> Result<SendResponse, SendError> {
    let to = Jid::parse_address(recipient)?;
    let data = tokio::fs::read(path).await.map_err(|source| SendError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let message = upload_file(engine, data, path).await?;
    let response = engine
        .send_message(&to, message)
        .await
        .map_err(SendError::SendFailed)?;
    tracing::info!(
        to = %to,
        server_timestamp = %response.timestamp,
        "Attachment sent"
    );
    Ok(response)
}

/// Send a plain text message to `recipient`
pub async fn send_text(
    engine: &dyn ProtocolClient,
    recipient: &str,
    body: &str,
) -> Result<SendResponse, SendError> {
    let result = send_text_inner(engine, recipient, body).await;
    record_outcome(&result);
    result
}

async fn send_text_inner(
    engine: &dyn ProtocolClient,
    recipient: &str,
    body: &str,
) -> Result<SendResponse, SendError> {
    let to = Jid::parse_address(recipient)?;
    engine
        .send_message(&to, OutboundMessage::text(body))
        .await
        .map_err(SendError::SendFailed)
}

fn record_outcome(result: &Result<SendResponse, SendError>) {
    match result {
        Ok(_) => metrics::record_send("ok"),
        Err(e) => {
            tracing::warn!(error = %e, "Outbound send failed");
            metrics::record_send(e.label());
        }
    }
}
