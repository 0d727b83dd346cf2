// ABOUTME: Tests for the outbound file and text pipeline
// ABOUTME: Covers image vs document encoding, exit codes and the no-upload-on-read-failure rule

use mdbridge_core::testing::{session_deps, RecordingHost};
use mdbridge_core::{Config, Session, EXIT_OK};
use mdbridge_engine::backends::mock::{EngineCall, FailPoint, MockEngine};
use mdbridge_engine::{Jid, MediaKind, OutboundMessage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01\x01\x00\x00\x01";
const PNG: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR";

fn session(engine: MockEngine) -> (Arc<MockEngine>, Arc<Session>) {
    let engine = Arc::new(engine);
    let session = Session::new(
        "15550001",
        Arc::new(Config::default()),
        session_deps(engine.clone(), Arc::new(RecordingHost::new())),
    );
    (engine, session)
}

fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn sent_messages(engine: &MockEngine) -> Vec<(Jid, OutboundMessage)> {
    engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::SendMessage { to, message } => Some((to, message)),
            _ => None,
        })
        .collect()
}

fn uploads(engine: &MockEngine) -> Vec<EngineCall> {
    engine.calls_where(|c| matches!(c, EngineCall::Upload { .. }))
}

#[tokio::test]
async fn test_jpeg_is_sent_as_image() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "photo.jpg", JPEG);
    let (engine, session) = session(MockEngine::new());

    let code = session.send_file("15550002", &path).await;

    assert_eq!(code, EXIT_OK);
    assert_eq!(
        uploads(&engine),
        vec![EngineCall::Upload {
            len: JPEG.len(),
            kind: MediaKind::Image,
        }]
    );
    let sent = sent_messages(&engine);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Jid::user("15550002"));
    match &sent[0].1 {
        OutboundMessage::Image(image) => {
            assert_eq!(image.media.mimetype, "image/jpeg");
            assert_eq!(image.media.file_length, JPEG.len() as u64);
            assert!(image.media.url.starts_with("https://mock.invalid/"));
            assert!(!image.media.direct_path.is_empty());
        }
        other => panic!("expected image, got {:?}", other),
    }
}

#[tokio::test]
async fn test_png_named_jpg_is_sent_as_document() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "photo.jpg", PNG);
    let (engine, session) = session(MockEngine::new());

    assert_eq!(session.send_file("15550002", &path).await, EXIT_OK);

    match &sent_messages(&engine)[0].1 {
        OutboundMessage::Document(doc) => {
            assert_eq!(doc.title, "photo.jpg");
            assert_eq!(doc.media.mimetype, "image/png");
        }
        other => panic!("expected document, got {:?}", other),
    }
    assert_eq!(
        uploads(&engine),
        vec![EngineCall::Upload {
            len: PNG.len(),
            kind: MediaKind::Document,
        }]
    );
}

#[tokio::test]
async fn test_pdf_document_title_is_base_name() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "quarterly report.pdf", b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
    let (engine, session) = session(MockEngine::new());

    assert_eq!(session.send_file("+15550002", &path).await, EXIT_OK);

    match &sent_messages(&engine)[0].1 {
        OutboundMessage::Document(doc) => {
            assert_eq!(doc.title, "quarterly report.pdf");
            assert_eq!(doc.media.mimetype, "application/pdf");
        }
        other => panic!("expected document, got {:?}", other),
    }
}

#[tokio::test]
async fn test_group_recipient() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "notes.txt", b"agenda");
    let (engine, session) = session(MockEngine::new());

    assert_eq!(session.send_file("120363000@g.us", &path).await, EXIT_OK);
    assert!(sent_messages(&engine)[0].0.is_group());
}

#[tokio::test]
async fn test_unreadable_path_returns_io_code_without_upload() {
    let (engine, session) = session(MockEngine::new());

    let code = session
        .send_file("15550002", Path::new("/definitely/not/here.jpg"))
        .await;

    assert_eq!(code, 5);
    assert!(uploads(&engine).is_empty());
    assert!(sent_messages(&engine).is_empty());
}

#[tokio::test]
async fn test_invalid_address_returns_efault() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "photo.jpg", JPEG);
    let (engine, session) = session(MockEngine::new());

    assert_eq!(session.send_file("", &path).await, 14);
    assert_eq!(session.send_file("@s.whatsapp.net", &path).await, 14);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_upload_failure_returns_epipe() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "photo.jpg", JPEG);
    let (engine, session) = session(MockEngine::new().fail_on(FailPoint::Upload));

    assert_eq!(session.send_file("15550002", &path).await, 32);
    assert_eq!(uploads(&engine).len(), 1);
    assert!(sent_messages(&engine).is_empty());
}

#[tokio::test]
async fn test_send_failure_returns_ecomm() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "photo.jpg", JPEG);
    let (_engine, session) = session(MockEngine::new().fail_on(FailPoint::SendMessage));

    assert_eq!(session.send_file("15550002", &path).await, 70);
}

#[tokio::test]
async fn test_send_failure_does_not_end_session() {
    let (_engine, session) = session(MockEngine::new().fail_on(FailPoint::SendMessage));

    let err = session.send_text("15550002", "hi").await.unwrap_err();
    assert_eq!(err.exit_code(), 70);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_send_text() {
    let (engine, session) = session(MockEngine::new());

    let response = session.send_text("15550002", "hello there").await.unwrap();

    assert!(response.id.starts_with("mock-msg-"));
    assert_eq!(
        sent_messages(&engine),
        vec![(Jid::user("15550002"), OutboundMessage::text("hello there"))]
    );
}
