// ABOUTME: Replay harness that runs a full session against a scripted event stream
// ABOUTME: Reads newline-delimited JSON events and feeds them through the mock engine

use anyhow::{Context, Result};
use mdbridge_core::testing::MemoryCredentialStore;
use mdbridge_core::{Config, HostCallbacks, HttpAvatarFetcher, Session, SessionDeps, EXIT_OK};
use mdbridge_engine::backends::mock::MockEngine;
use mdbridge_engine::ProtocolEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outbound file to send once the event stream is drained
#[derive(Debug, Clone)]
pub struct FileSend {
    pub chat: String,
    pub path: PathBuf,
}

/// Outcome of a replay run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub events: usize,
    pub exit_code: i32,
}

/// Parse newline-delimited JSON events.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_events(input: &str) -> Result<Vec<ProtocolEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            ProtocolEvent::from_json(line)
                .with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}

/// Read and parse an events file
pub fn load_events(path: &Path) -> Result<Vec<ProtocolEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_events(&content)
}

/// Run one session over `events`, then optionally send a file
pub async fn run(
    account: &str,
    config: Config,
    events: Vec<ProtocolEvent>,
    host: Arc<dyn HostCallbacks>,
    send: Option<FileSend>,
) -> Result<ReplayReport> {
    let count = events.len();
    let engine = Arc::new(MockEngine::new().with_events(events));
    let fetcher = HttpAvatarFetcher::new(config.avatars.timeout())?;
    let session = Session::new(
        account,
        Arc::new(config),
        SessionDeps {
            engine: engine.clone(),
            host,
            store: Arc::new(MemoryCredentialStore::new()),
            fetcher: Arc::new(fetcher),
        },
    );

    // the stream ends after the scripted events
    engine.close_events();
    tracing::info!(events = count, "Replaying events");

    session.clone().run().await?;
    session.join_worker().await;

    let exit_code = match send {
        Some(send) => session.send_file(&send.chat, &send.path).await,
        None => EXIT_OK,
    };

    Ok(ReplayReport {
        events: count,
        exit_code,
    })
}
