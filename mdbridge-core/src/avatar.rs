// ABOUTME: Profile picture fetching: bounded request queue plus one background worker per session.
// ABOUTME: Best-effort; overflow drops requests and fetch failures are only logged.

use crate::metrics;
use crate::sniff::sniff_content_type;
use crate::traits::HostCallbacks;
use anyhow::{Context, Result};
use async_trait::async_trait;
use mdbridge_engine::{Jid, ProtocolClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A request to refresh one contact's avatar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePictureRequest {
    pub jid: Jid,
    /// Picture id the caller already has, to skip unchanged pictures
    pub known_picture_id: Option<String>,
}

impl ProfilePictureRequest {
    pub fn new(jid: Jid) -> Self {
        Self {
            jid,
            known_picture_id: None,
        }
    }
}

/// Producer side of the avatar queue. Never blocks.
#[derive(Clone)]
pub struct AvatarQueue {
    tx: mpsc::Sender<ProfilePictureRequest>,
}

/// Create a queue of the given capacity and its receiving end
pub fn avatar_channel(capacity: usize) -> (AvatarQueue, mpsc::Receiver<ProfilePictureRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AvatarQueue { tx }, rx)
}

impl AvatarQueue {
    /// Queue a request; returns false if it was dropped because the queue is
    /// full or the worker is gone
    pub fn enqueue(&self, request: ProfilePictureRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => {
                metrics::record_avatar("queued");
                true
            }
            Err(TrySendError::Full(request)) => {
                tracing::debug!(jid = %request.jid, "Avatar queue full, dropping request");
                metrics::record_avatar("dropped");
                false
            }
            Err(TrySendError::Closed(request)) => {
                tracing::debug!(jid = %request.jid, "Avatar worker stopped, dropping request");
                metrics::record_avatar("dropped");
                false
            }
        }
    }
}

/// Downloads picture bytes from a URL
#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher with a per-request timeout
pub struct HttpAvatarFetcher {
    client: reqwest::Client,
}

impl HttpAvatarFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build avatar HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AvatarFetcher for HttpAvatarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("avatar download failed: {}", response.status());
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Single consumer of the avatar queue for a session's lifetime
pub struct ProfilePictureWorker {
    engine: Arc<dyn ProtocolClient>,
    host: Arc<dyn HostCallbacks>,
    fetcher: Arc<dyn AvatarFetcher>,
    shutdown: CancellationToken,
    timeout: Duration,
    known_ids: HashMap<Jid, String>,
}

impl ProfilePictureWorker {
    pub fn new(
        engine: Arc<dyn ProtocolClient>,
        host: Arc<dyn HostCallbacks>,
        fetcher: Arc<dyn AvatarFetcher>,
        shutdown: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            host,
            fetcher,
            shutdown,
            timeout,
            known_ids: HashMap::new(),
        }
    }

    /// Run the worker on its own task
    pub fn spawn(self, rx: mpsc::Receiver<ProfilePictureRequest>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Drain requests until the queue closes or the session shuts down
    pub async fn run(mut self, mut rx: mpsc::Receiver<ProfilePictureRequest>) {
        tracing::debug!("Profile picture worker started");
        loop {
            let request = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let jid = request.jid.clone();
            match tokio::time::timeout(self.timeout, self.process(request)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    metrics::record_avatar("failed");
                    tracing::warn!(jid = %jid, error = %e, "Profile picture fetch failed");
                }
                Err(_) => {
                    metrics::record_avatar("failed");
                    tracing::warn!(jid = %jid, timeout = ?self.timeout, "Profile picture fetch timed out");
                }
            }
        }
        tracing::debug!("Profile picture worker stopped");
    }

    async fn process(&mut self, request: ProfilePictureRequest) -> Result<()> {
        let known = request
            .known_picture_id
            .or_else(|| self.known_ids.get(&request.jid).cloned());

        let Some(info) = self
            .engine
            .profile_picture(&request.jid, known.as_deref())
            .await
            .context("Failed to resolve profile picture")?
        else {
            metrics::record_avatar("unchanged");
            tracing::debug!(jid = %request.jid, "Profile picture unchanged or absent");
            return Ok(());
        };

        let bytes = self.fetcher.fetch(&info.url).await?;
        let content_type = sniff_content_type(&bytes);
        if content_type.type_() != mime_guess::mime::IMAGE {
            anyhow::bail!("picture is not an image ({})", content_type);
        }

        // Session may have been torn down while the download was in flight
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        self.host.update_avatar(&request.jid, &bytes);
        self.known_ids.insert(request.jid.clone(), info.id);
        metrics::record_avatar("fetched");
        tracing::debug!(jid = %request.jid, size = bytes.len(), "Profile picture updated");
        Ok(())
    }
}
