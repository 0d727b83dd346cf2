// ABOUTME: Per-account session owning cache, receipt tracker, avatar queue and lifecycle state.
// ABOUTME: Consumes the engine event stream and exposes the host's outbound command surface.

use crate::avatar::{avatar_channel, AvatarFetcher, AvatarQueue, ProfilePictureRequest, ProfilePictureWorker};
use crate::config::Config;
use crate::dispatcher::HandleResult;
use crate::error::{ErrorSeverity, SendError, EXIT_OK};
use crate::lifecycle::{ConnectionLifecycle, ConnectionState, LifecycleSignal};
use crate::message_cache::MessageCache;
use crate::metrics;
use crate::receipts::DeferredReceiptTracker;
use crate::send_file;
use crate::traits::{CredentialStore, HostCallbacks};
use anyhow::{Context, Result};
use chrono::Utc;
use mdbridge_engine::{Jid, ProtocolClient, SendResponse};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Collaborators a session is wired to
#[derive(Clone)]
pub struct SessionDeps {
    pub engine: Arc<dyn ProtocolClient>,
    pub host: Arc<dyn HostCallbacks>,
    pub store: Arc<dyn CredentialStore>,
    pub fetcher: Arc<dyn AvatarFetcher>,
}

/// Worker and its queue end, held until the first Connected event
struct PendingWorker {
    worker: ProfilePictureWorker,
    rx: mpsc::Receiver<ProfilePictureRequest>,
}

/// One logged-in account.
///
/// Everything session-scoped lives here and is only reachable through it.
pub struct Session {
    pub(crate) account: String,
    pub(crate) config: Arc<Config>,
    pub(crate) engine: Arc<dyn ProtocolClient>,
    pub(crate) host: Arc<dyn HostCallbacks>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) cache: Mutex<MessageCache>,
    pub(crate) receipts: DeferredReceiptTracker,
    pub(crate) lifecycle: ConnectionLifecycle,
    pub(crate) media_tasks: TaskTracker,
    avatars: AvatarQueue,
    pending_worker: Mutex<Option<PendingWorker>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    avatar_requested: Mutex<HashSet<Jid>>,
    shutdown: CancellationToken,
    fatal_reported: AtomicBool,
    torn_down: AtomicBool,
}

impl Session {
    pub fn new(account: impl Into<String>, config: Arc<Config>, deps: SessionDeps) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let (avatars, rx) = avatar_channel(config.avatars.queue_capacity);
        let worker = ProfilePictureWorker::new(
            deps.engine.clone(),
            deps.host.clone(),
            deps.fetcher,
            shutdown.clone(),
            config.avatars.timeout(),
        );

        Arc::new(Self {
            account: account.into(),
            cache: Mutex::new(MessageCache::new(config.cache.capacity)),
            receipts: DeferredReceiptTracker::new(),
            lifecycle: ConnectionLifecycle::new(config.account.display_name.clone()),
            engine: deps.engine,
            host: deps.host,
            store: deps.store,
            media_tasks: TaskTracker::new(),
            avatars,
            pending_worker: Mutex::new(Some(PendingWorker { worker, rx })),
            worker_handle: Mutex::new(None),
            avatar_requested: Mutex::new(HashSet::new()),
            shutdown,
            fatal_reported: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            config,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// False once the session has been torn down
    pub fn is_active(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Token cancelled on teardown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of cached messages available for quotes and reactions
    pub fn cached_messages(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of inbound messages still waiting for a read receipt
    pub fn pending_receipts(&self) -> usize {
        self.receipts.pending_count()
    }

    /// Identifier the paired device must belong to.
    ///
    /// Falls back to the account handle when no username is configured.
    pub(crate) fn expected_user(&self) -> &str {
        if self.config.account.username.is_empty() {
            &self.account
        } else {
            &self.config.account.username
        }
    }

    /// Subscribe, connect, then dispatch events until teardown or stream end
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let span = tracing::info_span!("session", account = %self.account);
        async move { self.run_inner().await }.instrument(span).await
    }

    async fn run_inner(&self) -> Result<()> {
        let mut events = self
            .engine
            .subscribe()
            .await
            .context("Failed to subscribe to engine events")?;

        tracing::info!(engine = self.engine.name(), "Connecting");
        self.lifecycle.apply(LifecycleSignal::ConnectRequested);
        if let Err(e) = self.engine.connect().await {
            self.report_fatal(
                LifecycleSignal::FatalError,
                &format!("Failed to connect: {:#}", e),
            );
            return Err(e.context("Failed to connect"));
        }

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!("Session shut down, leaving event loop");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("Engine event stream ended");
                        break;
                    }
                },
            };

            if self.handle_event(event).await == HandleResult::Teardown {
                break;
            }
        }

        self.teardown().await;
        Ok(())
    }

    /// Stop consuming events and avatar requests and disconnect the engine
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.engine.disconnect().await {
            tracing::debug!(error = %e, "Engine disconnect failed during teardown");
        }
        tracing::info!(state = %self.lifecycle.state(), "Session torn down");
    }

    /// Wait until every media fetch started so far has finished or given up
    pub async fn wait_for_media(&self) {
        self.media_tasks.close();
        self.media_tasks.wait().await;
        self.media_tasks.reopen();
    }

    /// Wait for the avatar worker and media fetches to stop after teardown
    pub async fn join_worker(&self) {
        self.wait_for_media().await;
        let handle = self
            .worker_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Profile picture worker panicked");
            }
        }
    }

    /// Start the profile picture worker; only the first call has an effect
    pub(crate) fn start_avatar_worker(&self) -> bool {
        if !self.config.avatars.enabled {
            return false;
        }
        let pending = self
            .pending_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(PendingWorker { worker, rx }) = pending else {
            return false;
        };
        let span = tracing::info_span!("avatars", account = %self.account);
        let handle = tokio::spawn(worker.run(rx).instrument(span));
        *self.worker_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        tracing::debug!("Profile picture worker spawned");
        true
    }

    /// Queue an avatar fetch for a contact seen for the first time
    pub(crate) fn request_avatar(&self, jid: &Jid) {
        if !self.config.avatars.enabled {
            return;
        }
        let jid = jid.to_non_ad();
        let newly_seen = self
            .avatar_requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(jid.clone());
        if !newly_seen {
            return;
        }
        if !self.avatars.enqueue(ProfilePictureRequest::new(jid.clone())) {
            // allow a retry the next time the contact shows up
            self.avatar_requested
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&jid);
        }
    }

    /// Queue a refresh for a contact whose picture id the host already knows.
    ///
    /// The picture is only downloaded again when its id changed.
    pub fn refresh_avatar(&self, jid: &Jid, known_picture_id: Option<&str>) -> bool {
        if !self.config.avatars.enabled {
            return false;
        }
        let mut request = ProfilePictureRequest::new(jid.to_non_ad());
        request.known_picture_id = known_picture_id.map(str::to_string);
        self.avatars.enqueue(request)
    }

    /// Tell the host about a recoverable problem
    pub(crate) fn report_transient(&self, message: &str) {
        if !self.is_active() {
            return;
        }
        metrics::record_host_error("transient");
        self.host.report_error(ErrorSeverity::Transient, message);
    }

    /// Report a session-ending error exactly once and cancel the session.
    ///
    /// Returns false if a fatal error was already reported.
    pub(crate) fn report_fatal(&self, signal: LifecycleSignal, message: &str) -> bool {
        if self.fatal_reported.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.lifecycle.apply(signal);
        tracing::error!(error = %message, "Session ended");
        metrics::record_host_error("fatal");
        self.host.report_error(ErrorSeverity::Fatal, message);
        self.shutdown.cancel();
        true
    }

    /// Send a text message on behalf of the host
    pub async fn send_text(&self, chat: &str, body: &str) -> Result<SendResponse, SendError> {
        send_file::send_text(self.engine.as_ref(), chat, body).await
    }

    /// Send a file on behalf of the host, returning the exit code it expects
    pub async fn send_file(&self, chat: &str, path: &Path) -> i32 {
        match send_file::send_file(self.engine.as_ref(), chat, path).await {
            Ok(_) => EXIT_OK,
            Err(e) => e.exit_code(),
        }
    }

    /// Flush deferred receipts for (chat, sender) and send them as one read receipt.
    ///
    /// Returns how many message ids were marked read.
    pub async fn mark_read(&self, chat: &str, sender: &str) -> Result<usize> {
        let chat = Jid::parse_address(chat).context("Invalid chat address")?;
        let sender = Jid::parse_address(sender).context("Invalid sender address")?;
        let ids = self.receipts.flush(&chat, &sender);
        if ids.is_empty() {
            tracing::debug!(chat = %chat, sender = %sender, "No pending receipts");
            return Ok(0);
        }

        if let Err(e) = self.engine.mark_read(&ids, Utc::now(), &chat, &sender).await {
            // keep them pending so the next mark-read retries
            let count = ids.len();
            self.receipts.restore(&chat, &sender, ids);
            return Err(e.context(format!("Failed to mark {} messages read", count)));
        }
        tracing::info!(chat = %chat, sender = %sender, count = ids.len(), "Marked messages read");
        Ok(ids.len())
    }
}
