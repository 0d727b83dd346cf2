// ABOUTME: Event dispatcher mapping each protocol event kind to session state changes and host callbacks.
// ABOUTME: One match arm per kind; unmodelled kinds are logged and skipped, never fatal.

use crate::config::ReceiptPolicy;
use crate::lifecycle::{AnnounceOutcome, LifecycleSignal};
use crate::media;
use crate::metrics;
use crate::session::Session;
use crate::traits::{DisplayMessage, TypingState};
use chrono::{DateTime, Utc};
use mdbridge_engine::{
    CallMeta, ChatPresenceState, Conversation, HistorySyncData, Jid, MediaRef, MessageContent,
    MessageEvent, MessageInfo, ProtocolClient, ProtocolEvent, ReceiptKind, CRITICAL_BLOCK,
};
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Text shown when a contact tries to call
pub const CALL_NOTICE: &str =
    "This contact is trying to call you, but WhatsApp Web does not support calls.";

/// Body shown in place of media that could not be downloaded
pub const MEDIA_UNAVAILABLE: &str = "[media could not be downloaded]";

/// What the dispatcher did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// Event changed state or reached the host
    Handled,
    /// Event was logged and dropped
    Ignored,
    /// A fatal error was reported; stop consuming events
    Teardown,
}

impl Session {
    /// Route one engine event.
    ///
    /// After a fatal error every further event is ignored.
    pub async fn handle_event(&self, event: ProtocolEvent) -> HandleResult {
        if !self.is_active() {
            tracing::debug!(kind = event.kind(), "Session inactive, dropping event");
            return HandleResult::Ignored;
        }
        metrics::record_event(event.kind());

        match event {
            ProtocolEvent::Connected => {
                self.lifecycle.apply(LifecycleSignal::Connected);
                self.start_avatar_worker();
                self.announce_connected().await;
                HandleResult::Handled
            }
            ProtocolEvent::AppStateSyncComplete { name } => {
                if name != CRITICAL_BLOCK {
                    tracing::debug!(name = %name, "App state sync complete");
                    return HandleResult::Ignored;
                }
                tracing::info!("Critical app state synced");
                self.lifecycle.apply(LifecycleSignal::CriticalSyncComplete);
                self.announce_connected().await;
                HandleResult::Handled
            }
            ProtocolEvent::PushNameSetting { name } => {
                tracing::info!(name = %name, "Own display name changed");
                self.lifecycle.set_display_name(&name);
                self.announce_connected().await;
                HandleResult::Handled
            }
            ProtocolEvent::PushName {
                jid,
                old_push_name,
                new_push_name,
            } => {
                tracing::info!(
                    jid = %jid,
                    old = %old_push_name,
                    new = %new_push_name,
                    "Contact display name changed"
                );
                if new_push_name.is_empty() {
                    return HandleResult::Ignored;
                }
                self.host
                    .update_contact_name(&jid.to_non_ad().to_string(), &new_push_name);
                HandleResult::Handled
            }
            ProtocolEvent::Disconnected => {
                self.lifecycle.apply(LifecycleSignal::Disconnected);
                self.report_transient("Disconnected.");
                HandleResult::Handled
            }
            ProtocolEvent::StreamReplaced => {
                // kept non-fatal; the engine reconnects on its own
                self.lifecycle.apply(LifecycleSignal::StreamReplaced);
                self.report_transient("Connection stream has been replaced.");
                HandleResult::Handled
            }
            ProtocolEvent::LoggedOut { reason } => {
                tracing::info!(reason = %reason, "Logged out by primary device");
                self.report_fatal(LifecycleSignal::LoggedOut, "Logged out. Please link again.");
                HandleResult::Teardown
            }
            ProtocolEvent::Qr { codes } => {
                self.lifecycle.apply(LifecycleSignal::QrShown);
                let Some(code) = codes.first() else {
                    tracing::warn!("Pairing event without codes");
                    return HandleResult::Ignored;
                };
                tracing::debug!(available = codes.len(), "Showing pairing code");
                self.host.display_qr_code(code);
                HandleResult::Handled
            }
            ProtocolEvent::PairSuccess {
                id,
                business_name,
                platform,
            } => {
                tracing::info!(
                    id = %id,
                    business_name = %business_name,
                    platform = %platform,
                    "Pairing succeeded"
                );
                self.handle_pair_success(&id).await
            }
            ProtocolEvent::Message(message) => self.handle_message(message).await,
            ProtocolEvent::Receipt {
                kind,
                chat,
                sender,
                message_ids,
                timestamp,
            } => {
                match kind {
                    ReceiptKind::Read | ReceiptKind::ReadSelf => {
                        tracing::info!(?message_ids, chat = %chat, sender = %sender, %timestamp, "Messages were read");
                    }
                    ReceiptKind::Delivered => {
                        tracing::info!(?message_ids, chat = %chat, sender = %sender, %timestamp, "Messages were delivered");
                    }
                    _ => {
                        tracing::debug!(?kind, ?message_ids, chat = %chat, "Receipt received");
                    }
                }
                HandleResult::Handled
            }
            ProtocolEvent::Presence {
                from,
                unavailable,
                last_seen,
            } => {
                let from = from.to_non_ad();
                self.host.update_presence(&from, !unavailable, last_seen);
                self.request_avatar(&from);
                HandleResult::Handled
            }
            ProtocolEvent::ChatPresence {
                chat,
                sender,
                state,
            } => {
                let state = match state {
                    ChatPresenceState::Composing => TypingState::Composing,
                    ChatPresenceState::Paused => TypingState::Paused,
                };
                self.host
                    .update_typing_state(&chat.to_non_ad(), &sender.to_non_ad(), state);
                HandleResult::Handled
            }
            ProtocolEvent::HistorySync(data) => {
                self.handle_history_sync(data);
                HandleResult::Handled
            }
            ProtocolEvent::CallOffer(meta) => {
                self.display_call_notice(&meta, false);
                HandleResult::Handled
            }
            ProtocolEvent::CallOfferNotice(meta) => {
                self.display_call_notice(&meta, true);
                HandleResult::Handled
            }
            ProtocolEvent::CallRelayLatency(_) | ProtocolEvent::CallTerminate(_) => {
                HandleResult::Ignored
            }
            ProtocolEvent::AppState { index, action } => {
                tracing::debug!(?index, %action, "App state event");
                HandleResult::Ignored
            }
            ProtocolEvent::OfflineSyncCompleted { count } => {
                tracing::debug!(count, "Offline sync completed");
                HandleResult::Ignored
            }
            ProtocolEvent::JoinedGroup { jid, name } => {
                tracing::debug!(group = %jid, name = %name, "Joined group");
                HandleResult::Ignored
            }
            ProtocolEvent::Unknown { kind, .. } => {
                tracing::warn!(kind = %kind, "Event type not handled");
                HandleResult::Ignored
            }
        }
    }

    async fn announce_connected(&self) -> AnnounceOutcome {
        self.lifecycle
            .announce_connected(self.engine.as_ref(), self.host.as_ref())
            .await
    }

    async fn handle_pair_success(&self, id: &Jid) -> HandleResult {
        let Some(device) = self.engine.own_device() else {
            self.report_fatal(
                LifecycleSignal::FatalError,
                "Pairing succeeded, but device ID is missing.",
            );
            return HandleResult::Teardown;
        };

        let paired = id.to_non_ad();
        let username = self.expected_user();
        let matches = Jid::parse_address(username)
            .map(|expected| expected.to_non_ad() == paired)
            .unwrap_or(false);
        if !matches {
            self.report_fatal(
                LifecycleSignal::FatalError,
                &format!(
                    "Your username '{}' does not match the main device's ID '{}'. Please adjust your username.",
                    username, paired
                ),
            );
            return HandleResult::Teardown;
        }

        if let Err(e) = self.store.set_credentials(&self.account, &device).await {
            tracing::error!(error = %e, "Failed to persist credentials");
            self.report_transient("Pairing succeeded, but the credentials could not be saved.");
        }
        self.lifecycle.apply(LifecycleSignal::PairSucceeded);
        self.host.notify_pairing_succeeded();
        self.prune_devices(&device.jid).await;
        HandleResult::Handled
    }

    /// Delete older device records of the same user, keeping `current`
    async fn prune_devices(&self, current: &Jid) {
        let devices = match self.store.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list devices for pruning");
                return;
            }
        };
        let current_paired_at = devices
            .iter()
            .find(|d| &d.jid == current)
            .map(|d| d.paired_at)
            .unwrap_or_else(Utc::now);

        for device in devices {
            let same_user = device.jid.user == current.user && device.jid.server == current.server;
            if !same_user || &device.jid == current || device.paired_at >= current_paired_at {
                continue;
            }
            match self.store.delete_device(&device.jid).await {
                Ok(()) => tracing::info!(device = %device.jid, "Pruned stale device"),
                Err(e) => tracing::warn!(device = %device.jid, error = %e, "Failed to prune device"),
            }
        }
    }

    async fn handle_message(&self, message: MessageEvent) -> HandleResult {
        let MessageEvent { info, content } = message;
        let quoted_body = content
            .quoted_id()
            .map(|id| self.lookup_cached(id).unwrap_or_default())
            .unwrap_or_default();

        let body = match content {
            MessageContent::Text { body, .. } => {
                self.remember(&info, &body);
                MessageBody::Ready(body)
            }
            MessageContent::Image { caption, media, .. } => {
                if let Some(caption) = caption.as_deref().filter(|c| !c.is_empty()) {
                    self.remember(&info, caption);
                }
                MessageBody::Media {
                    media,
                    name_hint: None,
                    caption,
                }
            }
            MessageContent::Document { title, media } => MessageBody::Media {
                media,
                name_hint: title,
                caption: None,
            },
            MessageContent::Reaction { target_id, emoji } => {
                if emoji.is_empty() {
                    tracing::debug!(target = %target_id, "Reaction removed");
                    return HandleResult::Ignored;
                }
                MessageBody::Ready(match self.lookup_cached(&target_id) {
                    Some(text) => format!("reacted with {} to \"{}\"", emoji, text),
                    None => format!("reacted with {} to a message", emoji),
                })
            }
            MessageContent::Unsupported { name } => {
                tracing::debug!(id = %info.id, kind = %name, "Unsupported message content");
                return HandleResult::Ignored;
            }
        };

        if !info.is_from_me {
            self.request_avatar(&info.sender);
        }

        match body {
            MessageBody::Ready(body) => {
                self.host
                    .display_text_message(&display_message(&info, body, quoted_body, false));
            }
            MessageBody::Media {
                media,
                name_hint,
                caption,
            } => {
                let message = display_message(&info, String::new(), quoted_body, false);
                self.spawn_media_display(message, &info.id, media, name_hint, caption);
            }
        }
        self.track_receipt(&info).await;
        HandleResult::Handled
    }

    fn remember(&self, info: &MessageInfo, text: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(info.id.as_str(), text, info.timestamp);
    }

    fn lookup_cached(&self, id: &str) -> Option<String> {
        let text = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .lookup(id)
            .map(str::to_string);
        metrics::record_cache_lookup(text.is_some());
        if text.is_none() {
            tracing::debug!(id = %id, "Referenced message not cached");
        }
        text
    }

    /// Fetch and save media off the event loop, then display it.
    ///
    /// The fetch is bounded by the attachment timeout and abandoned on teardown.
    fn spawn_media_display(
        &self,
        mut message: DisplayMessage,
        message_id: &str,
        media: MediaRef,
        name_hint: Option<String>,
        caption: Option<String>,
    ) {
        let engine = self.engine.clone();
        let host = self.host.clone();
        let shutdown = self.shutdown_token();
        let dir = PathBuf::from(&self.config.attachments.download_dir);
        let limit = self.config.attachments.timeout();
        let message_id = message_id.to_string();

        let task = async move {
            let fetch = fetch_media(engine.as_ref(), &dir, &message_id, &media, name_hint.as_deref());
            let saved = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(id = %message_id, "Session ended before media was fetched");
                    return;
                }
                result = tokio::time::timeout(limit, fetch) => match result {
                    Ok(body) => body,
                    Err(_) => {
                        tracing::warn!(id = %message_id, timeout_secs = limit.as_secs(), "Media download timed out");
                        MEDIA_UNAVAILABLE.to_string()
                    }
                },
            };
            if shutdown.is_cancelled() {
                return;
            }
            message.body = with_caption(saved, caption.as_deref());
            host.display_text_message(&message);
        };
        self.media_tasks.spawn(task.in_current_span());
    }

    async fn track_receipt(&self, info: &MessageInfo) {
        if info.is_from_me {
            return;
        }
        match self.config.receipts.policy {
            ReceiptPolicy::Deferred => {
                if !self.receipts.defer(&info.chat, &info.sender, &info.id) {
                    tracing::debug!(id = %info.id, "Receipt already pending");
                }
            }
            ReceiptPolicy::Immediate => {
                let ids = [info.id.clone()];
                if let Err(e) = self
                    .engine
                    .mark_read(&ids, Utc::now(), &info.chat, &info.sender)
                    .await
                {
                    tracing::warn!(id = %info.id, error = %e, "Failed to send read receipt");
                }
            }
            ReceiptPolicy::Never => {}
        }
    }

    fn handle_history_sync(&self, data: HistorySyncData) {
        let HistorySyncData {
            push_names,
            conversations,
        } = data;

        for entry in push_names {
            let (Some(id), Some(name)) = (entry.id, entry.push_name) else {
                continue;
            };
            self.host.update_contact_name(&id, &name);
            if let Ok(jid) = id.parse::<Jid>() {
                self.request_avatar(&jid);
            }
        }

        if self.config.history.fetch_history {
            self.import_history(conversations);
        } else if !conversations.is_empty() {
            tracing::debug!(
                conversations = conversations.len(),
                "History import disabled, skipping conversations"
            );
        }
    }

    /// Show text messages from history; nothing is cached or receipted
    fn import_history(&self, conversations: Vec<Conversation>) {
        let mut imported = 0usize;
        for conversation in conversations {
            for message in conversation.messages {
                let MessageContent::Text { body, .. } = message.content else {
                    continue;
                };
                self.host.display_text_message(&display_message(
                    &message.info,
                    body,
                    String::new(),
                    true,
                ));
                imported += 1;
            }
        }
        tracing::info!(imported, "Imported historical messages");
    }

    fn display_call_notice(&self, meta: &CallMeta, is_group: bool) {
        let message = DisplayMessage {
            chat: meta.from.to_non_ad(),
            is_group,
            is_self: false,
            sender: meta.call_creator.to_non_ad(),
            sender_display_name: None,
            timestamp: meta.timestamp,
            body: CALL_NOTICE.to_string(),
            quoted_body: String::new(),
            historical: false,
        };
        self.host.display_text_message(&message);
    }
}

/// Body of an inbound message, or the media still to be fetched for it
enum MessageBody {
    Ready(String),
    Media {
        media: MediaRef,
        name_hint: Option<String>,
        caption: Option<String>,
    },
}

/// Download a media payload and return the body shown for it
async fn fetch_media(
    engine: &dyn ProtocolClient,
    dir: &Path,
    message_id: &str,
    media: &MediaRef,
    name_hint: Option<&str>,
) -> String {
    let data = match engine.download(media).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(id = %message_id, error = %e, "Failed to download media");
            return MEDIA_UNAVAILABLE.to_string();
        }
    };
    let filename = media::attachment_filename(message_id, name_hint, &media.mimetype);
    match media::save_attachment(dir, &filename, &data).await {
        Ok(path) => path.display().to_string(),
        Err(e) => {
            tracing::warn!(id = %message_id, error = %e, "Failed to save media");
            MEDIA_UNAVAILABLE.to_string()
        }
    }
}

fn display_message(
    info: &MessageInfo,
    body: String,
    quoted_body: String,
    historical: bool,
) -> DisplayMessage {
    DisplayMessage {
        chat: info.chat.to_non_ad(),
        is_group: info.is_group,
        is_self: info.is_from_me,
        sender: info.sender.to_non_ad(),
        sender_display_name: Some(info.push_name.clone()).filter(|name| !name.is_empty()),
        timestamp: timestamp_or_now(info.timestamp),
        body,
        quoted_body,
        historical,
    }
}

fn timestamp_or_now(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    if timestamp.timestamp() == 0 {
        Utc::now()
    } else {
        timestamp
    }
}

fn with_caption(body: String, caption: Option<&str>) -> String {
    match caption.filter(|c| !c.is_empty()) {
        Some(caption) => format!("{}\n{}", body, caption),
        None => body,
    }
}
