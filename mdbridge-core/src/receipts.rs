// ABOUTME: Per-chat, per-sender tracking of inbound message ids awaiting our read receipt.
// ABOUTME: Safe for concurrent defer from the dispatcher and flush from host mark-read.

use mdbridge_engine::Jid;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

type PendingBySender = HashMap<Jid, Vec<String>>;

#[derive(Debug, Default)]
struct Pending {
    by_chat: HashMap<Jid, PendingBySender>,
    // every id currently held in some sequence
    ids: HashSet<String>,
}

/// Pending read receipts keyed by chat, then sender
#[derive(Debug, Default)]
pub struct DeferredReceiptTracker {
    pending: Mutex<Pending>,
}

impl DeferredReceiptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message id for a later read receipt.
    ///
    /// Returns false if the id is already pending for any (chat, sender) pair;
    /// an id is never held in two sequences at once.
    pub fn defer(&self, chat: &Jid, sender: &Jid, message_id: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.ids.insert(message_id.to_string()) {
            return false;
        }
        pending
            .by_chat
            .entry(chat.clone())
            .or_default()
            .entry(sender.clone())
            .or_default()
            .push(message_id.to_string());
        true
    }

    /// Take every pending id for (chat, sender) in arrival order
    pub fn flush(&self, chat: &Jid, sender: &Jid) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(by_sender) = pending.by_chat.get_mut(chat) else {
            return Vec::new();
        };
        let ids = by_sender.remove(sender).unwrap_or_default();
        if by_sender.is_empty() {
            pending.by_chat.remove(chat);
        }
        for id in &ids {
            pending.ids.remove(id);
        }
        ids
    }

    /// Put flushed ids back ahead of anything deferred since the flush.
    ///
    /// Ids that became pending again in the meantime are skipped.
    pub fn restore(&self, chat: &Jid, sender: &Jid, ids: Vec<String>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let restored: Vec<String> = ids
            .into_iter()
            .filter(|id| pending.ids.insert(id.clone()))
            .collect();
        if restored.is_empty() {
            return;
        }
        pending
            .by_chat
            .entry(chat.clone())
            .or_default()
            .entry(sender.clone())
            .or_default()
            .splice(0..0, restored);
    }

    /// Total number of pending ids
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).ids.len()
    }
}
