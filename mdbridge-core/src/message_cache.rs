// ABOUTME: Bounded FIFO cache of recent inbound messages for quote and reaction lookup.
// ABOUTME: Global across chats; a miss means the quoted content is no longer available.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity ring of recently seen messages
#[derive(Debug)]
pub struct MessageCache {
    entries: VecDeque<CachedMessage>,
    /// Sequence number of the newest entry for each id
    index: HashMap<String, u64>,
    /// Sequence number of `entries[0]`
    front_seq: u64,
    capacity: usize,
}

impl MessageCache {
    /// Create a cache holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            front_seq: 0,
            capacity,
        }
    }

    /// Remember a message, evicting the oldest entry when full
    pub fn record(&mut self, id: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) {
        if self.entries.len() == self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                if self.index.get(&evicted.id) == Some(&self.front_seq) {
                    self.index.remove(&evicted.id);
                }
            }
            self.front_seq += 1;
        }
        let id = id.into();
        let seq = self.front_seq + self.entries.len() as u64;
        self.index.insert(id.clone(), seq);
        self.entries.push_back(CachedMessage {
            id,
            text: text.into(),
            timestamp,
        });
    }

    /// Text of a cached message.
    ///
    /// A re-delivered id resolves to its latest text.
    pub fn lookup(&self, id: &str) -> Option<&str> {
        let seq = *self.index.get(id)?;
        let position = usize::try_from(seq - self.front_seq).ok()?;
        self.entries.get(position).map(|m| m.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
