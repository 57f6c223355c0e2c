//! Chat/feedback transcript.
//!
//! Prompts, assistant replies and accept/reject confirmations land here in a
//! fixed-capacity ring; the oldest entries fall off once it is full.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub sender: Sender,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

pub const FEEDBACK_CAPACITY: usize = 500;

pub struct FeedbackLog {
    entries: Vec<Option<FeedbackEntry>>,
    capacity: usize,
    /// Next slot to write; the oldest entry once the ring is full
    write_pos: usize,
    count: usize,
    next_id: u64,
}

impl Default for FeedbackLog {
    fn default() -> Self {
        Self::new(FEEDBACK_CAPACITY)
    }
}

impl FeedbackLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries,
            capacity,
            write_pos: 0,
            count: 0,
            next_id: 1,
        }
    }

    /// Append an entry and return its id.
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.entries[self.write_pos] = Some(FeedbackEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            sender,
            text: text.into(),
        });
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
        id
    }

    /// The most recent `limit` entries, oldest first. `0` means all.
    pub fn entries(&self, limit: usize) -> Vec<FeedbackEntry> {
        let take = if limit == 0 { self.count } else { limit.min(self.count) };
        let start = if self.count < self.capacity { 0 } else { self.write_pos };
        (self.count - take..self.count)
            .filter_map(|i| self.entries[(start + i) % self.capacity].clone())
            .collect()
    }

    pub fn last(&self) -> Option<&FeedbackEntry> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.write_pos + self.capacity - 1) % self.capacity;
        self.entries[idx].as_ref()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop every entry. Ids keep counting up.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|slot| *slot = None);
        self.write_pos = 0;
        self.count = 0;
    }
}
