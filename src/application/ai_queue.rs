//! Bounded in-process buffer of generated posts waiting to be shown.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use tracing::debug;

use crate::domain::entities::AiPostRecord;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::ai_queue";

pub const DEFAULT_CAPACITY: usize = 50;

/// A generated post already persisted to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAiPost {
    pub archive_id: i64,
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
}

impl From<AiPostRecord> for QueuedAiPost {
    fn from(record: AiPostRecord) -> Self {
        Self {
            archive_id: record.id,
            title: record.title,
            self_text: record.self_text,
            subreddit: record.subreddit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The buffer already holds a post with this archive id.
    AlreadyQueued,
    Full,
}

/// FIFO with a fixed capacity. Pushing into a full queue drops the item.
pub struct AiPostQueue {
    items: Mutex<VecDeque<QueuedAiPost>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl AiPostQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `post` unless the queue is full or already holds its archive id.
    ///
    /// Only the full case counts as a drop.
    pub fn try_push(&self, post: QueuedAiPost) -> PushOutcome {
        let mut items = mutex_lock(&self.items, SOURCE, "try_push");
        if items.iter().any(|queued| queued.archive_id == post.archive_id) {
            return PushOutcome::AlreadyQueued;
        }
        if items.len() >= self.capacity {
            drop(items);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("slopfeed_ai_queue_dropped_total").increment(1);
            debug!(
                target = "slopfeed::application::ai_queue",
                archive_id = post.archive_id,
                "AI queue full, dropping post"
            );
            return PushOutcome::Full;
        }
        items.push_back(post);
        gauge!("slopfeed_ai_queue_len").set(items.len() as f64);
        PushOutcome::Queued
    }

    /// Takes up to `max` posts in FIFO order without waiting.
    pub fn drain(&self, max: usize) -> Vec<QueuedAiPost> {
        let mut items = mutex_lock(&self.items, SOURCE, "drain");
        let count = max.min(items.len());
        let drained: Vec<_> = items.drain(..count).collect();
        gauge!("slopfeed_ai_queue_len").set(items.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.items, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for AiPostQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
pub(crate) fn queued(archive_id: i64) -> QueuedAiPost {
    QueuedAiPost {
        archive_id,
        title: format!("generated {archive_id}"),
        self_text: "body".to_string(),
        subreddit: Some("ai".to_string()),
    }
}
