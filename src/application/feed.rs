use std::sync::Arc;

use metrics::counter;
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::ai_queue::{AiPostQueue, QueuedAiPost};
use crate::application::repos::{FeedRepo, RepoError};
use crate::application::sampling::PostSampler;
use crate::domain::entities::PostRecord;
use crate::domain::types::PostSource;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("limit must be between 1 and {max}, got {requested}")]
    InvalidLimit { requested: usize, max: usize },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedSettings {
    pub batch_size: usize,
    pub ai_posts_ratio: f64,
    pub drain_limit: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            ai_posts_ratio: 0.2,
            drain_limit: 10,
        }
    }
}

/// One slot in a served batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEntry {
    Post(PostRecord),
    Humor(PostRecord),
    Ai(QueuedAiPost),
}

impl FeedEntry {
    pub fn is_ai(&self) -> bool {
        match self {
            FeedEntry::Post(post) | FeedEntry::Humor(post) => post.is_ai,
            FeedEntry::Ai(_) => true,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            FeedEntry::Post(post) | FeedEntry::Humor(post) => &post.title,
            FeedEntry::Ai(post) => &post.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedBatch {
    pub entries: Vec<FeedEntry>,
    pub ai_posts_count: usize,
    pub batch_size: usize,
}

#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedRepo>,
    queue: Arc<AiPostQueue>,
    sampler: PostSampler,
    settings: FeedSettings,
}

impl FeedService {
    pub fn new(
        repo: Arc<dyn FeedRepo>,
        queue: Arc<AiPostQueue>,
        sampler: PostSampler,
        settings: FeedSettings,
    ) -> Self {
        Self {
            repo,
            queue,
            sampler,
            settings,
        }
    }

    pub fn settings(&self) -> FeedSettings {
        self.settings
    }

    /// Serves the next batch for `user_id`.
    ///
    /// Default-source posts come from the served ledger and get generated posts
    /// mixed in; humor posts are a plain random draw.
    pub async fn next_batch(
        &self,
        user_id: i64,
        source: PostSource,
        limit: Option<usize>,
    ) -> Result<FeedBatch, FeedError> {
        let limit = self.resolve_limit(limit)?;
        let mut rng = StdRng::from_entropy();

        let entries: Vec<FeedEntry> = match source {
            PostSource::Posts => {
                let mut session = self.repo.begin_sampling().await?;
                let sampled = self
                    .sampler
                    .sample_unserved(session.as_mut(), user_id, limit, &mut rng)
                    .await?;
                if sampled.used_fallback {
                    counter!("slopfeed_feed_fallback_total").increment(1);
                }
                if sampled.lost_races > 0 {
                    warn!(
                        target = "slopfeed::application::feed",
                        user_id,
                        lost = sampled.lost_races,
                        "posts already served by a concurrent request were dropped"
                    );
                }
                sampled.posts.into_iter().map(FeedEntry::Post).collect()
            }
            PostSource::HumorPosts => self
                .repo
                .random_humor_posts(limit as i64)
                .await?
                .into_iter()
                .map(FeedEntry::Humor)
                .collect(),
        };

        counter!("slopfeed_feed_served_total", "source" => source.as_str())
            .increment(entries.len() as u64);

        let (entries, ai_posts_count) = match source {
            PostSource::Posts => {
                let wanted = desired_ai_count(
                    entries.len(),
                    self.settings.ai_posts_ratio,
                    self.settings.drain_limit,
                );
                let ai_posts = self.queue.drain(wanted);
                let count = ai_posts.len();
                (interleave(entries, ai_posts, &mut rng), count)
            }
            PostSource::HumorPosts => (entries, 0),
        };

        info!(
            target = "slopfeed::application::feed",
            user_id,
            source = source.as_str(),
            served = entries.len(),
            ai_posts = ai_posts_count,
            "feed batch served"
        );

        Ok(FeedBatch {
            entries,
            ai_posts_count,
            batch_size: limit,
        })
    }

    fn resolve_limit(&self, requested: Option<usize>) -> Result<usize, FeedError> {
        match requested {
            None | Some(0) => Ok(self.settings.batch_size),
            Some(value) if value > MAX_BATCH_SIZE => Err(FeedError::InvalidLimit {
                requested: value,
                max: MAX_BATCH_SIZE,
            }),
            Some(value) => Ok(value),
        }
    }

    pub async fn clear_served(&self, user_id: Option<i64>) -> Result<u64, FeedError> {
        let removed = self.repo.clear_served(user_id).await?;
        info!(
            target = "slopfeed::application::feed",
            user_id = ?user_id,
            removed,
            "served ledger cleared"
        );
        Ok(removed)
    }
}

/// `round(served * ratio)` clamped to `[0, served]` and to what one request may drain.
pub fn desired_ai_count(served: usize, ratio: f64, drain_limit: usize) -> usize {
    let wanted = (served as f64 * ratio.clamp(0.0, 1.0)).round() as usize;
    wanted.min(served).min(drain_limit)
}

/// Inserts each generated post at a uniformly random position.
pub fn interleave<R: Rng + ?Sized>(
    mut entries: Vec<FeedEntry>,
    ai_posts: Vec<QueuedAiPost>,
    rng: &mut R,
) -> Vec<FeedEntry> {
    for post in ai_posts {
        let index = rng.gen_range(0..=entries.len());
        entries.insert(index, FeedEntry::Ai(post));
    }
    entries
}
