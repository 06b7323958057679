//! Windowed random sampling over the served-post ledger.

use rand::{Rng, seq::SliceRandom};
use tracing::debug;

use crate::application::repos::{RepoError, SamplingSession};
use crate::domain::entities::PostRecord;
use crate::domain::sampling::KeyWindow;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_FALLBACK_FACTOR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostSampler {
    attempts: u32,
    fallback_factor: u32,
}

impl Default for PostSampler {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_FALLBACK_FACTOR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledBatch {
    pub posts: Vec<PostRecord>,
    pub used_fallback: bool,
    /// Posts dropped because another request marked them first.
    pub lost_races: usize,
}

impl PostSampler {
    pub fn new(attempts: u32, fallback_factor: u32) -> Self {
        Self {
            attempts,
            fallback_factor: fallback_factor.max(1),
        }
    }

    /// Picks up to `limit` posts never served to `user_id` and marks them served.
    ///
    /// Random key windows are probed first. If they come up short, the remainder
    /// is drawn from a shuffled key-ordered pool `fallback_factor` times larger,
    /// which is only approximately uniform. The session is committed on success.
    pub async fn sample_unserved<S, R>(
        &self,
        session: &mut S,
        user_id: i64,
        limit: usize,
        rng: &mut R,
    ) -> Result<SampledBatch, RepoError>
    where
        S: SamplingSession + ?Sized,
        R: Rng + Send + ?Sized,
    {
        let mut collected: Vec<PostRecord> = Vec::with_capacity(limit);
        let mut ids: Vec<i64> = Vec::with_capacity(limit);

        for attempt in 0..self.attempts {
            if collected.len() >= limit {
                break;
            }
            let window = KeyWindow::random(rng);
            let wanted = (limit - collected.len()) as i64;
            let chunk = session
                .window_unserved(user_id, window, &ids, wanted)
                .await?;
            debug!(
                target = "slopfeed::application::sampling",
                user_id,
                attempt,
                low = window.low,
                high = window.high,
                found = chunk.len(),
                "probed key window"
            );
            absorb(&mut collected, &mut ids, chunk, limit);
        }

        let mut used_fallback = false;
        if collected.len() < limit {
            used_fallback = true;
            let remainder = limit - collected.len();
            let pool_size = remainder.saturating_mul(self.fallback_factor as usize) as i64;
            let mut pool = session.ordered_unserved(user_id, &ids, pool_size).await?;
            pool.shuffle(rng);
            absorb(&mut collected, &mut ids, pool, limit);
        }

        let marked = if ids.is_empty() {
            Vec::new()
        } else {
            session.mark_served(user_id, &ids).await?
        };
        let before = collected.len();
        collected.retain(|post| marked.contains(&post.id));
        let lost_races = before - collected.len();

        session.commit().await?;

        Ok(SampledBatch {
            posts: collected,
            used_fallback,
            lost_races,
        })
    }
}

fn absorb(
    collected: &mut Vec<PostRecord>,
    ids: &mut Vec<i64>,
    chunk: Vec<PostRecord>,
    limit: usize,
) {
    for post in chunk {
        if collected.len() >= limit {
            break;
        }
        if ids.contains(&post.id) {
            continue;
        }
        ids.push(post.id);
        collected.push(post);
    }
}
