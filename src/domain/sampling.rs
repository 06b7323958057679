//! Random sort-key space used by the feed sampler.

use rand::Rng;

/// Largest value a `random_key` may take.
pub const KEY_MAX: i64 = i64::MAX;

/// Half-width of a sampling window; 1/16 of the key space on each side of the center.
pub const WINDOW_HALF_WIDTH: i64 = 1 << 59;

/// Inclusive `random_key` range probed by one sampling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    pub low: i64,
    pub high: i64,
}

impl KeyWindow {
    /// Window of `WINDOW_HALF_WIDTH` around `center`, clamped to `[0, KEY_MAX]`.
    pub fn around(center: i64) -> Self {
        let center = center.clamp(0, KEY_MAX);
        Self {
            low: center.saturating_sub(WINDOW_HALF_WIDTH).max(0),
            high: center.saturating_add(WINDOW_HALF_WIDTH),
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::around(random_key(rng))
    }

    pub fn contains(&self, key: i64) -> bool {
        (self.low..=self.high).contains(&key)
    }
}

/// Fresh uniformly distributed sort key, assigned once per post.
pub fn random_key<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    rng.gen_range(0..=KEY_MAX)
}
