//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::experiments::{ExperimentCounters, ExperimentRates};

/// Row of `posts` or `humor_posts`; both tables share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub post_id: Option<String>,
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
    pub over_18: bool,
    pub link_flair_text: Option<String>,
    pub is_ai: bool,
    pub random_key: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiPostRecord {
    pub id: i64,
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub current_experiment: Option<String>,
    pub aware_of_experiment: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentStatsRecord {
    pub user_id: i64,
    pub experiment: String,
    pub counters: ExperimentCounters,
    pub rates: ExperimentRates,
    pub aware_of_experiment: bool,
    pub updated_at: OffsetDateTime,
}

/// Insert payload for `posts` / `humor_posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub post_id: Option<String>,
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
    pub over_18: bool,
    pub link_flair_text: Option<String>,
    pub is_ai: bool,
}

impl NewPost {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            post_id: None,
            title: title.into(),
            self_text: String::new(),
            subreddit: None,
            over_18: false,
            link_flair_text: None,
            is_ai: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAiPost {
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
}
