//! Request and response types for the slopfeed study API.
//!
//! Field names follow the wire format used by the study frontend, which mixes
//! snake_case post fields with a handful of camelCase envelope fields.

use serde::{Deserialize, Deserializer, Serialize};

/// Prefix marking a `post_id` that refers to the AI-generated archive.
pub const AI_POST_ID_PREFIX: &str = "ai-";

/// Sentinel accepted by `POST /experiments/set` to request a random assignment.
pub const RANDOM_EXPERIMENT: &str = "random";

/// One post as shown in the feed and echoed back by interaction calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub self_text: String,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default = "default_over_18", deserialize_with = "flag_string")]
    pub over_18: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub is_ai: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humor_post_id: Option<i64>,
}

impl Default for FeedPost {
    fn default() -> Self {
        Self {
            id: None,
            post_id: None,
            title: String::new(),
            self_text: String::new(),
            subreddit: None,
            over_18: default_over_18(),
            link_flair_text: None,
            is_ai: false,
            humor_post_id: None,
        }
    }
}

impl FeedPost {
    /// Archive id encoded in `post_id` when the post came from the AI archive.
    pub fn ai_archive_id(&self) -> Option<i64> {
        self.post_id
            .as_deref()?
            .strip_prefix(AI_POST_ID_PREFIX)?
            .parse()
            .ok()
    }

    pub fn is_over_18(&self) -> bool {
        self.over_18.eq_ignore_ascii_case("true")
    }
}

pub fn ai_post_id(archive_id: i64) -> String {
    format!("{AI_POST_ID_PREFIX}{archive_id}")
}

pub fn flag_value(flag: bool) -> String {
    if flag { "true" } else { "false" }.to_string()
}

fn default_over_18() -> String {
    flag_value(false)
}

/// Accepts `"true"`/`"false"` strings as well as JSON booleans.
fn flag_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => flag_value(value),
        Flag::Text(value) => flag_value(value.trim().eq_ignore_ascii_case("true")),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub posts: Vec<FeedPost>,
    pub count: usize,
    #[serde(rename = "aiPostsCount")]
    pub ai_posts_count: usize,
    #[serde(rename = "batchSize")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub post: FeedPost,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSetRequest {
    #[serde(default)]
    pub experiment: Option<String>,
}

/// `current` is `null` whenever the user has not been told their assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSetResponse {
    pub ok: bool,
    pub current: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentOptionsResponse {
    pub experiments: Vec<String>,
    #[serde(rename = "supportsRandom")]
    pub supports_random: bool,
    pub current: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatsView {
    pub experiment: String,
    pub ai_post_count: i64,
    pub real_post_count: i64,
    pub liked_ai_post_count: i64,
    pub liked_real_post_count: i64,
    pub ai_marked_as_ai_count: i64,
    pub real_marked_as_ai_count: i64,
    pub ai_dislike_count: i64,
    pub real_dislike_count: i64,
    pub ai_like_rate: f64,
    pub real_like_rate: f64,
    pub ai_marked_as_ai_rate: f64,
    pub real_marked_as_ai_rate: f64,
    pub ai_dislike_rate: f64,
    pub real_dislike_rate: f64,
    pub aware_of_experiment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatsResponse {
    pub stats: Vec<ExperimentStatsView>,
}
