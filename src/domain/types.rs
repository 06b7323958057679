//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// Table a feed request samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSource {
    #[default]
    Posts,
    HumorPosts,
}

impl PostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PostSource::Posts => "posts",
            PostSource::HumorPosts => "humorposts",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            PostSource::Posts => "posts",
            PostSource::HumorPosts => "humor_posts",
        }
    }
}

impl TryFrom<&str> for PostSource {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "posts" => Ok(PostSource::Posts),
            "humorposts" | "humor_posts" => Ok(PostSource::HumorPosts),
            _ => Err(()),
        }
    }
}

/// Persisted `interactions.action` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    Like,
    Dislike,
    Next,
    MarkedAi,
}

impl InteractionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionAction::Like => "like",
            InteractionAction::Dislike => "dislike",
            InteractionAction::Next => "next",
            InteractionAction::MarkedAi => "marked_ai",
        }
    }
}

impl TryFrom<&str> for InteractionAction {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "like" => Ok(InteractionAction::Like),
            "dislike" => Ok(InteractionAction::Dislike),
            "next" => Ok(InteractionAction::Next),
            "marked_ai" => Ok(InteractionAction::MarkedAi),
            _ => Err(()),
        }
    }
}

/// Resolved row an interaction points at. Exactly one per interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionTarget {
    Post(i64),
    HumorPost(i64),
    AiPost(i64),
}

impl InteractionTarget {
    pub fn kind(self) -> &'static str {
        match self {
            InteractionTarget::Post(_) => "post",
            InteractionTarget::HumorPost(_) => "humor_post",
            InteractionTarget::AiPost(_) => "ai_post",
        }
    }

    pub fn id(self) -> i64 {
        match self {
            InteractionTarget::Post(id)
            | InteractionTarget::HumorPost(id)
            | InteractionTarget::AiPost(id) => id,
        }
    }
}

/// True provenance of a post, used to pick which counters move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    Ai,
    Real,
}

impl ContentOrigin {
    pub fn from_is_ai(is_ai: bool) -> Self {
        if is_ai {
            ContentOrigin::Ai
        } else {
            ContentOrigin::Real
        }
    }
}

/// How the background producer fills the AI queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Ask a language model for new posts.
    #[default]
    Llm,
    /// Replay the most recent archived posts.
    Archive,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Llm => "llm",
            GenerationMode::Archive => "archive",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_source_parses_query_values() {
        assert_eq!(PostSource::try_from("posts"), Ok(PostSource::Posts));
        assert_eq!(PostSource::try_from("HumorPosts"), Ok(PostSource::HumorPosts));
        assert_eq!(PostSource::try_from("humor_posts"), Ok(PostSource::HumorPosts));
        assert!(PostSource::try_from("memes").is_err());
    }

    #[test]
    fn interaction_action_round_trips_through_storage_name() {
        for action in [
            InteractionAction::Like,
            InteractionAction::Dislike,
            InteractionAction::Next,
            InteractionAction::MarkedAi,
        ] {
            assert_eq!(InteractionAction::try_from(action.as_str()), Ok(action));
        }
    }
}
