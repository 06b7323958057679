//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    AiPostRecord, ExperimentStatsRecord, NewAiPost, NewPost, PostRecord, UserRecord,
};
use crate::domain::experiments::CounterDeltas;
use crate::domain::sampling::KeyWindow;
use crate::domain::types::{InteractionAction, InteractionTarget};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// One feed-serve unit of work. Everything done through a session becomes
/// visible only after [`SamplingSession::commit`]; dropping it rolls back.
#[async_trait]
pub trait SamplingSession: Send {
    /// Unserved posts whose key lies in `window`, skipping `exclude`, ordered by key.
    async fn window_unserved(
        &mut self,
        user_id: i64,
        window: KeyWindow,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Unserved posts anywhere in the key space, skipping `exclude`, ordered by key.
    async fn ordered_unserved(
        &mut self,
        user_id: i64,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Writes served rows and returns the ids this call actually marked.
    /// Ids already served (for example by a concurrent request) are left out.
    async fn mark_served(&mut self, user_id: i64, post_ids: &[i64])
    -> Result<Vec<i64>, RepoError>;

    async fn commit(&mut self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait FeedRepo: Send + Sync {
    async fn begin_sampling(&self) -> Result<Box<dyn SamplingSession>, RepoError>;

    /// Uniform draw from `humor_posts`; not tracked in the served ledger.
    async fn random_humor_posts(&self, limit: i64) -> Result<Vec<PostRecord>, RepoError>;

    /// Deletes served rows, for one user or everyone.
    async fn clear_served(&self, user_id: Option<i64>) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;

    async fn find_post_by_title(&self, title: &str) -> Result<Option<PostRecord>, RepoError>;

    async fn create_post(&self, post: NewPost, random_key: i64) -> Result<PostRecord, RepoError>;

    async fn find_humor_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait AiPostsRepo: Send + Sync {
    async fn insert_ai_post(&self, post: NewAiPost) -> Result<AiPostRecord, RepoError>;

    async fn find_ai_post(&self, id: i64) -> Result<Option<AiPostRecord>, RepoError>;

    /// Newest archive rows first.
    async fn recent_ai_posts(&self, limit: i64) -> Result<Vec<AiPostRecord>, RepoError>;
}

#[async_trait]
pub trait InteractionsRepo: Send + Sync {
    /// Inserts one interaction row. A repeat of the same
    /// `(user, target, action)` yields [`RepoError::Duplicate`].
    async fn insert_interaction(
        &self,
        user_id: i64,
        target: InteractionTarget,
        action: InteractionAction,
    ) -> Result<(), RepoError>;

    /// Finds the post titled `post.title`, creating it when absent, and inserts
    /// the interaction against it. Both happen in one transaction serialized per
    /// title. A repeat of the same `(user, post, action)` is reported through
    /// [`TitledInteraction::inserted`] instead of an error.
    async fn insert_titled_interaction(
        &self,
        user_id: i64,
        post: NewPost,
        random_key: i64,
        action: InteractionAction,
    ) -> Result<TitledInteraction, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitledInteraction {
    pub post: PostRecord,
    pub post_created: bool,
    pub inserted: bool,
}

#[async_trait]
pub trait ExperimentsRepo: Send + Sync {
    /// Creates the `(user, experiment)` row if needed, locks it, applies
    /// `deltas`, recomputes rates and stores the awareness flag, in one transaction.
    async fn apply_deltas(
        &self,
        user_id: i64,
        experiment: &str,
        aware: bool,
        deltas: &CounterDeltas,
    ) -> Result<ExperimentStatsRecord, RepoError>;

    async fn list_stats(&self, user_id: i64) -> Result<Vec<ExperimentStatsRecord>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(
        &self,
        username: &str,
        password_hash: Option<&str>,
    ) -> Result<UserRecord, RepoError>;

    async fn set_experiment(
        &self,
        user_id: i64,
        experiment: &str,
        aware: bool,
    ) -> Result<UserRecord, RepoError>;
}

/// Liveness probe for the backing store.
#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
