//! Idempotent recording of participant interactions.

use std::sync::Arc;

use metrics::counter;
use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::experiments::ExperimentService;
use crate::application::repos::{AiPostsRepo, InteractionsRepo, PostsRepo, RepoError};
use crate::domain::entities::NewPost;
use crate::domain::experiments::CounterDeltas;
use crate::domain::sampling::random_key;
use crate::domain::types::{ContentOrigin, InteractionAction, InteractionTarget};

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("post title is required to identify the post")]
    MissingTitle,
    #[error("AI post `{0}` not found")]
    UnknownAiPost(i64),
    #[error("humor post `{0}` not found")]
    UnknownHumorPost(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Post fields a client echoes back when interacting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReference {
    /// `ai-<id>` marks a post from the generated archive.
    pub ai_archive_id: Option<i64>,
    pub humor_post_id: Option<i64>,
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
    pub over_18: bool,
    pub link_flair_text: Option<String>,
    pub is_ai: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    AlreadyRecorded,
    /// A "not AI" judgment; nothing is stored for it.
    Ignored,
}

#[derive(Clone)]
pub struct InteractionService {
    posts: Arc<dyn PostsRepo>,
    ai_posts: Arc<dyn AiPostsRepo>,
    interactions: Arc<dyn InteractionsRepo>,
    experiments: ExperimentService,
}

impl InteractionService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        ai_posts: Arc<dyn AiPostsRepo>,
        interactions: Arc<dyn InteractionsRepo>,
        experiments: ExperimentService,
    ) -> Self {
        Self {
            posts,
            ai_posts,
            interactions,
            experiments,
        }
    }

    /// Stores `(user, target, action)` once. Repeats succeed without effect.
    ///
    /// Experiment counters move only when a new row was written.
    pub async fn record(
        &self,
        user_id: i64,
        reference: &PostReference,
        action: InteractionAction,
    ) -> Result<RecordOutcome, InteractionError> {
        let (target, origin, inserted) = match self.resolve(reference).await? {
            Resolved::Known(target, origin) => {
                match self
                    .interactions
                    .insert_interaction(user_id, target, action)
                    .await
                {
                    Ok(()) => (target, origin, true),
                    Err(RepoError::Duplicate { .. }) => (target, origin, false),
                    Err(err) => return Err(err.into()),
                }
            }
            Resolved::Titled(post) => {
                let key = {
                    let mut rng = StdRng::from_entropy();
                    random_key(&mut rng)
                };
                let titled = self
                    .interactions
                    .insert_titled_interaction(user_id, post, key, action)
                    .await?;
                if titled.post_created {
                    info!(
                        target = "slopfeed::application::interactions",
                        post_id = titled.post.id,
                        "created post for interaction on unknown title"
                    );
                }
                (
                    InteractionTarget::Post(titled.post.id),
                    ContentOrigin::from_is_ai(titled.post.is_ai),
                    titled.inserted,
                )
            }
        };

        if !inserted {
            counter!("slopfeed_interactions_duplicate_total").increment(1);
            debug!(
                target = "slopfeed::application::interactions",
                user_id,
                target_kind = target.kind(),
                target_id = target.id(),
                action = action.as_str(),
                "interaction already recorded"
            );
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        info!(
            target = "slopfeed::application::interactions",
            user_id,
            target_kind = target.kind(),
            target_id = target.id(),
            action = action.as_str(),
            "interaction recorded"
        );

        self.experiments
            .apply_logged(user_id, &CounterDeltas::for_interaction(action, origin))
            .await;
        Ok(RecordOutcome::Recorded)
    }

    /// A participant's guess about whether a post is generated.
    ///
    /// Only "this is AI" guesses are stored; counters use the post's true origin.
    pub async fn judge(
        &self,
        user_id: i64,
        reference: &PostReference,
        judged_ai: bool,
    ) -> Result<RecordOutcome, InteractionError> {
        if !judged_ai {
            return Ok(RecordOutcome::Ignored);
        }
        self.record(user_id, reference, InteractionAction::MarkedAi)
            .await
    }

    async fn resolve(&self, reference: &PostReference) -> Result<Resolved, InteractionError> {
        if let Some(id) = reference.ai_archive_id {
            return match self.ai_posts.find_ai_post(id).await? {
                Some(post) => Ok(Resolved::Known(
                    InteractionTarget::AiPost(post.id),
                    ContentOrigin::Ai,
                )),
                None => Err(InteractionError::UnknownAiPost(id)),
            };
        }

        if let Some(id) = reference.humor_post_id {
            return match self.posts.find_humor_post(id).await? {
                Some(post) => Ok(Resolved::Known(
                    InteractionTarget::HumorPost(post.id),
                    ContentOrigin::from_is_ai(post.is_ai),
                )),
                None => Err(InteractionError::UnknownHumorPost(id)),
            };
        }

        let title = reference.title.trim();
        if title.is_empty() {
            return Err(InteractionError::MissingTitle);
        }

        Ok(Resolved::Titled(NewPost {
            post_id: None,
            title: title.to_string(),
            self_text: reference.self_text.clone(),
            subreddit: reference.subreddit.clone(),
            over_18: reference.over_18,
            link_flair_text: reference.link_flair_text.clone(),
            is_ai: reference.is_ai,
        }))
    }
}

/// Where an interaction lands once the reference is checked.
enum Resolved {
    Known(InteractionTarget, ContentOrigin),
    /// Looked up, or created, by title when the interaction is stored.
    Titled(NewPost),
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::*;
    use crate::application::experiments::testing::{MemoryExperiments, MemoryUsers, catalog};
    use crate::application::repos::TitledInteraction;
    use crate::domain::entities::{AiPostRecord, NewAiPost, PostRecord};

    #[derive(Default)]
    struct MemoryPosts {
        posts: Mutex<Vec<PostRecord>>,
        humor: Vec<PostRecord>,
        ai: Vec<AiPostRecord>,
        interactions: Mutex<HashSet<(i64, InteractionTarget, InteractionAction)>>,
    }

    #[async_trait]
    impl PostsRepo for MemoryPosts {
        async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
            Ok(self.posts.lock().await.iter().find(|p| p.id == id).cloned())
        }

        async fn find_post_by_title(&self, title: &str) -> Result<Option<PostRecord>, RepoError> {
            Ok(self.posts.lock().await.iter().find(|p| p.title == title).cloned())
        }

        async fn create_post(
            &self,
            post: NewPost,
            random_key: i64,
        ) -> Result<PostRecord, RepoError> {
            let mut posts = self.posts.lock().await;
            let record = PostRecord {
                id: posts.len() as i64 + 1,
                post_id: post.post_id,
                title: post.title,
                self_text: post.self_text,
                subreddit: post.subreddit,
                over_18: post.over_18,
                link_flair_text: post.link_flair_text,
                is_ai: post.is_ai,
                random_key,
            };
            posts.push(record.clone());
            Ok(record)
        }

        async fn find_humor_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
            Ok(self.humor.iter().find(|p| p.id == id).cloned())
        }
    }

    #[async_trait]
    impl AiPostsRepo for MemoryPosts {
        async fn insert_ai_post(&self, _post: NewAiPost) -> Result<AiPostRecord, RepoError> {
            Err(RepoError::InvalidInput {
                message: "read only".into(),
            })
        }

        async fn find_ai_post(&self, id: i64) -> Result<Option<AiPostRecord>, RepoError> {
            Ok(self.ai.iter().find(|p| p.id == id).cloned())
        }

        async fn recent_ai_posts(&self, limit: i64) -> Result<Vec<AiPostRecord>, RepoError> {
            Ok(self.ai.iter().take(limit as usize).cloned().collect())
        }
    }

    #[async_trait]
    impl InteractionsRepo for MemoryPosts {
        async fn insert_interaction(
            &self,
            user_id: i64,
            target: InteractionTarget,
            action: InteractionAction,
        ) -> Result<(), RepoError> {
            if self
                .interactions
                .lock()
                .await
                .insert((user_id, target, action))
            {
                Ok(())
            } else {
                Err(RepoError::Duplicate {
                    constraint: "uq_user_post_action".into(),
                })
            }
        }

        async fn insert_titled_interaction(
            &self,
            user_id: i64,
            post: NewPost,
            random_key: i64,
            action: InteractionAction,
        ) -> Result<TitledInteraction, RepoError> {
            let mut posts = self.posts.lock().await;
            let existing = posts.iter().find(|p| p.title == post.title).cloned();
            let (record, post_created) = match existing {
                Some(existing) => (existing, false),
                None => {
                    let record = PostRecord {
                        id: posts.len() as i64 + 1,
                        post_id: post.post_id,
                        title: post.title,
                        self_text: post.self_text,
                        subreddit: post.subreddit,
                        over_18: post.over_18,
                        link_flair_text: post.link_flair_text,
                        is_ai: post.is_ai,
                        random_key,
                    };
                    posts.push(record.clone());
                    (record, true)
                }
            };
            let inserted = self.interactions.lock().await.insert((
                user_id,
                InteractionTarget::Post(record.id),
                action,
            ));
            Ok(TitledInteraction {
                post: record,
                post_created,
                inserted,
            })
        }
    }

    fn ai_record(id: i64) -> AiPostRecord {
        AiPostRecord {
            id,
            title: "generated".into(),
            self_text: "text".into(),
            subreddit: None,
            model_name: None,
            prompt: None,
            generated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    async fn fixture() -> (InteractionService, Arc<MemoryPosts>, Arc<MemoryExperiments>) {
        let store = Arc::new(MemoryPosts {
            ai: vec![ai_record(5)],
            humor: vec![PostRecord {
                id: 3,
                post_id: None,
                title: "joke".into(),
                self_text: String::new(),
                subreddit: None,
                over_18: false,
                link_flair_text: None,
                is_ai: false,
                random_key: 0,
            }],
            ..Default::default()
        });
        let users = Arc::new(MemoryUsers::default());
        users.insert(1, "ada").await;
        let experiments = Arc::new(MemoryExperiments::default());
        let service = InteractionService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            ExperimentService::new(users, experiments.clone(), catalog()),
        );
        (service, store, experiments)
    }

    async fn counters(experiments: &MemoryExperiments) -> crate::domain::experiments::ExperimentCounters {
        experiments.rows.lock().await[&(1, "base".to_string())].counters
    }

    #[tokio::test]
    async fn repeated_like_is_recorded_once() {
        let (service, store, experiments) = fixture().await;
        let reference = PostReference {
            title: "A real post".into(),
            ..Default::default()
        };

        let first = service
            .record(1, &reference, InteractionAction::Like)
            .await
            .expect("first");
        let second = service
            .record(1, &reference, InteractionAction::Like)
            .await
            .expect("second");

        assert_eq!(first, RecordOutcome::Recorded);
        assert_eq!(second, RecordOutcome::AlreadyRecorded);
        assert_eq!(store.interactions.lock().await.len(), 1);
        assert_eq!(store.posts.lock().await.len(), 1);
        assert_eq!(counters(&experiments).await.liked_real_post_count, 1);
    }

    #[tokio::test]
    async fn concurrent_likes_on_new_title_create_one_post() {
        let (service, store, experiments) = fixture().await;
        let reference = PostReference {
            title: "  first seen here ".into(),
            self_text: "body".into(),
            ..Default::default()
        };

        let outcomes = like_concurrently(&service, &reference).await;
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| **outcome == RecordOutcome::Recorded)
                .count(),
            1
        );

        let posts = store.posts.lock().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "first seen here");
        assert_eq!(store.interactions.lock().await.len(), 1);
        drop(posts);
        assert_eq!(counters(&experiments).await.liked_real_post_count, 1);
    }

    async fn like_concurrently(
        service: &InteractionService,
        reference: &PostReference,
    ) -> Vec<RecordOutcome> {
        let (a, b, c, d) = tokio::join!(
            service.record(1, reference, InteractionAction::Like),
            service.record(1, reference, InteractionAction::Like),
            service.record(1, reference, InteractionAction::Like),
            service.record(1, reference, InteractionAction::Like),
        );
        [a, b, c, d]
            .into_iter()
            .map(|outcome| outcome.expect("record"))
            .collect()
    }

    #[tokio::test]
    async fn ai_prefix_resolves_to_archive() {
        let (service, store, experiments) = fixture().await;
        let reference = PostReference {
            ai_archive_id: Some(5),
            title: "generated".into(),
            ..Default::default()
        };
        service
            .record(1, &reference, InteractionAction::Next)
            .await
            .expect("next");

        let recorded = store.interactions.lock().await;
        assert!(recorded.contains(&(1, InteractionTarget::AiPost(5), InteractionAction::Next)));
        assert_eq!(counters(&experiments).await.ai_post_count, 1);
    }

    #[tokio::test]
    async fn humor_reference_takes_precedence_over_title() {
        let (service, store, _) = fixture().await;
        let reference = PostReference {
            humor_post_id: Some(3),
            title: "joke".into(),
            ..Default::default()
        };
        service
            .record(1, &reference, InteractionAction::Dislike)
            .await
            .expect("dislike");
        assert!(store.posts.lock().await.is_empty());
        assert!(store.interactions.lock().await.contains(&(
            1,
            InteractionTarget::HumorPost(3),
            InteractionAction::Dislike
        )));
    }

    #[tokio::test]
    async fn unknown_references_are_errors() {
        let (service, _, _) = fixture().await;
        let missing_ai = PostReference {
            ai_archive_id: Some(99),
            ..Default::default()
        };
        assert!(matches!(
            service.record(1, &missing_ai, InteractionAction::Like).await,
            Err(InteractionError::UnknownAiPost(99))
        ));
        assert!(matches!(
            service
                .record(1, &PostReference::default(), InteractionAction::Like)
                .await,
            Err(InteractionError::MissingTitle)
        ));
    }

    #[tokio::test]
    async fn judgments_count_against_true_origin() {
        let (service, store, experiments) = fixture().await;
        let real = PostReference {
            title: "looks generated".into(),
            ..Default::default()
        };
        assert_eq!(
            service.judge(1, &real, false).await.expect("judge"),
            RecordOutcome::Ignored
        );
        assert!(store.interactions.lock().await.is_empty());

        service.judge(1, &real, true).await.expect("judge");
        let counters = counters(&experiments).await;
        assert_eq!(counters.real_marked_as_ai_count, 1);
        assert_eq!(counters.ai_marked_as_ai_count, 0);
    }
}
