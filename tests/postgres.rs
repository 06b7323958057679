use std::collections::HashSet;
use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use slopfeed::application::experiments::ExperimentService;
use slopfeed::application::interactions::{InteractionService, PostReference, RecordOutcome};
use slopfeed::application::repos::{
    AiPostsRepo, ExperimentsRepo, FeedRepo, HealthRepo, InteractionsRepo, PostsRepo, RepoError,
    UsersRepo,
};
use slopfeed::application::sampling::PostSampler;
use slopfeed::domain::entities::{NewAiPost, NewPost, PostRecord};
use slopfeed::domain::experiments::{Counter, CounterDeltas, ExperimentCatalog};
use slopfeed::domain::sampling::random_key;
use slopfeed::domain::types::{InteractionAction, InteractionTarget};
use slopfeed::infra::db::PostgresRepositories;
use sqlx::PgPool;

async fn seed_posts(repo: &PostgresRepositories, count: usize) -> Vec<PostRecord> {
    let mut rng = StdRng::seed_from_u64(11);
    let mut created = Vec::with_capacity(count);
    for n in 0..count {
        let post = NewPost {
            post_id: Some(format!("t3_{n}")),
            ..NewPost::titled(format!("seeded post {n}"))
        };
        created.push(
            repo.create_post(post, random_key(&mut rng))
                .await
                .expect("create post"),
        );
    }
    created
}

#[sqlx::test(migrations = "./migrations")]
async fn sampled_batches_do_not_repeat_until_exhausted(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let user = repo.create_user("alice", None).await.expect("user");
    seed_posts(&repo, 40).await;

    let sampler = PostSampler::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut seen = HashSet::new();

    for _ in 0..4 {
        let mut session = repo.begin_sampling().await.expect("session");
        let batch = sampler
            .sample_unserved(session.as_mut(), user.id, 10, &mut rng)
            .await
            .expect("sample");
        assert_eq!(batch.posts.len(), 10);
        for post in batch.posts {
            assert!(seen.insert(post.id), "post {} served twice", post.id);
        }
    }

    let mut session = repo.begin_sampling().await.expect("session");
    let empty = sampler
        .sample_unserved(session.as_mut(), user.id, 10, &mut rng)
        .await
        .expect("sample exhausted");
    assert!(empty.posts.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_serve_keeps_the_first_commit(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let user = repo.create_user("alice", None).await.expect("user");
    let posts = seed_posts(&repo, 3).await;
    let ids: Vec<i64> = posts.iter().map(|post| post.id).collect();

    let mut first = repo.begin_sampling().await.expect("first session");
    let mut second = repo.begin_sampling().await.expect("second session");

    let marked = first
        .mark_served(user.id, &ids[..2])
        .await
        .expect("first mark");
    assert_eq!(marked.len(), 2);
    first.commit().await.expect("first commit");

    let marked = second
        .mark_served(user.id, &ids[1..])
        .await
        .expect("second mark");
    assert_eq!(marked, vec![ids[2]]);
    second.commit().await.expect("second commit");
}

#[sqlx::test(migrations = "./migrations")]
async fn dropped_session_rolls_back_served_rows(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let user = repo.create_user("alice", None).await.expect("user");
    let posts = seed_posts(&repo, 2).await;

    {
        let mut session = repo.begin_sampling().await.expect("session");
        session
            .mark_served(user.id, &[posts[0].id])
            .await
            .expect("mark");
    }

    assert_eq!(repo.clear_served(Some(user.id)).await.expect("clear"), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn clear_served_scopes_to_one_user(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let alice = repo.create_user("alice", None).await.expect("alice");
    let bob = repo.create_user("bob", None).await.expect("bob");
    let posts = seed_posts(&repo, 2).await;
    let ids: Vec<i64> = posts.iter().map(|post| post.id).collect();

    for user_id in [alice.id, bob.id] {
        let mut session = repo.begin_sampling().await.expect("session");
        session.mark_served(user_id, &ids).await.expect("mark");
        session.commit().await.expect("commit");
    }

    assert_eq!(repo.clear_served(Some(alice.id)).await.expect("alice"), 2);
    assert_eq!(repo.clear_served(None).await.expect("everyone"), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_duplicate_interactions_store_one_row(pool: PgPool) {
    let repo = Arc::new(PostgresRepositories::new(pool.clone()));
    let user = repo.create_user("alice", None).await.expect("user");
    let post = seed_posts(&repo, 1).await.remove(0);
    let target = InteractionTarget::Post(post.id);

    let (a, b) = tokio::join!(
        repo.insert_interaction(user.id, target, InteractionAction::Like),
        repo.insert_interaction(user.id, target, InteractionAction::Like),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|result| matches!(result, Err(RepoError::Duplicate { .. })))
    );

    repo.insert_interaction(user.id, target, InteractionAction::Dislike)
        .await
        .expect("different action is a new row");

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(rows, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_likes_on_unseen_title_store_one_post(pool: PgPool) {
    let repo = Arc::new(PostgresRepositories::new(pool.clone()));
    let user_id = repo.create_user("alice", None).await.expect("user").id;
    let catalog = ExperimentCatalog::new(vec!["base".into()], "base".into()).expect("catalog");
    let service = Arc::new(InteractionService::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        ExperimentService::new(repo.clone(), repo.clone(), catalog),
    ));
    let reference = PostReference {
        title: "a title nobody stored".to_string(),
        self_text: "body".to_string(),
        ..Default::default()
    };

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let reference = reference.clone();
        handles.push(tokio::spawn(async move {
            service
                .record(user_id, &reference, InteractionAction::Like)
                .await
        }));
    }
    let mut recorded = 0;
    for handle in handles {
        if handle.await.expect("join").expect("record") == RecordOutcome::Recorded {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);

    let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE title = $1")
        .bind(&reference.title)
        .fetch_one(&pool)
        .await
        .expect("count posts");
    assert_eq!(posts, 1);

    let likes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM interactions WHERE user_id = $1 AND action = $2",
    )
    .bind(user_id)
    .bind(InteractionAction::Like.as_str())
    .fetch_one(&pool)
    .await
    .expect("count likes");
    assert_eq!(likes, 1);

    let stats = repo.list_stats(user_id).await.expect("stats");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].counters.liked_real_post_count, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn titled_interaction_reuses_stored_post(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let user = repo.create_user("alice", None).await.expect("user");
    let stored = repo
        .create_post(NewPost::titled("already here"), 7)
        .await
        .expect("create");

    let first = repo
        .insert_titled_interaction(
            user.id,
            NewPost::titled("already here"),
            99,
            InteractionAction::Dislike,
        )
        .await
        .expect("first");
    assert_eq!(first.post.id, stored.id);
    assert!(!first.post_created);
    assert!(first.inserted);

    let repeat = repo
        .insert_titled_interaction(
            user.id,
            NewPost::titled("already here"),
            99,
            InteractionAction::Dislike,
        )
        .await
        .expect("repeat");
    assert_eq!(repeat.post.id, stored.id);
    assert!(!repeat.inserted);
}

#[sqlx::test(migrations = "./migrations")]
async fn interactions_reference_archive_posts(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let user = repo.create_user("alice", None).await.expect("user");
    let archived = repo
        .insert_ai_post(NewAiPost {
            title: "generated".to_string(),
            self_text: "body".to_string(),
            subreddit: None,
            model_name: Some("local".to_string()),
            prompt: Some("write a post".to_string()),
        })
        .await
        .expect("archive");

    repo.insert_interaction(
        user.id,
        InteractionTarget::AiPost(archived.id),
        InteractionAction::MarkedAi,
    )
    .await
    .expect("insert");

    let missing = repo
        .insert_interaction(
            user.id,
            InteractionTarget::AiPost(archived.id + 1000),
            InteractionAction::Like,
        )
        .await;
    assert!(matches!(missing, Err(RepoError::InvalidInput { .. })));

    let found = repo.find_ai_post(archived.id).await.expect("find");
    assert_eq!(found.map(|post| post.title), Some("generated".to_string()));
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_counter_updates_are_not_lost(pool: PgPool) {
    let repo = Arc::new(PostgresRepositories::new(pool));
    let user_id = repo.create_user("alice", None).await.expect("user").id;

    let mut handles = Vec::new();
    for n in 0..8 {
        let repo = repo.clone();
        let deltas = if n % 2 == 0 {
            CounterDeltas::new().with(Counter::RealPost, 1)
        } else {
            CounterDeltas::new()
                .with(Counter::RealPost, 1)
                .with(Counter::LikedRealPost, 1)
        };
        handles.push(tokio::spawn(async move {
            repo.apply_deltas(user_id, "base", false, &deltas).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("apply");
    }

    let stats = repo.list_stats(user_id).await.expect("stats");
    assert_eq!(stats.len(), 1);
    let row = &stats[0];
    assert_eq!(row.experiment, "base");
    assert_eq!(row.counters.real_post_count, 8);
    assert_eq!(row.counters.liked_real_post_count, 4);
    assert!((row.rates.real_like_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(row.rates.ai_like_rate, 0.0);
}

#[sqlx::test(migrations = "./migrations")]
async fn usernames_are_unique(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    repo.create_user("alice", None).await.expect("first");

    let duplicate = repo.create_user("alice", Some("hash")).await;
    assert!(matches!(duplicate, Err(RepoError::Duplicate { .. })));

    let user = repo
        .find_user_by_username("alice")
        .await
        .expect("lookup")
        .expect("present");
    let updated = repo
        .set_experiment(user.id, "summarize", true)
        .await
        .expect("set experiment");
    assert_eq!(updated.current_experiment.as_deref(), Some("summarize"));
    assert!(updated.aware_of_experiment);

    assert!(matches!(
        repo.set_experiment(user.id + 1000, "base", false).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn posts_are_found_by_title(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let created = repo
        .create_post(NewPost::titled("a question"), 42)
        .await
        .expect("create");

    let found = repo
        .find_post_by_title("a question")
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(found.id, created.id);
    assert_eq!(found.post_id, None);
    assert!(
        repo.find_post_by_title("unknown")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn recent_archive_posts_are_newest_first(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    for n in 0..3 {
        repo.insert_ai_post(NewAiPost {
            title: format!("generated {n}"),
            self_text: String::new(),
            subreddit: None,
            model_name: None,
            prompt: None,
        })
        .await
        .expect("archive");
    }

    let recent = repo.recent_ai_posts(2).await.expect("recent");
    let titles: Vec<_> = recent.into_iter().map(|post| post.title).collect();
    assert_eq!(titles, vec!["generated 2", "generated 1"]);
}

#[sqlx::test(migrations = "./migrations")]
async fn health_ping_succeeds(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    repo.ping().await.expect("ping");
}
