use async_trait::async_trait;
use sqlx::{PgConnection, PgExecutor, Postgres, Transaction};

use crate::{
    application::repos::{FeedRepo, PostsRepo, RepoError, SamplingSession},
    domain::{entities::{NewPost, PostRecord}, sampling::KeyWindow},
};

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "p.id, p.post_id, p.title, p.self_text, p.subreddit, p.over_18, \
     p.link_flair_text, p.is_ai, p.random_key";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    post_id: Option<String>,
    title: String,
    self_text: String,
    subreddit: Option<String>,
    over_18: bool,
    link_flair_text: Option<String>,
    is_ai: bool,
    random_key: i64,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            title: row.title,
            self_text: row.self_text,
            subreddit: row.subreddit,
            over_18: row.over_18,
            link_flair_text: row.link_flair_text,
            is_ai: row.is_ai,
            random_key: row.random_key,
        }
    }
}

fn into_records(rows: Vec<PostRow>) -> Vec<PostRecord> {
    rows.into_iter().map(PostRecord::from).collect()
}

/// Oldest post with exactly this title.
pub(super) async fn select_post_by_title<'e>(
    executor: impl PgExecutor<'e>,
    title: &str,
) -> Result<Option<PostRecord>, RepoError> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.title = $1 ORDER BY p.id LIMIT 1");
    let row = sqlx::query_as::<_, PostRow>(&sql)
        .bind(title)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(PostRecord::from))
}

pub(super) async fn insert_post<'e>(
    executor: impl PgExecutor<'e>,
    post: NewPost,
    random_key: i64,
) -> Result<PostRecord, RepoError> {
    let sql = format!(
        "INSERT INTO posts AS p \
             (post_id, title, self_text, subreddit, over_18, link_flair_text, is_ai, random_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {POST_COLUMNS}"
    );
    let row = sqlx::query_as::<_, PostRow>(&sql)
        .bind(post.post_id)
        .bind(post.title)
        .bind(post.self_text)
        .bind(post.subreddit)
        .bind(post.over_18)
        .bind(post.link_flair_text)
        .bind(post.is_ai)
        .bind(random_key)
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.into())
}

/// Feed-serve transaction; rolled back if dropped before [`SamplingSession::commit`].
pub struct PgSamplingSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSamplingSession {
    fn conn(&mut self) -> Result<&mut PgConnection, RepoError> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(RepoError::Integrity {
                message: "sampling session already committed".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SamplingSession for PgSamplingSession {
    async fn window_unserved(
        &mut self,
        user_id: i64,
        window: KeyWindow,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} \
             FROM posts p \
             LEFT JOIN served_posts s ON s.user_id = $1 AND s.post_id = p.id \
             WHERE p.random_key BETWEEN $2 AND $3 \
               AND s.id IS NULL \
               AND NOT (p.id = ANY($4)) \
             ORDER BY p.random_key \
             LIMIT $5"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(user_id)
            .bind(window.low)
            .bind(window.high)
            .bind(exclude)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn ordered_unserved(
        &mut self,
        user_id: i64,
        exclude: &[i64],
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} \
             FROM posts p \
             LEFT JOIN served_posts s ON s.user_id = $1 AND s.post_id = p.id \
             WHERE s.id IS NULL \
               AND NOT (p.id = ANY($2)) \
             ORDER BY p.random_key \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(user_id)
            .bind(exclude)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn mark_served(
        &mut self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<Vec<i64>, RepoError> {
        // A concurrent request that already served a post wins; ours skips it.
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO served_posts (user_id, post_id)
            SELECT $1, ids.post_id FROM UNNEST($2::BIGINT[]) AS ids(post_id)
            ON CONFLICT ON CONSTRAINT uq_user_post_served DO NOTHING
            RETURNING post_id
            "#,
        )
        .bind(user_id)
        .bind(post_ids)
        .fetch_all(self.conn()?)
        .await
        .map_err(map_sqlx_error)
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(map_sqlx_error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeedRepo for PostgresRepositories {
    async fn begin_sampling(&self) -> Result<Box<dyn SamplingSession>, RepoError> {
        let tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgSamplingSession { tx: Some(tx) }))
    }

    async fn random_humor_posts(&self, limit: i64) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM humor_posts p ORDER BY random() LIMIT $1");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn clear_served(&self, user_id: Option<i64>) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "DELETE FROM served_posts WHERE $1::BIGINT IS NULL OR user_id = $1",
        )
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn find_post_by_title(&self, title: &str) -> Result<Option<PostRecord>, RepoError> {
        select_post_by_title(self.pool(), title).await
    }

    async fn create_post(&self, post: NewPost, random_key: i64) -> Result<PostRecord, RepoError> {
        insert_post(self.pool(), post, random_key).await
    }

    async fn find_humor_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM humor_posts p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }
}
