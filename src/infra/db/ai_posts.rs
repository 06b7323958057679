use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{AiPostsRepo, RepoError},
    domain::entities::{AiPostRecord, NewAiPost},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct AiPostRow {
    id: i64,
    title: String,
    self_text: String,
    subreddit: Option<String>,
    model_name: Option<String>,
    prompt: Option<String>,
    generated_at: OffsetDateTime,
}

impl From<AiPostRow> for AiPostRecord {
    fn from(row: AiPostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            self_text: row.self_text,
            subreddit: row.subreddit,
            model_name: row.model_name,
            prompt: row.prompt,
            generated_at: row.generated_at,
        }
    }
}

#[async_trait]
impl AiPostsRepo for PostgresRepositories {
    async fn insert_ai_post(&self, post: NewAiPost) -> Result<AiPostRecord, RepoError> {
        let row = sqlx::query_as::<_, AiPostRow>(
            r#"
            INSERT INTO ai_generated_posts (title, self_text, subreddit, model_name, prompt)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, self_text, subreddit, model_name, prompt, generated_at
            "#,
        )
        .bind(post.title)
        .bind(post.self_text)
        .bind(post.subreddit)
        .bind(post.model_name)
        .bind(post.prompt)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_ai_post(&self, id: i64) -> Result<Option<AiPostRecord>, RepoError> {
        let row = sqlx::query_as::<_, AiPostRow>(
            r#"
            SELECT id, title, self_text, subreddit, model_name, prompt, generated_at
            FROM ai_generated_posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AiPostRecord::from))
    }

    async fn recent_ai_posts(&self, limit: i64) -> Result<Vec<AiPostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, AiPostRow>(
            r#"
            SELECT id, title, self_text, subreddit, model_name, prompt, generated_at
            FROM ai_generated_posts
            ORDER BY generated_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AiPostRecord::from).collect())
    }
}
