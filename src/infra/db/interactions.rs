use async_trait::async_trait;
use crate::{
    application::repos::{InteractionsRepo, RepoError, TitledInteraction},
    domain::{
        entities::NewPost,
        types::{InteractionAction, InteractionTarget},
    },
};

use super::{
    PostgresRepositories, map_sqlx_error,
    posts::{insert_post, select_post_by_title},
};

#[async_trait]
impl InteractionsRepo for PostgresRepositories {
    async fn insert_interaction(
        &self,
        user_id: i64,
        target: InteractionTarget,
        action: InteractionAction,
    ) -> Result<(), RepoError> {
        let (post_id, humor_post_id, ai_post_id) = match target {
            InteractionTarget::Post(id) => (Some(id), None, None),
            InteractionTarget::HumorPost(id) => (None, Some(id), None),
            InteractionTarget::AiPost(id) => (None, None, Some(id)),
        };

        sqlx::query(
            r#"
            INSERT INTO interactions (user_id, post_id, humor_post_id, ai_post_id, action)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(humor_post_id)
        .bind(ai_post_id)
        .bind(action.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_titled_interaction(
        &self,
        user_id: i64,
        post: NewPost,
        random_key: i64,
        action: InteractionAction,
    ) -> Result<TitledInteraction, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        // Held until commit or rollback; concurrent callers on one title queue here.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&post.title)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let existing = select_post_by_title(&mut *tx, &post.title).await?;
        let (record, post_created) = match existing {
            Some(record) => (record, false),
            None => (insert_post(&mut *tx, post, random_key).await?, true),
        };

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO interactions (user_id, post_id, action)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, post_id, action) WHERE post_id IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(record.id)
        .bind(action.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(TitledInteraction {
            post: record,
            post_created,
            inserted,
        })
    }
}

