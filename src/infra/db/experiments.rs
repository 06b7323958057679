use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ExperimentsRepo, RepoError},
    domain::{
        entities::ExperimentStatsRecord,
        experiments::{CounterDeltas, ExperimentCounters, ExperimentRates},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ExperimentRow {
    id: i64,
    user_id: i64,
    experiment: String,
    ai_post_count: i64,
    real_post_count: i64,
    liked_ai_post_count: i64,
    liked_real_post_count: i64,
    ai_marked_as_ai_count: i64,
    real_marked_as_ai_count: i64,
    ai_dislike_count: i64,
    real_dislike_count: i64,
    ai_like_rate: f64,
    real_like_rate: f64,
    ai_marked_as_ai_rate: f64,
    real_marked_as_ai_rate: f64,
    ai_dislike_rate: f64,
    real_dislike_rate: f64,
    aware_of_experiment: bool,
    updated_at: OffsetDateTime,
}

impl ExperimentRow {
    fn counters(&self) -> ExperimentCounters {
        ExperimentCounters {
            ai_post_count: self.ai_post_count,
            real_post_count: self.real_post_count,
            liked_ai_post_count: self.liked_ai_post_count,
            liked_real_post_count: self.liked_real_post_count,
            ai_marked_as_ai_count: self.ai_marked_as_ai_count,
            real_marked_as_ai_count: self.real_marked_as_ai_count,
            ai_dislike_count: self.ai_dislike_count,
            real_dislike_count: self.real_dislike_count,
        }
    }
}

impl From<ExperimentRow> for ExperimentStatsRecord {
    fn from(row: ExperimentRow) -> Self {
        Self {
            counters: row.counters(),
            rates: ExperimentRates {
                ai_like_rate: row.ai_like_rate,
                real_like_rate: row.real_like_rate,
                ai_marked_as_ai_rate: row.ai_marked_as_ai_rate,
                real_marked_as_ai_rate: row.real_marked_as_ai_rate,
                ai_dislike_rate: row.ai_dislike_rate,
                real_dislike_rate: row.real_dislike_rate,
            },
            user_id: row.user_id,
            experiment: row.experiment,
            aware_of_experiment: row.aware_of_experiment,
            updated_at: row.updated_at,
        }
    }
}

const EXPERIMENT_COLUMNS: &str = "id, user_id, experiment, \
     ai_post_count, real_post_count, liked_ai_post_count, liked_real_post_count, \
     ai_marked_as_ai_count, real_marked_as_ai_count, ai_dislike_count, real_dislike_count, \
     ai_like_rate, real_like_rate, ai_marked_as_ai_rate, real_marked_as_ai_rate, \
     ai_dislike_rate, real_dislike_rate, aware_of_experiment, updated_at";

#[async_trait]
impl ExperimentsRepo for PostgresRepositories {
    async fn apply_deltas(
        &self,
        user_id: i64,
        experiment: &str,
        aware: bool,
        deltas: &CounterDeltas,
    ) -> Result<ExperimentStatsRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO experiments (user_id, experiment, aware_of_experiment)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT uq_user_experiment DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(experiment)
        .bind(aware)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let locked = sqlx::query_as::<_, ExperimentRow>(&format!(
            "SELECT {EXPERIMENT_COLUMNS} FROM experiments \
             WHERE user_id = $1 AND experiment = $2 \
             FOR UPDATE"
        ))
        .bind(user_id)
        .bind(experiment)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut counters = locked.counters();
        counters.apply(deltas);
        let rates = counters.rates();

        let updated = sqlx::query_as::<_, ExperimentRow>(&format!(
            "UPDATE experiments SET \
                 ai_post_count = $2, real_post_count = $3, \
                 liked_ai_post_count = $4, liked_real_post_count = $5, \
                 ai_marked_as_ai_count = $6, real_marked_as_ai_count = $7, \
                 ai_dislike_count = $8, real_dislike_count = $9, \
                 ai_like_rate = $10, real_like_rate = $11, \
                 ai_marked_as_ai_rate = $12, real_marked_as_ai_rate = $13, \
                 ai_dislike_rate = $14, real_dislike_rate = $15, \
                 aware_of_experiment = $16, updated_at = now() \
             WHERE id = $1 \
             RETURNING {EXPERIMENT_COLUMNS}"
        ))
        .bind(locked.id)
        .bind(counters.ai_post_count)
        .bind(counters.real_post_count)
        .bind(counters.liked_ai_post_count)
        .bind(counters.liked_real_post_count)
        .bind(counters.ai_marked_as_ai_count)
        .bind(counters.real_marked_as_ai_count)
        .bind(counters.ai_dislike_count)
        .bind(counters.real_dislike_count)
        .bind(rates.ai_like_rate)
        .bind(rates.real_like_rate)
        .bind(rates.ai_marked_as_ai_rate)
        .bind(rates.real_marked_as_ai_rate)
        .bind(rates.ai_dislike_rate)
        .bind(rates.real_dislike_rate)
        .bind(aware)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(updated.into())
    }

    async fn list_stats(&self, user_id: i64) -> Result<Vec<ExperimentStatsRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ExperimentRow>(&format!(
            "SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE user_id = $1 ORDER BY experiment"
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ExperimentStatsRecord::from).collect())
    }
}
