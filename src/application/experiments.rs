//! Experiment assignment and per-experiment counter aggregation.

use std::sync::Arc;

use metrics::counter;
use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{ExperimentsRepo, RepoError, UsersRepo};
use crate::domain::entities::{ExperimentStatsRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::experiments::{Assignment, CounterDeltas, ExperimentCatalog};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("experiment is required")]
    MissingExperiment,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("user `{0}` not found")]
    UnknownUser(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentOptions {
    pub experiments: Vec<String>,
    pub supports_random: bool,
    /// Only set when the participant chose their experiment explicitly.
    pub current: Option<String>,
}

#[derive(Clone)]
pub struct ExperimentService {
    users: Arc<dyn UsersRepo>,
    experiments: Arc<dyn ExperimentsRepo>,
    catalog: Arc<ExperimentCatalog>,
}

impl ExperimentService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        experiments: Arc<dyn ExperimentsRepo>,
        catalog: ExperimentCatalog,
    ) -> Self {
        Self {
            users,
            experiments,
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &ExperimentCatalog {
        &self.catalog
    }

    pub async fn assign(
        &self,
        user_id: i64,
        requested: Option<&str>,
    ) -> Result<Assignment, ExperimentError> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ExperimentError::MissingExperiment)?;

        let assignment = {
            let mut rng = StdRng::from_entropy();
            self.catalog.assign(requested, &mut rng)?
        };

        match self
            .users
            .set_experiment(user_id, &assignment.experiment, assignment.aware)
            .await
        {
            Ok(_) => {}
            Err(RepoError::NotFound) => return Err(ExperimentError::UnknownUser(user_id)),
            Err(err) => return Err(err.into()),
        }

        info!(
            target = "slopfeed::application::experiments",
            user_id,
            experiment = %assignment.experiment,
            aware = assignment.aware,
            "experiment assigned"
        );
        Ok(assignment)
    }

    pub async fn options(&self, user_id: i64) -> Result<ExperimentOptions, ExperimentError> {
        let user = self.load_user(user_id).await?;
        Ok(ExperimentOptions {
            experiments: self.catalog.available().to_vec(),
            supports_random: true,
            current: visible_experiment(&user),
        })
    }

    /// Adds `deltas` to the row of the experiment the user is attributed to.
    pub async fn apply(
        &self,
        user_id: i64,
        deltas: &CounterDeltas,
    ) -> Result<Option<ExperimentStatsRecord>, ExperimentError> {
        if deltas.is_empty() {
            return Ok(None);
        }
        let user = self.load_user(user_id).await?;
        let experiment = self
            .catalog
            .attribute(user.current_experiment.as_deref())
            .to_string();
        let record = self
            .experiments
            .apply_deltas(user_id, &experiment, user.aware_of_experiment, deltas)
            .await?;
        Ok(Some(record))
    }

    /// Like [`Self::apply`], but failures are logged and swallowed.
    pub async fn apply_logged(&self, user_id: i64, deltas: &CounterDeltas) {
        if let Err(err) = self.apply(user_id, deltas).await {
            counter!("slopfeed_experiment_update_failures_total").increment(1);
            warn!(
                target = "slopfeed::application::experiments",
                user_id,
                error = %err,
                "experiment counters not updated"
            );
        }
    }

    pub async fn stats(&self, user_id: i64) -> Result<Vec<ExperimentStatsRecord>, ExperimentError> {
        Ok(self.experiments.list_stats(user_id).await?)
    }

    async fn load_user(&self, user_id: i64) -> Result<UserRecord, ExperimentError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or(ExperimentError::UnknownUser(user_id))
    }
}

fn visible_experiment(user: &UserRecord) -> Option<String> {
    if user.aware_of_experiment {
        user.current_experiment.clone()
    } else {
        None
    }
}
