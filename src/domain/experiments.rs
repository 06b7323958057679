//! Experiment counters, derived rates, and assignment rules.

use rand::{Rng, seq::SliceRandom};
use serde::Serialize;

use crate::domain::{
    error::DomainError,
    types::{ContentOrigin, InteractionAction},
};

pub const RANDOM_CHOICE: &str = "random";

/// Named counter columns of an `experiments` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    AiPost,
    RealPost,
    LikedAiPost,
    LikedRealPost,
    AiMarkedAsAi,
    RealMarkedAsAi,
    AiDislike,
    RealDislike,
}

/// Sparse set of counter increments applied in one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterDeltas {
    entries: Vec<(Counter, i64)>,
}

impl CounterDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, counter: Counter, amount: i64) -> Self {
        self.add(counter, amount);
        self
    }

    pub fn add(&mut self, counter: Counter, amount: i64) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == counter) {
            Some((_, total)) => *total += amount,
            None => self.entries.push((counter, amount)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, amount)| *amount == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Counter, i64)> + '_ {
        self.entries.iter().copied()
    }

    /// Increments caused by one recorded interaction with a post of the given origin.
    pub fn for_interaction(action: InteractionAction, origin: ContentOrigin) -> Self {
        let counter = match (action, origin) {
            (InteractionAction::Next, ContentOrigin::Ai) => Counter::AiPost,
            (InteractionAction::Next, ContentOrigin::Real) => Counter::RealPost,
            (InteractionAction::Like, ContentOrigin::Ai) => Counter::LikedAiPost,
            (InteractionAction::Like, ContentOrigin::Real) => Counter::LikedRealPost,
            (InteractionAction::Dislike, ContentOrigin::Ai) => Counter::AiDislike,
            (InteractionAction::Dislike, ContentOrigin::Real) => Counter::RealDislike,
            (InteractionAction::MarkedAi, ContentOrigin::Ai) => Counter::AiMarkedAsAi,
            (InteractionAction::MarkedAi, ContentOrigin::Real) => Counter::RealMarkedAsAi,
        };
        Self::new().with(counter, 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentCounters {
    pub ai_post_count: i64,
    pub real_post_count: i64,
    pub liked_ai_post_count: i64,
    pub liked_real_post_count: i64,
    pub ai_marked_as_ai_count: i64,
    pub real_marked_as_ai_count: i64,
    pub ai_dislike_count: i64,
    pub real_dislike_count: i64,
}

impl ExperimentCounters {
    fn slot(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::AiPost => &mut self.ai_post_count,
            Counter::RealPost => &mut self.real_post_count,
            Counter::LikedAiPost => &mut self.liked_ai_post_count,
            Counter::LikedRealPost => &mut self.liked_real_post_count,
            Counter::AiMarkedAsAi => &mut self.ai_marked_as_ai_count,
            Counter::RealMarkedAsAi => &mut self.real_marked_as_ai_count,
            Counter::AiDislike => &mut self.ai_dislike_count,
            Counter::RealDislike => &mut self.real_dislike_count,
        }
    }

    pub fn apply(&mut self, deltas: &CounterDeltas) {
        for (counter, amount) in deltas.iter() {
            let slot = self.slot(counter);
            *slot = slot.saturating_add(amount);
        }
    }

    pub fn rates(&self) -> ExperimentRates {
        ExperimentRates {
            ai_like_rate: ratio(self.liked_ai_post_count, self.ai_post_count),
            real_like_rate: ratio(self.liked_real_post_count, self.real_post_count),
            ai_marked_as_ai_rate: ratio(self.ai_marked_as_ai_count, self.ai_post_count),
            real_marked_as_ai_rate: ratio(self.real_marked_as_ai_count, self.real_post_count),
            ai_dislike_rate: ratio(self.ai_dislike_count, self.ai_post_count),
            real_dislike_rate: ratio(self.real_dislike_count, self.real_post_count),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExperimentRates {
    pub ai_like_rate: f64,
    pub real_like_rate: f64,
    pub ai_marked_as_ai_rate: f64,
    pub real_marked_as_ai_rate: f64,
    pub ai_dislike_rate: f64,
    pub real_dislike_rate: f64,
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Outcome of an assignment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub experiment: String,
    pub aware: bool,
}

impl Assignment {
    /// Name to reveal to the participant.
    pub fn visible(&self) -> Option<&str> {
        self.aware.then_some(self.experiment.as_str())
    }
}

/// Experiments offered to participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentCatalog {
    available: Vec<String>,
    default: String,
}

impl ExperimentCatalog {
    pub fn new(available: Vec<String>, default: String) -> Result<Self, DomainError> {
        if available.is_empty() {
            return Err(DomainError::validation("experiment list must not be empty"));
        }
        if !available.iter().any(|name| name == &default) {
            return Err(DomainError::unknown_experiment(default));
        }
        if available.iter().any(|name| name == RANDOM_CHOICE) {
            return Err(DomainError::validation(
                "`random` is reserved and cannot be an experiment name",
            ));
        }
        Ok(Self { available, default })
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn default_experiment(&self) -> &str {
        &self.default
    }

    pub fn contains(&self, name: &str) -> bool {
        self.available.iter().any(|candidate| candidate == name)
    }

    /// `"random"` picks uniformly and hides the result; a listed name is revealed.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        requested: &str,
        rng: &mut R,
    ) -> Result<Assignment, DomainError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(DomainError::validation("experiment is required"));
        }

        if requested.eq_ignore_ascii_case(RANDOM_CHOICE) {
            let experiment = self
                .available
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| self.default.clone());
            return Ok(Assignment {
                experiment,
                aware: false,
            });
        }

        if !self.contains(requested) {
            return Err(DomainError::unknown_experiment(requested));
        }

        Ok(Assignment {
            experiment: requested.to_string(),
            aware: true,
        })
    }

    /// Experiment an interaction is attributed to.
    pub fn attribute<'a>(&'a self, current: Option<&'a str>) -> &'a str {
        current
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.default)
    }
}
