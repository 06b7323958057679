//! Background producer feeding the AI post queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::application::ai_queue::{AiPostQueue, PushOutcome, QueuedAiPost};
use crate::application::repos::{AiPostsRepo, RepoError};
use crate::domain::entities::NewAiPost;
use crate::domain::error::DomainError;
use crate::domain::generated::parse_generated_post;
use crate::domain::types::GenerationMode;

const FORMAT_INSTRUCTIONS: &str = "Reply with exactly three labelled fields and nothing else:\n\
title: <post title>\n\
self_text: <post body>\n\
subreddit: r/<community>";

const BASE_PROMPT: &str = "Write a new, original text post in the style of a popular \
Reddit community. Pick the community yourself and make the post read like a real user \
wrote it.";

const SUMMARIZE_PROMPT: &str = "Write a short Reddit text post that summarizes a recent \
personal experience or news story in a casual voice, the way a user would retell it to a \
community.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no text")]
    EmptyResponse,
    #[error("generated text could not be parsed: {0}")]
    Parse(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("no text generator configured")]
    MissingGenerator,
}

/// A language model that turns a prompt into raw text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub mode: GenerationMode,
    pub interval: Duration,
    pub replay_count: usize,
    /// Experiment whose prompt the producer uses.
    pub experiment: String,
    /// Prompt used for the `user-defined` experiment.
    pub custom_prompt: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Llm,
            interval: Duration::from_secs(10),
            replay_count: 20,
            experiment: "base".to_string(),
            custom_prompt: None,
        }
    }
}

/// Prompt sent to the model for `experiment`.
pub fn prompt_for(experiment: &str, custom: Option<&str>) -> String {
    let task = match experiment {
        "summarize" => SUMMARIZE_PROMPT,
        "user-defined" => custom.unwrap_or(BASE_PROMPT),
        _ => BASE_PROMPT,
    };
    format!("{task}\n\n{FORMAT_INSTRUCTIONS}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Enqueued(usize),
    QueueFull,
}

pub struct GenerationWorker {
    queue: Arc<AiPostQueue>,
    archive: Arc<dyn AiPostsRepo>,
    generator: Option<Arc<dyn TextGenerator>>,
    settings: GenerationSettings,
}

impl GenerationWorker {
    pub fn new(
        queue: Arc<AiPostQueue>,
        archive: Arc<dyn AiPostsRepo>,
        generator: Option<Arc<dyn TextGenerator>>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            queue,
            archive,
            generator,
            settings,
        }
    }

    /// One production step. Does nothing while the queue is full.
    pub async fn tick(&self) -> Result<TickOutcome, GenerationError> {
        if self.queue.is_full() {
            return Ok(TickOutcome::QueueFull);
        }
        match self.settings.mode {
            GenerationMode::Llm => self.generate_one().await,
            GenerationMode::Archive => self.replay_archive().await,
        }
    }

    async fn generate_one(&self) -> Result<TickOutcome, GenerationError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(GenerationError::MissingGenerator)?;
        let prompt = prompt_for(
            &self.settings.experiment,
            self.settings.custom_prompt.as_deref(),
        );

        let started = Instant::now();
        let raw = generator.generate(&prompt).await;
        histogram!("slopfeed_generation_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        let raw = raw?;
        let parsed = parse_generated_post(&raw)?;

        let record = self
            .archive
            .insert_ai_post(NewAiPost {
                title: parsed.title,
                self_text: parsed.self_text,
                subreddit: parsed.subreddit,
                model_name: Some(generator.model_name().to_string()),
                prompt: Some(prompt),
            })
            .await?;
        let archive_id = record.id;

        match self.queue.try_push(QueuedAiPost::from(record)) {
            PushOutcome::Queued => {
                debug!(
                    target = "slopfeed::application::generation",
                    archive_id,
                    queue_len = self.queue.len(),
                    "generated post enqueued"
                );
                Ok(TickOutcome::Enqueued(1))
            }
            PushOutcome::AlreadyQueued => Ok(TickOutcome::Enqueued(0)),
            PushOutcome::Full => Ok(TickOutcome::QueueFull),
        }
    }

    async fn replay_archive(&self) -> Result<TickOutcome, GenerationError> {
        let recent = self
            .archive
            .recent_ai_posts(self.settings.replay_count as i64)
            .await?;

        // Rows still buffered from an earlier tick are skipped, not re-queued.
        let mut enqueued = 0;
        for record in recent {
            match self.queue.try_push(QueuedAiPost::from(record)) {
                PushOutcome::Queued => enqueued += 1,
                PushOutcome::AlreadyQueued => {}
                PushOutcome::Full => break,
            }
        }
        Ok(TickOutcome::Enqueued(enqueued))
    }

    /// Runs [`Self::tick`] on a fixed interval until the task is aborted.
    ///
    /// Failures are logged and counted; the next tick proceeds normally.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                target = "slopfeed::application::generation",
                mode = self.settings.mode.as_str(),
                experiment = %self.settings.experiment,
                interval_ms = self.settings.interval.as_millis() as u64,
                "AI post producer started"
            );
            loop {
                ticker.tick().await;
                match self.tick().await {
                    Ok(TickOutcome::Enqueued(count)) if count > 0 => {
                        debug!(
                            target = "slopfeed::application::generation",
                            count,
                            "producer tick enqueued posts"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        counter!(
                            "slopfeed_generation_failures_total",
                            "stage" => failure_stage(&err)
                        )
                        .increment(1);
                        warn!(
                            target = "slopfeed::application::generation",
                            error = %err,
                            "producer tick failed"
                        );
                    }
                }
            }
        })
    }
}

fn failure_stage(error: &GenerationError) -> &'static str {
    match error {
        GenerationError::Request(_)
        | GenerationError::Status { .. }
        | GenerationError::EmptyResponse
        | GenerationError::MissingGenerator => "provider",
        GenerationError::Parse(_) => "parse",
        GenerationError::Repo(_) => "archive",
    }
}
