use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "slopfeed_feed_served_total",
            Unit::Count,
            "Total number of posts served in feed batches, labelled by source."
        );
        describe_counter!(
            "slopfeed_feed_fallback_total",
            Unit::Count,
            "Total number of feed batches completed by the ordered fallback scan."
        );
        describe_gauge!(
            "slopfeed_ai_queue_len",
            Unit::Count,
            "Current number of AI posts waiting to be served."
        );
        describe_counter!(
            "slopfeed_ai_queue_dropped_total",
            Unit::Count,
            "Total number of AI posts rejected because the queue was full."
        );
        describe_counter!(
            "slopfeed_generation_failures_total",
            Unit::Count,
            "Total number of failed producer ticks, labelled by stage."
        );
        describe_histogram!(
            "slopfeed_generation_ms",
            Unit::Milliseconds,
            "Language model request latency in milliseconds."
        );
        describe_counter!(
            "slopfeed_interactions_duplicate_total",
            Unit::Count,
            "Total number of repeated interactions ignored by the recorder."
        );
        describe_counter!(
            "slopfeed_experiment_update_failures_total",
            Unit::Count,
            "Total number of experiment counter updates that failed after an interaction was stored."
        );
    });
}
