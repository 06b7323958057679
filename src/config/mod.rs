//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use rand::RngCore;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::auth::AuthSettings;
use crate::application::feed::{FeedSettings, MAX_BATCH_SIZE};
use crate::application::generation::GenerationSettings;
use crate::application::sampling::PostSampler;
use crate::domain::experiments::ExperimentCatalog;
use crate::domain::types::GenerationMode;

mod cli;

pub use cli::{ClearServedArgs, CliArgs, Command, DatabaseOverride, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "slopfeed";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_TOKEN_TTL_HOURS: u64 = 12;
const DEFAULT_LEEWAY_SECS: u64 = 60;
const MIN_JWT_SECRET_BYTES: usize = 32;
const DEFAULT_BATCH_SIZE: u64 = 10;
const DEFAULT_AI_POSTS_RATIO: f64 = 0.2;
const DEFAULT_SAMPLE_ATTEMPTS: u32 = 5;
const DEFAULT_FALLBACK_POOL_FACTOR: u32 = 10;
const DEFAULT_GENERATION_INTERVAL_SECS: u64 = 10;
const DEFAULT_QUEUE_CAPACITY: u64 = 50;
const DEFAULT_DRAIN_LIMIT: u64 = 10;
const DEFAULT_REPLAY_COUNT: u64 = 20;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-5";
const DEFAULT_LOCAL_BASE_URL: &str = "http://127.0.0.1:8000/v1";
const DEFAULT_LOCAL_MODEL: &str = "local";
const DEFAULT_EXPERIMENTS: [&str; 3] = ["base", "summarize", "user-defined"];
const DEFAULT_EXPERIMENT: &str = "base";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub auth: AuthConfig,
    pub feed: FeedConfig,
    pub generation: GenerationConfig,
    pub experiments: ExperimentCatalog,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub leeway: Duration,
    pub dev_no_password: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("leeway", &self.leeway)
            .field("dev_no_password", &self.dev_no_password)
            .finish()
    }
}

impl AuthConfig {
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            jwt_secret: self.jwt_secret.clone(),
            token_ttl: time_duration(self.token_ttl),
            leeway: time_duration(self.leeway),
            dev_no_password: self.dev_no_password,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub batch_size: NonZeroUsize,
    pub ai_posts_ratio: f64,
    pub sample_attempts: NonZeroU32,
    pub fallback_pool_factor: NonZeroU32,
    pub clear_served_on_start: bool,
}

impl FeedConfig {
    pub fn sampler(&self) -> PostSampler {
        PostSampler::new(self.sample_attempts.get(), self.fallback_pool_factor.get())
    }

    pub fn feed_settings(&self, drain_limit: usize) -> FeedSettings {
        FeedSettings {
            batch_size: self.batch_size.get(),
            ai_posts_ratio: self.ai_posts_ratio,
            drain_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Hosted OpenAI Responses API.
    OpenAi,
    /// OpenAI-compatible chat-completions server.
    Local,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown provider `{other}`, expected `openai` or `local`")),
        }
    }
}

#[derive(Clone)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub mode: GenerationMode,
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub interval: Duration,
    pub queue_capacity: NonZeroUsize,
    pub drain_limit: usize,
    pub replay_count: usize,
    pub max_output_tokens: NonZeroU32,
    pub experiment: String,
    pub custom_prompt: Option<String>,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("interval", &self.interval)
            .field("queue_capacity", &self.queue_capacity)
            .field("drain_limit", &self.drain_limit)
            .field("replay_count", &self.replay_count)
            .field("experiment", &self.experiment)
            .finish_non_exhaustive()
    }
}

impl GenerationConfig {
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            mode: self.mode,
            interval: self.interval,
            replay_count: self.replay_count,
            experiment: self.experiment.clone(),
            custom_prompt: self.custom_prompt.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("SLOPFEED")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("experiments.available")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::ClearServed(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    auth: RawAuthSettings,
    feed: RawFeedSettings,
    generation: RawGenerationSettings,
    experiments: RawExperimentSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(enabled) = overrides.generation_enabled {
            self.generation.enabled = Some(enabled);
        }
        if let Some(mode) = overrides.generation_mode.as_ref() {
            self.generation.mode = Some(mode.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            auth,
            feed,
            generation,
            experiments,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let auth = build_auth_settings(auth)?;
        let feed = build_feed_settings(feed)?;
        let experiments = build_experiment_catalog(experiments)?;
        let generation = build_generation_settings(generation, &experiments)?;

        Ok(Self {
            server,
            logging,
            database,
            auth,
            feed,
            generation,
            experiments,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthConfig, LoadError> {
    let dev_no_password = auth.dev_no_password.unwrap_or(true);

    let jwt_secret = match non_blank(auth.jwt_secret) {
        Some(secret) if secret.len() >= MIN_JWT_SECRET_BYTES || dev_no_password => secret,
        Some(_) => {
            return Err(LoadError::invalid(
                "auth.jwt_secret",
                format!("must be at least {MIN_JWT_SECRET_BYTES} bytes"),
            ));
        }
        // Tokens from an ephemeral secret do not survive a restart.
        None if dev_no_password => ephemeral_secret(),
        None => {
            return Err(LoadError::invalid(
                "auth.jwt_secret",
                "required unless auth.dev_no_password is enabled",
            ));
        }
    };

    let ttl_hours = auth.token_ttl_hours.unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
    if ttl_hours == 0 {
        return Err(LoadError::invalid(
            "auth.token_ttl_hours",
            "must be greater than zero",
        ));
    }

    Ok(AuthConfig {
        jwt_secret,
        token_ttl: Duration::from_secs(ttl_hours.saturating_mul(3600)),
        leeway: Duration::from_secs(auth.leeway_seconds.unwrap_or(DEFAULT_LEEWAY_SECS)),
        dev_no_password,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedConfig, LoadError> {
    let batch_size = non_zero_usize(
        feed.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        "feed.batch_size",
    )?;
    if batch_size.get() > MAX_BATCH_SIZE {
        return Err(LoadError::invalid(
            "feed.batch_size",
            format!("must not exceed {MAX_BATCH_SIZE}"),
        ));
    }

    let ai_posts_ratio = feed.ai_posts_ratio.unwrap_or(DEFAULT_AI_POSTS_RATIO);
    if !ai_posts_ratio.is_finite() || !(0.0..=1.0).contains(&ai_posts_ratio) {
        return Err(LoadError::invalid(
            "feed.ai_posts_ratio",
            "must be between 0 and 1",
        ));
    }

    let sample_attempts = non_zero_u32(
        feed.sample_attempts
            .unwrap_or(DEFAULT_SAMPLE_ATTEMPTS)
            .into(),
        "feed.sample_attempts",
    )?;
    let fallback_pool_factor = non_zero_u32(
        feed.fallback_pool_factor
            .unwrap_or(DEFAULT_FALLBACK_POOL_FACTOR)
            .into(),
        "feed.fallback_pool_factor",
    )?;

    Ok(FeedConfig {
        batch_size,
        ai_posts_ratio,
        sample_attempts,
        fallback_pool_factor,
        clear_served_on_start: feed.clear_served_on_start.unwrap_or(false),
    })
}

fn build_generation_settings(
    generation: RawGenerationSettings,
    catalog: &ExperimentCatalog,
) -> Result<GenerationConfig, LoadError> {
    let mode = match non_blank(generation.mode) {
        Some(mode) => parse_generation_mode(&mode)
            .map_err(|reason| LoadError::invalid("generation.mode", reason))?,
        None => GenerationMode::default(),
    };

    let provider = match non_blank(generation.provider) {
        Some(provider) => ProviderKind::from_str(&provider)
            .map_err(|reason| LoadError::invalid("generation.provider", reason))?,
        None => ProviderKind::OpenAi,
    };

    let (default_base_url, default_model) = match provider {
        ProviderKind::OpenAi => (DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL),
        ProviderKind::Local => (DEFAULT_LOCAL_BASE_URL, DEFAULT_LOCAL_MODEL),
    };
    let base_url = non_blank(generation.base_url)
        .unwrap_or_else(|| default_base_url.to_string())
        .trim_end_matches('/')
        .to_string();
    let model = non_blank(generation.model).unwrap_or_else(|| default_model.to_string());
    let api_key = non_blank(generation.api_key);

    let enabled = generation.enabled.unwrap_or(false);
    if enabled
        && mode == GenerationMode::Llm
        && provider == ProviderKind::OpenAi
        && api_key.is_none()
    {
        return Err(LoadError::invalid(
            "generation.api_key",
            "required when the openai provider generates posts",
        ));
    }

    let interval_secs = generation
        .interval_seconds
        .unwrap_or(DEFAULT_GENERATION_INTERVAL_SECS);
    if interval_secs == 0 {
        return Err(LoadError::invalid(
            "generation.interval_seconds",
            "must be greater than zero",
        ));
    }

    let queue_capacity = non_zero_usize(
        generation.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
        "generation.queue_capacity",
    )?;
    let drain_limit = usize_value(
        generation.drain_limit.unwrap_or(DEFAULT_DRAIN_LIMIT),
        "generation.drain_limit",
    )?;
    let replay_count = usize_value(
        generation.replay_count.unwrap_or(DEFAULT_REPLAY_COUNT),
        "generation.replay_count",
    )?;
    let max_output_tokens = non_zero_u32(
        generation
            .max_output_tokens
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
            .into(),
        "generation.max_output_tokens",
    )?;

    let experiment = non_blank(generation.experiment)
        .unwrap_or_else(|| catalog.default_experiment().to_string());
    if !catalog.contains(&experiment) {
        return Err(LoadError::invalid(
            "generation.experiment",
            format!("`{experiment}` is not listed in experiments.available"),
        ));
    }

    Ok(GenerationConfig {
        enabled,
        mode,
        provider,
        model,
        api_key,
        base_url,
        interval: Duration::from_secs(interval_secs),
        queue_capacity,
        drain_limit,
        replay_count,
        max_output_tokens,
        experiment,
        custom_prompt: non_blank(generation.custom_prompt),
    })
}

fn build_experiment_catalog(
    experiments: RawExperimentSettings,
) -> Result<ExperimentCatalog, LoadError> {
    let available = experiments
        .available
        .map(|names| {
            names
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| DEFAULT_EXPERIMENTS.iter().map(|s| s.to_string()).collect());
    let default =
        non_blank(experiments.default).unwrap_or_else(|| DEFAULT_EXPERIMENT.to_string());

    ExperimentCatalog::new(available, default)
        .map_err(|err| LoadError::invalid("experiments", err.to_string()))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    jwt_secret: Option<String>,
    token_ttl_hours: Option<u64>,
    leeway_seconds: Option<u64>,
    dev_no_password: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    batch_size: Option<u64>,
    ai_posts_ratio: Option<f64>,
    sample_attempts: Option<u32>,
    fallback_pool_factor: Option<u32>,
    clear_served_on_start: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGenerationSettings {
    enabled: Option<bool>,
    mode: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    interval_seconds: Option<u64>,
    queue_capacity: Option<u64>,
    drain_limit: Option<u64>,
    replay_count: Option<u64>,
    max_output_tokens: Option<u32>,
    experiment: Option<String>,
    custom_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExperimentSettings {
    available: Option<Vec<String>>,
    default: Option<String>,
}

fn parse_generation_mode(value: &str) -> Result<GenerationMode, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "llm" => Ok(GenerationMode::Llm),
        "archive" => Ok(GenerationMode::Archive),
        other => Err(format!("unknown mode `{other}`, expected `llm` or `archive`")),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(usize_value(value, key)?)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn usize_value(value: u64, key: &'static str) -> Result<usize, LoadError> {
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

fn time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

fn ephemeral_secret() -> String {
    let mut bytes = [0u8; MIN_JWT_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
