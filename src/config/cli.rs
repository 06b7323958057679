use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the slopfeed binary.
#[derive(Debug, Parser)]
#[command(name = "slopfeed", version, about = "Slopfeed study backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SLOPFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the feed API and the background producer.
    Serve(Box<ServeArgs>),
    /// Forget which posts have been served, for one user or everyone.
    #[command(name = "clear-served")]
    ClearServed(ClearServedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ClearServedArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Only clear the ledger of this user.
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the bind host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the bind port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Toggle the background producer.
    #[arg(
        long = "generation-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub generation_enabled: Option<bool>,

    /// Producer mode: `llm` or `archive`.
    #[arg(long = "generation-mode", value_name = "MODE")]
    pub generation_mode: Option<String>,
}
