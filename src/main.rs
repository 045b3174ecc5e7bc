//! Argus CLI - Main entry point.

use argus::config::{ArgusConfig, NodeConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Argus - a distributed monitoring fleet.
#[derive(Parser)]
#[command(name = "argus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ARGUS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "ARGUS_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Start an Argus fleet member
    Server {
        /// Address for the member's API to listen on
        #[arg(short, long, env = "ARGUS_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
        listen: String,

        /// Stable member identity; derived from the hostname when omitted
        #[arg(short, long, env = "ARGUS_MEMBER_ID")]
        member_id: Option<String>,

        /// Comma-separated member tags used for work routing
        #[arg(short, long, env = "ARGUS_MEMBER_TAGS")]
        tags: Option<String>,

        /// Comma-separated coordination store endpoints
        #[arg(
            short = 'e',
            long,
            env = "ARGUS_STORE_ENDPOINTS",
            default_value = "http://localhost:2379"
        )]
        store_endpoints: String,

        /// Prefix the engine's keys live under in the store
        #[arg(short = 'p', long, env = "ARGUS_STORE_PREFIX", default_value = "argus")]
        store_prefix: String,

        /// Store credentials in user:password form
        #[arg(short = 'U', long, env = "ARGUS_STORE_USERPASS")]
        store_userpass: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            listen,
            member_id,
            tags,
            store_endpoints,
            store_prefix,
            store_userpass,
        } => {
            let mut config = match &cli.config {
                Some(path) => ArgusConfig::from_file(path)?,
                None => ArgusConfig::default(),
            };

            config.node.listen_address = listen;
            config.node.member_id = match member_id {
                Some(id) => id,
                None => NodeConfig::derive_member_id(&config.node.listen_address)?,
            };
            if let Some(tags) = tags {
                config.node.tags = split_list(&tags);
            }
            if config.node.version == "N/A" {
                config.node.version = env!("CARGO_PKG_VERSION").to_string();
            }
            if config.node.semver == "N/A" {
                config.node.semver = env!("CARGO_PKG_VERSION").to_string();
            }

            config.store.endpoints = split_list(&store_endpoints);
            config.store.prefix = store_prefix;
            if let Some(userpass) = store_userpass {
                let (user, password) = userpass.split_once(':').ok_or_else(|| {
                    anyhow::anyhow!("store credentials must be in user:password form")
                })?;
                config.store.username = Some(user.to_string());
                config.store.password = Some(password.to_string());
            }

            config.observability.log_level = cli.log_level;
            config.observability.json_logs = cli.json_logs;

            config.validate()?;
            argus::observability::init(&config.observability)?;

            argus::run(config).await?;
        }
    }

    Ok(())
}

/// Split a comma-separated CLI value into trimmed, non-empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
