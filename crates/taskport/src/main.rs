//! Taskport: task backend migration and API server
//!
//! Main binary with subcommands:
//! - `migrate`: Copy users, tasks and subtasks from SQLite into the document store
//! - `serve`: Run the HTTP API over the document store

use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskport_migrate::DEFAULT_SOURCE;
use taskport_store::DEFAULT_TARGET_URI;

mod migrate;
mod serve;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "taskport")]
#[command(about = "Task backend migration and API server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate users, tasks and subtasks into the document store, then seed counters
    Migrate {
        /// Source SQLite database path or URI
        #[arg(long, env = "SQL_CONN", default_value = DEFAULT_SOURCE)]
        sql: String,

        /// Target document store URI (sqlite://path or memory://)
        #[arg(long, env = "MONGO_URI", default_value = DEFAULT_TARGET_URI)]
        mongo: String,

        /// Log every planned write without touching the target.
        #[arg(long, env = "TASKPORT_DRY_RUN", value_parser = parse_bool_env, default_value = "false")]
        dry_run: bool,

        /// Timeout for each target store round trip, in seconds
        #[arg(long, env = "TASKPORT_STORE_TIMEOUT_SECS", default_value = "30")]
        store_timeout_secs: u64,
    },

    /// Run the HTTP API
    Serve {
        /// Document store URI (sqlite://path or memory://)
        #[arg(long, env = "MONGO_URI", default_value = DEFAULT_TARGET_URI)]
        mongo: String,

        /// HTTP server port
        #[arg(long, env = "TASKPORT_PORT", default_value = "8080")]
        port: u16,

        /// Timeout for each store round trip, in seconds
        #[arg(long, env = "TASKPORT_STORE_TIMEOUT_SECS", default_value = "30")]
        store_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "taskport=info,taskport_store=info,taskport_migrate=info,taskport_web=info"
                    .to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            sql,
            mongo,
            dry_run,
            store_timeout_secs,
        } => {
            migrate::run(
                &sql,
                &mongo,
                dry_run,
                Duration::from_secs(store_timeout_secs),
            )
            .await
        }

        Commands::Serve {
            mongo,
            port,
            store_timeout_secs,
        } => serve::run(&mongo, port, Duration::from_secs(store_timeout_secs)).await,
    }
}
