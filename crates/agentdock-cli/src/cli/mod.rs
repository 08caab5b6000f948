//! CLI entry and dispatch.

use std::io;
use std::path::{Path, PathBuf};

use agentdock_session::config::{self, SessionConfig};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "agentdock")]
#[command(version = "0.1")]
#[command(about = "Drive the agentdock session core from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of $AGENTDOCK_HOME/config.toml
    #[arg(long, global = true, env = "AGENTDOCK_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect the persisted key-value store
    Storage {
        #[command(subcommand)]
        command: StorageCommands,
    },

    /// Run a login/logout scenario against simulated collaborators
    Simulate {
        #[arg(value_enum)]
        scenario: commands::simulate::Scenario,

        /// Persist to $AGENTDOCK_HOME/storage.json instead of memory
        #[arg(long)]
        file_store: bool,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(clap::Subcommand)]
enum StorageCommands {
    /// List persisted keys
    List,
    /// Remove every key under the configured session prefixes
    Purge,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("AGENTDOCK_LOG").unwrap_or_else(|_unset| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(config::paths::config_path);

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path(&config_path);
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(&config_path),
            ConfigCommands::Show => commands::config::show(&load(&config_path)?),
        },

        Commands::Storage { command } => {
            let config = load(&config_path)?;
            match command {
                StorageCommands::List => commands::storage::list(),
                StorageCommands::Purge => commands::storage::purge(&config),
            }
        }

        Commands::Simulate {
            scenario,
            file_store,
        } => commands::simulate::run(load(&config_path)?, scenario, file_store).await,
    }
}

fn load(path: &Path) -> Result<SessionConfig> {
    SessionConfig::load_from(path).context("load config")
}
