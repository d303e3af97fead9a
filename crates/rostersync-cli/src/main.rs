use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rostersync_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rostersync", version, about = "Roster sync daemon")]
struct Cli {
    /// Config file (defaults to $ROSTERSYNC_CONFIG, then ~/.config/rostersync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pass now and then on every interval until interrupted
    Daemon,
    /// Run a single pass
    Sync {
        /// Print the delta without writing to the target
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify both stores answer a liveness query
    Check,
    /// Create the target schema if it is missing
    InitTarget,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());

    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action, &config_path),
        Commands::Daemon => with_config(&config_path, commands::daemon::run),
        Commands::Sync { dry_run, json } => {
            with_config(&config_path, |c| commands::sync::run(c, dry_run, json))
        }
        Commands::Check => with_config(&config_path, commands::check::run),
        Commands::InitTarget => with_config(&config_path, commands::init_target::run),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Load and validate the config, start logging, then run `f`.
fn with_config(
    path: &Path,
    f: impl FnOnce(&Config) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_init(path)?;
    config.validate()?;
    config.resolve_store_paths(path);
    init_tracing(&config.log.level);
    f(&config)
}

/// Log to stderr. `RUST_LOG` overrides the configured level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
