use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use findings_engine::{EngineConfig, StorageKind};
use findings_inspect::{app_history, list_apps, show_report};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "findings")]
#[command(about = "Inspect applications and reports in a findings store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override storage.type
    #[arg(long, global = true, value_enum)]
    storage: Option<StorageArg>,

    /// Override storage.location
    #[arg(long, global = true)]
    location: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageArg {
    File,
    Db,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => Self::File,
            StorageArg::Db => Self::Db,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List known applications
    Apps {
        /// Only applications of this owner
        #[arg(long)]
        owner: Option<String>,
    },

    /// Print a finished report as JSON
    Show {
        app: String,

        /// Run id (defaults to the most recent finished run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Print the finished runs of an application, newest first
    History {
        app: String,

        /// Maximum number of runs (defaults to reports.load_history_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::from_env().context("Invalid FINDINGS_* environment")?,
    };
    if let Some(storage) = cli.storage {
        config.storage.kind = storage.into();
    }
    if let Some(location) = &cli.location {
        config.storage.location.clone_from(location);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    );
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    if matches!(cli.command, Commands::Config) {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = config
        .open_store()
        .await
        .context("Failed to open findings store")?;
    log::debug!("Using store at {}", config.storage.root().display());

    match cli.command {
        Commands::Apps { owner } => print_json(&list_apps(store.as_ref(), owner.as_deref()).await?)?,
        Commands::Show { app, run } => {
            print_json(&show_report(store.as_ref(), &app, run.as_deref()).await?)?;
        }
        Commands::History { app, limit } => {
            let limit = limit.unwrap_or(config.reports.load_history_limit);
            print_json(&app_history(store.as_ref(), &app, limit).await?)?;
        }
        Commands::Config => {}
    }
    Ok(())
}
