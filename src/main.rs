use clap::Parser;
use nested_extract::console::{TerminalNotifier, stdin_prompt};
use nested_extract::{Config, Extractor};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Recursively extract nested, password-protected archives
#[derive(Clone, Debug, Parser)]
#[command(name = "nested-extract", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./config/nested_extract.toml or ./nested_extract.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to scan, overrides `target_directory`
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Rename marked files and retry without asking
    #[arg(long)]
    auto_rename: bool,
}

fn load_config(cli: &Cli) -> nested_extract::Result<Config> {
    let mut config = Config::read(cli.config.as_deref())?;
    if let Some(target) = &cli.target {
        config.target_directory = target.clone();
    }
    if cli.auto_rename {
        config.rename.auto_rename = true;
    }
    config.validate()
}

fn init_logging(config: &Config) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.file)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!(
            "cannot open log file {}: {e}",
            config.logging.file.display()
        );
    }

    println!("target directory : {}", config.target_directory.display());

    let notifier = Arc::new(TerminalNotifier::stdout());
    let mut extractor = match Extractor::new(Arc::new(config), notifier, stdin_prompt()).await {
        Ok(extractor) => extractor,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match extractor.run().await {
        Ok(summary) => {
            tracing::info!(?summary, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
