//! Pagegist CLI - webpage summarisation with a daily free tier
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use pagegist::license::LicenseError;
use pagegist::{
    scraper, Config, GateState, HttpVerifier, LicenseManager, LicenseVerifier, Pipeline, SledStore,
    StaticKeyVerifier, SummaryClient, UsageGate,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pagegist")]
#[command(author, version, about = "Summarise webpages with a daily free tier", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to ./pagegist.toml or ~/.config/pagegist/pagegist.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a webpage by URL or local HTML file
    Summarise {
        /// URL to summarise
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        url: Option<String>,
        /// Read the page from a local HTML file instead
        #[arg(long)]
        file: Option<PathBuf>,
        /// Show raw extracted text instead of summary
        #[arg(long)]
        raw: bool,
    },
    /// Show how many summaries are left today
    Usage,
    /// Manage the Pro license
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
}

#[derive(Subcommand)]
enum LicenseAction {
    /// Verify a license key and save it
    Activate {
        /// The license key
        key: String,
    },
    /// Show the active license
    Show,
    /// Remove the saved license
    Remove,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Summarise { url, file, raw }) => summarise(&config, url, file, raw).await,
        Some(Commands::License { action }) => license(&config, action).await,
        Some(Commands::Usage) | None => {
            let gate = open_gate(&config)?;
            let state = gate.check().await?;
            println!("{}", state);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn summarise(
    config: &Config,
    url: Option<String>,
    file: Option<PathBuf>,
    raw: bool,
) -> anyhow::Result<ExitCode> {
    // Fail on a missing API key before touching the network.
    let client = if raw {
        None
    } else {
        Some(SummaryClient::from_config(config)?)
    };

    let html = match (url, file) {
        (_, Some(path)) => {
            println!("Reading: {}", path.display());
            scraper::read_html(&path)?
        }
        (Some(url), None) => {
            println!("Fetching: {}", url);
            scraper::fetch_html(&url).await?
        }
        (None, None) => anyhow::bail!("either a URL or --file is required"),
    };

    let Some(client) = client else {
        // Just show raw extracted text
        let content = scraper::extract_html(&html);
        let title = content.title.as_deref().unwrap_or("No title");
        println!("\n=== {} ===\n", title);
        println!("{}", content.text);
        println!("\n--- Extracted {} characters ---", content.char_count);
        return Ok(ExitCode::SUCCESS);
    };

    let pipeline = Pipeline::new(client, open_gate(config)?);

    println!("Summarising... please wait.\n");
    match pipeline.run(&html).await {
        Ok(outcome) => {
            if let Some(title) = &outcome.extraction.title {
                println!("=== {} ===\n", title);
            }
            println!("{}\n", outcome.summary.text);
            println!(
                "{}",
                format!(
                    "✓ {} words from {} characters ({})",
                    outcome.summary.word_count(),
                    outcome.extraction.char_count,
                    outcome.summary.model
                )
                .green()
            );
            let usage = outcome.state.to_string();
            match outcome.state {
                GateState::FreeAtLimit | GateState::FreeUnderLimit { remaining: 1 } => {
                    println!("{}", usage.yellow())
                }
                _ => println!("{}", usage),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e.user_message().red());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn license(config: &Config, action: LicenseAction) -> anyhow::Result<ExitCode> {
    let manager = open_license(config, Arc::new(open_store(config)?))?;

    match action {
        LicenseAction::Activate { key } => {
            println!("Verifying...");
            match manager.activate(&key).await {
                Ok(()) => {
                    println!("{}", "License activated successfully!".green());
                    if let Some(masked) = manager.current_masked()? {
                        println!("Current License: {} ✓", masked);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e @ (LicenseError::EmptyKey
                | LicenseError::InvalidKey
                | LicenseError::Network(_))) => {
                    eprintln!("{}", e.to_string().red());
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
        LicenseAction::Show => {
            match manager.current_masked()? {
                Some(masked) => println!("Current License: {} ✓", masked),
                None => println!("No license activated."),
            }
            Ok(ExitCode::SUCCESS)
        }
        LicenseAction::Remove => {
            manager.deactivate()?;
            println!("License removed.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<SledStore> {
    let path = config.storage.path.join("state");
    SledStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn open_license(config: &Config, store: Arc<SledStore>) -> anyhow::Result<LicenseManager> {
    let verifier: Arc<dyn LicenseVerifier> = if config.license.valid_keys.is_empty() {
        Arc::new(HttpVerifier::new(config.license.verify_endpoint.clone())?)
    } else {
        Arc::new(StaticKeyVerifier::new(&config.license.valid_keys))
    };
    Ok(LicenseManager::new(store, verifier))
}

fn open_gate(config: &Config) -> anyhow::Result<UsageGate> {
    let store = Arc::new(open_store(config)?);
    let license = open_license(config, store.clone())?;
    Ok(UsageGate::new(store, license, config.usage.daily_limit))
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("pagegist=debug")
        } else {
            EnvFilter::new("pagegist=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
