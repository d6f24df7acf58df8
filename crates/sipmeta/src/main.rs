//! sipmeta - SIP-010 token metadata cache for Stacks

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sipmeta_core::config::StoreBackend;
use sipmeta_core::maintenance::{Job, Mode};
use sipmeta_core::{AppContext, Config, ContractId, RefreshOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::cli::CliError;

#[derive(Parser)]
#[command(
    name = "sipmeta",
    version,
    about = "SIP-010 token metadata cache for Stacks",
    long_about = "Fetches fungible-token metadata from a metadata API, the token URI and the\n\
                  contract itself, merges it and caches the result with a TTL.\n\
                  \n\
                  Examples:\n\
                    sipmeta get SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token\n\
                    sipmeta get .stx --json\n\
                    sipmeta tokens add SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token\n\
                    sipmeta maintain refresh-incomplete live 5\n\
                    sipmeta serve --port 8080\n\
                  \n\
                  Environment Variables:\n\
                    SIPMETA_CONFIG                   # Config file path\n\
                    SIPMETA_STORE_PATH               # Override store directory\n\
                    SIPMETA_STACKS_API_URL           # Override Stacks node URL\n\
                    SIPMETA_METADATA_API_URL         # Override metadata API URL\n\
                    SIPMETA_NO_COLOR                 # Disable ANSI colors\n\
                    RUST_LOG                         # Log filter (default: sipmeta=info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (default: <config_dir>/sipmeta/config.toml)
    #[arg(long, env = "SIPMETA_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(long, env = "SIPMETA_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Use the in-memory store (nothing persists)
    #[arg(long)]
    memory: bool,

    /// Stacks node base URL (overrides config)
    #[arg(long, env = "SIPMETA_STACKS_API_URL")]
    stacks_api_url: Option<String>,

    /// Metadata API base URL (overrides config)
    #[arg(long, env = "SIPMETA_METADATA_API_URL")]
    metadata_api_url: Option<String>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "SIPMETA_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show metadata for a token, fetching on a cache miss
    Get {
        /// Contract ID (<address>.<name>) or .stx
        contract_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch fresh metadata and overwrite the cached record
    Refresh {
        contract_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the list of tracked tokens
    Tokens {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Manage tokens that are never fetched
    Blacklist {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Run a maintenance job over the cache
    Maintain {
        /// audit, fix-identifiers, convert-supply, audit-images, refresh-incomplete, refresh-managed
        job: Job,
        /// dry-run or live
        #[arg(default_value = "dry-run")]
        mode: Mode,
        /// Items processed concurrently per batch
        batch_size: Option<usize>,
        /// Pause between batches in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Serve the HTTP API
    Serve {
        /// Port for the HTTP server (default from config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Remove expired records and print store statistics
    Purge,
}

#[derive(Subcommand)]
enum ListAction {
    /// Show the list
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a contract ID
    Add { contract_id: String },
    /// Remove a contract ID
    Remove { contract_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.no_color);

    let config = load_config(&cli)?;
    let ctx = AppContext::from_config(config)?;
    let no_color = cli.no_color;

    match cli.command {
        Command::Get { contract_id, json } => run_get(&ctx, &contract_id, json).await?,
        Command::Refresh { contract_id, json } => run_refresh(&ctx, &contract_id, json).await?,
        Command::Tokens { action } => run_tokens(&ctx, action, no_color).await?,
        Command::Blacklist { action } => run_blacklist(&ctx, action).await?,
        Command::Maintain {
            job,
            mode,
            batch_size,
            delay_ms,
        } => run_maintain(&ctx, job, mode, batch_size, delay_ms).await?,
        Command::Serve { port } => {
            let port = port.unwrap_or(ctx.config.server.port);
            sipmeta_web::run(ctx.service.clone(), port).await?;
        }
        Command::Purge => run_purge(&ctx).await?,
    }

    Ok(())
}

fn init_tracing(no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sipmeta=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    if let Some(path) = &cli.store_path {
        config.store.path = path.clone();
    }
    if cli.memory {
        config.store.backend = StoreBackend::Memory;
    }
    if let Some(url) = &cli.stacks_api_url {
        config.sources.stacks_api_url = url.clone();
    }
    if let Some(url) = &cli.metadata_api_url {
        config.sources.metadata_api_url = url.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn parse_id(raw: &str) -> Result<ContractId> {
    ContractId::parse(raw).with_context(|| format!("Invalid contract id '{}'", raw))
}

fn spinner(message: &str, json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

async fn run_get(ctx: &AppContext, raw: &str, json: bool) -> Result<()> {
    let id = parse_id(raw)?;
    let spinner = spinner(&format!("Looking up {}...", id), json);
    let result = ctx.service.get(&id).await;
    spinner.finish_and_clear();

    match result? {
        Some(data) => {
            println!("{}", cli::format_token_info(&data, json));
            Ok(())
        }
        None => Err(CliError::NotFound { contract_id: id }.into()),
    }
}

async fn run_refresh(ctx: &AppContext, raw: &str, json: bool) -> Result<()> {
    let id = parse_id(raw)?;
    let spinner = spinner(&format!("Refreshing {}...", id), json);
    let result = ctx.service.refresh(&id).await;
    spinner.finish_and_clear();

    match result? {
        RefreshOutcome::Fresh(data) => {
            println!("{}", cli::format_token_info(&data, json));
        }
        RefreshOutcome::Stale(data) => {
            if !json {
                eprintln!("Refresh failed, showing the cached record from {}", data.last_updated.to_rfc3339());
            }
            println!("{}", cli::format_token_info(&data, json));
        }
        RefreshOutcome::Missing => return Err(CliError::NotFound { contract_id: id }.into()),
    }
    Ok(())
}

async fn run_tokens(ctx: &AppContext, action: ListAction, no_color: bool) -> Result<()> {
    let registry = ctx.service.registry();
    match action {
        ListAction::List { json } => {
            let ids = registry.managed().await?;
            let mut rows = Vec::with_capacity(ids.len());
            for id in ids {
                let cached = ctx.service.cached(&id).await;
                rows.push((id, cached));
            }
            println!("{}", cli::format_token_table(&rows, json, no_color));
        }
        ListAction::Add { contract_id } => {
            let id = parse_id(&contract_id)?;
            if registry.is_blacklisted(&id).await? {
                return Err(CliError::Blacklisted { contract_id: id }.into());
            }
            if registry.add(&id).await? {
                println!("Added {}", id);
            } else {
                println!("{} is already managed", id);
            }
        }
        ListAction::Remove { contract_id } => {
            let id = parse_id(&contract_id)?;
            if registry.remove(&id).await? {
                println!("Removed {}", id);
            } else {
                println!("{} was not managed", id);
            }
        }
    }
    Ok(())
}

async fn run_blacklist(ctx: &AppContext, action: ListAction) -> Result<()> {
    let registry = ctx.service.registry();
    match action {
        ListAction::List { json } => {
            let ids: Vec<ContractId> = registry.blacklist().await?.into_iter().collect();
            println!("{}", cli::format_id_list(&ids, json));
        }
        ListAction::Add { contract_id } => {
            let id = parse_id(&contract_id)?;
            if registry.blacklist_add(&id).await? {
                println!("Blacklisted {}", id);
            } else {
                println!("{} is already blacklisted", id);
            }
        }
        ListAction::Remove { contract_id } => {
            let id = parse_id(&contract_id)?;
            if registry.blacklist_remove(&id).await? {
                println!("Removed {} from the blacklist", id);
            } else {
                println!("{} was not blacklisted", id);
            }
        }
    }
    Ok(())
}

async fn run_maintain(
    ctx: &AppContext,
    job: Job,
    mode: Mode,
    batch_size: Option<usize>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let mut options = ctx.default_job_options();
    options.mode = mode;
    if let Some(size) = batch_size {
        anyhow::ensure!(size > 0, "batch size must be at least 1");
        options.batch_size = size;
    }
    if let Some(ms) = delay_ms {
        options.batch_delay = Duration::from_millis(ms);
    }

    let spinner = spinner(&format!("Running {} ({})...", job, mode), false);
    let report = ctx.maintenance(options).run(job).await;
    spinner.finish_and_clear();

    let report = report.with_context(|| format!("Job {} failed", job))?;
    println!("{}", report);
    if report.has_failures() {
        eprintln!("\n{} item(s) failed", report.failures.len());
    }
    Ok(())
}

async fn run_purge(ctx: &AppContext) -> Result<()> {
    let removed = ctx.store.purge_expired().await?;
    let stats = ctx.store.stats().await?;

    println!("Removed {} expired record(s)", removed);
    println!("{}", cli::format_store_stats(&stats));
    Ok(())
}
