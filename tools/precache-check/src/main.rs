//! Run the offline worker against a live origin.
//!
//! ## Usage
//!
//! ```bash
//! # Show the manifest the worker would precache
//! precache-check manifest --origin http://localhost:8080/
//!
//! # Install and activate, printing the reports
//! precache-check install --config worker.json -v
//!
//! # Route one request through the active worker
//! precache-check fetch /history --navigate
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pathfinder_common::{init_logging, LogConfig, LogFormat};
use pathfinder_net::{Fetcher, HttpFetcher, LoaderConfig, Request};
use pathfinder_sw::{
    FetchOutcome, InstallReport, MemoryCacheStore, ServiceWorkerRegistration, WorkerConfig,
    WorkerContext,
};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

#[derive(Parser)]
#[command(name = "precache-check")]
#[command(about = "Run the Habit Pathfinder offline worker against a live origin")]
struct Cli {
    /// Worker config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application origin, overriding the config
    #[arg(long, global = true)]
    origin: Option<Url>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log filter directives, overriding RUST_LOG (e.g. `pathfinder_sw=trace`)
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache version and resolved asset manifest
    Manifest,

    /// Install and activate the worker, then print the reports
    Install,

    /// Install, then route one request through the worker
    Fetch {
        /// Path relative to the origin
        path: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        navigate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    let mut log_config = LogConfig::from_verbosity(cli.verbose).with_format(format);
    if let Some(filter) = &cli.log_filter {
        log_config = log_config.with_filter(filter);
    }
    init_logging(log_config)?;

    let config = load_config(cli.config.as_deref(), cli.origin)?;

    match cli.command {
        Commands::Manifest => {
            let assets = config.resolved_assets()?;
            let out = json!({
                "version": config.version_id,
                "origin": config.origin,
                "offline_fallback": config.resolve(&config.offline_fallback)?,
                "assets": assets,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Install => {
            let session = install(config).await?;
            let report = session.report;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Fetch { path, navigate } => {
            let url = config.resolve(&path)?;
            let session = install(config).await?;
            debug!(cached = session.report.cached.len(), "Worker installed");

            let Some(worker) = session.registration.active().await else {
                bail!("worker did not activate");
            };
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };

            let outcome = worker.handle_fetch(request).await?;
            let source = outcome.source();
            let response = match outcome {
                FetchOutcome::Passthrough(request) => session.network.fetch(request).await?,
                FetchOutcome::Cache(response)
                | FetchOutcome::Network(response)
                | FetchOutcome::OfflineFallback(response) => response,
            };
            worker.wait_for_background().await;

            let out = json!({
                "source": source,
                "url": response.url,
                "status": response.status.as_u16(),
                "response_type": format!("{:?}", response.response_type),
                "bytes": response.body.len(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&std::path::Path>, origin: Option<Url>) -> Result<WorkerConfig> {
    let mut config = match path {
        Some(path) => WorkerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(origin) = origin {
        config.origin = origin;
    }
    config.validate()?;
    Ok(config)
}

struct Session {
    registration: ServiceWorkerRegistration,
    network: Arc<dyn Fetcher>,
    report: InstallReport,
}

/// The worker enforces `network_timeout_ms` itself, so the client gets none.
fn loader_config(config: &WorkerConfig) -> LoaderConfig {
    let defaults = LoaderConfig::default();
    LoaderConfig {
        user_agent: format!("{} ({})", defaults.user_agent, config.version_id),
        ..defaults
    }
}

async fn install(config: WorkerConfig) -> Result<Session> {
    let network: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new(&config.origin, loader_config(&config))?);
    let context = WorkerContext::new(Arc::new(MemoryCacheStore::new()), Arc::clone(&network));

    let (registration, _events) = ServiceWorkerRegistration::new(config.origin.clone(), context);
    let client = registration
        .clients()
        .write()
        .await
        .open_window(config.origin.clone());
    info!(client = %client, "Opened window");

    let report = registration.register(config).await?;
    Ok(Session {
        registration,
        network,
        report,
    })
}
