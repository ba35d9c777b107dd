//! speechd-cache - caching speech synthesis server
//!
//! `serve` (the default) runs the HTTP front end; `worker` runs one job read
//! from stdin and is spawned by the server itself.

use clap::{Parser, Subcommand};
use speechd_cache::config_loader::Settings;
use speechd_cache::delivery::Delivery;
use speechd_cache::dispatch::Dispatcher;
use speechd_cache::encoder::EncoderRegistry;
use speechd_cache::http::{self, AppState};
use speechd_cache::job::{Job, JobRunner};
use speechd_cache::metrics_store::SledMetricsStore;
use speechd_cache::pool::{InlineExecutor, JobExecutor, ProcessExecutor, WorkerPool};
use speechd_cache::registry::Registry;
use std::error::Error;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speechd-cache")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Caching speech synthesis server", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.config/speechd-cache/Speech)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Number of concurrent synthesis jobs
        #[arg(short, long)]
        workers: Option<usize>,
        /// Run jobs on threads inside the server instead of child processes
        #[arg(long)]
        inline_workers: bool,
    },

    /// Run one job from stdin and print its result (internal)
    #[command(hide = true)]
    Worker,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        workers: None,
        inline_workers: false,
    }) {
        Commands::Serve {
            host,
            port,
            workers,
            inline_workers,
        } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            settings.validate()?;

            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(serve(settings, cli.config, inline_workers))
        }
        Commands::Worker => work(&settings),
    }
}

async fn serve(
    settings: Settings,
    config: Option<PathBuf>,
    inline_workers: bool,
) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&settings.cache_dir)?;
    std::fs::create_dir_all(&settings.data_dir)?;

    let registry = Arc::new(Registry::from_settings(&settings)?);
    let encoders = Arc::new(EncoderRegistry::from_settings(&settings));

    let executor: Arc<dyn JobExecutor> = if inline_workers {
        Arc::new(InlineExecutor::new(JobRunner::new(
            registry.clone(),
            encoders.clone(),
            settings.cache_dir.clone(),
        )))
    } else {
        let mut args = Vec::new();
        if let Some(config) = config {
            args.push("--config".to_string());
            args.push(config.to_string_lossy().into_owned());
        }
        args.push("worker".to_string());
        Arc::new(ProcessExecutor::new(std::env::current_exe()?, args))
    };

    let pool = WorkerPool::new(
        executor,
        settings.workers,
        Duration::from_secs(settings.job_timeout_secs),
    );
    let metrics = SledMetricsStore::open(&settings.data_dir.join("metrics"))?;

    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(registry.clone(), encoders.clone(), Arc::new(pool)),
        delivery: Delivery::new(settings.cache_dir.clone()),
        metrics: Arc::new(metrics),
    });

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!(
        address = %listener.local_addr()?,
        engines = ?registry.list_available(),
        formats = ?encoders.formats(),
        workers = settings.workers,
        cache_dir = %settings.cache_dir.display(),
        "speechd-cache listening"
    );

    axum::serve(listener, http::router(state)).await?;
    Ok(())
}

/// Worker side of `ProcessExecutor`: stdout carries only the result.
fn work(settings: &Settings) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&settings.cache_dir)?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let job: Job = serde_json::from_str(&input)?;

    let runner = JobRunner::new(
        Arc::new(Registry::unprobed(settings)),
        Arc::new(EncoderRegistry::from_settings(settings)),
        settings.cache_dir.clone(),
    );
    let result = runner.run(&job);

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &result)?;
    stdout.flush()?;
    Ok(())
}
