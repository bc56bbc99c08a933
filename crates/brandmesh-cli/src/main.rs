//! `brandmesh`: agent orchestration service.

mod config;

use brandmesh_agents::{register_default_agents, AgentRegistry, ProviderTable};
use brandmesh_orchestrator::{build_server, OrchestrationContext, WorkflowProcessor};
use brandmesh_queue::{InMemoryLedger, JobLedger, RedisLedger, TaskQueueSystem, TaskType};
use clap::{Parser, Subcommand, ValueEnum};
use config::{BrandmeshConfig, LedgerBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brandmesh", about = "Brandmesh agent orchestration service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "brandmesh.toml", global = true)]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the protocol server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep jobs in process memory instead of Redis
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the tool and resource catalogue
    Tools,
}

/// Load `.env` from the working directory, then from the service root.
fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv()
        .or_else(|_| dotenvy::from_path(Path::new("../../.env")).map(|()| PathBuf::from("../../.env")))
        .ok()
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn open_ledger(config: &BrandmeshConfig, in_memory: bool) -> anyhow::Result<Arc<dyn JobLedger>> {
    let queue = &config.queue;
    if in_memory || queue.backend == LedgerBackend::Memory {
        info!(queue = %queue.name, "Using in-memory job ledger");
        return Ok(Arc::new(InMemoryLedger::new(&queue.name, queue.retention())));
    }
    let ledger = RedisLedger::connect(&queue.redis_url, &queue.name, queue.retention()).await?;
    info!(queue = %queue.name, "Connected to Redis job ledger");
    Ok(Arc::new(ledger))
}

fn build_registry(config: &BrandmeshConfig) -> Arc<AgentRegistry> {
    let registry = Arc::new(AgentRegistry::new(ProviderTable::from_config(&config.providers)));
    if config.agents.register_defaults {
        let agents = register_default_agents(&registry);
        info!(count = agents.len(), "Default agents registered");
    }
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match &dotenv {
        Some(path) => info!(path = %path.display(), "Loaded environment file"),
        None => warn!("No .env file found, using process environment only"),
    }

    let mut config = BrandmeshConfig::load(&cli.config)?;
    config.apply_env(|key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            in_memory,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let ledger = open_ledger(&config, in_memory).await?;
            let queue = Arc::new(TaskQueueSystem::with_defaults(ledger, config.queue.defaults()));
            let agents = build_registry(&config);
            let ctx = OrchestrationContext::new(queue.clone(), agents.clone());

            if config.queue.workflow_processor {
                queue
                    .register_processor(
                        TaskType::WorkflowExecution,
                        Arc::new(WorkflowProcessor::new(agents)),
                        config.queue.workflow_concurrency,
                    )
                    .await?;
            }

            let server = build_server(&ctx);
            let tools = server.tool_descriptors().len();
            let app = server.router();

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(addr = %addr, tools, "Agent orchestration server listening");

            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await;

            // Drain workers and close the ledger even if serving failed.
            let closed = queue.shutdown().await;
            served?;
            closed?;
            info!("Server stopped");
        }
        Commands::Tools => {
            let ledger = Arc::new(InMemoryLedger::new(
                &config.queue.name,
                config.queue.retention(),
            ));
            let queue = Arc::new(TaskQueueSystem::new(ledger));
            let agents = Arc::new(AgentRegistry::new(ProviderTable::from_config(&config.providers)));
            let server = build_server(&OrchestrationContext::new(queue, agents));
            println!("{}", serde_json::to_string_pretty(&server.catalogue())?);
        }
    }

    Ok(())
}
