use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{mpsc, watch};

use sniper_automation::PositionAutomationEngine;
use sniper_coordination::{
    JobQueue, MemoryJobQueue, MemoryLockStore, RedisJobQueue, RedisLockStore,
};
use sniper_core::paper::{NullAnalysisProvider, PaperExchange};
use sniper_core::{
    AppConfig, BalanceSource, BroadcastNotifier, BuyExecutor, ConfigLoader, LockStore, Notifier,
    PositionStore, PriceSource, RetryPolicy, SellExecutor, SniperStore, TokenAnalysisProvider,
};
use sniper_data::{
    run_migrations, MemoryPositionStore, MemorySniperStore, PgPositionStore, PgSniperStore,
};
use sniper_dispatch::DispatchOrchestrator;
use sniper_execution::{BalanceCache, ExecutionWorker, ExecutionWorkerPool};

const JOB_QUEUE_KEY: &str = "sniper:jobs";

#[derive(Parser)]
#[command(name = "sniper")]
#[command(about = "Migration sniping pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch, execution, and automation services
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Sniper.toml")]
        config: String,
        /// Coordinate and persist entirely in process (no Postgres/Redis)
        #[arg(long)]
        paper: bool,
    },
    /// Apply database migrations and exit
    Migrate {
        /// Config file path
        #[arg(short, long, default_value = "config/Sniper.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, paper } => run(&config, paper).await,
        Commands::Migrate { config } => migrate(&config).await,
    }
}

async fn migrate(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;
    run_migrations(&pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

struct Backends {
    snipers: Arc<dyn SniperStore>,
    positions: Arc<dyn PositionStore>,
    locks: Arc<dyn LockStore>,
    queue: Arc<dyn JobQueue>,
}

async fn connect_backends(config: &AppConfig, paper: bool) -> Result<Backends> {
    if paper {
        tracing::info!("paper mode: in-process stores, locks, and queue");
        return Ok(Backends {
            snipers: Arc::new(MemorySniperStore::new()),
            positions: Arc::new(MemoryPositionStore::new()),
            locks: Arc::new(MemoryLockStore::new()),
            queue: Arc::new(MemoryJobQueue::new()),
        });
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;
    let locks = RedisLockStore::connect(&config.redis.url)
        .await
        .context("failed to connect the lock store to Redis")?;
    let queue = RedisJobQueue::connect(&config.redis.url, JOB_QUEUE_KEY)
        .await
        .context("failed to connect the job queue to Redis")?;

    Ok(Backends {
        snipers: Arc::new(PgSniperStore::new(pool.clone())),
        positions: Arc::new(PgPositionStore::new(pool)),
        locks: Arc::new(locks),
        queue: Arc::new(queue),
    })
}

async fn run(config_path: &str, paper: bool) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let backends = connect_backends(&config, paper).await?;

    // The buy/sell primitives, balance reads, price feed, and analysis
    // providers are external integrations behind the core trait seams.
    // The paper exchange stands in for all of them until those
    // integrations are wired here.
    let exchange = Arc::new(PaperExchange::new());
    if !paper {
        tracing::warn!("live trade executors not configured; paper exchange backs buy/sell/price/balance");
    }

    let notifier = Arc::new(BroadcastNotifier::new(1024));
    let mut notifications = notifier.subscribe();
    // Outbound fan-out transport plugs in here; until then every event is
    // at least visible in the logs.
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            tracing::debug!(?event, "notification");
        }
    });

    let (event_tx, event_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = Arc::new(DispatchOrchestrator::new(
        Arc::clone(&backends.snipers),
        Arc::clone(&backends.locks),
        Arc::clone(&backends.queue),
        Arc::new(NullAnalysisProvider) as Arc<dyn TokenAnalysisProvider>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config.dispatch.clone(),
    ));

    let balances = Arc::new(BalanceCache::new(
        Arc::clone(&exchange) as Arc<dyn BalanceSource>,
        Duration::from_millis(config.execution.balance_cache_ttl_ms),
        RetryPolicy::new(
            config.execution.balance_read_attempts,
            Duration::from_millis(config.execution.balance_read_backoff_ms),
        ),
    ));
    let worker = Arc::new(ExecutionWorker::new(
        Arc::clone(&backends.snipers),
        Arc::clone(&backends.positions),
        Arc::clone(&backends.locks),
        Arc::clone(&exchange) as Arc<dyn BuyExecutor>,
        balances,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config.execution.clone(),
        config.fees.clone(),
    ));
    let pool = Arc::new(ExecutionWorkerPool::new(
        worker,
        Arc::clone(&backends.queue),
        config.execution.clone(),
    ));

    let engine = Arc::new(PositionAutomationEngine::new(
        Arc::clone(&backends.positions),
        Arc::clone(&backends.snipers),
        Arc::clone(&exchange) as Arc<dyn PriceSource>,
        Arc::clone(&exchange) as Arc<dyn SellExecutor>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config.automation.clone(),
    ));

    let orchestrator_handle = tokio::spawn(orchestrator.run(event_rx, shutdown_rx.clone()));
    let pool_handle = tokio::spawn(pool.run(shutdown_rx.clone()));
    let engine_handle = tokio::spawn(engine.run(shutdown_rx));

    // The migration detector is an external collaborator: hand `event_tx`
    // to its transport. The channel stays open until shutdown.
    tracing::info!("sniper pipeline running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    drop(event_tx);
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = tokio::join!(orchestrator_handle, pool_handle, engine_handle);
    })
    .await;

    Ok(())
}
