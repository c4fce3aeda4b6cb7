use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

fn redact_host(url: &str) -> String {
    url.split('@')
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("?")
        .to_string()
}

use bet_settlement_bot::{
    feed::FeedClient,
    monitoring::{self, control::serve_control, stats::spawn_stats_log_task},
    settlement::SettlementEngine,
    storage::{create_pg_pool, MemoryWagerStore, WagerStore},
    types::{AppConfig, FeedMode, StoreMode},
};

#[derive(Parser, Debug)]
#[command(name = "bet-settlement-bot")]
#[command(about = "Background settlement engine for a sportsbook odds feed", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    /// Override feed mode (http/fixture)
    #[arg(long)]
    feed_mode: Option<FeedMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the settlement loop and the control surface
    Run {},
    /// Run exactly one settlement pass and print the resulting status
    Cycle {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "bet_settlement_bot=debug,bot=debug,info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(target: "bot", "bet-settlement-bot starting");

    let cli = Cli::parse();
    tracing::debug!(target: "bot", config = %cli.config, "loading config");

    let mut settings = AppConfig::from_file(&cli.config)?;
    tracing::info!(
        target: "bot",
        config = %cli.config,
        feed_base_url = %settings.feed.base_url,
        postgres_host = redact_host(&settings.postgres.url),
        interval_secs = settings.engine.interval_secs,
        "config loaded"
    );

    if let Some(mode) = cli.feed_mode {
        settings.feed.mode = mode;
    }

    match cli.command.unwrap_or(Commands::Run {}) {
        Commands::Run {} => {
            monitoring::logger::log_startup(&settings);
            run_engine(settings).await?;
        }
        Commands::Cycle {} => {
            let engine = build_engine(&settings).await?;
            engine.run_cycle().await;
            let status = engine.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

async fn build_engine(cfg: &AppConfig) -> anyhow::Result<Arc<SettlementEngine>> {
    let feed = Arc::new(FeedClient::from_config(&cfg.feed)?);

    let store = match cfg.engine.store {
        StoreMode::Postgres => {
            tracing::info!(target: "bot", "connecting to Postgres");
            let pool = create_pg_pool(&cfg.postgres).await?;
            tracing::info!(target: "bot", "Postgres connected");
            WagerStore::postgres(pool)
        }
        StoreMode::Memory => {
            tracing::warn!(target: "bot", "memory store selected; settlements will not persist");
            WagerStore::memory(MemoryWagerStore::new())
        }
    };

    Ok(Arc::new(SettlementEngine::new(
        Arc::new(store),
        feed,
        &cfg.engine,
    )))
}

async fn run_engine(cfg: AppConfig) -> anyhow::Result<()> {
    let engine = build_engine(&cfg).await?;

    Arc::clone(&engine).start();
    spawn_stats_log_task(engine.stats().clone(), Duration::from_secs(30));

    let control_addr = cfg.engine.control_addr.clone();
    tokio::select! {
        res = serve_control(&control_addr, Arc::clone(&engine)) => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "bot", "interrupt received; stopping settlement loop");
            engine.stop();
        }
    }

    Ok(())
}
