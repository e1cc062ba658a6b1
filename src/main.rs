mod config;
mod error;
mod services;
mod types;

use config::Config;
use services::{
    BotScheduler, BotStore, BrokerMode, ConnectionRegistry, PortfolioService, SimulatedBroker,
    SqliteStore, TradeRecorder,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::{BotAccount, RiskLevel, Strategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botfleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(db = %config.db_path, "Starting botfleet");

    let store: Arc<SqliteStore> = Arc::new(SqliteStore::new(&config.db_path)?);
    let registry = Arc::new(ConnectionRegistry::new());
    let broker = Arc::new(SimulatedBroker::new(registry.clone()));
    let recorder = Arc::new(TradeRecorder::new(store.clone()));
    let scheduler = Arc::new(BotScheduler::new(
        store.clone(),
        broker.clone(),
        registry.clone(),
        recorder,
        config.loop_config.clone(),
    ));
    let portfolios = PortfolioService::new(store.clone(), broker.clone(), registry.clone());

    // Paper session for the demo user
    let user_id = "demo-user";
    registry.connect(
        user_id,
        BrokerMode::Paper,
        "demo-api-key-0000000000000000",
        "demo-api-secret-00000000000000",
    )?;
    portfolios.portfolio_for_user(user_id)?;

    // Seed a small fleet if the user has none yet
    let mut bots = store.bots_for_user(user_id)?;
    if bots.is_empty() {
        let fleet = [
            ("Grid Bot", Strategy::GridTrading, RiskLevel::Low),
            ("DCA Bot", Strategy::DcaRsi, RiskLevel::Medium),
            ("Momentum Bot", Strategy::MomentumTrading, RiskLevel::High),
        ];
        for (name, strategy, risk) in fleet {
            let bot = BotAccount::new(
                user_id.to_string(),
                name.to_string(),
                strategy,
                risk,
                5_000.0,
            );
            store.save_bot(&bot)?;
            bots.push(bot);
        }
        info!(count = bots.len(), "Seeded demo fleet");
    }

    for bot in &bots {
        scheduler.start(&bot.id).await?;
    }
    info!(running = scheduler.running_count(), "Trading loops started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping loops");
    scheduler.stop_all().await;

    for bot in &bots {
        if let Some(perf) = store.get_bot(&bot.id)? {
            info!(
                bot = %perf.name,
                trades = perf.total_trades(),
                profit = perf.profit(),
                accuracy = perf.accuracy(),
                "Final bot performance"
            );
        }
    }

    Ok(())
}
