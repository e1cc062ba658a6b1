//! Integration tests for the bot scheduler and its control loops
//!
//! Tests cover:
//! - Start/stop lifecycle and status transitions
//! - Duplicate-start and missing-connection rejection
//! - Loop exit on deactivation and deletion
//! - Fatal-fault isolation between bots

use botfleet::config::LoopConfig;
use botfleet::error::AppError;
use botfleet::services::{
    AccountBalance, BotScheduler, BotStore, BrokerClient, BrokerError, BrokerMode,
    ConnectionRegistry, OrderReceipt, Quote, SqliteStore, StoreError, TradeRecorder,
};
use botfleet::types::{BotAccount, Portfolio, RiskLevel, Strategy, Trade, TradeSide};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test fixtures
// =============================================================================

/// Broker that always quotes and always fills.
struct AlwaysFillBroker;

impl BrokerClient for AlwaysFillBroker {
    fn get_quote<'a>(
        &'a self,
        pair: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Quote>> + Send + 'a>> {
        Box::pin(async move {
            Some(Quote {
                pair: pair.to_string(),
                price: 100.0,
                change_24h: 0.0,
                timestamp: 0,
            })
        })
    }

    fn place_order<'a>(
        &'a self,
        _user_id: &'a str,
        pair: &'a str,
        side: TradeSide,
        amount: f64,
        price: f64,
    ) -> Pin<Box<dyn Future<Output = Result<OrderReceipt, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(OrderReceipt {
                order_id: "SIM_TEST".to_string(),
                pair: pair.to_string(),
                side,
                amount,
                price,
                total: amount * price,
                fee: amount * price * 0.001,
                executed_at: 0,
            })
        })
    }

    fn account_balance<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccountBalance, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(AccountBalance {
                total_balance: 40_000.0,
                available_balance: 35_000.0,
                in_orders: 5_000.0,
                currency: "USDT".to_string(),
            })
        })
    }
}

/// Store wrapper that fails trade inserts for one bot, leaving everything
/// else working. Drives the fatal-fault path for exactly that bot.
struct FaultyInsertStore {
    inner: SqliteStore,
    poisoned_bot: String,
}

impl BotStore for FaultyInsertStore {
    fn get_bot(&self, bot_id: &str) -> Result<Option<BotAccount>, StoreError> {
        self.inner.get_bot(bot_id)
    }

    fn save_bot(&self, bot: &BotAccount) -> Result<(), StoreError> {
        self.inner.save_bot(bot)
    }

    fn delete_bot(&self, bot_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_bot(bot_id)
    }

    fn bots_for_user(&self, user_id: &str) -> Result<Vec<BotAccount>, StoreError> {
        self.inner.bots_for_user(user_id)
    }

    fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        if trade.bot_id == self.poisoned_bot {
            return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.insert_trade(trade)
    }

    fn trades_for_bot(&self, bot_id: &str, limit: usize) -> Result<Vec<Trade>, StoreError> {
        self.inner.trades_for_bot(bot_id, limit)
    }

    fn executed_trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>, StoreError> {
        self.inner.executed_trades_for_user(user_id)
    }

    fn portfolio_for_user(&self, user_id: &str) -> Result<Option<Portfolio>, StoreError> {
        self.inner.portfolio_for_user(user_id)
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.inner.save_portfolio(portfolio)
    }
}

/// Loop config tuned so tests see many cycles per second.
fn fast_config() -> LoopConfig {
    LoopConfig {
        trade_probability: 1.0,
        min_amount_fraction: 0.1,
        max_amount_fraction: 1.0,
        min_profit_factor: -0.05,
        max_profit_factor: 0.15,
        min_sleep: Duration::from_millis(5),
        max_sleep: Duration::from_millis(10),
        trading_pairs: vec!["BTC/USDT".to_string()],
    }
}

fn scheduler_with(store: Arc<dyn BotStore>, config: LoopConfig) -> (BotScheduler, Arc<ConnectionRegistry>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let broker = Arc::new(AlwaysFillBroker);
    let recorder = Arc::new(TradeRecorder::new(store.clone()));
    let scheduler = BotScheduler::new(store, broker, registry.clone(), recorder, config)
        .with_rng_seed(7);
    (scheduler, registry)
}

fn connect(registry: &ConnectionRegistry, user_id: &str) {
    registry
        .connect(
            user_id,
            BrokerMode::Paper,
            "test-api-key-000000000000",
            "test-api-secret-000000000",
        )
        .unwrap();
}

fn make_bot(store: &dyn BotStore, user_id: &str, name: &str) -> BotAccount {
    let bot = BotAccount::new(
        user_id.to_string(),
        name.to_string(),
        Strategy::GridTrading,
        RiskLevel::Medium,
        5_000.0,
    );
    store.save_bot(&bot).unwrap();
    bot
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_start_unknown_bot_is_not_found() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let (scheduler, _) = scheduler_with(store, fast_config());

    let err = scheduler.start("no-such-bot").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_start_requires_broker_connection() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, _) = scheduler_with(store.clone(), fast_config());

    let err = scheduler.start(&bot.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotConnected(_)));

    // Status untouched by the rejected start.
    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert!(!reloaded.is_active);
    assert_eq!(reloaded.status, botfleet::types::BotStatus::Inactive);
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    let err = scheduler.start(&bot.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyRunning(_)));

    scheduler.stop(&bot.id).await.unwrap();
}

#[tokio::test]
async fn test_start_marks_active_and_loop_trades() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    assert!(scheduler.is_running(&bot.id));

    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert!(reloaded.is_active);
    assert_eq!(reloaded.status, botfleet::types::BotStatus::Active);

    // Every cycle trades with probability 1.0; give the loop a few cycles.
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop(&bot.id).await.unwrap();

    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert!(reloaded.total_trades() > 0);
    assert!(reloaded.last_trade_at().is_some());

    let trades = store.trades_for_bot(&bot.id, 100).unwrap();
    assert_eq!(trades.len() as u64, reloaded.total_trades());
}

#[tokio::test]
async fn test_stop_is_idempotent_and_marks_inactive() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    scheduler.stop(&bot.id).await.unwrap();
    assert!(!scheduler.is_running(&bot.id));

    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert!(!reloaded.is_active);
    assert_eq!(reloaded.status, botfleet::types::BotStatus::Inactive);

    // Stopping again (no registered loop) is fine.
    scheduler.stop(&bot.id).await.unwrap();
}

#[tokio::test]
async fn test_restart_after_stop() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    scheduler.stop(&bot.id).await.unwrap();
    scheduler.start(&bot.id).await.unwrap();
    assert!(scheduler.is_running(&bot.id));

    scheduler.stop(&bot.id).await.unwrap();
}

#[tokio::test]
async fn test_stop_interrupts_long_sleep() {
    // Long sleeps, no trades: the loop parks in its sleep immediately.
    let config = LoopConfig {
        trade_probability: 0.0,
        min_sleep: Duration::from_secs(60),
        max_sleep: Duration::from_secs(120),
        ..fast_config()
    };
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), config);
    connect(&registry, "user-1");

    // The loop task owns one store clone; when the task finishes it drops
    // it, so the refcount falling back to baseline proves the loop exited
    // instead of sleeping out its 60s interval.
    let baseline = Arc::strong_count(&store);
    scheduler.start(&bot.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(Arc::strong_count(&store), baseline + 1);

    let stopped = tokio::time::timeout(Duration::from_secs(1), scheduler.stop(&bot.id)).await;
    assert!(stopped.is_ok());
    assert!(!scheduler.is_running(&bot.id));

    let mut exited = false;
    for _ in 0..100 {
        if Arc::strong_count(&store) == baseline {
            exited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(exited, "loop task did not exit after stop");
}

#[tokio::test]
async fn test_inverted_sleep_bounds_do_not_kill_the_loop() {
    // Misordered bounds degrade to a fixed sleep instead of a panic that
    // would strand the bot as Active with no loop behind it.
    let config = LoopConfig {
        min_sleep: Duration::from_millis(20),
        max_sleep: Duration::from_millis(5),
        ..fast_config()
    };
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), config);
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(scheduler.is_running(&bot.id));
    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert_eq!(reloaded.status, botfleet::types::BotStatus::Active);
    assert!(reloaded.total_trades() > 0);

    scheduler.stop(&bot.id).await.unwrap();
}

#[tokio::test]
async fn test_loop_exits_when_bot_deleted() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&bot.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.delete_bot(&bot.id).unwrap());

    // Next cycle reload finds no bot and the loop winds down, after which
    // a fresh start no longer reports AlreadyRunning.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = scheduler.start(&bot.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// =============================================================================
// Fault isolation
// =============================================================================

#[tokio::test]
async fn test_fatal_fault_flags_only_the_faulty_bot() {
    let inner = SqliteStore::new_in_memory().unwrap();
    let healthy = make_bot(&inner, "user-1", "Healthy");
    let doomed = make_bot(&inner, "user-1", "Doomed");

    let store: Arc<dyn BotStore> = Arc::new(FaultyInsertStore {
        inner,
        poisoned_bot: doomed.id.clone(),
    });
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&healthy.id).await.unwrap();
    scheduler.start(&doomed.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    // The doomed bot's first recorded trade hits the storage fault, the
    // loop exits, and the bot lands in Error.
    let doomed_after = store.get_bot(&doomed.id).unwrap().unwrap();
    assert_eq!(doomed_after.status, botfleet::types::BotStatus::Error);
    assert!(!doomed_after.is_active);
    assert!(!scheduler.is_running(&doomed.id));

    // The healthy bot keeps trading.
    let healthy_after = store.get_bot(&healthy.id).unwrap().unwrap();
    assert_eq!(healthy_after.status, botfleet::types::BotStatus::Active);
    assert!(healthy_after.total_trades() > 0);
    assert!(scheduler.is_running(&healthy.id));

    scheduler.stop_all().await;
}

#[tokio::test]
async fn test_stop_all_clears_every_loop() {
    let store: Arc<dyn BotStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let a = make_bot(store.as_ref(), "user-1", "A");
    let b = make_bot(store.as_ref(), "user-1", "B");
    let (scheduler, registry) = scheduler_with(store.clone(), fast_config());
    connect(&registry, "user-1");

    scheduler.start(&a.id).await.unwrap();
    scheduler.start(&b.id).await.unwrap();
    assert_eq!(scheduler.running_count(), 2);

    scheduler.stop_all().await;
    assert_eq!(scheduler.running_count(), 0);
    assert!(!store.get_bot(&a.id).unwrap().unwrap().is_active);
    assert!(!store.get_bot(&b.id).unwrap().unwrap().is_active);
}
