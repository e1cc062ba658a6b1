//! Integration tests for concurrent trade recording
//!
//! The recorder serializes writes per bot and per user, so counters on the
//! bot record and the portfolio must equal the sums over the trade ledger
//! no matter how many tasks record at once.

use botfleet::services::{BotStore, SqliteStore, TradeRecorder};
use botfleet::types::{BotAccount, RiskLevel, Strategy, Trade, TradeSide};
use std::sync::Arc;

fn make_bot(store: &dyn BotStore, user_id: &str, name: &str) -> BotAccount {
    let bot = BotAccount::new(
        user_id.to_string(),
        name.to_string(),
        Strategy::HighFrequency,
        RiskLevel::High,
        10_000.0,
    );
    store.save_bot(&bot).unwrap();
    bot
}

fn executed_trade(bot: &BotAccount, profit_loss: f64) -> Trade {
    Trade::executed(
        bot.id.clone(),
        bot.user_id.clone(),
        "BTC/USDT".to_string(),
        TradeSide::Buy,
        0.01,
        50_000.0,
        profit_loss,
        profit_loss / 500.0,
        None,
        bot.strategy.display_name().to_string(),
    )
}

#[tokio::test]
async fn test_concurrent_records_never_lose_updates() {
    let store: Arc<SqliteStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let bot = make_bot(store.as_ref(), "user-1", "Bot");
    let recorder = Arc::new(TradeRecorder::new(store.clone()));

    // 50 concurrent recorders against one bot, alternating wins and losses.
    let n = 50;
    let mut handles = Vec::with_capacity(n);
    for i in 0..n {
        let recorder = recorder.clone();
        let pnl = if i % 2 == 0 { 10.0 } else { -4.0 };
        let trade = executed_trade(&bot, pnl);
        handles.push(tokio::spawn(async move { recorder.record(trade).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let reloaded = store.get_bot(&bot.id).unwrap().unwrap();
    assert_eq!(reloaded.total_trades(), n as u64);
    assert_eq!(reloaded.successful_trades(), 25);
    assert!((reloaded.profit() - (25.0 * 10.0 - 25.0 * 4.0)).abs() < 1e-9);
    assert!((reloaded.accuracy() - 50.0).abs() < 1e-9);

    let trades = store.trades_for_bot(&bot.id, 100).unwrap();
    assert_eq!(trades.len(), n);

    // The user's portfolio saw every profit delta exactly once.
    let portfolio = store.portfolio_for_user("user-1").unwrap().unwrap();
    assert_eq!(portfolio.total_trades(), n as u64);
    assert!((portfolio.total_profit_loss - 150.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_bots_record_independently() {
    let store: Arc<SqliteStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
    let a = make_bot(store.as_ref(), "user-1", "A");
    let b = make_bot(store.as_ref(), "user-2", "B");
    let recorder = Arc::new(TradeRecorder::new(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let recorder_a = recorder.clone();
        let trade_a = executed_trade(&a, 5.0);
        handles.push(tokio::spawn(async move { recorder_a.record(trade_a).await }));

        let recorder_b = recorder.clone();
        let trade_b = executed_trade(&b, -2.0);
        handles.push(tokio::spawn(async move { recorder_b.record(trade_b).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let a_after = store.get_bot(&a.id).unwrap().unwrap();
    assert_eq!(a_after.total_trades(), 10);
    assert!((a_after.profit() - 50.0).abs() < 1e-9);

    let b_after = store.get_bot(&b.id).unwrap().unwrap();
    assert_eq!(b_after.total_trades(), 10);
    assert!((b_after.profit() + 20.0).abs() < 1e-9);
    assert_eq!(b_after.successful_trades(), 0);

    // Per-user portfolios stay disjoint.
    let p1 = store.portfolio_for_user("user-1").unwrap().unwrap();
    let p2 = store.portfolio_for_user("user-2").unwrap().unwrap();
    assert!((p1.total_profit_loss - 50.0).abs() < 1e-9);
    assert!((p2.total_profit_loss + 20.0).abs() < 1e-9);
}
