//! Trade Recorder
//!
//! The only write path for a completed trade. Appends the trade to the
//! ledger and folds the result into the owning bot's counters and the
//! user's portfolio as one logical unit.
//!
//! Same-bot recordings are serialized through a per-bot async mutex so the
//! read-modify-write on counters never interleaves; different bots record
//! independently with no cross-bot blocking.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::store::{BotStore, StoreError};
use crate::types::{Portfolio, Trade, TradeStatus};

/// Recorder errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Trade is not executed: {0}")]
    NotExecuted(String),

    #[error("Bot not found: {0}")]
    BotNotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Sole writer of the trade ledger and of the counter fields on bot
/// accounts and portfolios.
pub struct TradeRecorder {
    store: Arc<dyn BotStore>,
    /// Per-bot serialization of counter updates
    bot_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Per-user serialization of portfolio updates
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TradeRecorder {
    pub fn new(store: Arc<dyn BotStore>) -> Self {
        Self {
            store,
            bot_locks: DashMap::new(),
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(map: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> Arc<Mutex<()>> {
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist an executed trade and update bot and portfolio counters.
    ///
    /// The trade is appended before the bot is re-read; if the bot record
    /// has disappeared in between, the call fails with `BotNotFound` and the
    /// trade remains as an orphaned ledger entry. That is accepted, not
    /// retried.
    pub async fn record(&self, trade: Trade) -> Result<(), RecorderError> {
        if trade.status != TradeStatus::Executed {
            return Err(RecorderError::NotExecuted(trade.id));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let profit_loss = trade.profit_loss;
        let bot_id = trade.bot_id.clone();
        let user_id = trade.user_id.clone();

        {
            let bot_lock = Self::lock_for(&self.bot_locks, &bot_id);
            let _guard = bot_lock.lock().await;

            self.store.insert_trade(&trade)?;

            let mut bot = self
                .store
                .get_bot(&bot_id)?
                .ok_or_else(|| RecorderError::BotNotFound(bot_id.clone()))?;
            bot.apply_trade_result(profit_loss, now);
            self.store.save_bot(&bot)?;
        }

        {
            let user_lock = Self::lock_for(&self.user_locks, &user_id);
            let _guard = user_lock.lock().await;

            let mut portfolio = self
                .store
                .portfolio_for_user(&user_id)?
                .unwrap_or_else(|| Portfolio::new(user_id.clone()));
            portfolio.apply_trade_result(profit_loss, now);
            self.store.save_portfolio(&portfolio)?;
        }

        debug!(
            bot_id,
            trade_id = trade.id,
            profit_loss,
            "Trade recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::SqliteStore;
    use crate::types::{BotAccount, RiskLevel, Strategy, TradeSide};

    fn setup() -> (Arc<SqliteStore>, TradeRecorder, BotAccount) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let bot = BotAccount::new(
            "user-1".to_string(),
            "Recorder Bot".to_string(),
            Strategy::DcaRsi,
            RiskLevel::Low,
            1_000.0,
        );
        store.save_bot(&bot).unwrap();
        let recorder = TradeRecorder::new(store.clone());
        (store, recorder, bot)
    }

    fn executed_trade(bot: &BotAccount, pnl: f64) -> Trade {
        Trade::executed(
            bot.id.clone(),
            bot.user_id.clone(),
            "BTC/USDT".to_string(),
            TradeSide::Buy,
            0.01,
            43_000.0,
            pnl,
            pnl / 430.0,
            Some("SIM_200000".to_string()),
            "DCA + RSI".to_string(),
        )
    }

    #[tokio::test]
    async fn test_record_updates_bot_and_portfolio() {
        let (store, recorder, bot) = setup();

        recorder.record(executed_trade(&bot, 50.0)).await.unwrap();
        recorder.record(executed_trade(&bot, -10.0)).await.unwrap();

        let bot = store.get_bot(&bot.id).unwrap().unwrap();
        assert_eq!(bot.total_trades(), 2);
        assert_eq!(bot.successful_trades(), 1);
        assert_eq!(bot.profit(), 40.0);
        assert_eq!(bot.roi(), 4.0);
        assert!(bot.last_trade_at().is_some());

        let portfolio = store.portfolio_for_user("user-1").unwrap().unwrap();
        assert_eq!(portfolio.total_trades(), 2);
        assert_eq!(portfolio.total_profit_loss, 40.0);

        let trades = store.trades_for_bot(&bot.id, 10).unwrap();
        assert_eq!(trades.len(), 2);
    }

    #[tokio::test]
    async fn test_record_rejects_non_executed_trade() {
        let (store, recorder, bot) = setup();

        let mut trade = executed_trade(&bot, 5.0);
        trade.status = TradeStatus::Pending;
        let err = recorder.record(trade).await.unwrap_err();
        assert!(matches!(err, RecorderError::NotExecuted(_)));

        // Nothing was written.
        assert!(store.trades_for_bot(&bot.id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bot_leaves_orphaned_trade() {
        let (store, recorder, bot) = setup();
        store.delete_bot(&bot.id).unwrap();

        let trade = executed_trade(&bot, 5.0);
        let trade_id = trade.id.clone();
        let err = recorder.record(trade).await.unwrap_err();
        assert!(matches!(err, RecorderError::BotNotFound(_)));

        // The trade was persisted before the bot lookup failed.
        let trades = store.trades_for_bot(&bot.id, 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, trade_id);
    }
}
