//! Portfolio Service
//!
//! Read-side aggregation for users (holdings, performance summaries) plus
//! portfolio synchronization against the broker's account balance.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::services::broker::{BrokerClient, ConnectionRegistry};
use crate::services::ledger;
use crate::services::store::BotStore;
use crate::types::{AssetHolding, BotPerformance, Portfolio, PortfolioSummary};

/// Number of trades returned in "recent trades" views.
const RECENT_TRADES: usize = 10;

pub struct PortfolioService {
    store: Arc<dyn BotStore>,
    broker: Arc<dyn BrokerClient>,
    registry: Arc<ConnectionRegistry>,
}

impl PortfolioService {
    pub fn new(
        store: Arc<dyn BotStore>,
        broker: Arc<dyn BrokerClient>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            store,
            broker,
            registry,
        }
    }

    /// Load the user's portfolio, creating the default one on first access.
    pub fn portfolio_for_user(&self, user_id: &str) -> Result<Portfolio, AppError> {
        if let Some(portfolio) = self.store.portfolio_for_user(user_id)? {
            return Ok(portfolio);
        }

        let portfolio = Portfolio::new(user_id.to_string());
        self.store.save_portfolio(&portfolio)?;
        debug!(user_id, "Created default portfolio");
        Ok(portfolio)
    }

    /// Refresh portfolio balances from the broker account snapshot.
    pub async fn sync_with_broker(&self, user_id: &str) -> Result<Portfolio, AppError> {
        if !self.registry.is_connected(user_id) {
            return Err(AppError::NotConnected(user_id.to_string()));
        }

        let balance = self.broker.account_balance(user_id).await?;
        let mut portfolio = self.portfolio_for_user(user_id)?;
        portfolio.apply_balance(
            balance.total_balance,
            balance.available_balance,
            balance.in_orders,
            chrono::Utc::now().timestamp_millis(),
        );
        self.store.save_portfolio(&portfolio)?;

        info!(user_id, total = portfolio.total_balance, "Portfolio synced");
        Ok(portfolio)
    }

    /// Current asset holdings, derived from the executed trade history and
    /// priced with live quotes.
    pub async fn holdings_for_user(&self, user_id: &str) -> Result<Vec<AssetHolding>, AppError> {
        let trades = self.store.executed_trades_for_user(user_id)?;
        let totals = ledger::accumulate(&trades);

        let mut prices: HashMap<String, f64> = HashMap::new();
        for total in totals.iter().filter(|t| t.amount > 0.0) {
            let pair = format!("{}/USDT", total.symbol);
            if let Some(quote) = self.broker.get_quote(&pair).await {
                prices.insert(total.symbol.clone(), quote.price);
            }
        }

        Ok(ledger::holdings(&totals, |symbol| {
            prices.get(symbol).copied()
        }))
    }

    /// Aggregate trading performance across all of the user's bots.
    pub fn performance(&self, user_id: &str) -> Result<PortfolioSummary, AppError> {
        let trades = self.store.executed_trades_for_user(user_id)?;
        let portfolio = self.portfolio_for_user(user_id)?;

        let total_trades = trades.len() as u64;
        let profitable_trades = trades.iter().filter(|t| t.profit_loss > 0.0).count() as u64;
        let total_profit_loss: f64 = trades.iter().map(|t| t.profit_loss).sum();
        let total_volume: f64 = trades.iter().map(|t| t.total_value).sum();
        let win_rate = if total_trades > 0 {
            profitable_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let recent_trades = trades
            .iter()
            .rev()
            .take(RECENT_TRADES)
            .cloned()
            .collect();

        Ok(PortfolioSummary {
            user_id: user_id.to_string(),
            total_trades,
            profitable_trades,
            win_rate,
            total_profit_loss,
            total_volume,
            current_balance: portfolio.total_balance,
            roi: portfolio.total_profit_percentage,
            recent_trades,
        })
    }

    /// Read-only performance snapshot for one bot, using the bot record's
    /// all-trades counters as the canonical source.
    pub fn bot_performance(&self, bot_id: &str) -> Result<BotPerformance, AppError> {
        let bot = self
            .store
            .get_bot(bot_id)?
            .ok_or_else(|| AppError::NotFound(format!("bot {bot_id}")))?;
        let recent_trades = self.store.trades_for_bot(bot_id, RECENT_TRADES)?;

        Ok(BotPerformance {
            bot_id: bot.id.clone(),
            total_trades: bot.total_trades(),
            successful_trades: bot.successful_trades(),
            accuracy: bot.accuracy(),
            total_profit: bot.profit(),
            roi: bot.roi(),
            recent_trades,
        })
    }
}
