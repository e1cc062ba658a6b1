//! Portfolio Types
//!
//! Per-user aggregate balances and the derived asset holdings view.

use serde::{Deserialize, Serialize};

use super::trade::Trade;

/// A user's net position in one asset, derived from executed trade history.
/// Never persisted; recomputed per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHolding {
    /// Base asset symbol, e.g. "BTC"
    pub symbol: String,
    /// Net amount held (buys minus sells)
    pub amount: f64,
    /// Cost-basis weighted average entry price
    pub average_price: f64,
    /// Current market price
    pub current_price: f64,
    /// amount * current_price
    pub total_value: f64,
    /// Unrealized profit versus cost basis
    pub profit_loss: f64,
    /// Profit as a percentage of cost basis
    pub profit_percentage: f64,
}

/// Per-user portfolio: balances plus aggregate performance counters.
///
/// Like [`super::bot::BotAccount`], the trade counters are private and only
/// mutated through the recorder's write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// Unique portfolio ID
    pub id: String,
    /// Owning user ID
    pub user_id: String,

    /// Total account balance
    pub total_balance: f64,
    /// Balance available for new orders
    pub available_balance: f64,
    /// Balance locked in open orders
    pub in_orders: f64,
    /// Capital the user started with
    pub initial_investment: f64,

    /// Cumulative profit or loss
    pub total_profit_loss: f64,
    /// Cumulative profit as a percentage of initial investment
    pub total_profit_percentage: f64,
    /// Profit or loss for the current day
    pub daily_profit_loss: f64,
    /// Daily profit as a percentage
    pub daily_profit_percentage: f64,

    /// Total recorded trades across all of the user's bots
    total_trades: u64,
    /// Recorded trades with positive profit
    successful_trades: u64,
    /// Percentage of recorded trades that were profitable
    accuracy: f64,

    /// When the portfolio was created (ms)
    pub created_at: i64,
    /// When the portfolio was last updated (ms)
    pub updated_at: i64,
}

impl Portfolio {
    /// Create a portfolio with the default paper-trading balances.
    pub fn new(user_id: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            total_balance: 40_000.0,
            available_balance: 35_000.0,
            in_orders: 5_000.0,
            initial_investment: 40_000.0,
            total_profit_loss: 0.0,
            total_profit_percentage: 0.0,
            daily_profit_loss: 0.0,
            daily_profit_percentage: 0.0,
            total_trades: 0,
            successful_trades: 0,
            accuracy: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total recorded trades across the user's bots.
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    /// Recorded trades with positive profit.
    pub fn successful_trades(&self) -> u64 {
        self.successful_trades
    }

    /// Percentage of recorded trades that were profitable.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Fold one completed trade into the user-level counters and balances.
    pub(crate) fn apply_trade_result(&mut self, profit_loss: f64, now_ms: i64) {
        self.total_trades += 1;
        if profit_loss > 0.0 {
            self.successful_trades += 1;
        }
        self.accuracy = if self.total_trades > 0 {
            self.successful_trades as f64 / self.total_trades as f64 * 100.0
        } else {
            0.0
        };
        self.total_profit_loss += profit_loss;
        self.total_balance += profit_loss;
        self.available_balance += profit_loss;
        self.daily_profit_loss += profit_loss;
        self.recompute_percentages();
        self.updated_at = now_ms;
    }

    /// Overwrite balances from a broker account snapshot.
    pub(crate) fn apply_balance(
        &mut self,
        total: f64,
        available: f64,
        in_orders: f64,
        now_ms: i64,
    ) {
        self.total_balance = total;
        self.available_balance = available;
        self.in_orders = in_orders;
        self.total_profit_loss = self.total_balance - self.initial_investment;
        self.recompute_percentages();
        self.updated_at = now_ms;
    }

    fn recompute_percentages(&mut self) {
        if self.initial_investment > 0.0 {
            self.total_profit_percentage =
                self.total_profit_loss / self.initial_investment * 100.0;
            self.daily_profit_percentage =
                self.daily_profit_loss / self.initial_investment * 100.0;
        } else {
            self.total_profit_percentage = 0.0;
            self.daily_profit_percentage = 0.0;
        }
    }
}

/// Aggregate performance summary for a user's trade history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub user_id: String,
    pub total_trades: u64,
    pub profitable_trades: u64,
    pub win_rate: f64,
    pub total_profit_loss: f64,
    pub total_volume: f64,
    pub current_balance: f64,
    pub roi: f64,
    pub recent_trades: Vec<Trade>,
}
