//! Trade Types
//!
//! Append-only execution records. A trade is created by the recorder around
//! a broker call and never mutated after it reaches `Executed`.

use serde::{Deserialize, Serialize};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Sign applied to quantities when accumulating positions.
    pub fn sign(&self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

/// Execution status of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

/// One executed (or attempted) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Unique trade ID
    pub id: String,
    /// Bot that produced this trade
    pub bot_id: String,
    /// Owning user ID
    pub user_id: String,
    /// Trading pair, e.g. "BTC/USDT"
    pub trading_pair: String,
    /// Buy or sell
    pub side: TradeSide,
    /// Quantity in base-asset units
    pub amount: f64,
    /// Execution price in the quote asset
    pub price: f64,
    /// amount * price
    pub total_value: f64,
    /// Realized profit or loss
    pub profit_loss: f64,
    /// Profit as a percentage of the trade value
    pub profit_percentage: f64,
    /// Execution status
    pub status: TradeStatus,
    /// Broker order reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    /// Strategy tag of the bot at execution time
    pub strategy_used: String,
    /// When the trade record was created (ms)
    pub created_at: i64,
    /// When the trade executed (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<i64>,
}

impl Trade {
    /// Create an executed trade record. `total_value` is derived from
    /// amount and price, and `executed_at` is set immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn executed(
        bot_id: String,
        user_id: String,
        trading_pair: String,
        side: TradeSide,
        amount: f64,
        price: f64,
        profit_loss: f64,
        profit_percentage: f64,
        broker_order_id: Option<String>,
        strategy_used: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bot_id,
            user_id,
            trading_pair,
            side,
            amount,
            price,
            total_value: amount * price,
            profit_loss,
            profit_percentage,
            status: TradeStatus::Executed,
            broker_order_id,
            strategy_used,
            created_at: now,
            executed_at: Some(now),
        }
    }

    /// Base symbol of the trading pair ("BTC" from "BTC/USDT").
    pub fn base_symbol(&self) -> &str {
        self.trading_pair
            .split('/')
            .next()
            .unwrap_or(&self.trading_pair)
    }
}
