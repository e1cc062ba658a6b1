//! Bot Account Types
//!
//! The persisted state of one trading bot: configuration plus the live
//! performance counters maintained by the trade recorder.

use serde::{Deserialize, Serialize};

use super::trade::Trade;

/// Lifecycle status of a trading bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    /// Bot is active and its control loop is (or should be) running
    Active,
    /// Bot is not running
    Inactive,
    /// Bot is temporarily paused by the user
    Paused,
    /// Bot's loop hit an internal fault and terminated
    Error,
}

/// Risk tier selected at bot creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Trading strategy tag attached to a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    GridTrading,
    DcaRsi,
    MomentumTrading,
    HighFrequency,
    CrossExchange,
    MachineLearning,
}

impl Strategy {
    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::GridTrading => "Grid Trading",
            Strategy::DcaRsi => "DCA + RSI",
            Strategy::MomentumTrading => "Momentum Trading",
            Strategy::HighFrequency => "High Frequency",
            Strategy::CrossExchange => "Cross Exchange",
            Strategy::MachineLearning => "Machine Learning",
        }
    }
}

/// A trading bot account: configuration plus running performance counters.
///
/// The counter fields are private on purpose. The only mutation path is
/// [`BotAccount::apply_trade_result`], which is crate-internal and called
/// exclusively by the trade recorder, so counters cannot drift out of sync
/// with the trade ledger through ad-hoc writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotAccount {
    /// Unique bot ID
    pub id: String,
    /// Owning user ID
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Trading strategy tag
    pub strategy: Strategy,
    /// Risk tier
    pub risk_level: RiskLevel,
    /// Whether a control loop should be running for this bot
    pub is_active: bool,
    /// Lifecycle status
    pub status: BotStatus,

    /// Cumulative profit across all recorded trades
    profit: f64,
    /// Profit as a percentage of the initial investment
    roi: f64,
    /// Percentage of recorded trades with positive profit
    accuracy: f64,
    /// Total recorded trades
    total_trades: u64,
    /// Recorded trades with positive profit
    successful_trades: u64,

    /// Capital allocated to the bot
    pub initial_investment: f64,
    /// Upper bound on the quote value of a single trade
    pub max_investment_per_trade: f64,
    /// Stop-loss percentage configured for the bot
    pub stop_loss_percentage: f64,
    /// Take-profit percentage configured for the bot
    pub take_profit_percentage: f64,

    /// When the bot was created (ms)
    pub created_at: i64,
    /// When the bot was last updated (ms)
    pub updated_at: i64,
    /// When the bot last recorded a trade (ms)
    last_trade_at: Option<i64>,
}

impl BotAccount {
    /// Create a new inactive bot for a user.
    pub fn new(
        user_id: String,
        name: String,
        strategy: Strategy,
        risk_level: RiskLevel,
        initial_investment: f64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            name,
            strategy,
            risk_level,
            is_active: false,
            status: BotStatus::Inactive,
            profit: 0.0,
            roi: 0.0,
            accuracy: 0.0,
            total_trades: 0,
            successful_trades: 0,
            initial_investment,
            max_investment_per_trade: 100.0,
            stop_loss_percentage: 5.0,
            take_profit_percentage: 10.0,
            created_at: now,
            updated_at: now,
            last_trade_at: None,
        }
    }

    /// Cumulative profit across all recorded trades.
    pub fn profit(&self) -> f64 {
        self.profit
    }

    /// Profit as a percentage of initial investment (0 when no capital).
    pub fn roi(&self) -> f64 {
        self.roi
    }

    /// Percentage of recorded trades that were profitable (0 when no trades).
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Total recorded trades.
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    /// Recorded trades with positive profit.
    pub fn successful_trades(&self) -> u64 {
        self.successful_trades
    }

    /// When the bot last recorded a trade (ms).
    pub fn last_trade_at(&self) -> Option<i64> {
        self.last_trade_at
    }

    /// Fold one completed trade into the performance counters.
    ///
    /// Maintains the counter invariants: `successful_trades <= total_trades`,
    /// `accuracy = successful / total * 100` (0 when no trades), and
    /// `roi = profit / initial_investment * 100` (0 when no capital).
    pub(crate) fn apply_trade_result(&mut self, profit_loss: f64, now_ms: i64) {
        self.profit += profit_loss;
        self.total_trades += 1;
        if profit_loss > 0.0 {
            self.successful_trades += 1;
        }
        self.accuracy = if self.total_trades > 0 {
            self.successful_trades as f64 / self.total_trades as f64 * 100.0
        } else {
            0.0
        };
        self.roi = if self.initial_investment > 0.0 {
            self.profit / self.initial_investment * 100.0
        } else {
            0.0
        };
        self.last_trade_at = Some(now_ms);
        self.updated_at = now_ms;
    }

    /// Mark the bot active. Exactly one status transition per scheduler start.
    pub(crate) fn mark_active(&mut self) {
        self.is_active = true;
        self.status = BotStatus::Active;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Mark the bot inactive. Exactly one status transition per scheduler stop.
    pub(crate) fn mark_inactive(&mut self) {
        self.is_active = false;
        self.status = BotStatus::Inactive;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Mark the bot as errored after a fatal loop fault. The active flag is
    /// cleared so the loop's deactivation check also observes the failure.
    pub(crate) fn mark_errored(&mut self) {
        self.is_active = false;
        self.status = BotStatus::Error;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// Read-only performance snapshot for one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPerformance {
    pub bot_id: String,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub accuracy: f64,
    pub total_profit: f64,
    pub roi: f64,
    pub recent_trades: Vec<Trade>,
}
