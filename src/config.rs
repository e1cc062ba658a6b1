use std::env;
use std::time::Duration;

/// Timing and decision parameters for a bot's trading loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Probability of placing a trade in any given cycle (0.0 - 1.0).
    pub trade_probability: f64,
    /// Lower bound on the trade size as a fraction of max_investment_per_trade.
    pub min_amount_fraction: f64,
    /// Upper bound on the trade size as a fraction of max_investment_per_trade.
    pub max_amount_fraction: f64,
    /// Lower bound of the simulated profit factor per trade.
    pub min_profit_factor: f64,
    /// Upper bound of the simulated profit factor per trade.
    pub max_profit_factor: f64,
    /// Minimum sleep between cycles.
    pub min_sleep: Duration,
    /// Maximum sleep between cycles.
    pub max_sleep: Duration,
    /// Candidate trading pairs, one picked uniformly per trade.
    pub trading_pairs: Vec<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            trade_probability: 0.30,
            min_amount_fraction: 0.1,
            max_amount_fraction: 1.0,
            min_profit_factor: -0.05,
            max_profit_factor: 0.15,
            min_sleep: Duration::from_secs(30),
            max_sleep: Duration::from_secs(300),
            trading_pairs: vec![
                "BTC/USDT".to_string(),
                "ETH/USDT".to_string(),
                "ADA/USDT".to_string(),
                "DOT/USDT".to_string(),
            ],
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Trading loop parameters shared by all bots.
    pub loop_config: LoopConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let db_path = env::var("BOTFLEET_DB").unwrap_or_else(|_| "botfleet.db".to_string());

        let mut loop_config = LoopConfig::default();
        if let Ok(p) = env::var("BOTFLEET_TRADE_PROBABILITY") {
            if let Ok(p) = p.parse::<f64>() {
                loop_config.trade_probability = p.clamp(0.0, 1.0);
            }
        }
        if let Ok(s) = env::var("BOTFLEET_MIN_SLEEP_SECS") {
            if let Ok(s) = s.parse::<u64>() {
                loop_config.min_sleep = Duration::from_secs(s);
            }
        }
        if let Ok(s) = env::var("BOTFLEET_MAX_SLEEP_SECS") {
            if let Ok(s) = s.parse::<u64>() {
                loop_config.max_sleep = Duration::from_secs(s);
            }
        }
        // The sleep bounds form a sampling range and must stay ordered.
        if loop_config.min_sleep > loop_config.max_sleep {
            loop_config.max_sleep = loop_config.min_sleep;
        }

        Self {
            db_path,
            loop_config,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "botfleet.db".to_string(),
            loop_config: LoopConfig::default(),
        }
    }
}
