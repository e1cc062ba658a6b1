//! Broker Capability
//!
//! The abstract broker interface the trading loops execute against, a
//! paper-trading implementation of it, and the registry of per-user broker
//! connections.
//!
//! Broker mode (paper vs live) is chosen explicitly when a user connects.
//! It is never inferred from the shape of credential strings.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::types::TradeSide;

/// Broker errors.
///
/// `OrderRejected` is a normal business outcome for a trading loop; the
/// other variants are precondition failures surfaced to callers.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("User not connected to broker: {0}")]
    NotConnected(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// How a user's broker connection executes orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    /// Simulated execution against synthetic market data
    Paper,
    /// Real exchange connectivity (not implemented here)
    Live,
}

/// A market quote for one trading pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub pair: String,
    pub price: f64,
    /// 24h change percentage
    pub change_24h: f64,
    /// Quote timestamp (ms)
    pub timestamp: i64,
}

/// Confirmation of an executed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: String,
    pub pair: String,
    pub side: TradeSide,
    pub amount: f64,
    pub price: f64,
    pub total: f64,
    pub fee: f64,
    /// Execution timestamp (ms)
    pub executed_at: i64,
}

/// Account balance snapshot from the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub total_balance: f64,
    pub available_balance: f64,
    pub in_orders: f64,
    pub currency: String,
}

/// Market-quote and order-execution capability consumed by the trading loops.
///
/// `get_quote` returning `None` and `place_order` returning
/// [`BrokerError::OrderRejected`] are both normal, non-exceptional outcomes
/// that a loop handles by skipping the cycle.
pub trait BrokerClient: Send + Sync {
    /// Current quote for a pair, or `None` if no quote is available.
    fn get_quote<'a>(
        &'a self,
        pair: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Quote>> + Send + 'a>>;

    /// Submit an order on behalf of a user.
    fn place_order<'a>(
        &'a self,
        user_id: &'a str,
        pair: &'a str,
        side: TradeSide,
        amount: f64,
        price: f64,
    ) -> Pin<Box<dyn Future<Output = Result<OrderReceipt, BrokerError>> + Send + 'a>>;

    /// Current account balance for a user.
    fn account_balance<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccountBalance, BrokerError>> + Send + 'a>>;
}

/// A user's live broker connection.
#[derive(Debug, Clone)]
struct Connection {
    mode: BrokerMode,
    #[allow(dead_code)]
    api_key: String,
}

/// Owned registry of per-user broker connections.
///
/// Consulted by the scheduler before launching a loop; an unconnected user
/// cannot have running bots.
pub struct ConnectionRegistry {
    connections: DashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a broker connection for a user with an explicitly chosen mode.
    pub fn connect(
        &self,
        user_id: &str,
        mode: BrokerMode,
        api_key: &str,
        api_secret: &str,
    ) -> Result<(), BrokerError> {
        if api_key.len() < 20 || api_secret.len() < 20 {
            return Err(BrokerError::InvalidCredentials);
        }

        self.connections.insert(
            user_id.to_string(),
            Connection {
                mode,
                api_key: api_key.to_string(),
            },
        );
        info!(user_id, ?mode, "Broker connection registered");
        Ok(())
    }

    /// Drop a user's connection. Dropping an absent connection is a no-op.
    pub fn disconnect(&self, user_id: &str) {
        if self.connections.remove(user_id).is_some() {
            info!(user_id, "Broker connection removed");
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn mode_for(&self, user_id: &str) -> Option<BrokerMode> {
        self.connections.get(user_id).map(|c| c.mode)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference prices the simulated market jitters around.
const BASE_PRICES: &[(&str, f64)] = &[
    ("BTC/USDT", 43_250.0),
    ("ETH/USDT", 2_580.0),
    ("ADA/USDT", 0.485),
    ("DOT/USDT", 7.85),
    ("MATIC/USDT", 0.92),
    ("AVAX/USDT", 39.67),
];

/// Fraction of simulated orders that execute successfully.
const ORDER_SUCCESS_RATE: f64 = 0.85;

/// Trading fee applied to simulated executions.
const FEE_RATE: f64 = 0.001;

/// Paper-trading broker: synthetic quotes within ±5% of fixed base prices,
/// probabilistic order rejection, and jittered account balances.
pub struct SimulatedBroker {
    registry: std::sync::Arc<ConnectionRegistry>,
    rng: Mutex<StdRng>,
}

impl SimulatedBroker {
    pub fn new(registry: std::sync::Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_seed(registry: std::sync::Arc<ConnectionRegistry>, seed: u64) -> Self {
        Self {
            registry,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn quote_sync(&self, pair: &str) -> Option<Quote> {
        let base = BASE_PRICES
            .iter()
            .find(|(p, _)| *p == pair)
            .map(|(_, price)| *price)?;

        let change = self.rng.lock().unwrap().gen_range(-5.0..5.0);
        let price = base * (1.0 + change / 100.0);

        Some(Quote {
            pair: pair.to_string(),
            price,
            change_24h: change,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn order_sync(
        &self,
        user_id: &str,
        pair: &str,
        side: TradeSide,
        amount: f64,
        price: f64,
    ) -> Result<OrderReceipt, BrokerError> {
        if !self.registry.is_connected(user_id) {
            return Err(BrokerError::NotConnected(user_id.to_string()));
        }

        let (accepted, order_id) = {
            let mut rng = self.rng.lock().unwrap();
            (
                rng.gen_bool(ORDER_SUCCESS_RATE),
                format!("SIM_{}", rng.gen_range(100_000..1_000_000)),
            )
        };

        if !accepted {
            return Err(BrokerError::OrderRejected(format!(
                "simulated venue rejected {pair} order"
            )));
        }

        let total = amount * price;
        Ok(OrderReceipt {
            order_id,
            pair: pair.to_string(),
            side,
            amount,
            price,
            total,
            fee: total * FEE_RATE,
            executed_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn balance_sync(&self, user_id: &str) -> Result<AccountBalance, BrokerError> {
        if !self.registry.is_connected(user_id) {
            return Err(BrokerError::NotConnected(user_id.to_string()));
        }

        let mut rng = self.rng.lock().unwrap();
        Ok(AccountBalance {
            total_balance: rng.gen_range(5_000.0..50_000.0),
            available_balance: rng.gen_range(3_000.0..30_000.0),
            in_orders: rng.gen_range(1_000.0..10_000.0),
            currency: "USDT".to_string(),
        })
    }
}

impl BrokerClient for SimulatedBroker {
    fn get_quote<'a>(
        &'a self,
        pair: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Quote>> + Send + 'a>> {
        Box::pin(async move { self.quote_sync(pair) })
    }

    fn place_order<'a>(
        &'a self,
        user_id: &'a str,
        pair: &'a str,
        side: TradeSide,
        amount: f64,
        price: f64,
    ) -> Pin<Box<dyn Future<Output = Result<OrderReceipt, BrokerError>> + Send + 'a>> {
        Box::pin(async move { self.order_sync(user_id, pair, side, amount, price) })
    }

    fn account_balance<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AccountBalance, BrokerError>> + Send + 'a>> {
        Box::pin(async move { self.balance_sync(user_id) })
    }
}
