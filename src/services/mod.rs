pub mod broker;
pub mod ledger;
pub mod portfolio;
pub mod recorder;
pub mod scheduler;
pub mod store;

pub use broker::{
    AccountBalance, BrokerClient, BrokerError, BrokerMode, ConnectionRegistry, OrderReceipt,
    Quote, SimulatedBroker,
};
pub use ledger::PositionTotals;
pub use portfolio::PortfolioService;
pub use recorder::{RecorderError, TradeRecorder};
pub use scheduler::BotScheduler;
pub use store::{BotStore, SqliteStore, StoreError};
