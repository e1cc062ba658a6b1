use thiserror::Error;

use crate::services::broker::BrokerError;
use crate::services::store::StoreError;

/// Application error types.
///
/// Precondition failures (`AlreadyRunning`, `NotConnected`, `NotFound`) are
/// returned synchronously to callers of the scheduler/recorder and never
/// terminate a running loop.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bot is already running: {0}")]
    AlreadyRunning(String),

    #[error("User has no broker connection: {0}")]
    NotConnected(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
