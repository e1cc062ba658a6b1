//! Botfleet - Autonomous paper-trading bot fleet with supervised control loops

pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use config::{Config, LoopConfig};
pub use error::{AppError, Result};
