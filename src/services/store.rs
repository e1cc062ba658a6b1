//! SQLite-backed document store for bots, trades, and portfolios.
//!
//! Records are stored as JSON documents with a few indexed key columns,
//! and every save is a full-document upsert. The [`BotStore`] trait is the
//! seam the rest of the system talks to, so tests can substitute a faulty
//! or instrumented store.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{BotAccount, Portfolio, Trade, TradeStatus};

/// Document store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Load/save capability for bot accounts, the append-only trade ledger, and
/// per-user portfolios. Keyed by bot ID / user ID; saves are full-document
/// upserts.
pub trait BotStore: Send + Sync {
    fn get_bot(&self, bot_id: &str) -> Result<Option<BotAccount>, StoreError>;
    fn save_bot(&self, bot: &BotAccount) -> Result<(), StoreError>;
    fn delete_bot(&self, bot_id: &str) -> Result<bool, StoreError>;
    fn bots_for_user(&self, user_id: &str) -> Result<Vec<BotAccount>, StoreError>;

    /// Append a trade to the ledger. Trades are never updated afterwards.
    fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;
    /// Trades for a bot, newest first, up to `limit`.
    fn trades_for_bot(&self, bot_id: &str, limit: usize) -> Result<Vec<Trade>, StoreError>;
    /// All executed trades for a user, oldest first.
    fn executed_trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>, StoreError>;

    fn portfolio_for_user(&self, user_id: &str) -> Result<Option<Portfolio>, StoreError>;
    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError>;
}

/// SQLite implementation of [`BotStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bots_user_id ON bots(user_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_bot_id ON trades(bot_id, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_status ON trades(user_id, status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolios (
                user_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    fn status_tag(status: TradeStatus) -> &'static str {
        match status {
            TradeStatus::Pending => "pending",
            TradeStatus::Executed => "executed",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Failed => "failed",
        }
    }
}

impl BotStore for SqliteStore {
    fn get_bot(&self, bot_id: &str) -> Result<Option<BotAccount>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM bots WHERE id = ?1",
                params![bot_id],
                |row| row.get(0),
            )
            .optional()?;

        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn save_bot(&self, bot: &BotAccount) -> Result<(), StoreError> {
        let doc = serde_json::to_string(bot)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO bots (id, user_id, updated_at, doc)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                updated_at = excluded.updated_at,
                doc = excluded.doc",
            params![bot.id, bot.user_id, bot.updated_at, doc],
        )?;
        Ok(())
    }

    fn delete_bot(&self, bot_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM bots WHERE id = ?1", params![bot_id])?;
        Ok(deleted > 0)
    }

    fn bots_for_user(&self, user_id: &str) -> Result<Vec<BotAccount>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT doc FROM bots WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

        let mut bots = Vec::new();
        for doc in rows {
            bots.push(serde_json::from_str(&doc?)?);
        }
        Ok(bots)
    }

    fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let doc = serde_json::to_string(trade)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO trades (id, bot_id, user_id, status, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                trade.id,
                trade.bot_id,
                trade.user_id,
                Self::status_tag(trade.status),
                trade.created_at,
                doc
            ],
        )?;
        Ok(())
    }

    fn trades_for_bot(&self, bot_id: &str, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT doc FROM trades WHERE bot_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![bot_id, limit as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut trades = Vec::new();
        for doc in rows {
            trades.push(serde_json::from_str(&doc?)?);
        }
        Ok(trades)
    }

    fn executed_trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT doc FROM trades
             WHERE user_id = ?1 AND status = 'executed'
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

        let mut trades = Vec::new();
        for doc in rows {
            trades.push(serde_json::from_str(&doc?)?);
        }
        Ok(trades)
    }

    fn portfolio_for_user(&self, user_id: &str) -> Result<Option<Portfolio>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM portfolios WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let doc = serde_json::to_string(portfolio)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO portfolios (user_id, doc) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET doc = excluded.doc",
            params![portfolio.user_id, doc],
        )?;
        Ok(())
    }
}
