//! Bot Scheduler
//!
//! Owns the set of running per-bot control loops: starts them, stops them,
//! and supervises their lifetime. Each loop is a spawned tokio task with a
//! retained cancellation handle, so `stop` is deterministic rather than
//! fire-and-forget. At most one loop runs per bot ID at any time.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::LoopConfig;
use crate::error::AppError;
use crate::services::broker::{BrokerClient, BrokerError, ConnectionRegistry};
use crate::services::recorder::{RecorderError, TradeRecorder};
use crate::services::store::BotStore;
use crate::types::{BotAccount, Trade, TradeSide};

/// Supervision handle for one running loop.
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Manages the registry of running trading loops.
pub struct BotScheduler {
    store: Arc<dyn BotStore>,
    broker: Arc<dyn BrokerClient>,
    registry: Arc<ConnectionRegistry>,
    recorder: Arc<TradeRecorder>,
    loop_config: LoopConfig,
    /// Running loops keyed by bot ID
    loops: DashMap<String, LoopHandle>,
    /// Fixed RNG seed for deterministic loops (tests); entropy when unset
    rng_seed: Option<u64>,
}

impl BotScheduler {
    pub fn new(
        store: Arc<dyn BotStore>,
        broker: Arc<dyn BrokerClient>,
        registry: Arc<ConnectionRegistry>,
        recorder: Arc<TradeRecorder>,
        loop_config: LoopConfig,
    ) -> Self {
        Self {
            store,
            broker,
            registry,
            recorder,
            loop_config,
            loops: DashMap::new(),
            rng_seed: None,
        }
    }

    /// Seed every spawned loop's RNG for reproducible behavior in tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Launch the control loop for a bot.
    ///
    /// Fails with `AlreadyRunning` if a loop is registered for the bot,
    /// `NotFound` if the bot record does not exist, and `NotConnected` if
    /// the owning user has no broker connection. On success the bot's status
    /// transitions to Active (the single status write of this call) and the
    /// loop task is spawned and registered.
    pub async fn start(&self, bot_id: &str) -> Result<(), AppError> {
        if let Some(handle) = self.loops.get(bot_id) {
            if !handle.join.is_finished() {
                return Err(AppError::AlreadyRunning(bot_id.to_string()));
            }
            // Loop exited on its own (deactivation or fault); clear the
            // stale handle and allow the restart.
            drop(handle);
            self.loops.remove(bot_id);
        }

        let mut bot = self
            .store
            .get_bot(bot_id)?
            .ok_or_else(|| AppError::NotFound(format!("bot {bot_id}")))?;

        if !self.registry.is_connected(&bot.user_id) {
            return Err(AppError::NotConnected(bot.user_id.clone()));
        }

        bot.mark_active();
        self.store.save_bot(&bot)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let trading_loop = TradingLoop {
            bot_id: bot.id.clone(),
            user_id: bot.user_id.clone(),
            store: self.store.clone(),
            broker: self.broker.clone(),
            recorder: self.recorder.clone(),
            config: self.loop_config.clone(),
            rng,
        };
        let join = tokio::spawn(trading_loop.run(shutdown_rx));

        match self.loops.entry(bot_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(LoopHandle {
                    shutdown: shutdown_tx,
                    join,
                });
                info!(bot_id, "Bot loop started");
                Ok(())
            }
            Entry::Occupied(_) => {
                // Lost a start race; cancel the loop we just spawned.
                let _ = shutdown_tx.send(true);
                Err(AppError::AlreadyRunning(bot_id.to_string()))
            }
        }
    }

    /// Signal the bot's loop to stop and deregister it.
    ///
    /// Idempotent: stopping a bot without a registered loop is not an
    /// error. Does not wait for the loop to exit; the loop observes the
    /// signal at its next cycle boundary or mid-sleep. The bot's status
    /// transitions to Inactive (the single status write of this call).
    pub async fn stop(&self, bot_id: &str) -> Result<(), AppError> {
        if let Some((_, handle)) = self.loops.remove(bot_id) {
            let _ = handle.shutdown.send(true);
            info!(bot_id, "Bot loop stop requested");
        }

        if let Some(mut bot) = self.store.get_bot(bot_id)? {
            bot.mark_inactive();
            self.store.save_bot(&bot)?;
        }
        Ok(())
    }

    /// Cancel every registered loop. Used at process shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        for bot_id in ids {
            if let Err(e) = self.stop(&bot_id).await {
                warn!(bot_id, error = %e, "Failed to stop bot during shutdown");
            }
        }
    }

    /// Whether a loop is currently registered and alive for this bot.
    pub fn is_running(&self, bot_id: &str) -> bool {
        self.loops
            .get(bot_id)
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    /// Number of registered loops (including any that exited on their own
    /// and have not been reaped yet).
    pub fn running_count(&self) -> usize {
        self.loops.len()
    }
}

enum CycleOutcome {
    /// Cycle finished; keep looping
    Continue,
    /// Bot was deactivated or deleted; exit without error
    Deactivated,
}

/// Per-bot control loop: decide, maybe trade, record, sleep, repeat.
struct TradingLoop {
    bot_id: String,
    user_id: String,
    store: Arc<dyn BotStore>,
    broker: Arc<dyn BrokerClient>,
    recorder: Arc<TradeRecorder>,
    config: LoopConfig,
    rng: StdRng,
}

impl TradingLoop {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(bot_id = self.bot_id, "Trading loop running");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.cycle().await {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Deactivated) => {
                    info!(bot_id = self.bot_id, "Bot deactivated; loop exiting");
                    break;
                }
                Err(e) => {
                    // Fatal internal fault: flag this bot and exit. Other
                    // bots' loops are unaffected and there is no automatic
                    // restart; reactivation is a new explicit start.
                    error!(bot_id = self.bot_id, error = %e, "Trading loop fault");
                    self.flag_errored();
                    break;
                }
            }

            let min_secs = self.config.min_sleep.as_secs_f64();
            let max_secs = self.config.max_sleep.as_secs_f64();
            let sleep_secs = if min_secs < max_secs {
                self.rng.gen_range(min_secs..=max_secs)
            } else {
                min_secs
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(sleep_secs)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(bot_id = self.bot_id, "Trading loop stopped");
    }

    /// One iteration: reload the bot, decide, maybe trade and record.
    async fn cycle(&mut self) -> Result<CycleOutcome, AppError> {
        let bot = match self.store.get_bot(&self.bot_id)? {
            Some(bot) if bot.is_active => bot,
            // Deactivation (or deletion) is the normal exit path.
            _ => return Ok(CycleOutcome::Deactivated),
        };

        if !self.rng.gen_bool(self.config.trade_probability) {
            debug!(bot_id = self.bot_id, "No trade this cycle");
            return Ok(CycleOutcome::Continue);
        }

        let Some(pair) = self.config.trading_pairs.choose(&mut self.rng).cloned() else {
            warn!(bot_id = self.bot_id, "No trading pairs configured");
            return Ok(CycleOutcome::Continue);
        };

        let Some(quote) = self.broker.get_quote(&pair).await else {
            debug!(bot_id = self.bot_id, pair, "No quote available; skipping cycle");
            return Ok(CycleOutcome::Continue);
        };

        let fraction = self
            .rng
            .gen_range(self.config.min_amount_fraction..=self.config.max_amount_fraction);
        let quote_value = fraction * bot.max_investment_per_trade;
        let amount = quote_value / quote.price;
        let side = if self.rng.gen_bool(0.5) {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        };

        match self
            .broker
            .place_order(&self.user_id, &pair, side, amount, quote.price)
            .await
        {
            Ok(receipt) => {
                self.record_fill(&bot, &pair, side, amount, quote.price, receipt.order_id)
                    .await
            }
            Err(BrokerError::OrderRejected(reason)) => {
                // Business outcome, not a fault: skip the cycle.
                warn!(bot_id = self.bot_id, pair, reason, "Order rejected");
                Ok(CycleOutcome::Continue)
            }
            Err(e) => {
                // The connection may come back; keep cycling.
                warn!(bot_id = self.bot_id, error = %e, "Broker unavailable; skipping cycle");
                Ok(CycleOutcome::Continue)
            }
        }
    }

    /// Simulate the fill's profit and hand the trade to the recorder.
    async fn record_fill(
        &mut self,
        bot: &BotAccount,
        pair: &str,
        side: TradeSide,
        amount: f64,
        price: f64,
        order_id: String,
    ) -> Result<CycleOutcome, AppError> {
        let factor = self
            .rng
            .gen_range(self.config.min_profit_factor..=self.config.max_profit_factor);
        let profit_loss = amount * price * factor;

        let trade = Trade::executed(
            bot.id.clone(),
            bot.user_id.clone(),
            pair.to_string(),
            side,
            amount,
            price,
            profit_loss,
            factor * 100.0,
            Some(order_id),
            bot.strategy.display_name().to_string(),
        );

        match self.recorder.record(trade).await {
            Ok(()) => {
                info!(
                    bot_id = self.bot_id,
                    pair,
                    ?side,
                    amount,
                    price,
                    profit_loss,
                    "Trade executed"
                );
                Ok(CycleOutcome::Continue)
            }
            // Bot deleted mid-flight: the trade stays as an orphaned ledger
            // entry and the loop winds down.
            Err(RecorderError::BotNotFound(_)) => Ok(CycleOutcome::Deactivated),
            Err(RecorderError::NotExecuted(id)) => {
                Err(AppError::Internal(format!("recorder refused trade {id}")))
            }
            Err(RecorderError::Storage(e)) => Err(e.into()),
        }
    }

    /// Best-effort transition to Error status after a fatal fault.
    fn flag_errored(&self) {
        match self.store.get_bot(&self.bot_id) {
            Ok(Some(mut bot)) => {
                bot.mark_errored();
                if let Err(e) = self.store.save_bot(&bot) {
                    error!(bot_id = self.bot_id, error = %e, "Failed to persist error status");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(bot_id = self.bot_id, error = %e, "Failed to load bot for error status");
            }
        }
    }
}
