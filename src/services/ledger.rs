//! Position Ledger
//!
//! Derives current asset holdings from the executed trade history. This is
//! pure aggregation logic with no state of its own: holdings are recomputed
//! per query instead of being persisted, so they cannot drift from the
//! ledger.
//!
//! The order of the returned holdings is unspecified.

use std::collections::HashMap;

use crate::types::{AssetHolding, Trade, TradeStatus};

/// Accumulated position in one base asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTotals {
    /// Base asset symbol
    pub symbol: String,
    /// Net amount: buys minus sells
    pub amount: f64,
    /// Net cost basis: buy value minus sell value
    pub cost: f64,
    /// Number of executed trades folded in
    pub trades: u64,
}

/// Fold executed trades into per-symbol net amount and cost basis.
/// Non-executed trades are ignored.
pub fn accumulate(trades: &[Trade]) -> Vec<PositionTotals> {
    let mut totals: HashMap<String, PositionTotals> = HashMap::new();

    for trade in trades {
        if trade.status != TradeStatus::Executed {
            continue;
        }

        let symbol = trade.base_symbol().to_string();
        let entry = totals.entry(symbol.clone()).or_insert(PositionTotals {
            symbol,
            amount: 0.0,
            cost: 0.0,
            trades: 0,
        });

        let sign = trade.side.sign();
        entry.amount += sign * trade.amount;
        entry.cost += sign * trade.total_value;
        entry.trades += 1;
    }

    totals.into_values().collect()
}

/// Build the public holdings view from accumulated positions and a current
/// price lookup. Positions with non-positive net amount are fully exited and
/// produce no row.
pub fn holdings<F>(totals: &[PositionTotals], price_lookup: F) -> Vec<AssetHolding>
where
    F: Fn(&str) -> Option<f64>,
{
    totals
        .iter()
        .filter(|t| t.amount > 0.0)
        .map(|t| {
            let current_price = price_lookup(&t.symbol).unwrap_or(0.0);
            let average_price = t.cost / t.amount;
            let total_value = t.amount * current_price;
            let profit_loss = total_value - t.cost;
            let profit_percentage = if t.cost > 0.0 {
                profit_loss / t.cost * 100.0
            } else {
                0.0
            };

            AssetHolding {
                symbol: t.symbol.clone(),
                amount: t.amount,
                average_price,
                current_price,
                total_value,
                profit_loss,
                profit_percentage,
            }
        })
        .collect()
}

/// Convenience: accumulate and price in one step.
pub fn holdings_from_trades<F>(trades: &[Trade], price_lookup: F) -> Vec<AssetHolding>
where
    F: Fn(&str) -> Option<f64>,
{
    holdings(&accumulate(trades), price_lookup)
}
