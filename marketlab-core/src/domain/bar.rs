//! Bar — the fundamental market data unit, with exchange status flags.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol on a single day.
///
/// `prev_close` is the exchange reference price for price-limit bands (it
/// already reflects corporate actions on ex-dates, so it is not always the
/// previous bar's close). The three status flags come from the data feed;
/// the engine trusts them and never re-derives suspension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub prev_close: f64,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub is_limit_up: bool,
    #[serde(default)]
    pub is_limit_down: bool,
}

impl Bar {
    /// Basic OHLC sanity check: high >= low, band contains open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.prev_close > 0.0
    }
}
