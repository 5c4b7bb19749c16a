//! Strategy signals — the only thing a strategy hands the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What the strategy wants to do on a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// A dated strategy decision for one symbol.
///
/// `price` is an optional reference price; when absent the engine uses the
/// bar's close. `reason` is free text carried through to the trade tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub date: NaiveDate,
    pub action: SignalAction,
    pub price: Option<f64>,
    pub reason: Option<String>,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, action: SignalAction) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            action,
            price: None,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_builder_defaults() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let sig = Signal::new("600000", date, SignalAction::Buy).with_reason("ma crossover");
        assert_eq!(sig.action, SignalAction::Buy);
        assert!(sig.price.is_none());
        assert_eq!(sig.reason.as_deref(), Some("ma crossover"));
    }
}
