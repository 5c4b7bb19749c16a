//! Lot size rules: minimum tradeable units per market and symbol.

use crate::domain::Market;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LotSizeError {
    #[error("lot size must be positive")]
    NonPositiveLot,
}

/// HK board lots vary per symbol; this covers the liquid names.
/// Anything missing falls back to the HK default of 100.
const HK_LOT_OVERRIDES: &[(&str, u64)] = &[
    ("00700", 100),
    ("09988", 100),
    ("03690", 100),
    ("01810", 200),
    ("09618", 100),
    ("01024", 100),
    ("09999", 100),
    ("09888", 100),
    ("09626", 100),
    ("09961", 100),
    ("00005", 400),
    ("00941", 500),
    ("01398", 1000),
    ("03988", 500),
    ("01288", 500),
    ("00939", 500),
];

pub struct LotSizeRules;

impl LotSizeRules {
    /// Shares per lot for `symbol` in `market`.
    ///
    /// CN A-shares trade in lots of 100, HK per-symbol (default 100), US
    /// has no lot constraint (1).
    pub fn lot_size(symbol: &str, market: Market) -> u64 {
        let clean = symbol
            .trim_end_matches(".HK")
            .trim_end_matches(".SH")
            .trim_end_matches(".SZ");
        match market {
            Market::Cn => 100,
            Market::Hk => {
                let padded = Self::pad_hk(clean);
                HK_LOT_OVERRIDES
                    .iter()
                    .find(|(sym, _)| *sym == padded)
                    .map(|(_, lot)| *lot)
                    .unwrap_or(100)
            }
            Market::Us => 1,
        }
    }

    /// Round a share quantity down to a whole number of lots.
    pub fn round_down_to_lot(quantity: u64, lot_size: u64) -> Result<u64, LotSizeError> {
        if lot_size == 0 {
            return Err(LotSizeError::NonPositiveLot);
        }
        Ok(quantity / lot_size * lot_size)
    }

    fn pad_hk(symbol: &str) -> String {
        if symbol.chars().all(|c| c.is_ascii_digit()) {
            format!("{symbol:0>5}")
        } else {
            symbol.to_string()
        }
    }
}
