//! Symbol classification: code -> (market, board), ST detection, normalization.

use crate::domain::{Board, Channel, Market, TradingEnvironment};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("cannot classify symbol: {0}")]
    Unrecognized(String),
}

pub struct SymbolClassifier;

impl SymbolClassifier {
    /// Classify a raw symbol into (market, board).
    ///
    /// Pattern order matters: STAR `688xxx` must be checked before the
    /// Shanghai main-board `6xxxxx` rule, and ChiNext `300/301xxx` before
    /// the Shenzhen main-board `000/001xxx` rule. Exchange suffixes
    /// (`.SH`, `.SZ`, `.BJ`, `.HK`) are accepted when they match the code.
    pub fn classify(symbol: &str) -> Result<(Market, Board), ClassifyError> {
        let cleaned = symbol.trim().to_uppercase();
        let (base, suffix) = match cleaned.split_once('.') {
            Some((base, suffix)) => (base, Some(suffix)),
            None => (cleaned.as_str(), None),
        };

        let classified = if base.len() == 6 && base.chars().all(|c| c.is_ascii_digit()) {
            if base.starts_with("688") {
                Some((Market::Cn, Board::Star, "SH"))
            } else if base.starts_with("300") || base.starts_with("301") {
                Some((Market::Cn, Board::Gem, "SZ"))
            } else if base.starts_with("43") || base.starts_with("83") || base.starts_with("87") {
                Some((Market::Cn, Board::Bse, "BJ"))
            } else if base.starts_with('6') {
                Some((Market::Cn, Board::Main, "SH"))
            } else if base.starts_with("000") || base.starts_with("001") {
                Some((Market::Cn, Board::Main, "SZ"))
            } else {
                None
            }
        } else if base.len() == 5 && base.chars().all(|c| c.is_ascii_digit()) {
            Some((Market::Hk, Board::HkMain, "HK"))
        } else if (1..=5).contains(&base.len()) && base.chars().all(|c| c.is_ascii_uppercase()) {
            Some((Market::Us, Board::UsNyse, ""))
        } else {
            None
        };

        match classified {
            Some((market, board, expected_suffix)) => {
                if let Some(suffix) = suffix {
                    if suffix != expected_suffix {
                        return Err(ClassifyError::Unrecognized(symbol.to_string()));
                    }
                }
                debug!(symbol, %market, %board, "classified symbol");
                Ok((market, board))
            }
            None => Err(ClassifyError::Unrecognized(symbol.to_string())),
        }
    }

    /// Whether a stock name carries a special-treatment marker.
    pub fn is_st_name(name: &str) -> bool {
        // Covers ST, *ST, S*ST, SST.
        name.contains("ST")
    }

    /// Override the classified board when the name marks the stock as ST.
    /// Only CN has ST rules.
    pub fn detect_board_override(
        symbol: &str,
        name: Option<&str>,
        market: Market,
        board: Board,
    ) -> Board {
        if market == Market::Cn && name.is_some_and(Self::is_st_name) {
            debug!(symbol, from = %board, "ST name detected, overriding board");
            Board::St
        } else {
            board
        }
    }

    /// Full environment for a symbol: classify, apply ST override, attach channel.
    pub fn trading_environment(
        symbol: &str,
        name: Option<&str>,
        channel: Channel,
    ) -> Result<TradingEnvironment, ClassifyError> {
        let (market, board) = Self::classify(symbol)?;
        let board = Self::detect_board_override(symbol, name, market, board);
        Ok(TradingEnvironment::new(market, board, channel))
    }

    /// Canonical symbol form: suffix stripped, digits zero-padded to the
    /// market's code width (CN 6, HK 5).
    pub fn normalize(symbol: &str, market: Market) -> String {
        let cleaned = symbol.trim().to_uppercase();
        let base = cleaned
            .split_once('.')
            .map(|(base, _)| base)
            .unwrap_or(cleaned.as_str());
        if base.chars().all(|c| c.is_ascii_digit()) {
            match market {
                Market::Cn => format!("{base:0>6}"),
                Market::Hk => format!("{base:0>5}"),
                Market::Us => base.to_string(),
            }
        } else {
            base.to_string()
        }
    }
}
