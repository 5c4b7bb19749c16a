//! Trading environment — the (market, board, channel) triple every rule keys on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level market a symbol trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Cn,
    Hk,
    Us,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Market::Cn => "CN",
            Market::Hk => "HK",
            Market::Us => "US",
        };
        f.write_str(s)
    }
}

/// Board (listing segment) within a market.
///
/// `St` is a synthetic board for CN stocks under special treatment; the
/// classifier overrides the original board when the stock name carries an
/// ST marker, because ST stocks trade under a tighter price band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// CN main boards (Shanghai and Shenzhen).
    Main,
    /// Shenzhen ChiNext.
    Gem,
    /// Shanghai STAR market.
    Star,
    /// Beijing Stock Exchange.
    Bse,
    /// CN special-treatment stocks.
    St,
    HkMain,
    HkGem,
    UsNyse,
    UsNasdaq,
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Board::Main => "MAIN",
            Board::Gem => "GEM",
            Board::Star => "STAR",
            Board::Bse => "BSE",
            Board::St => "ST",
            Board::HkMain => "MAIN",
            Board::HkGem => "GEM",
            Board::UsNyse => "NYSE",
            Board::UsNasdaq => "NASDAQ",
        };
        f.write_str(s)
    }
}

/// Access channel used to reach the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Local account on the home exchange.
    Direct,
    /// Stock Connect (northbound/southbound) access to HK.
    Connect,
    /// Qualified domestic institutional investor channel.
    Qdii,
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Direct
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Direct => "DIRECT",
            Channel::Connect => "CONNECT",
            Channel::Qdii => "QDII",
        };
        f.write_str(s)
    }
}

/// The rule context a backtest runs under.
///
/// Every market-microstructure rule (price bands, T+1, lot sizes, fee
/// schedule extras) dispatches on this triple and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingEnvironment {
    pub market: Market,
    pub board: Board,
    #[serde(default)]
    pub channel: Channel,
}

impl TradingEnvironment {
    pub fn new(market: Market, board: Board, channel: Channel) -> Self {
        Self {
            market,
            board,
            channel,
        }
    }

    /// CN A-shares settle T+1: shares bought today cannot be sold today.
    pub fn is_t_plus_one(&self) -> bool {
        self.market == Market::Cn
    }
}

impl fmt::Display for TradingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channel == Channel::Direct {
            write!(f, "{}_{}", self.market, self.board)
        } else {
            write!(f, "{}_{}_{}", self.market, self.board, self.channel)
        }
    }
}
