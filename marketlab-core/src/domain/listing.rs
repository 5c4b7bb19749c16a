//! Static listing metadata, used for new-listing limit grace and ST override.

use super::environment::Board;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference data about a listed security.
///
/// Optional input: when absent the validator assumes a seasoned, non-ST
/// listing (bands apply from day one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingInfo {
    pub symbol: String,
    pub name: String,
    pub board: Board,
    pub listing_date: NaiveDate,
    #[serde(default)]
    pub is_st: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_serialization_roundtrip() {
        let info = ListingInfo {
            symbol: "688001".into(),
            name: "华兴源创".into(),
            board: Board::Star,
            listing_date: NaiveDate::from_ymd_opt(2019, 7, 22).unwrap(),
            is_st: false,
        };
        let json = serde_json::to_string(&info).unwrap();
        let deser: ListingInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(deser.board, Board::Star);
        assert_eq!(deser.listing_date, info.listing_date);
    }
}
