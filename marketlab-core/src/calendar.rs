//! Trading calendars — per-market trading-day sets and date arithmetic.
//!
//! Calendar loading never fails a run: `for_market` always succeeds by
//! falling back to a deterministic weekday calendar (Mon-Fri,
//! 2000-01-01..=2030-12-31). Callers with an authoritative holiday source
//! use `from_days` instead.

use crate::domain::Market;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Scan limit for next/prev lookups. No real market closes for a year.
const MAX_SCAN_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("no trading day within {MAX_SCAN_DAYS} days of {from} for {market}")]
    Exhausted { market: Market, from: NaiveDate },
    #[error("calendar for {0} has no trading days")]
    Empty(Market),
    #[error("date arithmetic overflow near {0}")]
    DateOverflow(NaiveDate),
}

/// An immutable set of trading days for one market.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    market: Market,
    days: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Weekday-fallback calendar: every Mon-Fri in 2000-01-01..=2030-12-31.
    ///
    /// This overstates trading days (exchange holidays are included), which
    /// is the accepted degradation mode: suspension flags on bars still
    /// prevent fills on days the data feed knows were closed.
    pub fn for_market(market: Market) -> Self {
        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2030, 12, 31).unwrap();
        let days = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        Self { market, days }
    }

    /// Calendar from an explicit trading-day list (authoritative source).
    pub fn from_days(market: Market, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            market,
            days: days.into_iter().collect(),
        }
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    /// The `skip`-th trading day strictly after `date` (`skip >= 1`).
    pub fn next_trading_day(&self, date: NaiveDate, skip: u32) -> Result<NaiveDate, CalendarError> {
        let mut remaining = skip.max(1);
        let mut cursor = date;
        for _ in 0..MAX_SCAN_DAYS {
            cursor = cursor
                .checked_add_days(Days::new(1))
                .ok_or(CalendarError::DateOverflow(cursor))?;
            if self.is_trading_day(cursor) {
                remaining -= 1;
                if remaining == 0 {
                    return Ok(cursor);
                }
            }
        }
        Err(CalendarError::Exhausted {
            market: self.market,
            from: date,
        })
    }

    /// The `skip`-th trading day strictly before `date` (`skip >= 1`).
    pub fn prev_trading_day(&self, date: NaiveDate, skip: u32) -> Result<NaiveDate, CalendarError> {
        let mut remaining = skip.max(1);
        let mut cursor = date;
        for _ in 0..MAX_SCAN_DAYS {
            cursor = cursor
                .checked_sub_days(Days::new(1))
                .ok_or(CalendarError::DateOverflow(cursor))?;
            if self.is_trading_day(cursor) {
                remaining -= 1;
                if remaining == 0 {
                    return Ok(cursor);
                }
            }
        }
        Err(CalendarError::Exhausted {
            market: self.market,
            from: date,
        })
    }

    /// Trading days in `[start, end]` (inclusive) or `[start, end)`.
    pub fn trading_days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        inclusive: bool,
    ) -> Vec<NaiveDate> {
        self.days
            .range(start..=end)
            .copied()
            .filter(|d| inclusive || *d < end)
            .collect()
    }

    /// Number of trading days in `[start, end]` inclusive.
    pub fn count_trading_days(&self, start: NaiveDate, end: NaiveDate) -> usize {
        self.days.range(start..=end).count()
    }

    pub fn earliest(&self) -> Result<NaiveDate, CalendarError> {
        self.days
            .first()
            .copied()
            .ok_or(CalendarError::Empty(self.market))
    }

    pub fn latest(&self) -> Result<NaiveDate, CalendarError> {
        self.days
            .last()
            .copied()
            .ok_or(CalendarError::Empty(self.market))
    }
}

/// Explicit per-market calendar cache.
///
/// Owned by whoever constructs the run (no process-global state); the
/// `Arc`s hand shared immutable calendars to parallel workers.
#[derive(Debug, Default)]
pub struct CalendarRegistry {
    calendars: HashMap<Market, Arc<TradingCalendar>>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached calendar for `market`, building the fallback on first use.
    pub fn get(&mut self, market: Market) -> Arc<TradingCalendar> {
        self.calendars
            .entry(market)
            .or_insert_with(|| Arc::new(TradingCalendar::for_market(market)))
            .clone()
    }

    /// Install an authoritative calendar, replacing any cached fallback.
    pub fn insert(&mut self, calendar: TradingCalendar) {
        self.calendars
            .insert(calendar.market(), Arc::new(calendar));
    }
}
