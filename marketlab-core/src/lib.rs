//! MarketLab Core — engine, domain types, trading rules, risk, matching.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, signals, orders, trades, positions, portfolio)
//! - Trading calendars with per-market registries
//! - Market-microstructure rules: symbol classification, lot sizes,
//!   price-limit bands, T+1, suspension
//! - Risk manager (exposure caps, stops, drawdown protection)
//! - Matching engine (slippage, band clipping, itemized fees)
//! - Per-bar trading state machine (Flat -> Long -> Flat)

pub mod calendar;
pub mod domain;
pub mod engine;
pub mod matching;
pub mod risk;
pub mod rules;
