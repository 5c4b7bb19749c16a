//! Risk manager: pre-trade exposure caps and forced-exit scanning.

use crate::domain::Portfolio;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RiskConfigError {
    #[error("{field} must be in (0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Validated risk limits. All fields are fractions of equity or price.
///
/// The exposure caps always apply; the three exit thresholds are each
/// optional, and an absent threshold disables that check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Max value of a single position as a fraction of total equity.
    pub max_position_pct: f64,
    /// Max summed position value as a fraction of total equity.
    pub max_total_exposure: f64,
    /// Exit when price falls this fraction below cost.
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    /// Exit when price rises this fraction above cost.
    #[serde(default)]
    pub stop_profit_pct: Option<f64>,
    /// Liquidate everything when drawdown from peak equity reaches this.
    #[serde(default)]
    pub max_drawdown_pct: Option<f64>,
}

impl RiskConfig {
    pub fn new(
        max_position_pct: f64,
        max_total_exposure: f64,
        stop_loss_pct: Option<f64>,
        stop_profit_pct: Option<f64>,
        max_drawdown_pct: Option<f64>,
    ) -> Result<Self, RiskConfigError> {
        let fractions = [
            ("max_position_pct", Some(max_position_pct)),
            ("max_total_exposure", Some(max_total_exposure)),
            ("stop_loss_pct", stop_loss_pct),
            ("max_drawdown_pct", max_drawdown_pct),
        ];
        for (field, value) in fractions {
            if let Some(value) = value {
                if !(value > 0.0 && value <= 1.0) {
                    return Err(RiskConfigError::FractionOutOfRange { field, value });
                }
            }
        }
        if let Some(value) = stop_profit_pct {
            if value <= 0.0 {
                return Err(RiskConfigError::NonPositive {
                    field: "stop_profit_pct",
                    value,
                });
            }
        }
        Ok(Self {
            max_position_pct,
            max_total_exposure,
            stop_loss_pct,
            stop_profit_pct,
            max_drawdown_pct,
        })
    }
}

/// Outcome of a pre-trade risk check. A veto is a value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub reason: Option<String>,
}

impl RiskCheckResult {
    fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            approved: false,
            reason: Some(reason),
        }
    }
}

/// Why a forced exit was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    StopProfit,
    DrawdownProtection,
}

/// A sell the risk manager demands, prior to validation and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedExit {
    pub symbol: String,
    pub quantity: u64,
    pub reason: ExitReason,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    OrderRejected,
    ForcedExit,
}

/// One entry in the run's risk audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub date: NaiveDate,
    pub kind: RiskEventKind,
    pub symbol: String,
    pub reason: String,
}

/// Summary counts surfaced in run metadata.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskStats {
    pub order_rejections: u64,
    pub forced_exits: u64,
    pub peak_equity: f64,
}

/// Stateful risk manager for one run.
///
/// The peak equity ratchet only moves up; drawdown protection fires once
/// the retreat from peak reaches `max_drawdown_pct` and takes priority over
/// per-position stops for that bar.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    peak_equity: f64,
    events: Vec<RiskEvent>,
    order_rejections: u64,
    forced_exits: u64,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            peak_equity: 0.0,
            events: Vec::new(),
            order_rejections: 0,
            forced_exits: 0,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn events(&self) -> &[RiskEvent] {
        &self.events
    }

    pub fn stats(&self) -> RiskStats {
        RiskStats {
            order_rejections: self.order_rejections,
            forced_exits: self.forced_exits,
            peak_equity: self.peak_equity,
        }
    }

    /// Pre-trade check for a prospective buy of `order_value` in `symbol`.
    ///
    /// Single-position cap is checked before the total-exposure cap; the
    /// first breach wins.
    pub fn check_order_risk(
        &mut self,
        date: NaiveDate,
        symbol: &str,
        order_value: f64,
        portfolio: &Portfolio,
    ) -> RiskCheckResult {
        let equity = portfolio.total_equity();
        if equity <= 0.0 {
            return self.reject_order(date, symbol, "equity is non-positive".to_string());
        }

        let existing = portfolio
            .get_position(symbol)
            .map_or(0.0, |p| p.market_value());
        let position_pct = (existing + order_value) / equity;
        if position_pct > self.config.max_position_pct {
            return self.reject_order(
                date,
                symbol,
                format!(
                    "single position {:.1}% would exceed cap {:.1}%",
                    position_pct * 100.0,
                    self.config.max_position_pct * 100.0
                ),
            );
        }

        let exposure_pct = (portfolio.market_value() + order_value) / equity;
        if exposure_pct > self.config.max_total_exposure {
            return self.reject_order(
                date,
                symbol,
                format!(
                    "total exposure {:.1}% would exceed cap {:.1}%",
                    exposure_pct * 100.0,
                    self.config.max_total_exposure * 100.0
                ),
            );
        }

        RiskCheckResult::approved()
    }

    /// Scan for forced exits after positions are marked to the bar close.
    ///
    /// Drawdown protection liquidates every position and suppresses the
    /// per-position stop checks for this bar; otherwise each position gets
    /// at most one forced exit, stop-loss checked before stop-profit.
    pub fn check_exit_signals(
        &mut self,
        date: NaiveDate,
        portfolio: &Portfolio,
    ) -> Vec<ForcedExit> {
        let equity = portfolio.total_equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }

        let drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - equity) / self.peak_equity
        } else {
            0.0
        };
        if let Some(limit) = self.config.max_drawdown_pct.filter(|limit| drawdown >= *limit) {
            let exits: Vec<ForcedExit> = portfolio
                .positions
                .values()
                .filter(|p| p.quantity > 0)
                .map(|p| ForcedExit {
                    symbol: p.symbol.clone(),
                    quantity: p.quantity,
                    reason: ExitReason::DrawdownProtection,
                    detail: format!(
                        "drawdown {:.1}% reached limit {:.1}%",
                        drawdown * 100.0,
                        limit * 100.0
                    ),
                })
                .collect();
            for exit in &exits {
                warn!(symbol = %exit.symbol, %date, "drawdown protection triggered");
                self.record_exit(date, exit);
            }
            return exits;
        }

        let mut exits = Vec::new();
        for position in portfolio.positions.values().filter(|p| p.quantity > 0) {
            let stop_loss_at = self
                .config
                .stop_loss_pct
                .map(|pct| position.avg_cost * (1.0 - pct));
            let stop_profit_at = self
                .config
                .stop_profit_pct
                .map(|pct| position.avg_cost * (1.0 + pct));
            let exit = if let Some(at) = stop_loss_at.filter(|at| position.current_price <= *at) {
                Some((
                    ExitReason::StopLoss,
                    format!(
                        "price {:.2} breached stop-loss {:.2}",
                        position.current_price, at
                    ),
                ))
            } else if let Some(at) =
                stop_profit_at.filter(|at| position.current_price >= *at)
            {
                Some((
                    ExitReason::StopProfit,
                    format!(
                        "price {:.2} reached stop-profit {:.2}",
                        position.current_price, at
                    ),
                ))
            } else {
                None
            };
            if let Some((reason, detail)) = exit {
                let forced = ForcedExit {
                    symbol: position.symbol.clone(),
                    quantity: position.quantity,
                    reason,
                    detail,
                };
                self.record_exit(date, &forced);
                exits.push(forced);
            }
        }
        exits
    }

    fn reject_order(&mut self, date: NaiveDate, symbol: &str, reason: String) -> RiskCheckResult {
        debug!(symbol, %date, reason, "order rejected by risk manager");
        self.order_rejections += 1;
        self.events.push(RiskEvent {
            date,
            kind: RiskEventKind::OrderRejected,
            symbol: symbol.to_string(),
            reason: reason.clone(),
        });
        RiskCheckResult::rejected(reason)
    }

    fn record_exit(&mut self, date: NaiveDate, exit: &ForcedExit) {
        self.forced_exits += 1;
        self.events.push(RiskEvent {
            date,
            kind: RiskEventKind::ForcedExit,
            symbol: exit.symbol.clone(),
            reason: exit.detail.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> RiskConfig {
        RiskConfig::new(0.3, 0.8, Some(0.10), Some(0.20), Some(0.15)).unwrap()
    }

    fn portfolio_with_position(cash: f64, qty: u64, cost: f64, price: f64) -> Portfolio {
        let mut portfolio = Portfolio::new(100_000.0).unwrap();
        portfolio.cash = cash;
        let mut pos = Position::new("600000", qty, cost, ymd(2024, 1, 2));
        pos.current_price = price;
        portfolio.positions.insert("600000".into(), pos);
        portfolio
    }

    #[test]
    fn config_validation() {
        assert!(RiskConfig::new(0.0, 0.8, Some(0.1), Some(0.2), Some(0.15)).is_err());
        assert!(RiskConfig::new(0.3, 1.5, Some(0.1), Some(0.2), Some(0.15)).is_err());
        assert!(RiskConfig::new(0.3, 0.8, Some(0.1), Some(-0.2), Some(0.15)).is_err());
        assert!(RiskConfig::new(0.3, 0.8, Some(1.1), Some(0.2), Some(0.15)).is_err());
        assert!(RiskConfig::new(0.3, 0.8, Some(0.1), Some(0.2), Some(0.15)).is_ok());
        // Exit thresholds are individually optional.
        assert!(RiskConfig::new(0.3, 0.8, None, None, None).is_ok());
    }

    #[test]
    fn absent_thresholds_disable_exit_checks() {
        let caps_only = RiskConfig::new(0.3, 0.8, None, None, None).unwrap();
        let mut risk = RiskManager::new(caps_only);
        // Establish a peak, then collapse the position far past any stop.
        let peak = portfolio_with_position(90_000.0, 1000, 10.0, 10.0);
        assert!(risk.check_exit_signals(ymd(2024, 1, 3), &peak).is_empty());
        let crashed = portfolio_with_position(90_000.0, 1000, 10.0, 2.0);
        assert!(risk.check_exit_signals(ymd(2024, 1, 4), &crashed).is_empty());
        assert_eq!(risk.stats().forced_exits, 0);

        // The exposure caps still apply.
        let portfolio = Portfolio::new(100_000.0).unwrap();
        let result = risk.check_order_risk(ymd(2024, 1, 5), "600000", 40_000.0, &portfolio);
        assert!(!result.approved);
    }

    #[test]
    fn single_position_cap_checked_first() {
        let mut risk = RiskManager::new(config());
        let portfolio = Portfolio::new(100_000.0).unwrap();
        // 40% of equity in one name breaches the 30% cap.
        let result = risk.check_order_risk(ymd(2024, 1, 2), "600000", 40_000.0, &portfolio);
        assert!(!result.approved);
        assert!(result.reason.unwrap().contains("single position"));
        assert_eq!(risk.stats().order_rejections, 1);
    }

    #[test]
    fn exposure_cap_counts_existing_positions() {
        let mut risk = RiskManager::new(config());
        // 60k position + 40k cash; a 25k buy passes the 30% single cap
        // (25% of 100k) but pushes exposure to 85% > 80%.
        let portfolio = portfolio_with_position(40_000.0, 6000, 10.0, 10.0);
        let result = risk.check_order_risk(ymd(2024, 1, 3), "000001", 25_000.0, &portfolio);
        assert!(!result.approved);
        assert!(result.reason.unwrap().contains("total exposure"));
    }

    #[test]
    fn within_caps_is_approved() {
        let mut risk = RiskManager::new(config());
        let portfolio = Portfolio::new(100_000.0).unwrap();
        let result = risk.check_order_risk(ymd(2024, 1, 2), "600000", 20_000.0, &portfolio);
        assert!(result.approved);
        assert!(risk.events().is_empty());
    }

    #[test]
    fn stop_loss_fires_before_stop_profit() {
        let mut risk = RiskManager::new(config());
        let portfolio = portfolio_with_position(90_000.0, 1000, 10.0, 8.9);
        let exits = risk.check_exit_signals(ymd(2024, 1, 3), &portfolio);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::StopLoss);
        assert_eq!(exits[0].quantity, 1000);
    }

    #[test]
    fn stop_profit_triggers() {
        let mut risk = RiskManager::new(config());
        let portfolio = portfolio_with_position(90_000.0, 1000, 10.0, 12.1);
        let exits = risk.check_exit_signals(ymd(2024, 1, 3), &portfolio);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::StopProfit);
    }

    #[test]
    fn no_exit_inside_band() {
        let mut risk = RiskManager::new(config());
        let portfolio = portfolio_with_position(90_000.0, 1000, 10.0, 10.5);
        assert!(risk.check_exit_signals(ymd(2024, 1, 3), &portfolio).is_empty());
    }

    #[test]
    fn drawdown_liquidates_and_suppresses_stops() {
        let mut risk = RiskManager::new(config());
        // Establish peak at 100k equity.
        let peak = portfolio_with_position(90_000.0, 1000, 10.0, 10.0);
        assert!(risk.check_exit_signals(ymd(2024, 1, 3), &peak).is_empty());

        // Price collapse: equity 90k + ... drop to 82k (18% drawdown from 100k).
        // Price 8.0 would also trip the stop-loss, but drawdown protection
        // claims the exit.
        let mut crashed = portfolio_with_position(74_000.0, 1000, 10.0, 8.0);
        crashed.cash = 74_000.0;
        let exits = risk.check_exit_signals(ymd(2024, 1, 4), &crashed);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::DrawdownProtection);
        assert_eq!(risk.stats().forced_exits, 1);
    }

    #[test]
    fn peak_equity_is_monotone() {
        let mut risk = RiskManager::new(config());
        let high = portfolio_with_position(90_000.0, 1000, 10.0, 11.0); // 101k
        risk.check_exit_signals(ymd(2024, 1, 3), &high);
        assert_eq!(risk.stats().peak_equity, 101_000.0);

        let lower = portfolio_with_position(90_000.0, 1000, 10.0, 10.5); // 100.5k
        risk.check_exit_signals(ymd(2024, 1, 4), &lower);
        assert_eq!(risk.stats().peak_equity, 101_000.0);
    }
}
