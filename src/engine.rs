use crate::config::BacktestConfig;
use crate::error::ConfigError;
use crate::ledger::Ledger;
use crate::models::{PerformancePoint, SummaryStats, TradeRecord};
use crate::panel::{CrossSection, Panel};
use crate::performance::PerformanceCalculator;
use crate::rebalance::rebalance_indices;
use anyhow::{ensure, Result};
use chrono::NaiveDate;
use log::{info, warn};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A name eligible for trading on a rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ticker: String,
    pub score: f64,
    pub price: f64,
}

/// Long and short selections of one rebalance, best scores first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Baskets {
    pub long: Vec<Candidate>,
    pub short: Vec<Candidate>,
}

impl Baskets {
    fn contains(&self, ticker: &str) -> bool {
        self.long
            .iter()
            .chain(self.short.iter())
            .any(|candidate| candidate.ticker == ticker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    Executed { trades: usize },
    MissingFactorRow,
    InsufficientUniverse { size: usize },
}

/// Everything a finished backtest produced.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub ledger: Ledger,
    pub trades: Vec<TradeRecord>,
    pub rebalance_dates: Vec<NaiveDate>,
    pub skipped_rebalances: usize,
}

impl BacktestRun {
    pub fn total_commission(&self) -> f64 {
        self.trades.iter().map(|trade| trade.commission).sum()
    }

    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        PerformanceCalculator::daily_returns(self.ledger.snapshots())
    }

    pub fn summary_stats(&self) -> Option<SummaryStats> {
        PerformanceCalculator::summary_stats(
            self.ledger.snapshots(),
            self.ledger.initial_capital(),
        )
    }

    pub fn performance_frame(&self) -> Vec<PerformancePoint> {
        self.ledger.performance_frame()
    }
}

/// Date-by-date long/short simulation driven by a precomputed factor panel.
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Replays `prices` once in date order, rebalancing on the configured schedule
    /// against the latest factor row dated on or before each rebalance date.
    pub fn run_long_short(&self, prices: &Panel, factor_values: &Panel) -> Result<BacktestRun> {
        ensure!(!prices.is_empty(), "Price panel is empty; nothing to simulate");
        ensure!(!factor_values.is_empty(), "Factor panel is empty; nothing to rank");

        let prices = prices.restrict_to_date_range(self.config.start_date, self.config.end_date);
        let factor_values =
            factor_values.restrict_to_date_range(self.config.start_date, self.config.end_date);
        ensure!(
            !prices.is_empty(),
            "No prices between {} and {}",
            describe_bound(self.config.start_date),
            describe_bound(self.config.end_date)
        );

        let dates = prices.dates();
        let schedule: BTreeSet<usize> =
            rebalance_indices(dates, self.config.rebalance_frequency).into_iter().collect();

        info!(
            "Running backtest for {} to {}",
            dates[0],
            dates[dates.len() - 1]
        );
        info!(
            "Rebalancing {} times ({})",
            schedule.len(),
            self.config.rebalance_frequency
        );

        let mut ledger = Ledger::new(self.config.initial_capital);
        let mut trades = Vec::new();
        let mut rebalance_dates = Vec::with_capacity(schedule.len());
        let mut skipped_rebalances = 0usize;

        for (index, date) in dates.iter().copied().enumerate() {
            let current_prices = prices.cross_section(index);

            if schedule.contains(&index) {
                rebalance_dates.push(date);
                let outcome = self.rebalance(
                    &mut ledger,
                    &mut trades,
                    date,
                    &current_prices,
                    &factor_values,
                );
                match outcome {
                    RebalanceOutcome::Executed { trades: executed } => {
                        info!(
                            "[{}/{}] Rebalance on {}: ${:.0} ({} trades)",
                            index,
                            dates.len(),
                            date,
                            ledger.value(&current_prices),
                            executed
                        );
                    }
                    RebalanceOutcome::MissingFactorRow => {
                        skipped_rebalances += 1;
                        warn!("Skipping rebalance on {}: no factor values on or before it", date);
                    }
                    RebalanceOutcome::InsufficientUniverse { size } => {
                        skipped_rebalances += 1;
                        warn!(
                            "Skipping rebalance on {}: only {} stocks available (minimum {})",
                            date, size, self.config.min_universe
                        );
                    }
                }
            }

            ledger.record_snapshot(date, &current_prices);
        }

        Ok(BacktestRun {
            ledger,
            trades,
            rebalance_dates,
            skipped_rebalances,
        })
    }

    fn rebalance(
        &self,
        ledger: &mut Ledger,
        trades: &mut Vec<TradeRecord>,
        date: NaiveDate,
        current_prices: &CrossSection,
        factor_values: &Panel,
    ) -> RebalanceOutcome {
        let Some(factor_index) = factor_values.as_of_index(date) else {
            return RebalanceOutcome::MissingFactorRow;
        };
        debug_assert!(factor_values.dates()[factor_index] <= date);
        let factors = factor_values.cross_section(factor_index);

        let universe = tradable_universe(current_prices, &factors);
        if universe.len() < self.config.min_universe {
            return RebalanceOutcome::InsufficientUniverse {
                size: universe.len(),
            };
        }

        let universe_prices: CrossSection = universe
            .iter()
            .map(|candidate| (candidate.ticker.clone(), candidate.price))
            .collect();
        let total_value = ledger.value(&universe_prices);
        let long_notional = total_value * self.config.long_allocation;
        let short_notional = total_value * self.config.short_allocation;

        let baskets = select_baskets(universe, self.config.long_pct, self.config.short_pct);
        let mut executed = 0usize;
        let mut record = |ledger: &mut Ledger, ticker: &str, shares: f64, price: f64| {
            let commission = ledger.apply_trade(ticker, shares, price, self.config.commission_pct);
            trades.push(TradeRecord {
                date,
                ticker: ticker.to_string(),
                shares,
                price,
                commission,
            });
            executed += 1;
        };

        let stale: Vec<(String, f64)> = ledger
            .positions()
            .iter()
            .filter(|(ticker, _)| !baskets.contains(ticker))
            .map(|(ticker, quantity)| (ticker.clone(), *quantity))
            .collect();
        for (ticker, quantity) in stale {
            match current_prices.get(&ticker).copied().filter(|price| *price > 0.0) {
                Some(price) => record(ledger, &ticker, -quantity, price),
                None => warn!(
                    "Cannot close {} on {}: no valid price, keeping {} shares",
                    ticker, date, quantity
                ),
            }
        }

        for (basket, notional, direction) in [
            (&baskets.long, long_notional, 1.0),
            (&baskets.short, short_notional, -1.0),
        ] {
            if basket.is_empty() {
                continue;
            }
            let target_value = notional / basket.len() as f64;
            for candidate in basket {
                let target_shares = direction * target_value / candidate.price;
                let delta = target_shares - ledger.get_position(&candidate.ticker);
                if delta.abs() > self.config.trade_threshold_shares {
                    record(ledger, &candidate.ticker, delta, candidate.price);
                }
            }
        }

        RebalanceOutcome::Executed { trades: executed }
    }
}

/// Tickers with both a factor score and a positive price, in ticker order.
pub fn tradable_universe(prices: &CrossSection, factors: &CrossSection) -> Vec<Candidate> {
    factors
        .iter()
        .filter_map(|(ticker, score)| {
            let price = prices.get(ticker).copied()?;
            (price > 0.0).then(|| Candidate {
                ticker: ticker.clone(),
                score: *score,
                price,
            })
        })
        .collect()
}

/// `max(1, round(n * pct))` names, never more than `n`.
pub fn basket_size(universe_size: usize, pct: f64) -> usize {
    let size = (universe_size as f64 * pct).round() as usize;
    size.max(1).min(universe_size)
}

/// Ranks candidates by score descending and takes the top of the list long and the
/// bottom short. Equal scores keep their incoming order. A name never lands in both.
///
/// With two or more candidates each side gets at least one name, so the long basket
/// gives up its last slot when the two fractions together would cover everything.
/// A single candidate only goes long.
pub fn select_baskets(mut universe: Vec<Candidate>, long_pct: f64, short_pct: f64) -> Baskets {
    let n = universe.len();
    if n == 0 {
        return Baskets::default();
    }
    let n_long = basket_size(n, long_pct).min(n.saturating_sub(1).max(1));
    let n_short = basket_size(n, short_pct).min(n - n_long);

    universe.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    let short = universe.split_off(universe.len() - n_short);
    universe.truncate(n_long);
    Baskets {
        long: universe,
        short,
    }
}

fn describe_bound(bound: Option<NaiveDate>) -> String {
    bound.map_or_else(|| "open bound".to_string(), |date| date.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(scores: &[(&str, f64)]) -> Vec<Candidate> {
        scores
            .iter()
            .map(|(ticker, score)| Candidate {
                ticker: ticker.to_string(),
                score: *score,
                price: 10.0,
            })
            .collect()
    }

    fn tickers(basket: &[Candidate]) -> Vec<&str> {
        basket.iter().map(|candidate| candidate.ticker.as_str()).collect()
    }

    fn ymd(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    #[test]
    fn basket_size_rounds_with_floor_of_one() {
        assert_eq!(basket_size(12, 0.2), 2);
        assert_eq!(basket_size(13, 0.2), 3);
        assert_eq!(basket_size(3, 0.1), 1);
        assert_eq!(basket_size(1, 1.0), 1);
    }

    #[test]
    fn selects_top_and_bottom_with_stable_ties() {
        let universe = candidates(&[
            ("A", 0.5),
            ("B", 2.0),
            ("C", -1.0),
            ("D", 2.0),
            ("E", -1.0),
            ("F", 0.0),
        ]);
        let baskets = select_baskets(universe, 0.34, 0.34);
        assert_eq!(tickers(&baskets.long), vec!["B", "D"]);
        assert_eq!(tickers(&baskets.short), vec!["C", "E"]);
    }

    #[test]
    fn baskets_never_overlap() {
        let baskets = select_baskets(candidates(&[("A", 1.0)]), 0.5, 0.5);
        assert_eq!(tickers(&baskets.long), vec!["A"]);
        assert!(baskets.short.is_empty());
    }

    #[test]
    fn both_baskets_get_a_name_when_long_covers_the_universe() {
        let universe: Vec<(String, f64)> =
            (0..12).map(|i| (format!("T{:02}", i), i as f64)).collect();
        let scores: Vec<(&str, f64)> = universe
            .iter()
            .map(|(ticker, score)| (ticker.as_str(), *score))
            .collect();
        let baskets = select_baskets(candidates(&scores), 0.96, 0.04);

        assert_eq!(baskets.long.len(), 11);
        assert_eq!(tickers(&baskets.short), vec!["T00"]);
        assert!(baskets.long.iter().all(|candidate| candidate.ticker != "T00"));

        let pair = select_baskets(candidates(&[("A", 2.0), ("B", 1.0)]), 1.0, 0.5);
        assert_eq!(tickers(&pair.long), vec!["A"]);
        assert_eq!(tickers(&pair.short), vec!["B"]);
    }

    #[test]
    fn universe_requires_factor_and_positive_price() {
        let prices: CrossSection = [("A", 10.0), ("B", 0.0), ("C", 5.0)]
            .iter()
            .map(|(ticker, price)| (ticker.to_string(), *price))
            .collect();
        let factors: CrossSection = [("A", 1.0), ("B", 2.0), ("D", 3.0)]
            .iter()
            .map(|(ticker, score)| (ticker.to_string(), *score))
            .collect();

        let universe = tradable_universe(&prices, &factors);
        assert_eq!(tickers(&universe), vec!["A"]);
    }

    #[test]
    fn rejects_invalid_config_before_running() {
        let config = BacktestConfig {
            long_pct: 0.0,
            ..BacktestConfig::default()
        };
        assert!(BacktestEngine::new(config).is_err());
    }

    #[test]
    fn empty_panels_are_fatal() {
        let engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
        let factors = Panel::new(vec![ymd(1, 2)], vec!["A".into()], vec![vec![Some(1.0)]]).unwrap();
        assert!(engine.run_long_short(&Panel::empty(), &factors).is_err());
        assert!(engine.run_long_short(&factors, &Panel::empty()).is_err());
    }

    #[test]
    fn window_outside_prices_is_fatal() {
        let engine = BacktestEngine::new(BacktestConfig {
            start_date: Some(ymd(6, 1)),
            ..BacktestConfig::default()
        })
        .unwrap();
        let panel = Panel::new(vec![ymd(1, 2)], vec!["A".into()], vec![vec![Some(1.0)]]).unwrap();
        assert!(engine.run_long_short(&panel, &panel).is_err());
    }
}
