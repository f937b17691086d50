use crate::models::{Snapshot, SummaryStats};
use chrono::NaiveDate;
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Day-over-day change of `total_value`, dated by the later snapshot.
    ///
    /// A step whose starting value is not positive has no defined return and is left out;
    /// it still counts towards `SummaryStats::trading_days`.
    pub fn daily_returns(snapshots: &[Snapshot]) -> Vec<(NaiveDate, f64)> {
        snapshots
            .windows(2)
            .filter_map(|window| {
                let previous = window[0].total_value;
                let current = window[1].total_value;
                if previous > 0.0 && current.is_finite() {
                    Some((window[1].date, current / previous - 1.0))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Summary of a snapshot history. `None` when nothing was recorded; a single snapshot
    /// yields its total return with every annualized figure at zero.
    pub fn summary_stats(snapshots: &[Snapshot], initial_capital: f64) -> Option<SummaryStats> {
        let final_value = snapshots.last()?.total_value;
        let total_return = if initial_capital > 0.0 {
            final_value / initial_capital - 1.0
        } else {
            0.0
        };

        let returns: Vec<f64> = Self::daily_returns(snapshots)
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        let trading_days = snapshots.len() - 1;
        let annual_volatility = Self::annual_volatility(&returns);
        let sharpe_ratio = Self::calculate_sharpe_ratio(&returns, annual_volatility);

        Some(SummaryStats {
            total_return,
            cagr: Self::calculate_cagr(total_return, trading_days),
            annual_volatility,
            sharpe_ratio,
            max_drawdown: Self::calculate_max_drawdown(&returns),
            final_value,
            trading_days,
        })
    }

    fn calculate_cagr(total_return: f64, trading_days: usize) -> f64 {
        if trading_days == 0 || !total_return.is_finite() {
            return 0.0;
        }
        let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
        let growth = 1.0 + total_return;
        if growth <= 0.0 {
            return -1.0;
        }
        growth.powf(1.0 / years) - 1.0
    }

    fn annual_volatility(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let std_dev = returns.iter().std_dev();
        if std_dev.is_finite() {
            std_dev * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        }
    }

    /// Zero risk-free rate.
    fn calculate_sharpe_ratio(returns: &[f64], annual_volatility: f64) -> f64 {
        if returns.is_empty() || annual_volatility <= 0.0 {
            return 0.0;
        }
        returns.iter().mean() * TRADING_DAYS_PER_YEAR / annual_volatility
    }

    /// Most negative `(cumulative - running_max) / running_max` along the compounded
    /// return path; zero or negative.
    fn calculate_max_drawdown(returns: &[f64]) -> f64 {
        let mut cumulative = 1.0;
        let mut running_max = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;

        for value in returns {
            cumulative *= 1.0 + value;
            running_max = running_max.max(cumulative);
            if running_max > 0.0 {
                max_drawdown = max_drawdown.min((cumulative - running_max) / running_max);
            }
        }
        max_drawdown
    }
}
