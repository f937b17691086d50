use crate::config::{settings_from_env, BacktestConfig};
use crate::context::{AppContext, MarketDataFilters};
use crate::engine::BacktestEngine;
use crate::factors::{FactorOptions, FactorRegistry};
use crate::rebalance::RebalanceFrequency;
use crate::report::BacktestReport;
use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use std::path::PathBuf;

/// Command-line overrides applied on top of the `BACKTEST_*` settings.
#[derive(Debug, Clone, Default)]
pub struct BacktestOverrides {
    pub rebalance_frequency: Option<RebalanceFrequency>,
    pub long_pct: Option<f64>,
    pub short_pct: Option<f64>,
    pub commission_pct: Option<f64>,
    pub initial_capital: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl BacktestOverrides {
    pub fn apply(&self, mut config: BacktestConfig) -> Result<BacktestConfig> {
        if let Some(frequency) = self.rebalance_frequency {
            config.rebalance_frequency = frequency;
        }
        if let Some(long_pct) = self.long_pct {
            config.long_pct = long_pct;
        }
        if let Some(short_pct) = self.short_pct {
            config.short_pct = short_pct;
        }
        if let Some(commission_pct) = self.commission_pct {
            config.commission_pct = commission_pct;
        }
        if let Some(initial_capital) = self.initial_capital {
            config.initial_capital = initial_capital;
        }
        if self.start_date.is_some() {
            config.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            config.end_date = self.end_date;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub factor: String,
    pub factor_options: FactorOptions,
    pub overrides: BacktestOverrides,
    pub data_file: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

pub async fn run(app: &AppContext, request: &BacktestRequest) -> Result<()> {
    let config = request
        .overrides
        .apply(BacktestConfig::parse_settings_map(&settings_from_env())?)?;

    let registry = FactorRegistry::with_builtin();
    let mut factor = registry.create(&request.factor, &request.factor_options)?;

    // Factor history before the window start feeds the first rebalance.
    let filters = MarketDataFilters {
        start_date: None,
        end_date: config.end_date,
    };
    let prices = app.load_prices(request.data_file.as_deref(), filters).await?;
    if prices.len() <= factor.min_history() {
        warn!(
            "{} needs {} days of history but only {} are loaded; early rebalances will be skipped",
            factor.name(),
            factor.min_history(),
            prices.len()
        );
    }

    info!("Calculating {} scores", factor.name());
    let scores = factor.calculate(&prices)?;

    let engine = BacktestEngine::new(config)?;
    let run = engine.run_long_short(&prices, &scores)?;

    match run.summary_stats() {
        Some(stats) => {
            info!(
                "{}: total return {:.2}%, CAGR {:.2}%, volatility {:.2}%, Sharpe {:.2}, max drawdown {:.2}%",
                factor.name(),
                stats.total_return * 100.0,
                stats.cagr * 100.0,
                stats.annual_volatility * 100.0,
                stats.sharpe_ratio,
                stats.max_drawdown * 100.0
            );
            info!(
                "Final value ${:.0} after {} trading days, {} trades, ${:.0} commission, {} of {} rebalances skipped",
                stats.final_value,
                stats.trading_days,
                run.trades.len(),
                run.total_commission(),
                run.skipped_rebalances,
                run.rebalance_dates.len()
            );
        }
        None => warn!("Backtest recorded no snapshots"),
    }

    if let Some(path) = &request.report_path {
        BacktestReport::from_run(factor.name(), factor.params(), engine.config(), &run)
            .save_to_file(path)?;
        info!("Backtest report written to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = BacktestOverrides {
            rebalance_frequency: Some(RebalanceFrequency::Weekly),
            long_pct: Some(0.1),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..BacktestOverrides::default()
        };
        let config = overrides.apply(BacktestConfig::default()).unwrap();

        assert_eq!(config.rebalance_frequency, RebalanceFrequency::Weekly);
        assert_eq!(config.long_pct, 0.1);
        assert_eq!(config.short_pct, 0.2);
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(config.end_date, None);
    }

    #[test]
    fn overrides_can_repair_conflicting_settings() {
        let settings: HashMap<String, String> = [
            ("BACKTEST_LONG_PCT", "0.7"),
            ("BACKTEST_SHORT_PCT", "0.7"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        assert!(BacktestConfig::from_settings_map(&settings).is_err());

        let overrides = BacktestOverrides {
            short_pct: Some(0.2),
            ..BacktestOverrides::default()
        };
        let config = overrides
            .apply(BacktestConfig::parse_settings_map(&settings).unwrap())
            .unwrap();
        assert_eq!(config.long_pct, 0.7);
        assert_eq!(config.short_pct, 0.2);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = BacktestOverrides {
            long_pct: Some(0.7),
            short_pct: Some(0.7),
            ..BacktestOverrides::default()
        };
        assert!(overrides.apply(BacktestConfig::default()).is_err());
    }
}
