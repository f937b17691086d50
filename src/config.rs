use crate::error::ConfigError;
use crate::rebalance::RebalanceFrequency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

pub const SETTINGS_PREFIX: &str = "BACKTEST_";

/// Parameters of one long/short backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Proportional commission charged on the absolute notional of every trade.
    pub commission_pct: f64,
    pub rebalance_frequency: RebalanceFrequency,
    pub long_pct: f64,
    pub short_pct: f64,
    /// Rebalances with fewer tradable names than this are skipped.
    pub min_universe: usize,
    /// Adjustments of this many shares or fewer are not traded.
    pub trade_threshold_shares: f64,
    pub long_allocation: f64,
    pub short_allocation: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            commission_pct: 0.001,
            rebalance_frequency: RebalanceFrequency::Monthly,
            long_pct: 0.2,
            short_pct: 0.2,
            min_universe: 10,
            trade_threshold_shares: 0.1,
            long_allocation: 0.5,
            short_allocation: 0.5,
            start_date: None,
            end_date: None,
        }
    }
}

impl BacktestConfig {
    /// Builds a validated config from `BACKTEST_*` settings. Absent or blank keys keep
    /// their defaults.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Self::parse_settings_map(settings)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `BACKTEST_*` settings without checking how the values fit together, for
    /// callers that layer further overrides before validating.
    pub fn parse_settings_map(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut config = Self {
            initial_capital: optional_setting_f64(settings, "BACKTEST_INITIAL_CAPITAL")?
                .unwrap_or(defaults.initial_capital),
            commission_pct: optional_setting_f64(settings, "BACKTEST_COMMISSION_PCT")?
                .unwrap_or(defaults.commission_pct),
            rebalance_frequency: match optional_setting(settings, "BACKTEST_REBALANCE_FREQUENCY") {
                Some(raw) => raw.parse()?,
                None => defaults.rebalance_frequency,
            },
            long_pct: optional_setting_f64(settings, "BACKTEST_LONG_PCT")?
                .unwrap_or(defaults.long_pct),
            short_pct: optional_setting_f64(settings, "BACKTEST_SHORT_PCT")?
                .unwrap_or(defaults.short_pct),
            min_universe: optional_setting_usize(settings, "BACKTEST_MIN_UNIVERSE")?
                .unwrap_or(defaults.min_universe),
            ..defaults
        };
        config.start_date = optional_setting_date(settings, "BACKTEST_START_DATE")?;
        config.end_date = optional_setting_date(settings, "BACKTEST_END_DATE")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::invalid(
                "initial_capital",
                self.initial_capital,
                "must be a positive amount",
            ));
        }
        if !(0.0..1.0).contains(&self.commission_pct) {
            return Err(ConfigError::invalid(
                "commission_pct",
                self.commission_pct,
                "must be within [0, 1)",
            ));
        }
        for (key, value) in [("long_pct", self.long_pct), ("short_pct", self.short_pct)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::invalid(key, value, "must be within (0, 1]"));
            }
        }
        if self.long_pct + self.short_pct > 1.0 + f64::EPSILON {
            return Err(ConfigError::invalid(
                "long_pct + short_pct",
                self.long_pct + self.short_pct,
                "long and short baskets must not overlap",
            ));
        }
        for (key, value) in [
            ("long_allocation", self.long_allocation),
            ("short_allocation", self.short_allocation),
            ("trade_threshold_shares", self.trade_threshold_shares),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(key, value, "must be >= 0"));
            }
        }
        if self.min_universe == 0 {
            return Err(ConfigError::invalid(
                "min_universe",
                self.min_universe,
                "must be at least 1",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ConfigError::invalid(
                    "end_date",
                    end,
                    format!("must not precede start_date {}", start),
                ));
            }
        }
        Ok(())
    }
}

/// `BACKTEST_*` variables from the process environment.
pub fn settings_from_env() -> HashMap<String, String> {
    env::vars()
        .filter(|(key, _)| key.starts_with(SETTINGS_PREFIX))
        .collect()
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<f64>, ConfigError> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| ConfigError::invalid(key, raw, "must be a number"))?;
    if !value.is_finite() {
        return Err(ConfigError::invalid(key, raw, "must be finite"));
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<usize>, ConfigError> {
    let Some(value) = optional_setting_f64(settings, key)? else {
        return Ok(None);
    };
    if value.fract() != 0.0 || value < 0.0 {
        return Err(ConfigError::invalid(key, value, "must be a non-negative integer"));
    }
    Ok(Some(value as usize))
}

fn optional_setting_date(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<NaiveDate>, ConfigError> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ConfigError::invalid(key, raw, "must be a date in YYYY-MM-DD format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_settings_keep_defaults() {
        let config = BacktestConfig::from_settings_map(&HashMap::new()).unwrap();
        assert_eq!(config, BacktestConfig::default());
        assert_eq!(config.rebalance_frequency, RebalanceFrequency::Monthly);
    }

    #[test]
    fn reads_overrides_and_ignores_blank_values() {
        let config = BacktestConfig::from_settings_map(&settings(&[
            ("BACKTEST_INITIAL_CAPITAL", "250000"),
            ("BACKTEST_REBALANCE_FREQUENCY", " Weekly "),
            ("BACKTEST_LONG_PCT", "0.1"),
            ("BACKTEST_SHORT_PCT", ""),
            ("BACKTEST_MIN_UNIVERSE", "20"),
            ("BACKTEST_START_DATE", "2021-01-04"),
        ]))
        .unwrap();

        assert_eq!(config.initial_capital, 250_000.0);
        assert_eq!(config.rebalance_frequency, RebalanceFrequency::Weekly);
        assert_eq!(config.long_pct, 0.1);
        assert_eq!(config.short_pct, 0.2);
        assert_eq!(config.min_universe, 20);
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2021, 1, 4));
    }

    #[test]
    fn rejects_unknown_frequency() {
        let err = BacktestConfig::from_settings_map(&settings(&[(
            "BACKTEST_REBALANCE_FREQUENCY",
            "fortnightly",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownRebalanceFrequency("fortnightly".to_string())
        );
    }

    #[test]
    fn rejects_invalid_values_with_key_name() {
        let err = BacktestConfig::from_settings_map(&settings(&[(
            "BACKTEST_COMMISSION_PCT",
            "abc",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("BACKTEST_COMMISSION_PCT"));

        let overlapping = BacktestConfig {
            long_pct: 0.6,
            short_pct: 0.6,
            ..BacktestConfig::default()
        };
        assert!(overlapping.validate().is_err());

        let no_capital = BacktestConfig {
            initial_capital: 0.0,
            ..BacktestConfig::default()
        };
        assert!(no_capital.validate().is_err());

        let inverted = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2022, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2021, 1, 1),
            ..BacktestConfig::default()
        };
        assert!(inverted.validate().is_err());
    }
}
