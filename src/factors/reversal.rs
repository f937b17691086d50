use super::{finalize_scores, Factor, FactorOptions};
use crate::cross_section::{validate_winsorize_limits, NormalizationMethod, DEFAULT_WINSORIZE_LIMITS};
use crate::error::ConfigError;
use crate::panel::{CrossSection, Panel};
use anyhow::{ensure, Result};
use serde_json::{json, Value};

pub const DEFAULT_LOOKBACK_DAYS: usize = 20;

/// Negated short-horizon return: recent losers score high, recent winners low.
pub struct ShortTermReversal {
    name: String,
    lookback_days: usize,
    normalize_method: NormalizationMethod,
    winsorize_limits: Option<(f64, f64)>,
    last_values: Option<CrossSection>,
}

impl ShortTermReversal {
    pub fn new(
        lookback_days: usize,
        normalize_method: NormalizationMethod,
        winsorize_limits: Option<(f64, f64)>,
    ) -> Result<Self, ConfigError> {
        if lookback_days == 0 {
            return Err(ConfigError::invalid(
                "lookback_days",
                lookback_days,
                "must be at least 1",
            ));
        }
        if let Some(limits) = winsorize_limits {
            validate_winsorize_limits(limits)?;
        }
        Ok(Self {
            name: format!("reversal_{}d", lookback_days),
            lookback_days,
            normalize_method,
            winsorize_limits,
            last_values: None,
        })
    }

    pub fn from_options(options: &FactorOptions) -> Result<Self, ConfigError> {
        if let Some(skip_days) = options.skip_days.filter(|skip| *skip > 0) {
            return Err(ConfigError::invalid(
                "skip_days",
                skip_days,
                "reversal measures the most recent window and takes no skip period",
            ));
        }
        let normalize_method = options.normalization_or(NormalizationMethod::ZScore)?;
        let winsorize_limits = if options.winsorize.unwrap_or(false) {
            Some(options.winsorize_limits.unwrap_or(DEFAULT_WINSORIZE_LIMITS))
        } else {
            None
        };
        Self::new(
            options.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            normalize_method,
            winsorize_limits,
        )
    }
}

impl Factor for ShortTermReversal {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Value {
        json!({
            "lookback_days": self.lookback_days,
            "normalize_method": self.normalize_method.as_str(),
            "winsorize": self.winsorize_limits.is_some(),
            "winsorize_limits": self.winsorize_limits,
        })
    }

    fn min_history(&self) -> usize {
        self.lookback_days
    }

    fn calculate(&mut self, prices: &Panel) -> Result<Panel> {
        ensure!(!prices.is_empty(), "{}: price panel is empty", self.name);

        let raw = prices.pct_change(self.lookback_days).map_values(|value| -value);
        let scores = finalize_scores(raw, self.winsorize_limits, self.normalize_method);

        self.last_values = scores.last_cross_section();
        Ok(scores)
    }

    fn latest_values(&self) -> Option<&CrossSection> {
        self.last_values.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn prices() -> Panel {
        let dates = (2..=7)
            .map(|day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
            .collect();
        Panel::new(
            dates,
            vec!["AAA".into(), "BBB".into(), "CCC".into(), "DDD".into()],
            vec![
                vec![Some(100.0), Some(100.0), Some(100.0), Some(100.0)],
                vec![Some(101.0), Some(99.0), Some(100.0), None],
                vec![Some(103.0), Some(97.0), Some(100.5), Some(100.0)],
                vec![Some(104.0), Some(95.0), Some(101.0), Some(101.0)],
                vec![Some(106.0), Some(94.0), Some(101.0), Some(102.0)],
                vec![Some(110.0), Some(90.0), Some(100.0), Some(104.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn losers_score_above_winners() {
        let mut factor = ShortTermReversal::new(3, NormalizationMethod::Rank, None).unwrap();
        let scores = factor.calculate(&prices()).unwrap();
        let latest = factor.latest_values().unwrap();

        assert_eq!(latest.get("BBB"), Some(&1.0));
        assert_eq!(latest.get("AAA"), Some(&0.25));
        assert_eq!(scores.row(2), &[None, None, None, None]);
    }

    #[test]
    fn raw_values_are_negated_returns() {
        let mut factor = ShortTermReversal::new(1, NormalizationMethod::Demean, None).unwrap();
        let scores = factor.calculate(&prices()).unwrap();

        // Row 1: AAA +1%, BBB -1%, CCC flat, DDD missing
        assert!((scores.value(1, "AAA").unwrap() + 0.01).abs() < 1e-12);
        assert!((scores.value(1, "BBB").unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(scores.value(1, "DDD"), None);
        assert_eq!(scores.value(2, "DDD"), None);
    }

    #[test]
    fn defaults_follow_short_horizon() {
        let factor = ShortTermReversal::from_options(&FactorOptions::default()).unwrap();
        assert_eq!(factor.name(), "reversal_20d");
        assert_eq!(factor.min_history(), 20);
        assert_eq!(factor.params()["winsorize"], false);

        let skip = FactorOptions {
            skip_days: Some(5),
            ..FactorOptions::default()
        };
        assert!(ShortTermReversal::from_options(&skip).is_err());
    }
}
