use super::{finalize_scores, Factor, FactorOptions};
use crate::cross_section::{validate_winsorize_limits, NormalizationMethod, DEFAULT_WINSORIZE_LIMITS};
use crate::error::ConfigError;
use crate::panel::{CrossSection, Panel};
use anyhow::{ensure, Result};
use serde_json::{json, Value};
use std::cmp::Ordering;

pub const DEFAULT_LOOKBACK_DAYS: usize = 252;
pub const DEFAULT_SKIP_DAYS: usize = 20;

/// Trailing return over `lookback_days`, measured up to `skip_days` before each date.
pub struct PriceMomentum {
    name: String,
    lookback_days: usize,
    skip_days: usize,
    normalize_method: NormalizationMethod,
    winsorize_limits: Option<(f64, f64)>,
    last_values: Option<CrossSection>,
}

impl PriceMomentum {
    pub fn new(
        lookback_days: usize,
        skip_days: usize,
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
            name: format!("momentum_{}d", lookback_days),
            lookback_days,
            skip_days,
            normalize_method,
            winsorize_limits,
            last_values: None,
        })
    }

    pub fn from_options(options: &FactorOptions) -> Result<Self, ConfigError> {
        let normalize_method = options.normalization_or(NormalizationMethod::ZScore)?;
        let winsorize_limits = if options.winsorize.unwrap_or(true) {
            Some(options.winsorize_limits.unwrap_or(DEFAULT_WINSORIZE_LIMITS))
        } else {
            None
        };
        Self::new(
            options.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            options.skip_days.unwrap_or(DEFAULT_SKIP_DAYS),
            normalize_method,
            winsorize_limits,
        )
    }

    /// Scores the panel and returns the strongest and weakest names of the latest date,
    /// both sorted by score descending.
    pub fn top_bottom(
        &mut self,
        prices: &Panel,
        top_n: usize,
        bottom_n: usize,
    ) -> Result<(Vec<(String, f64)>, Vec<(String, f64)>)> {
        let scores = self.calculate(prices)?;
        let mut latest: Vec<(String, f64)> = scores
            .last_cross_section()
            .unwrap_or_default()
            .into_iter()
            .collect();
        latest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let top = latest.iter().take(top_n).cloned().collect();
        let bottom = latest[latest.len().saturating_sub(bottom_n)..].to_vec();
        Ok((top, bottom))
    }
}

impl Factor for PriceMomentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Value {
        json!({
            "lookback_days": self.lookback_days,
            "skip_days": self.skip_days,
            "normalize_method": self.normalize_method.as_str(),
            "winsorize": self.winsorize_limits.is_some(),
            "winsorize_limits": self.winsorize_limits,
        })
    }

    fn min_history(&self) -> usize {
        self.lookback_days + self.skip_days
    }

    fn calculate(&mut self, prices: &Panel) -> Result<Panel> {
        ensure!(!prices.is_empty(), "{}: price panel is empty", self.name);

        let lagged = if self.skip_days > 0 {
            prices.shift(self.skip_days)
        } else {
            prices.clone()
        };
        let raw = lagged.pct_change(self.lookback_days);
        let scores = finalize_scores(raw, self.winsorize_limits, self.normalize_method);

        self.last_values = scores.last_cross_section();
        Ok(scores)
    }

    fn latest_values(&self) -> Option<&CrossSection> {
        self.last_values.as_ref()
    }
}
