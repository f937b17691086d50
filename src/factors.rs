use crate::cross_section::{normalize, winsorize, NormalizationMethod};
use crate::error::ConfigError;
use crate::panel::{CrossSection, Panel};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Cross-sectional alpha signal computed from a price panel.
pub trait Factor: Send + Sync {
    fn name(&self) -> &str;
    fn params(&self) -> Value;
    /// Rows of price history consumed before the first non-missing score.
    fn min_history(&self) -> usize;
    /// Scores with the same dates and tickers as `prices`. Caches the most recent row.
    fn calculate(&mut self, prices: &Panel) -> Result<Panel>;
    fn latest_values(&self) -> Option<&CrossSection>;
}

#[path = "factors/momentum.rs"]
pub mod momentum;

pub use momentum::PriceMomentum;

#[path = "factors/reversal.rs"]
pub mod reversal;

pub use reversal::ShortTermReversal;

/// Optional overrides applied on top of each factor's own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorOptions {
    pub lookback_days: Option<usize>,
    pub skip_days: Option<usize>,
    pub normalize_method: Option<String>,
    pub winsorize: Option<bool>,
    pub winsorize_limits: Option<(f64, f64)>,
}

impl FactorOptions {
    pub(crate) fn normalization_or(
        &self,
        default: NormalizationMethod,
    ) -> Result<NormalizationMethod, ConfigError> {
        match self.normalize_method.as_deref() {
            Some(raw) => raw.parse(),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    Momentum,
    Reversal,
}

impl FactorKind {
    pub const ALL: [FactorKind; 2] = [FactorKind::Momentum, FactorKind::Reversal];

    pub fn as_str(self) -> &'static str {
        match self {
            FactorKind::Momentum => "momentum",
            FactorKind::Reversal => "reversal",
        }
    }
}

impl FromStr for FactorKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        FactorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownFactor {
                name: raw.to_string(),
                available: FactorKind::ALL
                    .iter()
                    .map(|kind| kind.as_str().to_string())
                    .collect(),
            })
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type FactorConstructor = fn(&FactorOptions) -> Result<Box<dyn Factor>, ConfigError>;

/// Factor identifiers mapped to their constructors. Built once, read-only afterwards.
pub struct FactorRegistry {
    constructors: BTreeMap<FactorKind, FactorConstructor>,
}

impl FactorRegistry {
    pub fn with_builtin() -> Self {
        let mut constructors: BTreeMap<FactorKind, FactorConstructor> = BTreeMap::new();
        constructors.insert(FactorKind::Momentum, build_momentum);
        constructors.insert(FactorKind::Reversal, build_reversal);
        Self { constructors }
    }

    pub fn create(
        &self,
        name: &str,
        options: &FactorOptions,
    ) -> Result<Box<dyn Factor>, ConfigError> {
        let unknown = || ConfigError::UnknownFactor {
            name: name.to_string(),
            available: self.list().into_iter().map(str::to_string).collect(),
        };
        let kind: FactorKind = name.parse().map_err(|_| unknown())?;
        let constructor = self.constructors.get(&kind).ok_or_else(unknown)?;
        constructor(options)
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.constructors.keys().map(|kind| kind.as_str()).collect()
    }
}

fn build_momentum(options: &FactorOptions) -> Result<Box<dyn Factor>, ConfigError> {
    Ok(Box::new(PriceMomentum::from_options(options)?))
}

fn build_reversal(options: &FactorOptions) -> Result<Box<dyn Factor>, ConfigError> {
    Ok(Box::new(ShortTermReversal::from_options(options)?))
}

/// Optional outlier clipping followed by the chosen cross-sectional normalization.
pub(crate) fn finalize_scores(
    raw: Panel,
    winsorize_limits: Option<(f64, f64)>,
    method: NormalizationMethod,
) -> Panel {
    let clipped = match winsorize_limits {
        Some(limits) => winsorize(&raw, limits),
        None => raw,
    };
    normalize(&clipped, method)
}
