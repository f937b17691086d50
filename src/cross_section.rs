use crate::error::ConfigError;
use crate::panel::Panel;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WINSORIZE_LIMITS: (f64, f64) = (0.01, 0.99);

// Cross-sections whose dispersion falls below this are treated as having no spread.
const MIN_STD_DEV: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMethod {
    ZScore,
    Rank,
    Demean,
}

impl NormalizationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            NormalizationMethod::ZScore => "zscore",
            NormalizationMethod::Rank => "rank",
            NormalizationMethod::Demean => "demean",
        }
    }
}

impl FromStr for NormalizationMethod {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zscore" | "z-score" => Ok(NormalizationMethod::ZScore),
            "rank" => Ok(NormalizationMethod::Rank),
            "demean" => Ok(NormalizationMethod::Demean),
            _ => Err(ConfigError::UnknownNormalization(raw.to_string())),
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes every date of the panel across its tickers.
pub fn normalize(values: &Panel, method: NormalizationMethod) -> Panel {
    values.map_rows(|row| normalize_row(row, method))
}

pub fn normalize_row(row: &[Option<f64>], method: NormalizationMethod) -> Vec<Option<f64>> {
    match method {
        NormalizationMethod::ZScore => zscore_row(row),
        NormalizationMethod::Rank => rank_row(row),
        NormalizationMethod::Demean => demean_row(row),
    }
}

/// Clips each date's values to that date's `[lower, upper]` quantiles.
pub fn winsorize(values: &Panel, limits: (f64, f64)) -> Panel {
    values.map_rows(|row| winsorize_row(row, limits))
}

pub fn winsorize_row(row: &[Option<f64>], limits: (f64, f64)) -> Vec<Option<f64>> {
    let mut sorted = present_values(row);
    if sorted.is_empty() {
        return row.to_vec();
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let (Some(lower), Some(upper)) = (
        quantile(&sorted, limits.0, QuantileSide::Lower),
        quantile(&sorted, limits.1, QuantileSide::Upper),
    ) else {
        return row.to_vec();
    };

    row.iter()
        .map(|cell| cell.map(|value| value.clamp(lower, upper)))
        .collect()
}

pub fn validate_winsorize_limits(limits: (f64, f64)) -> Result<(), ConfigError> {
    let (lower, upper) = limits;
    if !(lower.is_finite() && upper.is_finite()) || lower < 0.0 || upper > 1.0 || lower >= upper {
        return Err(ConfigError::invalid(
            "winsorize_limits",
            format!("({}, {})", lower, upper),
            "bounds must satisfy 0 <= lower < upper <= 1",
        ));
    }
    Ok(())
}

/// Which neighbouring observation a quantile falls back to between two ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantileSide {
    Lower,
    Upper,
}

/// Quantile of already sorted values. `Lower` picks the observation at
/// `floor(q * (n - 1))`, `Upper` the one at `ceil(q * (n - 1))`.
///
/// Bounds are always actual observations, which keeps winsorizing idempotent.
pub fn quantile(sorted: &[f64], q: f64, side: QuantileSide) -> Option<f64> {
    if sorted.is_empty() || !q.is_finite() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let nearest = position.round();
    let idx = if (position - nearest).abs() < 1e-9 {
        nearest
    } else {
        match side {
            QuantileSide::Lower => position.floor(),
            QuantileSide::Upper => position.ceil(),
        }
    } as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Percentile ranks in (0, 1], tied values sharing their average rank.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // 1-based positions start+1..=end+1 share their mean
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        for &position in &order[start..=end] {
            ranks[position] = average_rank / n as f64;
        }
        start = end + 1;
    }
    ranks
}

fn zscore_row(row: &[Option<f64>]) -> Vec<Option<f64>> {
    let present = present_values(row);
    if present.len() < 2 {
        return vec![None; row.len()];
    }

    let mean = present.iter().mean();
    let std_dev = present.iter().std_dev();
    if !std_dev.is_finite() || std_dev <= MIN_STD_DEV {
        return vec![None; row.len()];
    }

    row.iter()
        .map(|cell| cell.map(|value| (value - mean) / std_dev))
        .collect()
}

fn rank_row(row: &[Option<f64>]) -> Vec<Option<f64>> {
    let present = present_values(row);
    let mut ranks = percentile_ranks(&present).into_iter();
    row.iter()
        .map(|cell| cell.and_then(|_| ranks.next()))
        .collect()
}

fn demean_row(row: &[Option<f64>]) -> Vec<Option<f64>> {
    let present = present_values(row);
    if present.is_empty() {
        return row.to_vec();
    }
    let mean = present.iter().mean();
    row.iter().map(|cell| cell.map(|value| value - mean)).collect()
}

fn present_values(row: &[Option<f64>]) -> Vec<f64> {
    row.iter().filter_map(|cell| *cell).collect()
}
