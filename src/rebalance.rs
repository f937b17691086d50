use crate::error::ConfigError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            _ => Err(ConfigError::UnknownRebalanceFrequency(raw.to_string())),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indices of `dates` on which the portfolio is rebalanced.
///
/// The first date always opens a period; afterwards a date is selected when its calendar
/// week, month or quarter differs from the previous date's. `dates` must be ascending.
pub fn rebalance_indices(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Vec<usize> {
    match frequency {
        RebalanceFrequency::Daily => (0..dates.len()).collect(),
        RebalanceFrequency::Weekly => period_start_indices(dates, |date| {
            let week = date.iso_week();
            (week.year(), week.week())
        }),
        RebalanceFrequency::Monthly => {
            period_start_indices(dates, |date| (date.year(), date.month()))
        }
        RebalanceFrequency::Quarterly => {
            period_start_indices(dates, |date| (date.year(), date.month0() / 3))
        }
    }
}

pub fn rebalance_dates(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Vec<NaiveDate> {
    rebalance_indices(dates, frequency)
        .into_iter()
        .map(|index| dates[index])
        .collect()
}

fn period_start_indices<T, F>(dates: &[NaiveDate], period_of: F) -> Vec<usize>
where
    T: PartialEq,
    F: Fn(&NaiveDate) -> T,
{
    let mut indices = Vec::new();
    let mut current: Option<T> = None;
    for (index, date) in dates.iter().enumerate() {
        let period = period_of(date);
        if current.as_ref() != Some(&period) {
            indices.push(index);
            current = Some(period);
        }
    }
    indices
}
