use anyhow::{ensure, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Present values of a single date keyed by ticker. Missing quotes are absent, never zero.
pub type CrossSection = BTreeMap<String, f64>;

/// Date-indexed table with one column per ticker.
///
/// Rows are strictly increasing by date. A `None` cell means "no value that day" and is
/// carried through every transform as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl Panel {
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        ensure!(
            rows.len() == dates.len(),
            "panel has {} dates but {} rows",
            dates.len(),
            rows.len()
        );
        for (index, row) in rows.iter().enumerate() {
            ensure!(
                row.len() == tickers.len(),
                "panel row {} has {} cells, expected {}",
                index,
                row.len(),
                tickers.len()
            );
        }
        for window in dates.windows(2) {
            ensure!(
                window[0] < window[1],
                "panel dates must be strictly increasing ({} followed by {})",
                window[0],
                window[1]
            );
        }
        let mut seen = HashSet::with_capacity(tickers.len());
        for ticker in &tickers {
            ensure!(seen.insert(ticker.as_str()), "duplicate ticker column {}", ticker);
        }

        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.filter(|value| value.is_finite()))
                    .collect()
            })
            .collect();

        Ok(Self {
            dates,
            tickers,
            rows,
        })
    }

    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            tickers: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Pivots long `(date, ticker, value)` observations into a panel.
    ///
    /// Dates and tickers come out sorted. Duplicate keys keep the last observation and
    /// non-finite values are treated as missing.
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, String, f64)>,
    {
        let mut cells: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
        let mut tickers = BTreeSet::new();
        for (date, ticker, value) in observations {
            tickers.insert(ticker.clone());
            cells.insert((date, ticker), value);
        }

        let dates: Vec<NaiveDate> = cells
            .keys()
            .map(|(date, _)| *date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let tickers: Vec<String> = tickers.into_iter().collect();
        let mut rows = vec![vec![None; tickers.len()]; dates.len()];

        for ((date, ticker), value) in cells {
            if !value.is_finite() {
                continue;
            }
            if let (Ok(row), Ok(col)) = (dates.binary_search(&date), tickers.binary_search(&ticker))
            {
                rows[row][col] = Some(value);
            }
        }

        Self {
            dates,
            tickers,
            rows,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.tickers.is_empty()
    }

    pub fn row(&self, index: usize) -> &[Option<f64>] {
        &self.rows[index]
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|candidate| candidate == ticker)
    }

    pub fn value(&self, row: usize, ticker: &str) -> Option<f64> {
        let col = self.ticker_index(ticker)?;
        self.rows.get(row).and_then(|cells| cells[col])
    }

    pub fn cross_section(&self, index: usize) -> CrossSection {
        self.tickers
            .iter()
            .zip(self.rows[index].iter())
            .filter_map(|(ticker, cell)| cell.map(|value| (ticker.clone(), value)))
            .collect()
    }

    pub fn last_cross_section(&self) -> Option<CrossSection> {
        self.len()
            .checked_sub(1)
            .map(|index| self.cross_section(index))
    }

    /// Index of the most recent row dated on or before `date`.
    pub fn as_of_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates
            .partition_point(|candidate| *candidate <= date)
            .checked_sub(1)
    }

    /// Moves every column down by `periods` rows; the first `periods` rows become missing.
    pub fn shift(&self, periods: usize) -> Panel {
        let width = self.tickers.len();
        let rows = (0..self.len())
            .map(|index| match index.checked_sub(periods) {
                Some(source) => self.rows[source].clone(),
                None => vec![None; width],
            })
            .collect();
        self.with_rows(rows)
    }

    /// `value[t] / value[t - periods] - 1`, missing when either side is missing or the base is zero.
    pub fn pct_change(&self, periods: usize) -> Panel {
        let width = self.tickers.len();
        let rows = (0..self.len())
            .map(|index| match index.checked_sub(periods) {
                Some(base_index) => self.rows[index]
                    .iter()
                    .zip(self.rows[base_index].iter())
                    .map(|(current, base)| match (current, base) {
                        (Some(current), Some(base)) if *base != 0.0 => {
                            Some(current / base - 1.0).filter(|value| value.is_finite())
                        }
                        _ => None,
                    })
                    .collect(),
                None => vec![None; width],
            })
            .collect();
        self.with_rows(rows)
    }

    pub fn map_values<F>(&self, f: F) -> Panel
    where
        F: Fn(f64) -> f64,
    {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(&f).filter(|value| value.is_finite()))
                    .collect()
            })
            .collect();
        self.with_rows(rows)
    }

    /// Applies a per-date transform to every row. Rows are independent, so they run on the rayon pool.
    pub fn map_rows<F>(&self, f: F) -> Panel
    where
        F: Fn(&[Option<f64>]) -> Vec<Option<f64>> + Sync + Send,
    {
        let rows: Vec<Vec<Option<f64>>> = self.rows.par_iter().map(|row| f(row)).collect();
        debug_assert!(rows.iter().all(|row| row.len() == self.tickers.len()));
        self.with_rows(rows)
    }

    pub fn restrict_to_date_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Panel {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for (date, row) in self.dates.iter().zip(self.rows.iter()) {
            if start.map_or(false, |start| *date < start) || end.map_or(false, |end| *date > end)
            {
                continue;
            }
            dates.push(*date);
            rows.push(row.clone());
        }

        Panel {
            dates,
            tickers: self.tickers.clone(),
            rows,
        }
    }

    fn with_rows(&self, rows: Vec<Vec<Option<f64>>>) -> Panel {
        Panel {
            dates: self.dates.clone(),
            tickers: self.tickers.clone(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample_panel() -> Panel {
        Panel::new(
            vec![date(2), date(3), date(4), date(5)],
            vec!["AAA".to_string(), "BBB".to_string()],
            vec![
                vec![Some(100.0), Some(50.0)],
                vec![Some(110.0), None],
                vec![Some(121.0), Some(55.0)],
                vec![Some(0.0), Some(60.5)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_unsorted_dates_and_duplicate_tickers() {
        let unsorted = Panel::new(
            vec![date(3), date(2)],
            vec!["AAA".to_string()],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        );
        assert!(unsorted.is_err());

        let duplicated = Panel::new(
            vec![date(2)],
            vec!["AAA".to_string(), "AAA".to_string()],
            vec![vec![Some(1.0), Some(2.0)]],
        );
        assert!(duplicated.is_err());
    }

    #[test]
    fn pivots_observations_with_last_write_wins() {
        let panel = Panel::from_observations(vec![
            (date(3), "BBB".to_string(), 20.0),
            (date(2), "AAA".to_string(), 10.0),
            (date(3), "BBB".to_string(), 21.0),
        ]);

        assert_eq!(panel.dates(), &[date(2), date(3)]);
        assert_eq!(panel.tickers(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(panel.value(1, "BBB"), Some(21.0));
        assert_eq!(panel.value(0, "BBB"), None);
    }

    #[test]
    fn pct_change_propagates_missing_values() {
        let changes = sample_panel().pct_change(1);

        assert_eq!(changes.row(0), &[None, None]);
        assert!((changes.value(1, "AAA").unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(changes.value(1, "BBB"), None);
        assert_eq!(changes.value(2, "BBB"), None);
        assert!((changes.value(3, "BBB").unwrap() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn pct_change_treats_zero_base_as_missing() {
        let panel = Panel::new(
            vec![date(2), date(3)],
            vec!["AAA".to_string()],
            vec![vec![Some(0.0)], vec![Some(5.0)]],
        )
        .unwrap();
        assert_eq!(panel.pct_change(1).value(1, "AAA"), None);
    }

    #[test]
    fn shift_moves_rows_forward() {
        let shifted = sample_panel().shift(2);
        assert_eq!(shifted.row(1), &[None, None]);
        assert_eq!(shifted.value(2, "AAA"), Some(100.0));
        assert_eq!(shifted.value(3, "BBB"), None);
    }

    #[test]
    fn as_of_index_never_looks_ahead() {
        let panel = sample_panel();
        assert_eq!(panel.as_of_index(date(1)), None);
        assert_eq!(panel.as_of_index(date(3)), Some(1));
        assert_eq!(panel.as_of_index(date(31)), Some(3));
    }

    #[test]
    fn cross_section_skips_missing_cells() {
        let section = sample_panel().cross_section(1);
        assert_eq!(section.len(), 1);
        assert_eq!(section.get("AAA"), Some(&110.0));
    }

    #[test]
    fn restricts_to_inclusive_window() {
        let window = sample_panel().restrict_to_date_range(Some(date(3)), Some(date(4)));
        assert_eq!(window.dates(), &[date(3), date(4)]);
        assert_eq!(window.value(1, "BBB"), Some(55.0));
    }
}
