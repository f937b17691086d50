use crate::panel::Panel;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;

/// Adjusted close panel persisted with bincode so backtests can run without a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    prices: Panel,
}

impl MarketDataSnapshot {
    pub fn new(prices: Panel) -> Result<Self> {
        if prices.is_empty() {
            return Err(anyhow!("Market data snapshot has no usable tickers or prices"));
        }
        Ok(Self {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            prices,
        })
    }

    pub fn prices(&self) -> &Panel {
        &self.prices
    }

    pub fn into_prices(self) -> Panel {
        self.prices
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!("Failed to open market data snapshot at {}", path.display())
        })?;
        let reader = BufReader::new(file);
        let snapshot: MarketDataSnapshot =
            bincode::deserialize_from(reader).context("Snapshot decode failed")?;

        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Market data snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                MARKET_DATA_SNAPSHOT_VERSION
            ));
        }
        if snapshot.prices.is_empty() {
            return Err(anyhow!("Market data snapshot at {} is empty", path.display()));
        }

        info!(
            "Loaded market data snapshot from {} ({} dates, {} tickers, generated {})",
            path.display(),
            snapshot.prices.len(),
            snapshot.prices.tickers().len(),
            snapshot.generated_at.format("%Y-%m-%d %H:%M")
        );
        Ok(snapshot)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path).with_context(|| {
            format!(
                "Unable to create market data snapshot at {}",
                path.display()
            )
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .context("Failed to serialize market data snapshot")?;
        writer
            .flush()
            .context("Failed to flush market data snapshot to disk")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("alpha-engine-{}-{}", std::process::id(), name))
            .join("market-data.bin")
    }

    fn sample_prices() -> Panel {
        Panel::new(
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            ],
            vec!["AAA".to_string(), "BBB".to_string()],
            vec![vec![Some(10.0), None], vec![Some(10.5), Some(20.0)]],
        )
        .unwrap()
    }

    #[test]
    fn snapshot_survives_a_file_round_trip() {
        let path = temp_path("round-trip");
        let snapshot = MarketDataSnapshot::new(sample_prices()).unwrap();
        snapshot.save_to_file(&path).unwrap();

        let loaded = MarketDataSnapshot::load_from_file(&path).unwrap();
        assert_eq!(loaded.prices(), snapshot.prices());
        assert_eq!(loaded.prices().value(0, "BBB"), None);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn rejects_other_versions_and_empty_panels() {
        assert!(MarketDataSnapshot::new(Panel::empty()).is_err());

        let path = temp_path("version");
        let mut snapshot = MarketDataSnapshot::new(sample_prices()).unwrap();
        snapshot.version = MARKET_DATA_SNAPSHOT_VERSION + 1;
        snapshot.save_to_file(&path).unwrap();

        let err = MarketDataSnapshot::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
