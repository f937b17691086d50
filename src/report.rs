use crate::config::BacktestConfig;
use crate::engine::BacktestRun;
use crate::models::{PerformancePoint, Snapshot, SummaryStats, TradeRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// JSON-serialisable record of one finished backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    pub factor_name: String,
    pub factor_params: Value,
    pub config: BacktestConfig,
    pub stats: Option<SummaryStats>,
    pub total_commission: f64,
    pub rebalance_dates: Vec<NaiveDate>,
    pub skipped_rebalances: usize,
    pub performance: Vec<PerformancePoint>,
    pub snapshots: Vec<Snapshot>,
    pub trades: Vec<TradeRecord>,
    pub created_at: DateTime<Utc>,
}

impl BacktestReport {
    pub fn from_run(
        factor_name: &str,
        factor_params: Value,
        config: &BacktestConfig,
        run: &BacktestRun,
    ) -> Self {
        Self {
            factor_name: factor_name.to_string(),
            factor_params,
            config: config.clone(),
            stats: run.summary_stats(),
            total_commission: run.total_commission(),
            rebalance_dates: run.rebalance_dates.clone(),
            skipped_rebalances: run.skipped_rebalances,
            performance: run.performance_frame(),
            snapshots: run.ledger.snapshots().to_vec(),
            trades: run.trades.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create report directory {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Unable to create report at {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize report")?;
        writer.flush().context("Failed to flush report to disk")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::panel::CrossSection;
    use serde_json::json;

    fn finished_run() -> BacktestRun {
        let mut ledger = Ledger::new(1_000.0);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let prices: CrossSection = [("AAA".to_string(), 10.0)].into_iter().collect();
        let commission = ledger.apply_trade("AAA", 10.0, 10.0, 0.001);
        ledger.record_snapshot(date, &prices);
        BacktestRun {
            ledger,
            trades: vec![TradeRecord {
                date,
                ticker: "AAA".to_string(),
                shares: 10.0,
                price: 10.0,
                commission,
            }],
            rebalance_dates: vec![date],
            skipped_rebalances: 0,
        }
    }

    #[test]
    fn report_serializes_with_camel_case_keys() {
        let run = finished_run();
        let report = BacktestReport::from_run(
            "momentum_252d",
            json!({"lookbackDays": 252}),
            &BacktestConfig::default(),
            &run,
        );
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["factorName"], "momentum_252d");
        assert_eq!(value["config"]["rebalanceFrequency"], "monthly");
        assert_eq!(value["snapshots"].as_array().unwrap().len(), 1);
        assert!((value["totalCommission"].as_f64().unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(value["stats"]["tradingDays"], 0);
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = std::env::temp_dir().join(format!("alpha-engine-report-{}", std::process::id()));
        let path = dir.join("report.json");
        let run = finished_run();
        BacktestReport::from_run("reversal_20d", json!({}), &BacktestConfig::default(), &run)
            .save_to_file(&path)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: BacktestReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.factor_name, "reversal_20d");
        assert_eq!(parsed.trades.len(), 1);

        fs::remove_dir_all(dir).ok();
    }
}
