use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ticker to signed share quantity. Flat tickers are absent.
pub type Positions = BTreeMap<String, f64>;

/// Ledger state recorded once per simulated date, after that date's trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub date: NaiveDate,
    pub total_value: f64,
    pub cash: f64,
    pub num_positions: usize,
    pub positions: Positions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub ticker: String,
    /// Signed share delta; negative sells or shorts.
    pub shares: f64,
    pub price: f64,
    pub commission: f64,
}

/// One row of the performance table derived from snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePoint {
    pub date: NaiveDate,
    pub total_value: f64,
    pub cash: f64,
    pub num_positions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_return: f64,
    pub cagr: f64,
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub final_value: f64,
    /// Steps between consecutive snapshots, used to annualize CAGR. Includes steps from
    /// a non-positive value, which have no return of their own.
    pub trading_days: usize,
}

/// Index constituent metadata, keyed by ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// Daily bar keyed by (ticker, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

/// Benchmark index level keyed by (date, index name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndexRow {
    pub date: NaiveDate,
    pub index_name: String,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}
