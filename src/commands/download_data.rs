use crate::context::AppContext;
use crate::retry::retry_db_operation;
use crate::yahoo::YahooFinanceClient;
use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

pub const DEFAULT_INDEX_SYMBOL: &str = "^GSPC";
pub const DEFAULT_YEARS_OF_HISTORY: u32 = 10;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub years: u32,
    /// Only the first `limit` constituents are fetched when set.
    pub limit: Option<usize>,
    pub index_symbol: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            years: DEFAULT_YEARS_OF_HISTORY,
            limit: None,
            index_symbol: DEFAULT_INDEX_SYMBOL.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct DownloadSummary {
    tickers_loaded: usize,
    tickers_failed: usize,
    price_rows: usize,
}

pub async fn run(app: &AppContext, options: &DownloadOptions) -> Result<()> {
    let mut db = app.database().await?;
    let client = YahooFinanceClient::new()?;

    let end = Utc::now().date_naive();
    let start = history_start(end, options.years);
    info!(
        "Downloading daily prices from {} to {} (index {})",
        start, end, options.index_symbol
    );

    let mut securities = client.get_sp500_constituents().await?;
    if let Some(limit) = options.limit {
        securities.truncate(limit);
    }
    info!("Fetched {} index constituents", securities.len());

    let written = retry_db_operation!("upserting securities", async {
        db.upsert_securities(&securities).await
    })?;
    info!("Stored {} securities", written);

    let pb = ProgressBar::new(securities.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut summary = DownloadSummary::default();
    for security in &securities {
        let ticker = security.ticker.as_str();
        pb.set_message(ticker.to_string());

        match client.get_historical_prices(ticker, start, end).await {
            Ok(bars) if bars.is_empty() => {
                warn!("No price rows returned for {}", ticker);
                summary.tickers_failed += 1;
            }
            Ok(bars) => {
                let context = format!("upserting prices for {}", ticker);
                match retry_db_operation!(context, async { db.upsert_daily_prices(&bars).await }) {
                    Ok(rows) => {
                        summary.tickers_loaded += 1;
                        summary.price_rows += rows;
                    }
                    Err(err) => {
                        error!("Failed to store prices for {}: {}", ticker, err);
                        summary.tickers_failed += 1;
                    }
                }
            }
            Err(err) => {
                error!("Failed to download prices for {}: {}", ticker, err);
                summary.tickers_failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Stored {} price rows for {} tickers ({} failed)",
        summary.price_rows, summary.tickers_loaded, summary.tickers_failed
    );

    match client
        .get_index_data(&options.index_symbol, start, end)
        .await
    {
        Ok(rows) => {
            let written = retry_db_operation!("upserting index data", async {
                db.upsert_market_data(&rows).await
            })?;
            info!("Stored {} {} index rows", written, options.index_symbol);
        }
        Err(err) => warn!(
            "Failed to download index data for {}: {}",
            options.index_symbol, err
        ),
    }

    Ok(())
}

fn history_start(end: NaiveDate, years: u32) -> NaiveDate {
    end - Duration::days(365 * i64::from(years))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_counts_calendar_years() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(
            history_start(end, 2),
            NaiveDate::from_ymd_opt(2022, 7, 1).unwrap()
        );
        assert_eq!(history_start(end, 0), end);
    }

    #[test]
    fn defaults_to_the_sp500_index() {
        let options = DownloadOptions::default();
        assert_eq!(options.index_symbol, "^GSPC");
        assert_eq!(options.limit, None);
    }
}
