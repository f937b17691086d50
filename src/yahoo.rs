use crate::models::{DailyPrice, MarketIndexRow, SecurityInfo};
use crate::retry::retry_with_backoff;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use tokio::time::sleep;

pub const SP500_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/master/data/constituents.csv";
const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct ConstituentRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Security")]
    security: Option<String>,
    #[serde(rename = "GICS Sector")]
    sector: Option<String>,
    #[serde(rename = "GICS Sub-Industry")]
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Index constituents and daily bars from Yahoo Finance.
pub struct YahooFinanceClient {
    http: Client,
    chart_base_url: String,
}

impl YahooFinanceClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            chart_base_url: CHART_BASE_URL.to_string(),
        })
    }

    pub async fn get_sp500_constituents(&self) -> Result<Vec<SecurityInfo>> {
        let http = &self.http;
        let body = retry_with_backoff("S&P 500 constituents", || async move {
            http.get(SP500_CONSTITUENTS_URL)
                .send()
                .await
                .context("constituents request failed")?
                .error_for_status()
                .context("constituents request returned error")?
                .text()
                .await
                .context("failed to read constituents body")
        })
        .await?;
        parse_constituents(body.as_bytes())
    }

    /// Daily bars for `symbol` in `[start, end]`. Days without a quote produce no row.
    pub async fn get_historical_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPrice>> {
        let response = self.fetch_chart(symbol, start, end).await?;
        parse_chart(symbol, response)
    }

    /// Closing levels and volume of an index such as `^GSPC`.
    pub async fn get_index_data(
        &self,
        index_symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MarketIndexRow>> {
        let bars = self.get_historical_prices(index_symbol, start, end).await?;
        Ok(bars
            .into_iter()
            .map(|bar| MarketIndexRow {
                date: bar.date,
                index_name: index_symbol.to_string(),
                close: bar.close,
                volume: bar.volume,
            })
            .collect())
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChartResponse> {
        let url = chart_url(&self.chart_base_url, symbol, start, end)?;
        let url = url.as_str();
        let http = &self.http;
        retry_with_backoff(symbol, || async move {
            sleep(REQUEST_DELAY).await;
            http.get(url)
                .send()
                .await
                .with_context(|| format!("GET chart for {} failed", symbol))?
                .error_for_status()
                .with_context(|| format!("chart request for {} returned error", symbol))?
                .json::<ChartResponse>()
                .await
                .with_context(|| format!("failed to parse chart response for {}", symbol))
        })
        .await
    }
}

fn chart_url(base_url: &str, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<String> {
    let period1 = start
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid start date {}", start))?
        .and_utc()
        .timestamp();
    let period2 = end
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("invalid end date {}", end))?
        .and_utc()
        .timestamp();
    Ok(format!(
        "{}/{}?period1={}&period2={}&interval=1d&events=div%2Csplits&includeAdjustedClose=true",
        base_url,
        symbol.replace('^', "%5E"),
        period1,
        period2
    ))
}

/// Normalizes share-class tickers to Yahoo's dash form (`BRK.B` becomes `BRK-B`).
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace('.', "-")
}

fn parse_constituents<R: Read>(reader: R) -> Result<Vec<SecurityInfo>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut securities = Vec::new();
    for row in csv_reader.deserialize::<ConstituentRow>() {
        let row = row.context("malformed constituents row")?;
        let ticker = normalize_ticker(&row.symbol);
        if ticker.is_empty() {
            continue;
        }
        securities.push(SecurityInfo {
            ticker,
            name: non_empty(row.security),
            sector: non_empty(row.sector),
            industry: non_empty(row.industry),
        });
    }
    Ok(securities)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_chart(symbol: &str, response: ChartResponse) -> Result<Vec<DailyPrice>> {
    if let Some(err) = response.chart.error {
        return Err(anyhow!(
            "chart request for {} failed: {} ({})",
            symbol,
            err.description,
            err.code
        ));
    }
    let Some(data) = response.chart.result.and_then(|result| result.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = data.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|series| series.into_iter().next())
        .map(|series| series.adjclose);
    let gmt_offset = data.meta.and_then(|meta| meta.gmtoffset).unwrap_or(0);

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = DateTime::from_timestamp(ts + gmt_offset, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| anyhow!("invalid timestamp {} for {}", ts, symbol))?;

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();
        let adj_close = adj_closes
            .as_ref()
            .and_then(|series| series.get(i).copied().flatten())
            .or(close);

        if close.is_none() && adj_close.is_none() {
            continue;
        }

        bars.push(DailyPrice {
            ticker: symbol.to_string(),
            date,
            open,
            high,
            low,
            close,
            adj_close,
            volume,
        });
    }
    Ok(bars)
}
