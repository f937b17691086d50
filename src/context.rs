use crate::database::Database;
use crate::market_data::MarketDataSnapshot;
use crate::panel::Panel;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::info;
use std::path::Path;

#[derive(Clone)]
pub struct AppContext {
    database_url: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MarketDataFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl MarketDataFilters {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none()
    }
}

impl AppContext {
    pub fn new(database_url: Option<String>) -> Self {
        Self {
            database_url: database_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }

    pub async fn database(&self) -> Result<Database> {
        let Some(database_url) = self.database_url.as_deref() else {
            return Err(anyhow!(
                "DATABASE_URL must be set to use database-backed commands."
            ));
        };
        Database::new(database_url).await
    }

    /// Adjusted close panel from a snapshot file when given, otherwise from the database.
    pub async fn load_prices(
        &self,
        data_file: Option<&Path>,
        filters: MarketDataFilters,
    ) -> Result<Panel> {
        let prices = match data_file {
            Some(path) => MarketDataSnapshot::load_from_file(path)?
                .into_prices()
                .restrict_to_date_range(filters.start_date, filters.end_date),
            None => {
                let db = self.database().await?;
                info!("Loading adjusted closes from database...");
                db.load_adjusted_closes(filters.start_date, filters.end_date)
                    .await?
            }
        };

        if prices.is_empty() {
            return Err(anyhow!(
                "No price data available{}",
                describe_filters(&filters)
            ));
        }
        info!(
            "Loaded {} dates for {} tickers ({} - {})",
            prices.len(),
            prices.tickers().len(),
            prices.dates()[0],
            prices.dates()[prices.len() - 1]
        );
        Ok(prices)
    }
}

fn describe_filters(filters: &MarketDataFilters) -> String {
    match (filters.start_date, filters.end_date) {
        _ if filters.is_empty() => String::new(),
        (Some(start), Some(end)) => format!(" between {} and {}", start, end),
        (Some(start), None) => format!(" from {} onward", start),
        (None, Some(end)) => format!(" through {}", end),
        (None, None) => String::new(),
    }
}
