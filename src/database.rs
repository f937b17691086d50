use crate::models::{DailyPrice, MarketIndexRow, SecurityInfo};
use crate::panel::Panel;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{error, info};
use std::collections::HashMap;
use std::hash::Hash;
use tokio_postgres::{Client, NoTls};

const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

// Keeps each transaction bounded when loading years of history for hundreds of tickers.
const UPSERT_CHUNK_SIZE: usize = 5_000;

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    pub async fn apply_schema(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("failed to apply database schema")?;
        info!("Database schema is up to date");
        Ok(())
    }

    /// Inserts or refreshes security metadata keyed by ticker.
    pub async fn upsert_securities(&mut self, securities: &[SecurityInfo]) -> Result<usize> {
        let rows = last_write_wins(securities, |security| security.ticker.clone());
        let mut written = 0usize;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let tx = self.client.transaction().await?;
            let stmt = tx
                .prepare(
                    "INSERT INTO securities (ticker, company_name, sector, industry, is_active)
                     VALUES ($1, $2, $3, $4, TRUE)
                     ON CONFLICT (ticker) DO UPDATE
                     SET company_name = EXCLUDED.company_name,
                         sector = EXCLUDED.sector,
                         industry = EXCLUDED.industry,
                         is_active = TRUE,
                         updated_at = CURRENT_TIMESTAMP",
                )
                .await?;

            for security in chunk {
                written += tx
                    .execute(
                        &stmt,
                        &[
                            &security.ticker,
                            &security.name,
                            &security.sector,
                            &security.industry,
                        ],
                    )
                    .await? as usize;
            }
            tx.commit().await?;
        }
        Ok(written)
    }

    /// Inserts or overwrites daily bars keyed by (ticker, date).
    pub async fn upsert_daily_prices(&mut self, prices: &[DailyPrice]) -> Result<usize> {
        let rows = last_write_wins(prices, |price| (price.ticker.clone(), price.date));
        let mut written = 0usize;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let tx = self.client.transaction().await?;
            let stmt = tx
                .prepare(
                    "INSERT INTO daily_prices (ticker, date, open, high, low, close, adj_close, volume)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (ticker, date) DO UPDATE
                     SET open = EXCLUDED.open,
                         high = EXCLUDED.high,
                         low = EXCLUDED.low,
                         close = EXCLUDED.close,
                         adj_close = EXCLUDED.adj_close,
                         volume = EXCLUDED.volume",
                )
                .await?;

            for price in chunk {
                written += tx
                    .execute(
                        &stmt,
                        &[
                            &price.ticker,
                            &price.date,
                            &price.open,
                            &price.high,
                            &price.low,
                            &price.close,
                            &price.adj_close,
                            &price.volume,
                        ],
                    )
                    .await? as usize;
            }
            tx.commit().await?;
        }
        Ok(written)
    }

    /// Inserts or overwrites index levels keyed by (date, index name).
    pub async fn upsert_market_data(&mut self, rows: &[MarketIndexRow]) -> Result<usize> {
        let rows = last_write_wins(rows, |row| (row.date, row.index_name.clone()));
        let mut written = 0usize;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let tx = self.client.transaction().await?;
            let stmt = tx
                .prepare(
                    "INSERT INTO market_data (date, index_name, close, volume)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (date, index_name) DO UPDATE
                     SET close = EXCLUDED.close,
                         volume = EXCLUDED.volume",
                )
                .await?;

            for row in chunk {
                written += tx
                    .execute(&stmt, &[&row.date, &row.index_name, &row.close, &row.volume])
                    .await? as usize;
            }
            tx.commit().await?;
        }
        Ok(written)
    }

    /// Adjusted closes pivoted into a date by ticker panel. Rows without an adjusted
    /// close stay missing.
    pub async fn load_adjusted_closes(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Panel> {
        let rows = self
            .client
            .query(
                "SELECT date, ticker, adj_close
                 FROM daily_prices
                 WHERE adj_close IS NOT NULL
                   AND ($1::date IS NULL OR date >= $1)
                   AND ($2::date IS NULL OR date <= $2)
                 ORDER BY date, ticker",
                &[&start_date, &end_date],
            )
            .await
            .context("failed to load adjusted closes")?;

        let observations = rows.into_iter().map(|row| {
            let date: NaiveDate = row.get(0);
            let ticker: String = row.get(1);
            let adj_close: f64 = row.get(2);
            (date, ticker, adj_close)
        });
        Ok(Panel::from_observations(observations))
    }
}

/// Collapses rows sharing a natural key to the last one, keeping first-seen key order.
fn last_write_wins<T, K, F>(rows: &[T], key_of: F) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(rows.len());
    let mut kept: Vec<&T> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.get(&key_of(row)) {
            Some(&slot) => kept[slot] = row,
            None => {
                positions.insert(key_of(row), kept.len());
                kept.push(row);
            }
        }
    }
    kept
}
