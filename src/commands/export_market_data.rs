use crate::context::{AppContext, MarketDataFilters};
use crate::market_data::MarketDataSnapshot;
use anyhow::Result;
use log::info;
use std::path::Path;

pub async fn run(app: &AppContext, output_path: &Path, filters: MarketDataFilters) -> Result<()> {
    info!(
        "Generating market data snapshot at {}",
        output_path.display()
    );

    let prices = app.load_prices(None, filters).await?;
    let snapshot = MarketDataSnapshot::new(prices)?;

    snapshot.save_to_file(output_path)?;
    info!(
        "Market data snapshot successfully written to {}",
        output_path.display()
    );

    Ok(())
}
