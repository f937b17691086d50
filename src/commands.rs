pub mod backtest;
pub mod download_data;
pub mod export_market_data;
pub mod list_factors;
pub mod market_data_snapshot;
pub mod setup_database;
