pub mod commands;
pub mod config;
pub mod context;
pub mod cross_section;
pub mod database;
pub mod engine;
pub mod error;
pub mod factors;
pub mod ledger;
pub mod market_data;
pub mod models;
pub mod panel;
pub mod performance;
pub mod rebalance;
pub mod report;
pub mod retry;
pub mod yahoo;
