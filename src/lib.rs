pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod query;
pub mod server;
pub mod signals;
pub mod sources;
pub mod store;
