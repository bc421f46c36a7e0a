pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod query;
pub mod store;
