//! PermitMap core
//!
//! Mirrors a continuously updated public building-permit dataset into a
//! normalized SQLite store and renders it as date-filtered vector tiles.
//! Ingestion is the sole writer of the store; tile generation is a pure
//! reader. The HTTP surface lives in the server binary.

pub mod config;
pub mod infrastructure;
pub mod ingest;
pub mod tiles;

pub use config::AppConfig;
pub use infrastructure::database::Database;
