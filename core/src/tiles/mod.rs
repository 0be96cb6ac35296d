//! Tile generation and caching
//!
//! Turns spatial + temporal queries against the normalized store into
//! Mapbox Vector Tile bytes, with a read-through cache table keyed by
//! `(layer, z, x, y, date)`.

use thiserror::Error;

pub mod cache;
pub mod generator;

pub use cache::{TileCache, TileKey};
pub use generator::generate;

/// Name of the single layer every tile carries
pub const TILE_LAYER: &str = "permits";

/// Tile coordinate extent
pub const TILE_EXTENT: u32 = 4096;

/// Clip buffer around the tile, in extent units
pub const TILE_BUFFER: f64 = 64.0;

#[derive(Error, Debug)]
pub enum TileError {
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error("tile encoding failed: {0}")]
	Encode(#[from] mvt::Error),
}
