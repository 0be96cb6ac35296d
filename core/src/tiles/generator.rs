//! Vector tile generator
//!
//! A pure read against the permit store: selects permits with non-null
//! geometry inside the tile's buffered bounding box, applies zoom-banded
//! coordinate snapping, and encodes the survivors as one point layer.
//! Identical inputs against unchanged data produce byte-identical output,
//! which conditional-request handling depends on.

use super::{TileError, TILE_BUFFER, TILE_EXTENT, TILE_LAYER};
use crate::infrastructure::database::entities::permit;
use chrono::NaiveDate;
use mvt::{GeomEncoder, GeomType, Tile};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
	pub west: f64,
	pub south: f64,
	pub east: f64,
	pub north: f64,
}

/// Bounds of a tile in the slippy-map scheme
pub fn tile_bounds(z: u8, x: u32, y: u32) -> TileBounds {
	let n = f64::from(1u32 << z);
	TileBounds {
		west: merc_to_lon(f64::from(x) / n),
		east: merc_to_lon(f64::from(x + 1) / n),
		north: merc_to_lat(f64::from(y) / n),
		south: merc_to_lat(f64::from(y + 1) / n),
	}
}

/// Tile bounds expanded by the clip buffer, so features just outside the
/// tile edge still render across the seam.
pub fn buffered_bounds(z: u8, x: u32, y: u32) -> TileBounds {
	let n = f64::from(1u32 << z);
	let pad = TILE_BUFFER / f64::from(TILE_EXTENT) / n;
	TileBounds {
		west: merc_to_lon(f64::from(x) / n - pad),
		east: merc_to_lon(f64::from(x + 1) / n + pad),
		north: merc_to_lat(f64::from(y) / n - pad),
		south: merc_to_lat(f64::from(y + 1) / n + pad),
	}
}

/// Which tile a WGS84 point falls in at a given zoom
pub fn tile_containing(lon: f64, lat: f64, z: u8) -> (u32, u32) {
	let n = f64::from(1u32 << z);
	let max = (1u32 << z) - 1;
	let x = (merc_x(lon) * n).floor().clamp(0.0, f64::from(max)) as u32;
	let y = (merc_y(lat) * n).floor().clamp(0.0, f64::from(max)) as u32;
	(x, y)
}

/// Zoom-banded simplification: grid step in extent units, None at high
/// zoom where exact positions are kept. Fixed thresholds, not request
/// parameters.
pub fn snap_step(z: u8) -> Option<f64> {
	if z < 11 {
		Some(32.0)
	} else if z < 14 {
		Some(8.0)
	} else {
		None
	}
}

/// Generate the tile at `(z, x, y)`, filtered to permits issued on `date`
/// when one is given. Zero matching permits is a normal outcome: the
/// result is empty bytes, never an error.
pub async fn generate(
	db: &DatabaseConnection,
	z: u8,
	x: u32,
	y: u32,
	date: Option<NaiveDate>,
) -> Result<Vec<u8>, TileError> {
	let bounds = buffered_bounds(z, x, y);

	let mut query = permit::Entity::find()
		.filter(permit::Column::GeomLon.is_not_null())
		.filter(permit::Column::GeomLat.is_not_null())
		.filter(permit::Column::GeomLon.between(bounds.west, bounds.east))
		.filter(permit::Column::GeomLat.between(bounds.south, bounds.north))
		.order_by_asc(permit::Column::Id);
	if let Some(date) = date {
		// Permits with a null issuance date only appear on unfiltered tiles
		query = query.filter(permit::Column::IssuanceDate.eq(date));
	}

	let rows = query.all(db).await?;
	if rows.is_empty() {
		return Ok(Vec::new());
	}

	let n = f64::from(1u32 << z);
	let extent = f64::from(TILE_EXTENT);
	let step = snap_step(z);

	let mut tile = Tile::new(TILE_EXTENT);
	let mut layer = tile.create_layer(TILE_LAYER);
	let mut occupied: HashSet<(i64, i64)> = HashSet::new();
	let mut features = 0usize;

	for row in &rows {
		let (Some(lon), Some(lat)) = (row.geom_lon, row.geom_lat) else {
			continue;
		};

		let px = (merc_x(lon) * n - f64::from(x)) * extent;
		let py = (merc_y(lat) * n - f64::from(y)) * extent;
		let (px, py) = match step {
			Some(step) => ((px / step).round() * step, (py / step).round() * step),
			None => (px.round(), py.round()),
		};

		if px < -TILE_BUFFER || px > extent + TILE_BUFFER {
			continue;
		}
		if py < -TILE_BUFFER || py > extent + TILE_BUFFER {
			continue;
		}

		// Snapped bands collapse co-located points; first in id order wins
		if step.is_some() && !occupied.insert((px as i64, py as i64)) {
			continue;
		}

		let geometry = GeomEncoder::new(GeomType::Point).point(px, py)?.encode()?;
		let mut feature = layer.into_feature(geometry);
		feature.add_tag_string("id", &row.id);
		if let Some(v) = &row.permit_type {
			feature.add_tag_string("permit_type", v);
		}
		if let Some(v) = &row.status {
			feature.add_tag_string("status", v);
		}
		if let Some(d) = row.issuance_date {
			feature.add_tag_string("issuance_date", &d.to_string());
		}
		if let Some(v) = &row.borough {
			feature.add_tag_string("borough", v);
		}
		layer = feature.into_layer();
		features += 1;
	}

	if features == 0 {
		return Ok(Vec::new());
	}

	tile.add_layer(layer)?;
	Ok(tile.to_bytes()?)
}

fn merc_x(lon: f64) -> f64 {
	(lon + 180.0) / 360.0
}

fn merc_y(lat: f64) -> f64 {
	let rad = lat.to_radians();
	(1.0 - (rad.tan() + 1.0 / rad.cos()).ln() / PI) / 2.0
}

fn merc_to_lon(x: f64) -> f64 {
	x * 360.0 - 180.0
}

fn merc_to_lat(y: f64) -> f64 {
	(PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}
