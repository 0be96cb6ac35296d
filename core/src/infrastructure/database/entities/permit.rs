//! Permit fact entity
//!
//! `bin` and `permit_number` are by-convention links to the buildings and
//! permit_details tables; no referential integrity is enforced. The
//! `geom_lon`/`geom_lat` pair is the derived geometry: populated only when
//! the raw coordinates fall inside valid WGS84 ranges, null otherwise, and
//! never settable by callers directly.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permits")]
pub struct Model {
	/// Opaque stable id assigned upstream
	#[sea_orm(primary_key, auto_increment = false)]
	pub id: String,
	pub borough: Option<String>,
	pub bin: Option<String>,
	pub permit_number: Option<String>,
	pub status: Option<String>,
	pub permit_type: Option<String>,
	pub job_type: Option<String>,
	pub issuance_date: Option<Date>,
	pub expiration_date: Option<Date>,
	/// Raw coordinates exactly as reported upstream
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	/// Derived geometry; null when the raw coordinates are invalid
	pub geom_lon: Option<f64>,
	pub geom_lat: Option<f64>,
	/// Complete original upstream payload
	pub raw: Json,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Derive the geometry stored on a permit row. Valid only when both
/// coordinates are present and inside WGS84 bounds.
pub fn derive_geometry(latitude: Option<f64>, longitude: Option<f64>) -> Option<(f64, f64)> {
	match (latitude, longitude) {
		(Some(lat), Some(lon))
			if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
		{
			Some((lon, lat))
		}
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn valid_coordinates_yield_geometry() {
		assert_eq!(derive_geometry(Some(40.7), Some(-73.9)), Some((-73.9, 40.7)));
		assert_eq!(derive_geometry(Some(-90.0), Some(180.0)), Some((180.0, -90.0)));
	}

	#[test]
	fn out_of_range_coordinates_yield_null_geometry() {
		assert_eq!(derive_geometry(Some(91.0), Some(-73.9)), None);
		assert_eq!(derive_geometry(Some(40.7), Some(-181.0)), None);
		assert_eq!(derive_geometry(None, Some(-73.9)), None);
		assert_eq!(derive_geometry(Some(40.7), None), None);
	}
}
