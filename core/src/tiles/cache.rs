//! Read-through tile cache
//!
//! Keys are `(layer, z, x, y, date)`; a key is either absent or cached, no
//! lock state in between. Concurrent writers to the same key are allowed —
//! generation is deterministic, so last-write-wins is harmless. Sweeping is
//! advisory: absence of an entry simply triggers regeneration.

use super::TileError;
use crate::infrastructure::database::entities::tile_cache;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

/// Cache key of one tile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
	pub layer: String,
	pub z: u8,
	pub x: u32,
	pub y: u32,
	pub date: NaiveDate,
}

#[derive(Clone)]
pub struct TileCache {
	db: DatabaseConnection,
}

impl TileCache {
	pub fn new(db: DatabaseConnection) -> Self {
		Self { db }
	}

	pub async fn get(&self, key: &TileKey) -> Result<Option<Vec<u8>>, TileError> {
		Ok(tile_cache::Entity::find_by_id((
			key.layer.clone(),
			i32::from(key.z),
			key.x as i32,
			key.y as i32,
			key.date,
		))
		.one(&self.db)
		.await?
		.map(|row| row.bytes))
	}

	pub async fn put(&self, key: &TileKey, bytes: Vec<u8>) -> Result<(), TileError> {
		let model = tile_cache::ActiveModel {
			layer: Set(key.layer.clone()),
			z: Set(i32::from(key.z)),
			x: Set(key.x as i32),
			y: Set(key.y as i32),
			date: Set(key.date),
			bytes: Set(bytes),
			created_at: Set(Utc::now()),
		};

		tile_cache::Entity::insert(model)
			.on_conflict(
				OnConflict::columns([
					tile_cache::Column::Layer,
					tile_cache::Column::Z,
					tile_cache::Column::X,
					tile_cache::Column::Y,
					tile_cache::Column::Date,
				])
				.update_columns([tile_cache::Column::Bytes, tile_cache::Column::CreatedAt])
				.to_owned(),
			)
			.exec(&self.db)
			.await?;
		Ok(())
	}

	/// Delete entries older than `max_age`; returns how many went.
	pub async fn sweep(&self, max_age: chrono::Duration) -> Result<u64, TileError> {
		let cutoff = Utc::now() - max_age;
		let result = tile_cache::Entity::delete_many()
			.filter(tile_cache::Column::CreatedAt.lt(cutoff))
			.exec(&self.db)
			.await?;
		Ok(result.rows_affected)
	}
}
