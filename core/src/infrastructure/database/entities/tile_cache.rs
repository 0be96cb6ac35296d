//! Tile cache entity
//!
//! Read-through store of generated tile bytes. Not versioned; regeneration
//! simply overwrites the row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tile_cache")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub layer: String,
	#[sea_orm(primary_key, auto_increment = false)]
	pub z: i32,
	#[sea_orm(primary_key, auto_increment = false)]
	pub x: i32,
	#[sea_orm(primary_key, auto_increment = false)]
	pub y: i32,
	#[sea_orm(primary_key, auto_increment = false)]
	pub date: Date,
	pub bytes: Vec<u8>,
	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
