//! Building entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "buildings")]
pub struct Model {
	/// Building identification number, as issued upstream
	#[sea_orm(primary_key, auto_increment = false)]
	pub bin: String,
	pub borough: Option<String>,
	pub block: Option<String>,
	pub lot: Option<String>,
	pub house_number: Option<String>,
	pub street_name: Option<String>,
	pub zip_code: Option<String>,
	pub community_board: Option<String>,
	pub zoning_district: Option<String>,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
