//! Permit detail entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permit_details")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub permit_number: String,
	pub filing_date: Option<Date>,
	pub filing_status: Option<String>,
	pub permit_status: Option<String>,
	pub permit_type: Option<String>,
	pub permit_subtype: Option<String>,
	pub work_type: Option<String>,
	pub self_cert: Option<String>,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
