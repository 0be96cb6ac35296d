//! Owner / permittee entity
//!
//! Uniqueness is `(role, business_name)` and applies only when a business
//! name is present; records without one are never deduplicated. Enforced by
//! a partial unique index created in the initial migration.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The role a record plays on a permit
pub const ROLE_OWNER: &str = "owner";
pub const ROLE_PERMITTEE: &str = "permittee";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entities")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub role: String,
	pub business_name: Option<String>,
	pub person_name: Option<String>,
	pub license_number: Option<String>,
	pub license_type: Option<String>,
	pub phone: Option<String>,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
