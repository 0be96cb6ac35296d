//! Sea-ORM entity definitions
//!
//! These map the normalized permit store to database tables.

pub mod building;
pub mod entity;
pub mod permit;
pub mod permit_detail;
pub mod sync_state;
pub mod tile_cache;

// Re-export all entities
pub use building::Entity as Building;
pub use entity::Entity as PermitEntity;
pub use permit::Entity as Permit;
pub use permit_detail::Entity as PermitDetail;
pub use sync_state::Entity as SyncState;
pub use tile_cache::Entity as TileCacheEntry;

// Re-export active models for easy access
pub use building::ActiveModel as BuildingActive;
pub use entity::ActiveModel as PermitEntityActive;
pub use permit::ActiveModel as PermitActive;
pub use permit_detail::ActiveModel as PermitDetailActive;
pub use sync_state::ActiveModel as SyncStateActive;
pub use tile_cache::ActiveModel as TileCacheEntryActive;
