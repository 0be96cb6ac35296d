//! Tile generation and cache integration tests

use chrono::{NaiveDate, Utc};
use pm_core::ingest::apply_page;
use pm_core::tiles::{self, generator, TileCache, TileKey};
use pm_core::Database;
use pretty_assertions::assert_eq;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::{json, Value};

async fn setup() -> DatabaseConnection {
	let db = Database::memory().await.unwrap();
	db.migrate().await.unwrap();
	db.conn().clone()
}

fn record(id: &str, lat: f64, lon: f64, issuance: Option<&str>) -> Value {
	let mut rec = json!({
		"id": id,
		"updated_at": "2024-01-02T00:00:00Z",
		"borough": "QUEENS",
		"permit_status": "ISSUED",
		"permit_type": "EW",
		"gis_latitude": lat.to_string(),
		"gis_longitude": lon.to_string(),
	});
	if let Some(date) = issuance {
		rec["issuance_date"] = json!(date);
	}
	rec
}

fn date(s: &str) -> NaiveDate {
	NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn generation_is_deterministic() {
	let db = setup().await;
	apply_page(
		&db,
		&[
			record("P1", 40.7, -73.9, Some("2024-01-02")),
			record("P2", 40.71, -73.91, Some("2024-01-02")),
		],
	)
	.await
	.unwrap();

	let (x, y) = generator::tile_containing(-73.9, 40.7, 14);
	let first = generator::generate(&db, 14, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	let second = generator::generate(&db, 14, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();

	assert!(!first.is_empty());
	assert_eq!(first, second);
}

#[tokio::test]
async fn no_matching_permits_yields_empty_bytes() {
	let db = setup().await;
	apply_page(&db, &[record("P1", 40.7, -73.9, Some("2024-01-02"))])
		.await
		.unwrap();

	// Other side of the world
	let (x, y) = generator::tile_containing(139.7, 35.6, 14);
	let tile = generator::generate(&db, 14, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	assert!(tile.is_empty());

	// Right place, wrong date
	let (x, y) = generator::tile_containing(-73.9, 40.7, 14);
	let tile = generator::generate(&db, 14, x, y, Some(date("2030-01-01")))
		.await
		.unwrap();
	assert!(tile.is_empty());
}

#[tokio::test]
async fn null_issuance_dates_only_appear_without_a_date_filter() {
	let db = setup().await;
	apply_page(&db, &[record("P1", 40.7, -73.9, None)])
		.await
		.unwrap();

	let (x, y) = generator::tile_containing(-73.9, 40.7, 14);
	let filtered = generator::generate(&db, 14, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	assert!(filtered.is_empty());

	let unfiltered = generator::generate(&db, 14, x, y, None).await.unwrap();
	assert!(!unfiltered.is_empty());
}

#[tokio::test]
async fn null_geometry_rows_never_reach_tiles() {
	let db = setup().await;
	apply_page(&db, &[record("P1", 91.0, -73.9, Some("2024-01-02"))])
		.await
		.unwrap();

	// The row exists, but with null geometry no tile anywhere contains it
	let (x, y) = generator::tile_containing(-73.9, 40.7, 0);
	let tile = generator::generate(&db, 0, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	assert!(tile.is_empty());
}

#[tokio::test]
async fn low_zoom_snapping_collapses_colocated_points() {
	let both = setup().await;
	apply_page(
		&both,
		&[
			record("P1", 40.70010, -73.90010, Some("2024-01-02")),
			record("P2", 40.70012, -73.90012, Some("2024-01-02")),
		],
	)
	.await
	.unwrap();

	let only_first = setup().await;
	apply_page(&only_first, &[record("P1", 40.70010, -73.90010, Some("2024-01-02"))])
		.await
		.unwrap();

	// A few meters apart: identical snapped cell at overview zoom, so the
	// second point is dropped and both stores render the same tile.
	let (x, y) = generator::tile_containing(-73.90010, 40.70010, 8);
	let collapsed = generator::generate(&both, 8, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	let single = generator::generate(&only_first, 8, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	assert!(!collapsed.is_empty());
	assert_eq!(collapsed, single);

	// At high zoom both survive
	let (x, y) = generator::tile_containing(-73.90010, 40.70010, 16);
	let exact = generator::generate(&both, 16, x, y, Some(date("2024-01-02")))
		.await
		.unwrap();
	assert!(exact.len() > single.len());
}

#[tokio::test]
async fn cache_round_trips_and_overwrites() {
	let db = setup().await;
	let cache = TileCache::new(db);
	let key = TileKey {
		layer: tiles::TILE_LAYER.to_string(),
		z: 14,
		x: 4827,
		y: 6157,
		date: date("2024-01-02"),
	};

	assert_eq!(cache.get(&key).await.unwrap(), None);

	cache.put(&key, vec![1, 2, 3]).await.unwrap();
	assert_eq!(cache.get(&key).await.unwrap(), Some(vec![1, 2, 3]));

	// Regeneration simply overwrites
	cache.put(&key, vec![9, 9]).await.unwrap();
	assert_eq!(cache.get(&key).await.unwrap(), Some(vec![9, 9]));

	// Different date, different key
	let other = TileKey {
		date: date("2024-01-03"),
		..key.clone()
	};
	assert_eq!(cache.get(&other).await.unwrap(), None);
}

#[tokio::test]
async fn sweep_removes_only_aged_entries() {
	use pm_core::infrastructure::database::entities::tile_cache;

	let db = setup().await;
	let cache = TileCache::new(db.clone());
	let fresh = TileKey {
		layer: tiles::TILE_LAYER.to_string(),
		z: 14,
		x: 1,
		y: 1,
		date: date("2024-01-02"),
	};
	let stale = TileKey { x: 2, ..fresh.clone() };

	cache.put(&fresh, vec![1]).await.unwrap();
	cache.put(&stale, vec![2]).await.unwrap();

	// Age the second entry past the sweep horizon
	let row = tile_cache::Entity::find_by_id((
		stale.layer.clone(),
		i32::from(stale.z),
		stale.x as i32,
		stale.y as i32,
		stale.date,
	))
	.one(&db)
	.await
	.unwrap()
	.unwrap();
	let mut aged: tile_cache::ActiveModel = row.into();
	aged.created_at = Set(Utc::now() - chrono::Duration::days(10));
	aged.update(&db).await.unwrap();

	let swept = cache.sweep(chrono::Duration::days(7)).await.unwrap();
	assert_eq!(swept, 1);
	assert_eq!(cache.get(&fresh).await.unwrap(), Some(vec![1]));
	assert_eq!(cache.get(&stale).await.unwrap(), None);
}
