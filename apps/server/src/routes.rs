//! HTTP routes
//!
//! The tile handler validates the path and date before touching anything,
//! then reads through the cache. Empty tiles are served but never cached;
//! non-empty misses are written back fire-and-forget so a cache failure can
//! never fail an already-computed response.

use axum::{
	body::Body,
	extract::{Path, Query, State},
	http::{header, HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use pm_core::ingest::{IngestEngine, SyncMode, UpstreamClient};
use pm_core::tiles::{self, TileCache, TileKey};
use pm_core::AppConfig;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
	pub db: DatabaseConnection,
	pub config: Arc<AppConfig>,
	pub cache: TileCache,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(|| async { "PermitMap Server!" }))
		.route("/health", get(|| async { "OK" }))
		.route("/tiles/:z/:x/:y", get(get_tile))
		.route("/sync", post(trigger_sync))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Deserialize)]
struct TileQuery {
	date: Option<String>,
}

async fn get_tile(
	State(state): State<AppState>,
	Path((z, x, y)): Path<(u8, u32, u32)>,
	Query(query): Query<TileQuery>,
	headers: HeaderMap,
) -> Response {
	// Reject bad requests before any store or cache access
	if let Err(msg) = validate_coords(z, x, y, state.config.tiles.max_zoom) {
		return (StatusCode::BAD_REQUEST, msg).into_response();
	}
	let date = match parse_date_param(query.date.as_deref()) {
		Ok(date) => date,
		Err(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
	};

	let key = TileKey {
		layer: tiles::TILE_LAYER.to_string(),
		z,
		x,
		y,
		date,
	};

	let cached = match state.cache.get(&key).await {
		Ok(cached) => cached,
		Err(e) => {
			error!("tile cache lookup failed: {e}");
			return (StatusCode::INTERNAL_SERVER_ERROR, format!("cache lookup failed: {e}"))
				.into_response();
		}
	};

	let bytes = match cached {
		Some(bytes) => bytes,
		None => {
			let bytes = match tiles::generate(&state.db, z, x, y, Some(date)).await {
				Ok(bytes) => bytes,
				Err(e) => {
					error!("tile generation failed: {e}");
					return (
						StatusCode::INTERNAL_SERVER_ERROR,
						format!("tile generation failed: {e}"),
					)
						.into_response();
				}
			};

			// Empty tiles are served but not cached; their correctness
			// window differs from positive results.
			if !bytes.is_empty() {
				let cache = state.cache.clone();
				let key = key.clone();
				let copy = bytes.clone();
				tokio::spawn(async move {
					if let Err(e) = cache.put(&key, copy).await {
						warn!("tile cache write failed: {e}");
					}
				});
			}
			bytes
		}
	};

	let etag = format!("\"{}\"", blake3::hash(&bytes).to_hex());
	let cache_control = cache_control(&state.config);

	if client_etag_matches(&headers, &etag) {
		return Response::builder()
			.status(StatusCode::NOT_MODIFIED)
			.header(header::ETAG, &etag)
			.header(header::CACHE_CONTROL, &cache_control)
			.body(Body::empty())
			.unwrap();
	}

	Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, "application/vnd.mapbox-vector-tile")
		.header(header::ETAG, &etag)
		.header(header::CACHE_CONTROL, &cache_control)
		.body(Body::from(bytes))
		.unwrap()
}

fn validate_coords(z: u8, x: u32, y: u32, max_zoom: u8) -> Result<(), String> {
	if z > max_zoom {
		return Err(format!("zoom {z} outside [0, {max_zoom}]"));
	}
	let tiles_per_axis = 1u32 << z;
	if x >= tiles_per_axis || y >= tiles_per_axis {
		return Err(format!("tile ({x}, {y}) outside [0, {tiles_per_axis}) at zoom {z}"));
	}
	Ok(())
}

fn parse_date_param(raw: Option<&str>) -> Result<NaiveDate, String> {
	match raw {
		None => Ok(Utc::now().date_naive()),
		Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
			.map_err(|_| format!("invalid date {s:?}, expected YYYY-MM-DD")),
	}
}

fn client_etag_matches(headers: &HeaderMap, etag: &str) -> bool {
	headers
		.get(header::IF_NONE_MATCH)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.split(',').any(|candidate| candidate.trim() == etag))
		.unwrap_or(false)
}

fn cache_control(config: &AppConfig) -> String {
	format!(
		"public, max-age={}, stale-while-revalidate={}",
		config.tiles.cache_max_age_secs, config.tiles.stale_while_revalidate_secs
	)
}

#[derive(Deserialize)]
struct SyncRequest {
	mode: Option<SyncMode>,
	since: Option<DateTime<Utc>>,
	until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
	success: bool,
	mode: String,
	total_processed: u64,
	total_inserted: u64,
	total_updated: u64,
	last_synced_updated_at: Option<DateTime<Utc>>,
	message: String,
}

#[derive(Serialize)]
struct SyncErrorResponse {
	success: bool,
	error: String,
}

async fn trigger_sync(State(state): State<AppState>, Json(req): Json<SyncRequest>) -> Response {
	let mode = req.mode.unwrap_or(SyncMode::Incremental);

	let client = match UpstreamClient::new(&state.config.upstream) {
		Ok(client) => client,
		Err(e) => return sync_error(e.to_string()),
	};
	let engine = IngestEngine::new(state.db.clone(), client, state.config.upstream.clone());

	match engine.sync(mode, req.since, req.until).await {
		Ok(report) => Json(SyncResponse {
			success: true,
			mode: mode.to_string(),
			total_processed: report.processed,
			total_inserted: report.inserted,
			total_updated: report.updated,
			last_synced_updated_at: report.new_watermark,
			message: format!("processed {} records", report.processed),
		})
		.into_response(),
		Err(e) => {
			error!("sync failed: {e}");
			sync_error(e.to_string())
		}
	}
}

fn sync_error(error: String) -> Response {
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		Json(SyncErrorResponse {
			success: false,
			error,
		}),
	)
		.into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::to_bytes;
	use http::Request;
	use pm_core::infrastructure::database::entities::tile_cache;
	use pm_core::ingest::apply_page;
	use pm_core::Database;
	use pretty_assertions::assert_eq;
	use sea_orm::{EntityTrait, PaginatorTrait};
	use serde_json::json;
	use std::time::Duration;
	use tower::ServiceExt;

	async fn test_state() -> AppState {
		let db = Database::memory().await.unwrap();
		db.migrate().await.unwrap();
		let conn = db.conn().clone();
		AppState {
			db: conn.clone(),
			config: Arc::new(AppConfig::default_with_dir(std::env::temp_dir())),
			cache: TileCache::new(conn),
		}
	}

	fn tile_request(uri: &str) -> Request<Body> {
		Request::get(uri).body(Body::empty()).unwrap()
	}

	#[test]
	fn coords_validation() {
		assert!(validate_coords(0, 0, 0, 16).is_ok());
		assert!(validate_coords(16, 65535, 65535, 16).is_ok());
		assert!(validate_coords(17, 0, 0, 16).is_err());
		assert!(validate_coords(2, 4, 0, 16).is_err());
		assert!(validate_coords(2, 0, 4, 16).is_err());
	}

	#[test]
	fn date_param_parsing() {
		assert_eq!(
			parse_date_param(Some("2024-01-02")).unwrap(),
			NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
		);
		assert_eq!(parse_date_param(None).unwrap(), Utc::now().date_naive());
		assert!(parse_date_param(Some("01/02/2024")).is_err());
		assert!(parse_date_param(Some("2024-13-40")).is_err());
	}

	#[tokio::test]
	async fn zoom_beyond_cap_is_a_client_error() {
		let app = router(test_state().await);
		let response = app.oneshot(tile_request("/tiles/20/0/0")).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn out_of_range_tile_coordinates_are_a_client_error() {
		let app = router(test_state().await);
		let response = app.oneshot(tile_request("/tiles/2/4/0")).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn malformed_date_is_a_client_error() {
		let app = router(test_state().await);
		let response = app
			.oneshot(tile_request("/tiles/2/1/1?date=January-2"))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn empty_tile_is_a_success_response_and_is_not_cached() {
		let state = test_state().await;
		let response = router(state.clone())
			.oneshot(tile_request("/tiles/2/1/1?date=2024-01-02"))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers()[header::CONTENT_TYPE],
			"application/vnd.mapbox-vector-tile"
		);
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert!(body.is_empty());

		// Empty results never reach the cache table
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(tile_cache::Entity::find().count(&state.db).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn non_empty_misses_are_written_back_and_hits_serve_cached_bytes() {
		let state = test_state().await;
		apply_page(
			&state.db,
			&[json!({
				"id": "P1",
				"updated_at": "2024-01-02T00:00:00Z",
				"issuance_date": "2024-01-02",
				"gis_latitude": "40.7",
				"gis_longitude": "-73.9",
			})],
		)
		.await
		.unwrap();

		let (x, y) = pm_core::tiles::generator::tile_containing(-73.9, 40.7, 14);
		let uri = format!("/tiles/14/{x}/{y}?date=2024-01-02");

		let response = router(state.clone())
			.oneshot(tile_request(&uri))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert!(!body.is_empty());

		// The write-back is a spawned task; wait for it to land
		let key = TileKey {
			layer: tiles::TILE_LAYER.to_string(),
			z: 14,
			x,
			y,
			date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
		};
		let mut cached = None;
		for _ in 0..100 {
			cached = state.cache.get(&key).await.unwrap();
			if cached.is_some() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(cached, Some(body.to_vec()));

		// A subsequent request serves the cached row verbatim
		let sentinel = b"cached tile bytes".to_vec();
		state.cache.put(&key, sentinel.clone()).await.unwrap();
		let response = router(state).oneshot(tile_request(&uri)).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert_eq!(body.to_vec(), sentinel);
	}

	#[tokio::test]
	async fn matching_fingerprint_yields_not_modified() {
		let state = test_state().await;
		apply_page(
			&state.db,
			&[json!({
				"id": "P1",
				"updated_at": "2024-01-02T00:00:00Z",
				"issuance_date": "2024-01-02",
				"gis_latitude": "40.7",
				"gis_longitude": "-73.9",
			})],
		)
		.await
		.unwrap();

		let (x, y) = pm_core::tiles::generator::tile_containing(-73.9, 40.7, 14);
		let uri = format!("/tiles/14/{x}/{y}?date=2024-01-02");

		let response = router(state.clone())
			.oneshot(tile_request(&uri))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();

		let conditional = Request::get(&uri)
			.header(header::IF_NONE_MATCH, &etag)
			.body(Body::empty())
			.unwrap();
		let response = router(state.clone()).oneshot(conditional).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert!(body.is_empty());

		// A stale fingerprint gets the full body back
		let stale = Request::get(&uri)
			.header(header::IF_NONE_MATCH, "\"deadbeef\"")
			.body(Body::empty())
			.unwrap();
		let response = router(state).oneshot(stale).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert!(!body.is_empty());
	}
}
