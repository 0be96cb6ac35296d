//! Application configuration
//!
//! All tunables (upstream endpoint, page size, retry policy, tile limits)
//! live in one validated structure read once at startup, instead of being
//! looked up ad hoc where they are consumed.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
	/// Config schema version
	pub version: u32,

	/// Data directory path (database + config file)
	pub data_dir: PathBuf,

	/// Logging level
	pub log_level: String,

	/// Upstream permit API settings
	pub upstream: UpstreamConfig,

	/// Tile serving settings
	pub tiles: TileConfig,
}

/// Settings for the paginated upstream permit API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
	/// Base URL of the dataset resource (JSON endpoint)
	pub base_url: String,

	/// Optional application token sent with every request
	pub app_token: Option<String>,

	/// Records fetched per page
	pub page_size: u64,

	/// Retry attempts for transient upstream failures
	pub max_retries: u32,

	/// Base delay for exponential backoff, in milliseconds
	pub retry_base_delay_ms: u64,
}

/// Settings for tile generation and caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileConfig {
	/// Maximum accepted zoom level on the tile endpoint
	pub max_zoom: u8,

	/// `max-age` of the Cache-Control header, in seconds
	pub cache_max_age_secs: u64,

	/// `stale-while-revalidate` window, in seconds
	pub stale_while_revalidate_secs: u64,

	/// Cached tiles older than this many days are swept
	pub sweep_age_days: u64,

	/// Interval between advisory cache sweeps, in seconds
	pub sweep_interval_secs: u64,
}

impl Default for UpstreamConfig {
	fn default() -> Self {
		Self {
			base_url: "https://data.cityofnewyork.us/resource/ipu4-2q9a.json".to_string(),
			app_token: None,
			page_size: 1000,
			max_retries: 3,
			retry_base_delay_ms: 500,
		}
	}
}

impl Default for TileConfig {
	fn default() -> Self {
		Self {
			max_zoom: 16,
			cache_max_age_secs: 3600,
			stale_while_revalidate_secs: 86400,
			sweep_age_days: 7,
			sweep_interval_secs: 3600,
		}
	}
}

impl AppConfig {
	/// Load configuration from a specific data directory, creating a default
	/// config file when none exists yet.
	pub fn load_or_create(data_dir: &PathBuf) -> Result<Self> {
		let config_path = data_dir.join("permitmap.json");

		let config = if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)?;
			serde_json::from_str(&json)?
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.clone());
			config.save()?;
			config
		};

		config.validate()?;
		Ok(config)
	}

	/// Create default configuration with a specific data directory
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			log_level: "info".to_string(),
			upstream: UpstreamConfig::default(),
			tiles: TileConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join("permitmap.json");
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	/// Validate tunables before anything consumes them
	pub fn validate(&self) -> Result<()> {
		if self.upstream.base_url.is_empty() {
			bail!("upstream.base_url must not be empty");
		}
		if self.upstream.page_size == 0 {
			bail!("upstream.page_size must be at least 1");
		}
		if self.tiles.max_zoom > 22 {
			bail!("tiles.max_zoom must be at most 22");
		}
		if self.tiles.sweep_age_days == 0 {
			bail!("tiles.sweep_age_days must be at least 1");
		}
		Ok(())
	}

	/// Path of the SQLite database inside the data directory
	pub fn database_path(&self) -> PathBuf {
		self.data_dir.join("permitmap.db")
	}

	fn target_version() -> u32 {
		1
	}
}

impl Default for AppConfig {
	fn default() -> Self {
		Self::default_with_dir(PathBuf::from("."))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn default_config_is_valid() {
		let config = AppConfig::default_with_dir(PathBuf::from("/tmp/pm"));
		config.validate().unwrap();
		assert_eq!(config.tiles.max_zoom, 16);
		assert_eq!(config.upstream.page_size, 1000);
	}

	#[test]
	fn zero_page_size_is_rejected() {
		let mut config = AppConfig::default_with_dir(PathBuf::from("/tmp/pm"));
		config.upstream.page_size = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn load_or_create_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let data_dir = dir.path().to_path_buf();

		let created = AppConfig::load_or_create(&data_dir).unwrap();
		let loaded = AppConfig::load_or_create(&data_dir).unwrap();
		assert_eq!(created.upstream.page_size, loaded.upstream.page_size);
		assert!(data_dir.join("permitmap.json").exists());
	}
}
