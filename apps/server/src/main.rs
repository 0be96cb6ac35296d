use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pm_core::ingest::{IngestEngine, SyncMode, UpstreamClient};
use pm_core::tiles::TileCache;
use pm_core::{AppConfig, Database};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod routes;
mod utils;

#[derive(Parser)]
#[command(name = "pm-server", about = "PermitMap tile and ingestion server")]
struct Cli {
	/// Data directory holding the config file and database
	#[arg(long, env = "DATA_DIR", default_value = "./pmserver_data")]
	data_dir: PathBuf,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Run the HTTP server
	Serve {
		#[arg(long, env = "PORT", default_value_t = 8080)]
		port: u16,
	},
	/// Run one ingestion pass and exit
	Sync {
		/// "historical" or "incremental"
		#[arg(long, default_value = "incremental")]
		mode: String,
		/// Override the stored watermark (RFC 3339); suppresses persistence
		#[arg(long)]
		since: Option<DateTime<Utc>>,
		/// Upper bound on updated_at (RFC 3339)
		#[arg(long)]
		until: Option<DateTime<Utc>>,
	},
	/// Sweep aged tile cache entries and exit
	Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = AppConfig::load_or_create(&cli.data_dir)?;

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
		)
		.init();

	let db = Database::open(&config.database_path()).await?;
	db.migrate().await?;

	match cli.command {
		Command::Serve { port } => serve(config, db, port).await,
		Command::Sync { mode, since, until } => {
			let mode: SyncMode = mode.parse().map_err(|e: String| anyhow!(e))?;
			let client = UpstreamClient::new(&config.upstream)?;
			let engine = IngestEngine::new(db.conn().clone(), client, config.upstream.clone());
			let report = engine.sync(mode, since, until).await?;
			println!("{}", serde_json::to_string_pretty(&report)?);
			Ok(())
		}
		Command::Sweep => {
			let cache = TileCache::new(db.conn().clone());
			let swept = cache
				.sweep(chrono::Duration::days(config.tiles.sweep_age_days as i64))
				.await?;
			info!("swept {swept} aged tile cache entries");
			Ok(())
		}
	}
}

async fn serve(config: AppConfig, db: Database, port: u16) -> Result<()> {
	let config = Arc::new(config);
	let state = routes::AppState {
		db: db.conn().clone(),
		config: config.clone(),
		cache: TileCache::new(db.conn().clone()),
	};

	// Advisory age-based sweep; absence of an entry only costs a regeneration
	{
		let cache = state.cache.clone();
		let tiles = config.tiles.clone();
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(tiles.sweep_interval_secs));
			loop {
				interval.tick().await;
				match cache.sweep(chrono::Duration::days(tiles.sweep_age_days as i64)).await {
					Ok(0) => {}
					Ok(swept) => info!("swept {swept} aged tile cache entries"),
					Err(e) => warn!("tile cache sweep failed: {e}"),
				}
			}
		});
	}

	let app = routes::router(state);

	let mut addr = "[::]:8080".parse::<SocketAddr>()?; // This listens on IPv6 and IPv4
	addr.set_port(port);
	info!("Listening on http://localhost:{}", port);

	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, app)
		.with_graceful_shutdown(utils::shutdown_signal())
		.await?;

	Ok(())
}
