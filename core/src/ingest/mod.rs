//! Incremental ingestion engine
//!
//! Paginates the upstream permit API with a rolling high-water mark and
//! applies each page as one atomic bulk upsert. See [`engine::IngestEngine`]
//! for the sync loop and [`upsert::apply_page`] for the per-page merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod client;
pub mod engine;
pub mod fields;
pub mod upsert;

pub use client::{PermitSource, UpstreamClient};
pub use engine::IngestEngine;
pub use fields::FieldMap;
pub use upsert::{apply_page, PageResult};

/// Ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
	/// Upstream responded with a non-success status
	#[error("upstream returned HTTP {status}")]
	UpstreamStatus { status: u16 },

	/// Request never produced a response (DNS, connect, timeout, ...)
	#[error("upstream request failed: {0}")]
	UpstreamTransport(#[from] reqwest::Error),

	/// A record in the page could not be parsed; fails the whole page
	#[error("malformed record: {0}")]
	MalformedRecord(String),

	/// A transient failure survived every retry attempt
	#[error("retries exhausted after {attempts} attempts: {source}")]
	RetriesExhausted {
		attempts: u32,
		#[source]
		source: Box<IngestError>,
	},

	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),
}

impl IngestError {
	/// Whether a retry has any chance of succeeding
	pub fn is_transient(&self) -> bool {
		match self {
			IngestError::UpstreamStatus { status } => *status == 429 || *status >= 500,
			IngestError::UpstreamTransport(_) => true,
			_ => false,
		}
	}
}

/// How a sync run chooses its lower bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
	/// Start from the epoch and re-fetch everything
	Historical,
	/// Start from the stored watermark
	Incremental,
}

impl fmt::Display for SyncMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncMode::Historical => write!(f, "historical"),
			SyncMode::Incremental => write!(f, "incremental"),
		}
	}
}

impl FromStr for SyncMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"historical" => Ok(SyncMode::Historical),
			"incremental" => Ok(SyncMode::Incremental),
			other => Err(format!("unknown sync mode: {other}")),
		}
	}
}

/// Outcome of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
	pub processed: u64,
	pub inserted: u64,
	pub updated: u64,
	pub new_watermark: Option<DateTime<Utc>>,
}
