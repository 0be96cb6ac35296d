//! Upstream permit API client
//!
//! The upstream is a Socrata-style JSON endpoint: server-side filtering via
//! `$where`, ordering via `$order`, paging via `$limit`. Ordering by
//! `updated_at` ascending is load-bearing — it is what makes rolling
//! watermark advancement safe within and across pages.

use super::IngestError;
use crate::config::UpstreamConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Seam between the ingestion engine and the upstream API. Tests script
/// pages through this; production uses [`UpstreamClient`].
#[async_trait]
pub trait PermitSource: Send + Sync {
	/// One page of records with `updated_at > since` (and `<= until` when
	/// bounded), ordered by `updated_at` ascending.
	async fn fetch_page(
		&self,
		since: DateTime<Utc>,
		until: Option<DateTime<Utc>>,
		limit: u64,
	) -> Result<Vec<Value>, IngestError>;

	/// Cheap existence probe: is there any record newer than the watermark?
	async fn any_newer_than(&self, watermark: DateTime<Utc>) -> Result<bool, IngestError>;
}

/// Production client for the upstream dataset
pub struct UpstreamClient {
	http: reqwest::Client,
	base_url: String,
	app_token: Option<String>,
}

impl UpstreamClient {
	pub fn new(config: &UpstreamConfig) -> Result<Self, IngestError> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()?;

		Ok(Self {
			http,
			base_url: config.base_url.clone(),
			app_token: config.app_token.clone(),
		})
	}

	async fn get(&self, query: &[(&str, String)]) -> Result<Vec<Value>, IngestError> {
		let mut request = self.http.get(&self.base_url).query(query);
		if let Some(token) = &self.app_token {
			request = request.header("X-App-Token", token);
		}

		let response = request.send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(IngestError::UpstreamStatus {
				status: status.as_u16(),
			});
		}

		Ok(response.json().await?)
	}
}

#[async_trait]
impl PermitSource for UpstreamClient {
	async fn fetch_page(
		&self,
		since: DateTime<Utc>,
		until: Option<DateTime<Utc>>,
		limit: u64,
	) -> Result<Vec<Value>, IngestError> {
		debug!("fetching page: since={} until={:?} limit={}", since, until, limit);
		self.get(&[
			("$where", where_clause(since, until)),
			("$order", "updated_at ASC".to_string()),
			("$limit", limit.to_string()),
		])
		.await
	}

	async fn any_newer_than(&self, watermark: DateTime<Utc>) -> Result<bool, IngestError> {
		let page = self
			.get(&[
				("$where", where_clause(watermark, None)),
				("$select", "updated_at".to_string()),
				("$limit", "1".to_string()),
			])
			.await?;
		Ok(!page.is_empty())
	}
}

fn where_clause(since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> String {
	let mut clause = format!("updated_at > '{}'", format_timestamp(since));
	if let Some(until) = until {
		clause.push_str(&format!(" AND updated_at <= '{}'", format_timestamp(until)));
	}
	clause
}

/// Floating timestamp literal, the format the upstream compares against
fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn ts(s: &str) -> DateTime<Utc> {
		DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
	}

	#[test]
	fn where_clause_lower_bound_only() {
		assert_eq!(
			where_clause(ts("2024-01-02T00:00:00Z"), None),
			"updated_at > '2024-01-02T00:00:00.000'"
		);
	}

	#[test]
	fn where_clause_bounded_range() {
		assert_eq!(
			where_clause(ts("2024-01-02T00:00:00Z"), Some(ts("2024-02-01T12:30:00Z"))),
			"updated_at > '2024-01-02T00:00:00.000' AND updated_at <= '2024-02-01T12:30:00.000'"
		);
	}
}
