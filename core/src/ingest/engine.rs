//! Sync loop
//!
//! Drives pagination against the upstream source, applies each page through
//! the bulk upsert, and advances a rolling high-water mark. Fetch and apply
//! are strictly sequential: page N+1 is not requested before page N has
//! committed.

use super::{upsert, IngestError, PermitSource, SyncMode, SyncReport};
use crate::config::UpstreamConfig;
use crate::infrastructure::database::entities::sync_state;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct IngestEngine<S: PermitSource> {
	db: DatabaseConnection,
	source: S,
	config: UpstreamConfig,
}

impl<S: PermitSource> IngestEngine<S> {
	pub fn new(db: DatabaseConnection, source: S, config: UpstreamConfig) -> Self {
		Self { db, source, config }
	}

	pub fn source_ref(&self) -> &S {
		&self.source
	}

	/// Run one sync. `since`/`until` override the stored watermark; a run
	/// with either override never mutates persisted sync state, so it
	/// cannot corrupt incremental progress.
	pub async fn sync(
		&self,
		mode: SyncMode,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
	) -> Result<SyncReport, IngestError> {
		let explicit_range = since.is_some() || until.is_some();
		let stored = self.load_watermark().await?;

		let start = match since {
			Some(s) => s,
			None => match mode {
				SyncMode::Historical => DateTime::UNIX_EPOCH,
				SyncMode::Incremental => stored.unwrap_or(DateTime::UNIX_EPOCH),
			},
		};

		// Preflight: when resuming from the stored watermark, a cheap
		// existence probe avoids paginating an unchanged dataset.
		if mode == SyncMode::Incremental && !explicit_range {
			if let Some(watermark) = stored {
				if !self.probe_with_retry(watermark).await? {
					debug!("no records newer than watermark {watermark}, skipping run");
					return Ok(SyncReport {
						processed: 0,
						inserted: 0,
						updated: 0,
						new_watermark: Some(watermark),
					});
				}
			}
		}

		info!("starting {mode} sync from {start}");

		let mut rolling = start;
		let mut processed = 0u64;
		let mut inserted = 0u64;
		let mut updated = 0u64;

		loop {
			let page = self.fetch_with_retry(rolling, until).await?;
			if page.is_empty() {
				break;
			}
			let page_len = page.len() as u64;

			let result = upsert::apply_page(&self.db, &page).await?;
			processed += page_len;
			inserted += result.inserted;
			updated += result.updated;

			if let Some(max) = result.max_updated_at {
				if max > rolling {
					rolling = max;
				}
			}
			debug!("applied page of {page_len} records, rolling watermark {rolling}");

			if page_len < self.config.page_size {
				break;
			}
		}

		let new_watermark = if processed > 0 { Some(rolling) } else { stored };

		if !explicit_range {
			if let Some(watermark) = new_watermark {
				// Never move backwards, whatever the run saw.
				if stored.map_or(true, |s| watermark > s) {
					self.store_watermark(watermark).await?;
				}
			}
		}

		info!(
			"{mode} sync complete: {processed} processed, {inserted} inserted, {updated} updated"
		);

		Ok(SyncReport {
			processed,
			inserted,
			updated,
			new_watermark,
		})
	}

	async fn fetch_with_retry(
		&self,
		since: DateTime<Utc>,
		until: Option<DateTime<Utc>>,
	) -> Result<Vec<serde_json::Value>, IngestError> {
		let mut attempt = 0u32;
		loop {
			match self
				.source
				.fetch_page(since, until, self.config.page_size)
				.await
			{
				Ok(page) => return Ok(page),
				Err(e) if e.is_transient() && attempt < self.config.max_retries => {
					let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
					warn!("transient upstream failure ({e}), retrying in {delay:?}");
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(e) if e.is_transient() => {
					return Err(IngestError::RetriesExhausted {
						attempts: attempt + 1,
						source: Box::new(e),
					})
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn probe_with_retry(&self, watermark: DateTime<Utc>) -> Result<bool, IngestError> {
		let mut attempt = 0u32;
		loop {
			match self.source.any_newer_than(watermark).await {
				Ok(newer) => return Ok(newer),
				Err(e) if e.is_transient() && attempt < self.config.max_retries => {
					let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
					warn!("transient upstream failure during probe ({e}), retrying in {delay:?}");
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(e) if e.is_transient() => {
					return Err(IngestError::RetriesExhausted {
						attempts: attempt + 1,
						source: Box::new(e),
					})
				}
				Err(e) => return Err(e),
			}
		}
	}

	pub async fn load_watermark(&self) -> Result<Option<DateTime<Utc>>, IngestError> {
		Ok(sync_state::Entity::find_by_id(sync_state::SINGLETON_ID)
			.one(&self.db)
			.await?
			.and_then(|row| row.last_synced_updated_at))
	}

	async fn store_watermark(&self, watermark: DateTime<Utc>) -> Result<(), IngestError> {
		let model = sync_state::ActiveModel {
			id: Set(sync_state::SINGLETON_ID),
			last_synced_updated_at: Set(Some(watermark)),
			updated_at: Set(Utc::now()),
		};
		sync_state::Entity::insert(model)
			.on_conflict(
				OnConflict::column(sync_state::Column::Id)
					.update_columns([
						sync_state::Column::LastSyncedUpdatedAt,
						sync_state::Column::UpdatedAt,
					])
					.to_owned(),
			)
			.exec(&self.db)
			.await?;
		Ok(())
	}
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
	Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_per_attempt() {
		assert_eq!(backoff_delay(500, 0), Duration::from_millis(500));
		assert_eq!(backoff_delay(500, 1), Duration::from_millis(1000));
		assert_eq!(backoff_delay(500, 2), Duration::from_millis(2000));
	}
}
