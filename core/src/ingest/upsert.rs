//! Bulk upsert operation
//!
//! Merges one page of raw upstream records into the normalized store as a
//! single transaction: buildings, permit details, owner/permittee entities,
//! then permit fact rows. Records are parsed up front so a malformed record
//! fails the whole page before anything is written — losing a page beats
//! silently advancing the watermark past unparsed data.

use super::{FieldMap, IngestError};
use crate::infrastructure::database::entities::{self, building, entity, permit, permit_detail};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
	ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
	TransactionTrait,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Outcome of applying one page
#[derive(Debug, Clone, Default)]
pub struct PageResult {
	pub inserted: u64,
	pub updated: u64,
	pub max_updated_at: Option<DateTime<Utc>>,
}

/// One upstream record with every logical attribute resolved
#[derive(Debug, Clone)]
struct NormalizedRecord {
	id: String,
	updated_at: DateTime<Utc>,
	borough: Option<String>,
	bin: Option<String>,
	permit_number: Option<String>,
	status: Option<String>,
	permit_type: Option<String>,
	job_type: Option<String>,
	issuance_date: Option<NaiveDate>,
	expiration_date: Option<NaiveDate>,
	latitude: Option<f64>,
	longitude: Option<f64>,
	// building attributes, meaningful only when bin is present
	block: Option<String>,
	lot: Option<String>,
	house_number: Option<String>,
	street_name: Option<String>,
	zip_code: Option<String>,
	community_board: Option<String>,
	zoning_district: Option<String>,
	// permit-detail attributes, meaningful only when permit_number is present
	filing_date: Option<NaiveDate>,
	filing_status: Option<String>,
	permit_subtype: Option<String>,
	work_type: Option<String>,
	self_cert: Option<String>,
	owner: Option<EntityCandidate>,
	permittee: Option<EntityCandidate>,
	raw: Value,
}

#[derive(Debug, Clone)]
struct EntityCandidate {
	role: &'static str,
	business_name: Option<String>,
	person_name: Option<String>,
	license_number: Option<String>,
	license_type: Option<String>,
	phone: Option<String>,
}

/// Apply one page of raw records as a single transaction.
pub async fn apply_page(db: &DatabaseConnection, page: &[Value]) -> Result<PageResult, IngestError> {
	if page.is_empty() {
		return Ok(PageResult::default());
	}

	let fields = FieldMap::resolve(page);
	let records = page
		.iter()
		.map(|record| normalize(&fields, record))
		.collect::<Result<Vec<_>, _>>()?;

	let txn = db.begin().await?;

	upsert_buildings(&txn, &records).await?;
	upsert_permit_details(&txn, &records).await?;
	upsert_entities(&txn, &records).await?;
	let (inserted, updated, ids) = upsert_permits(&txn, &records).await?;

	// The store's clock, not one recomputed client-side, is what the
	// rolling watermark advances to.
	let max_updated_at = permit::Entity::find()
		.select_only()
		.column_as(permit::Column::UpdatedAt.max(), "max_updated_at")
		.filter(permit::Column::Id.is_in(ids))
		.into_tuple::<Option<DateTime<Utc>>>()
		.one(&txn)
		.await?
		.flatten();

	txn.commit().await?;

	Ok(PageResult {
		inserted,
		updated,
		max_updated_at,
	})
}

fn normalize(fields: &FieldMap, record: &Value) -> Result<NormalizedRecord, IngestError> {
	let id = fields
		.str_field(record, "id")
		.ok_or_else(|| IngestError::MalformedRecord("record without a stable id".into()))?;
	let updated_at = fields
		.datetime_field(record, "updated_at")?
		.ok_or_else(|| IngestError::MalformedRecord(format!("record {id} lacks updated_at")))?;

	let owner = entity_candidate(
		entity::ROLE_OWNER,
		fields.str_field(record, "owner_business_name"),
		fields.str_field(record, "owner_name"),
		None,
		None,
		fields.str_field(record, "owner_phone"),
	);
	let permittee = entity_candidate(
		entity::ROLE_PERMITTEE,
		fields.str_field(record, "permittee_business_name"),
		fields.str_field(record, "permittee_name"),
		fields.str_field(record, "permittee_license_number"),
		fields.str_field(record, "permittee_license_type"),
		fields.str_field(record, "permittee_phone"),
	);

	Ok(NormalizedRecord {
		borough: fields.str_field(record, "borough"),
		bin: fields.str_field(record, "bin"),
		permit_number: fields.str_field(record, "permit_number"),
		status: fields.str_field(record, "status"),
		permit_type: fields.str_field(record, "permit_type"),
		job_type: fields.str_field(record, "job_type"),
		issuance_date: fields.date_field(record, "issuance_date")?,
		expiration_date: fields.date_field(record, "expiration_date")?,
		latitude: fields.f64_field(record, "latitude"),
		longitude: fields.f64_field(record, "longitude"),
		block: fields.str_field(record, "block"),
		lot: fields.str_field(record, "lot"),
		house_number: fields.str_field(record, "house_number"),
		street_name: fields.str_field(record, "street_name"),
		zip_code: fields.str_field(record, "zip_code"),
		community_board: fields.str_field(record, "community_board"),
		zoning_district: fields.str_field(record, "zoning_district"),
		filing_date: fields.date_field(record, "filing_date")?,
		filing_status: fields.str_field(record, "filing_status"),
		permit_subtype: fields.str_field(record, "permit_subtype"),
		work_type: fields.str_field(record, "work_type"),
		self_cert: fields.str_field(record, "self_cert"),
		owner,
		permittee,
		raw: record.clone(),
		id,
		updated_at,
	})
}

/// Included only when it has a business name or a person name.
fn entity_candidate(
	role: &'static str,
	business_name: Option<String>,
	person_name: Option<String>,
	license_number: Option<String>,
	license_type: Option<String>,
	phone: Option<String>,
) -> Option<EntityCandidate> {
	if business_name.is_none() && person_name.is_none() {
		return None;
	}
	Some(EntityCandidate {
		role,
		business_name,
		person_name,
		license_number,
		license_type,
		phone,
	})
}

async fn upsert_buildings<C: sea_orm::ConnectionTrait>(
	txn: &C,
	records: &[NormalizedRecord],
) -> Result<(), IngestError> {
	// Last record for a key wins within the page
	let mut by_bin: BTreeMap<String, building::ActiveModel> = BTreeMap::new();
	for rec in records {
		let Some(bin) = &rec.bin else { continue };
		by_bin.insert(
			bin.clone(),
			building::ActiveModel {
				bin: Set(bin.clone()),
				borough: Set(rec.borough.clone()),
				block: Set(rec.block.clone()),
				lot: Set(rec.lot.clone()),
				house_number: Set(rec.house_number.clone()),
				street_name: Set(rec.street_name.clone()),
				zip_code: Set(rec.zip_code.clone()),
				community_board: Set(rec.community_board.clone()),
				zoning_district: Set(rec.zoning_district.clone()),
				updated_at: Set(rec.updated_at),
			},
		);
	}
	if by_bin.is_empty() {
		return Ok(());
	}

	entities::Building::insert_many(by_bin.into_values())
		.on_conflict(
			OnConflict::column(building::Column::Bin)
				.update_columns([
					building::Column::Borough,
					building::Column::Block,
					building::Column::Lot,
					building::Column::HouseNumber,
					building::Column::StreetName,
					building::Column::ZipCode,
					building::Column::CommunityBoard,
					building::Column::ZoningDistrict,
					building::Column::UpdatedAt,
				])
				.to_owned(),
		)
		.exec(txn)
		.await?;
	Ok(())
}

async fn upsert_permit_details<C: sea_orm::ConnectionTrait>(
	txn: &C,
	records: &[NormalizedRecord],
) -> Result<(), IngestError> {
	let mut by_number: BTreeMap<String, permit_detail::ActiveModel> = BTreeMap::new();
	for rec in records {
		let Some(number) = &rec.permit_number else {
			continue;
		};
		by_number.insert(
			number.clone(),
			permit_detail::ActiveModel {
				permit_number: Set(number.clone()),
				filing_date: Set(rec.filing_date),
				filing_status: Set(rec.filing_status.clone()),
				permit_status: Set(rec.status.clone()),
				permit_type: Set(rec.permit_type.clone()),
				permit_subtype: Set(rec.permit_subtype.clone()),
				work_type: Set(rec.work_type.clone()),
				self_cert: Set(rec.self_cert.clone()),
				updated_at: Set(rec.updated_at),
			},
		);
	}
	if by_number.is_empty() {
		return Ok(());
	}

	entities::PermitDetail::insert_many(by_number.into_values())
		.on_conflict(
			OnConflict::column(permit_detail::Column::PermitNumber)
				.update_columns([
					permit_detail::Column::FilingDate,
					permit_detail::Column::FilingStatus,
					permit_detail::Column::PermitStatus,
					permit_detail::Column::PermitType,
					permit_detail::Column::PermitSubtype,
					permit_detail::Column::WorkType,
					permit_detail::Column::SelfCert,
					permit_detail::Column::UpdatedAt,
				])
				.to_owned(),
		)
		.exec(txn)
		.await?;
	Ok(())
}

async fn upsert_entities<C: sea_orm::ConnectionTrait>(
	txn: &C,
	records: &[NormalizedRecord],
) -> Result<(), IngestError> {
	// Page-level dedup applies only to named businesses; first seen wins.
	let mut seen: HashSet<(String, String)> = HashSet::new();

	for rec in records {
		for cand in [&rec.owner, &rec.permittee].into_iter().flatten() {
			match &cand.business_name {
				Some(name) => {
					if !seen.insert((cand.role.to_string(), name.clone())) {
						continue;
					}

					let existing = entity::Entity::find()
						.filter(entity::Column::Role.eq(cand.role))
						.filter(entity::Column::BusinessName.eq(name.clone()))
						.one(txn)
						.await?;

					match existing {
						Some(row) => {
							let mut active: entity::ActiveModel = row.into();
							active.person_name = Set(cand.person_name.clone());
							active.license_number = Set(cand.license_number.clone());
							active.license_type = Set(cand.license_type.clone());
							active.phone = Set(cand.phone.clone());
							active.updated_at = Set(rec.updated_at);
							active.update(txn).await?;
						}
						None => {
							new_entity(cand, rec.updated_at).insert(txn).await?;
						}
					}
				}
				// No business name: never deduplicated, every occurrence
				// becomes its own row.
				None => {
					new_entity(cand, rec.updated_at).insert(txn).await?;
				}
			}
		}
	}
	Ok(())
}

fn new_entity(cand: &EntityCandidate, updated_at: DateTime<Utc>) -> entity::ActiveModel {
	entity::ActiveModel {
		role: Set(cand.role.to_string()),
		business_name: Set(cand.business_name.clone()),
		person_name: Set(cand.person_name.clone()),
		license_number: Set(cand.license_number.clone()),
		license_type: Set(cand.license_type.clone()),
		phone: Set(cand.phone.clone()),
		updated_at: Set(updated_at),
		..Default::default()
	}
}

async fn upsert_permits<C: sea_orm::ConnectionTrait>(
	txn: &C,
	records: &[NormalizedRecord],
) -> Result<(u64, u64, Vec<String>), IngestError> {
	let mut by_id: BTreeMap<String, &NormalizedRecord> = BTreeMap::new();
	for rec in records {
		by_id.insert(rec.id.clone(), rec);
	}
	let ids: Vec<String> = by_id.keys().cloned().collect();

	// Classify before the upsert: a key that already exists is an update.
	let existing: HashSet<String> = permit::Entity::find()
		.select_only()
		.column(permit::Column::Id)
		.filter(permit::Column::Id.is_in(ids.clone()))
		.into_tuple::<String>()
		.all(txn)
		.await?
		.into_iter()
		.collect();

	let updated = existing.len() as u64;
	let inserted = ids.len() as u64 - updated;

	let models = by_id.values().map(|rec| {
		let geometry = permit::derive_geometry(rec.latitude, rec.longitude);
		permit::ActiveModel {
			id: Set(rec.id.clone()),
			borough: Set(rec.borough.clone()),
			bin: Set(rec.bin.clone()),
			permit_number: Set(rec.permit_number.clone()),
			status: Set(rec.status.clone()),
			permit_type: Set(rec.permit_type.clone()),
			job_type: Set(rec.job_type.clone()),
			issuance_date: Set(rec.issuance_date),
			expiration_date: Set(rec.expiration_date),
			latitude: Set(rec.latitude),
			longitude: Set(rec.longitude),
			geom_lon: Set(geometry.map(|(lon, _)| lon)),
			geom_lat: Set(geometry.map(|(_, lat)| lat)),
			raw: Set(rec.raw.clone()),
			updated_at: Set(rec.updated_at),
		}
	});

	entities::Permit::insert_many(models)
		.on_conflict(
			OnConflict::column(permit::Column::Id)
				.update_columns([
					permit::Column::Borough,
					permit::Column::Bin,
					permit::Column::PermitNumber,
					permit::Column::Status,
					permit::Column::PermitType,
					permit::Column::JobType,
					permit::Column::IssuanceDate,
					permit::Column::ExpirationDate,
					permit::Column::Latitude,
					permit::Column::Longitude,
					permit::Column::GeomLon,
					permit::Column::GeomLat,
					permit::Column::Raw,
					permit::Column::UpdatedAt,
				])
				.to_owned(),
		)
		.exec(txn)
		.await?;

	Ok((inserted, updated, ids))
}
