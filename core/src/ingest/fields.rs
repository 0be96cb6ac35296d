//! Upstream field-name resolution
//!
//! Field names drift across dataset revisions. Each logical attribute maps
//! to an ordered list of candidate upstream names; the first candidate seen
//! anywhere in the page wins. Resolution happens once per page, not per
//! record.

use super::IngestError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Candidate upstream names per logical attribute, in preference order.
const CANDIDATES: &[(&str, &[&str])] = &[
	("id", &["id", ":id", "permit_sid"]),
	(
		"updated_at",
		&["updated_at", ":updated_at", "last_update", "lastupdatedate", "dobrundate"],
	),
	("borough", &["borough", "boro"]),
	("bin", &["bin", "bin__", "bin_number"]),
	("block", &["block"]),
	("lot", &["lot"]),
	("house_number", &["house__", "house_no", "house_number"]),
	("street_name", &["street_name"]),
	("zip_code", &["zip_code", "zip"]),
	("community_board", &["community_board"]),
	("zoning_district", &["zoning_district", "zoning_dist1"]),
	("permit_number", &["permit_no", "permit__", "permit_number"]),
	("filing_date", &["filing_date"]),
	("filing_status", &["filing_status"]),
	("status", &["permit_status", "status"]),
	("permit_type", &["permit_type"]),
	("permit_subtype", &["permit_subtype"]),
	("work_type", &["work_type"]),
	("self_cert", &["self_cert"]),
	("job_type", &["job_type"]),
	("issuance_date", &["issuance_date", "issued_date", "issue_date"]),
	("expiration_date", &["expiration_date", "expired_date"]),
	("latitude", &["latitude", "gis_latitude", "lat"]),
	("longitude", &["longitude", "gis_longitude", "lon", "lng"]),
	(
		"owner_business_name",
		&["owner_s_business_name", "owner_business_name"],
	),
	("owner_name", &["owner_s_name", "owner_name"]),
	("owner_phone", &["owner_s_phone__", "owner_phone"]),
	(
		"permittee_business_name",
		&["permittee_s_business_name", "permittee_business_name"],
	),
	("permittee_name", &["permittee_s_name", "permittee_name"]),
	(
		"permittee_license_number",
		&["permittee_s_license__", "permittee_license_number"],
	),
	(
		"permittee_license_type",
		&["permittee_s_license_type", "permittee_license_type"],
	),
	("permittee_phone", &["permittee_s_phone__", "permittee_phone"]),
];

/// Resolved logical-attribute → upstream-key mapping for one page
#[derive(Debug)]
pub struct FieldMap {
	resolved: HashMap<&'static str, String>,
}

impl FieldMap {
	/// Resolve against the union of keys present anywhere in the page.
	pub fn resolve(records: &[Value]) -> Self {
		let keys: HashSet<&str> = records
			.iter()
			.filter_map(|r| r.as_object())
			.flat_map(|o| o.keys().map(String::as_str))
			.collect();

		let mut resolved = HashMap::new();
		for (logical, candidates) in CANDIDATES {
			if let Some(key) = candidates.iter().find(|c| keys.contains(**c)) {
				resolved.insert(*logical, key.to_string());
			}
		}

		Self { resolved }
	}

	/// Non-empty trimmed string value, or None
	pub fn str_field(&self, record: &Value, logical: &str) -> Option<String> {
		let key = self.resolved.get(logical)?;
		let value = record.get(key)?;
		let s = match value {
			Value::String(s) => s.trim().to_string(),
			Value::Number(n) => n.to_string(),
			_ => return None,
		};
		if s.is_empty() {
			None
		} else {
			Some(s)
		}
	}

	/// Numeric value; malformed numbers read as None
	pub fn f64_field(&self, record: &Value, logical: &str) -> Option<f64> {
		let key = self.resolved.get(logical)?;
		match record.get(key)? {
			Value::Number(n) => n.as_f64(),
			Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Calendar date; empty/missing reads as None, malformed is an error
	pub fn date_field(&self, record: &Value, logical: &str) -> Result<Option<NaiveDate>, IngestError> {
		match self.str_field(record, logical) {
			None => Ok(None),
			Some(s) => parse_date(&s)
				.map(Some)
				.ok_or_else(|| IngestError::MalformedRecord(format!("unparseable {logical}: {s:?}"))),
		}
	}

	/// Timestamp; empty/missing reads as None, malformed is an error
	pub fn datetime_field(
		&self,
		record: &Value,
		logical: &str,
	) -> Result<Option<DateTime<Utc>>, IngestError> {
		match self.str_field(record, logical) {
			None => Ok(None),
			Some(s) => parse_datetime(&s)
				.map(Some)
				.ok_or_else(|| IngestError::MalformedRecord(format!("unparseable {logical}: {s:?}"))),
		}
	}
}

fn parse_date(s: &str) -> Option<NaiveDate> {
	NaiveDate::parse_from_str(s, "%Y-%m-%d")
		.ok()
		.or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
		.or_else(|| {
			NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
				.ok()
				.map(|dt| dt.date())
		})
		.or_else(|| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.ok()
		.map(|dt| dt.with_timezone(&Utc))
		.or_else(|| {
			NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
				.ok()
				.map(|dt| dt.and_utc())
		})
		.or_else(|| {
			NaiveDate::parse_from_str(s, "%Y-%m-%d")
				.ok()
				.and_then(|d| d.and_hms_opt(0, 0, 0))
				.map(|dt| dt.and_utc())
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	#[test]
	fn earlier_candidates_win() {
		let page = vec![json!({"latitude": "40.7", "gis_latitude": "41.0"})];
		let fields = FieldMap::resolve(&page);
		assert_eq!(fields.f64_field(&page[0], "latitude"), Some(40.7));
	}

	#[test]
	fn fallback_names_resolve() {
		let page = vec![json!({"bin__": "1001", "permit__": "P-001"})];
		let fields = FieldMap::resolve(&page);
		assert_eq!(fields.str_field(&page[0], "bin").as_deref(), Some("1001"));
		assert_eq!(
			fields.str_field(&page[0], "permit_number").as_deref(),
			Some("P-001")
		);
	}

	#[test]
	fn resolution_uses_union_of_page_keys() {
		// First record lacks the field entirely; a later record carries it
		let page = vec![json!({"id": "a"}), json!({"id": "b", "borough": "QUEENS"})];
		let fields = FieldMap::resolve(&page);
		assert_eq!(fields.str_field(&page[0], "borough"), None);
		assert_eq!(
			fields.str_field(&page[1], "borough").as_deref(),
			Some("QUEENS")
		);
	}

	#[test]
	fn empty_string_reads_as_none() {
		let page = vec![json!({"issuance_date": "  "})];
		let fields = FieldMap::resolve(&page);
		assert_eq!(fields.date_field(&page[0], "issuance_date").unwrap(), None);
	}

	#[test]
	fn malformed_date_is_an_error() {
		let page = vec![json!({"issuance_date": "not-a-date"})];
		let fields = FieldMap::resolve(&page);
		assert!(fields.date_field(&page[0], "issuance_date").is_err());
	}

	#[test]
	fn accepted_date_formats() {
		let page = vec![json!({
			"issuance_date": "2024-01-02",
			"filing_date": "01/02/2024",
			"updated_at": "2024-01-02T00:00:00.000",
		})];
		let fields = FieldMap::resolve(&page);
		let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
		assert_eq!(
			fields.date_field(&page[0], "issuance_date").unwrap(),
			Some(expected)
		);
		assert_eq!(
			fields.date_field(&page[0], "filing_date").unwrap(),
			Some(expected)
		);
		assert_eq!(
			fields.datetime_field(&page[0], "updated_at").unwrap(),
			Some(expected.and_hms_opt(0, 0, 0).unwrap().and_utc())
		);
	}

	#[test]
	fn malformed_coordinates_read_as_none() {
		let page = vec![json!({"latitude": "forty", "longitude": -73.9})];
		let fields = FieldMap::resolve(&page);
		assert_eq!(fields.f64_field(&page[0], "latitude"), None);
		assert_eq!(fields.f64_field(&page[0], "longitude"), Some(-73.9));
	}
}
