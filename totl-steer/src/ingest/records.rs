//! Typed feed records
//!
//! Feeds arrive as flat key/value rows (already parsed from CSV or JSON by
//! the caller). Each kind has a typed record with explicit required and
//! optional fields, built with `TryFrom<&RawRecord>`. Values may arrive as
//! JSON strings or numbers; blank strings count as absent.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use totl_common::phone::PhoneKey;

use super::error::RecordError;
use crate::models::{FacilityClass, RiskTier};

/// One untyped feed row
pub type RawRecord = Map<String, Value>;

// ============================================================================
// Field access
// ============================================================================

/// Field value as trimmed text; `None` for null, missing, or blank
fn text(record: &RawRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(record: &RawRecord, field: &'static str) -> Result<String, RecordError> {
    text(record, field).ok_or(RecordError::MissingField(field))
}

fn optional_f64(record: &RawRecord, field: &'static str) -> Result<Option<f64>, RecordError> {
    match record.get(field) {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| RecordError::InvalidNumber {
                field,
                value: n.to_string(),
            }),
        _ => match text(record, field) {
            None => Ok(None),
            Some(raw) => raw
                .trim_start_matches('$')
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or(RecordError::InvalidNumber { field, value: raw }),
        },
    }
}

fn required_f64(record: &RawRecord, field: &'static str) -> Result<f64, RecordError> {
    optional_f64(record, field)?.ok_or(RecordError::MissingField(field))
}

fn optional_i64(record: &RawRecord, field: &'static str) -> Result<Option<i64>, RecordError> {
    match text(record, field) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RecordError::InvalidNumber { field, value: raw }),
    }
}

fn required_i64(record: &RawRecord, field: &'static str) -> Result<i64, RecordError> {
    optional_i64(record, field)?.ok_or(RecordError::MissingField(field))
}

fn optional_date(record: &RawRecord, field: &'static str) -> Result<Option<NaiveDate>, RecordError> {
    match text(record, field) {
        None => Ok(None),
        Some(raw) => totl_common::time::parse_date(&raw)
            .map(Some)
            .map_err(|_| RecordError::InvalidDate { field, value: raw }),
    }
}

fn required_date(record: &RawRecord, field: &'static str) -> Result<NaiveDate, RecordError> {
    optional_date(record, field)?.ok_or(RecordError::MissingField(field))
}

/// First present alias wins
fn text_any(record: &RawRecord, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| text(record, f))
}

/// Identifier used to label a record in batch error messages
pub fn record_label(record: &RawRecord) -> String {
    text_any(record, &["member_id", "npi", "plan_id", "referral_id"]).unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone)]
pub struct EligibilityRecord {
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: PhoneKey,
    pub zip_code: Option<String>,
    pub risk_tier: Option<RiskTier>,
}

impl TryFrom<&RawRecord> for EligibilityRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        let raw_phone = required_text(record, "phone_number")?;
        let phone = PhoneKey::parse(&raw_phone);
        if !phone.has_digits() {
            return Err(RecordError::InvalidValue {
                field: "phone_number",
                value: raw_phone,
                reason: "no digits".to_string(),
            });
        }

        let risk_tier = match text(record, "risk_tier") {
            None => None,
            Some(raw) => Some(raw.parse::<RiskTier>().map_err(|reason| {
                RecordError::InvalidValue {
                    field: "risk_tier",
                    value: raw,
                    reason,
                }
            })?),
        };

        Ok(Self {
            member_id: required_text(record, "member_id")?,
            plan_id: optional_i64(record, "plan_id")?,
            first_name: required_text(record, "first_name")?,
            last_name: required_text(record, "last_name")?,
            date_of_birth: optional_date(record, "date_of_birth")?,
            phone,
            zip_code: text(record, "zip_code"),
            risk_tier,
        })
    }
}

/// Accumulator row; limits fall back to policy defaults when absent
#[derive(Debug, Clone)]
pub struct AccumulatorRecord {
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub deductible_met: f64,
    pub deductible_limit: Option<f64>,
    pub oop_met: f64,
    pub oop_limit: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl TryFrom<&RawRecord> for AccumulatorRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        let recorded_at = match text(record, "recorded_at") {
            None => None,
            Some(raw) => Some(
                totl_common::time::parse_timestamp(&raw)
                    .or_else(|_| {
                        totl_common::time::parse_date(&raw).map(|d| {
                            d.and_hms_opt(0, 0, 0)
                                .map(|dt| dt.and_utc())
                                .unwrap_or_else(totl_common::time::now)
                        })
                    })
                    .map_err(|_| RecordError::InvalidDate {
                        field: "recorded_at",
                        value: raw,
                    })?,
            ),
        };

        Ok(Self {
            member_id: required_text(record, "member_id")?,
            plan_id: optional_i64(record, "plan_id")?,
            deductible_met: required_f64(record, "deductible_met")?,
            deductible_limit: optional_f64(record, "deductible_limit")?,
            oop_met: optional_f64(record, "oop_met")?.unwrap_or(0.0),
            oop_limit: optional_f64(record, "oop_limit")?,
            recorded_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClaimRecord {
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub date_of_service: NaiveDate,
    pub cpt_code: String,
    pub diagnosis_code: Option<String>,
    pub allowed_amount: f64,
    pub provider_npi: Option<String>,
}

impl TryFrom<&RawRecord> for ClaimRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            member_id: required_text(record, "member_id")?,
            plan_id: optional_i64(record, "plan_id")?,
            date_of_service: required_date(record, "date_of_service")?,
            cpt_code: required_text(record, "cpt_code")?,
            diagnosis_code: text(record, "diagnosis_code"),
            allowed_amount: required_f64(record, "allowed_amount")?,
            provider_npi: text_any(record, &["provider_npi", "npi"]),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReferralRecord {
    pub referral_id: Option<String>,
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub cpt_code: String,
    pub provider_npi: Option<String>,
    pub ordering_provider_npi: Option<String>,
}

impl TryFrom<&RawRecord> for ReferralRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            referral_id: text(record, "referral_id"),
            member_id: required_text(record, "member_id")?,
            plan_id: optional_i64(record, "plan_id")?,
            cpt_code: required_text(record, "cpt_code")?,
            provider_npi: text(record, "provider_npi"),
            ordering_provider_npi: text(record, "ordering_provider_npi"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub plan_id: i64,
    pub name: String,
    pub sponsor_name: Option<String>,
}

impl TryFrom<&RawRecord> for PlanRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            plan_id: required_i64(record, "plan_id")?,
            name: required_text(record, "name")?,
            sponsor_name: text(record, "sponsor_name"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FacilityRecord {
    pub npi: String,
    pub facility_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub facility_class: FacilityClass,
}

impl TryFrom<&RawRecord> for FacilityRecord {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        let facility_name = required_text(record, "facility_name")?;
        let facility_class = match text(record, "facility_type") {
            None => FacilityClass::infer_from_name(&facility_name),
            Some(raw) => raw.parse::<FacilityClass>().map_err(|reason| {
                RecordError::InvalidValue {
                    field: "facility_type",
                    value: raw,
                    reason,
                }
            })?,
        };

        Ok(Self {
            npi: required_text(record, "npi")?,
            facility_name,
            address: text(record, "address"),
            city: text(record, "city"),
            state: text(record, "state"),
            zip_code: text(record, "zip_code"),
            latitude: optional_f64(record, "latitude")?,
            longitude: optional_f64(record, "longitude")?,
            facility_class,
        })
    }
}

/// Historical EOB price line
#[derive(Debug, Clone)]
pub struct PriceLine {
    pub member_ref: String,
    pub plan_id: i64,
    pub date_of_service: NaiveDate,
    pub cpt_code: String,
    pub npi: String,
    pub allowed_amount: f64,
    pub place_of_service: Option<String>,
    pub facility_name: Option<String>,
}

impl TryFrom<&RawRecord> for PriceLine {
    type Error = RecordError;

    fn try_from(record: &RawRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            member_ref: required_text(record, "member_id")?,
            plan_id: required_i64(record, "plan_id")?,
            date_of_service: required_date(record, "date_of_service")?,
            cpt_code: required_text(record, "cpt_code")?,
            npi: required_text(record, "npi")?,
            allowed_amount: required_f64(record, "allowed_amount")?,
            place_of_service: text(record, "place_of_service"),
            facility_name: text(record, "facility_name"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_claim_requires_date_of_service() {
        let record = raw(json!({
            "member_id": "M100",
            "cpt_code": "85025",
            "allowed_amount": 42.5
        }));
        let err = ClaimRecord::try_from(&record).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("date_of_service")));
    }

    #[test]
    fn test_bad_date_and_number_are_reported() {
        let record = raw(json!({
            "member_id": "M100",
            "cpt_code": "85025",
            "date_of_service": "03/14/2024",
            "allowed_amount": "12"
        }));
        assert!(matches!(
            ClaimRecord::try_from(&record).unwrap_err(),
            RecordError::InvalidDate { field: "date_of_service", .. }
        ));

        let record = raw(json!({
            "member_id": "M100",
            "deductible_met": "lots"
        }));
        assert!(matches!(
            AccumulatorRecord::try_from(&record).unwrap_err(),
            RecordError::InvalidNumber { field: "deductible_met", .. }
        ));
    }

    #[test]
    fn test_numeric_strings_and_numbers_both_accepted() {
        let record = raw(json!({
            "member_id": 100234,
            "plan_id": "1",
            "deductible_met": "$1,250.50",
            "deductible_limit": 3000
        }));
        let acc = AccumulatorRecord::try_from(&record).unwrap();
        assert_eq!(acc.member_id, "100234");
        assert_eq!(acc.plan_id, Some(1));
        assert_eq!(acc.deductible_met, 1250.5);
        assert_eq!(acc.deductible_limit, Some(3000.0));
        assert_eq!(acc.oop_met, 0.0);
    }

    #[test]
    fn test_eligibility_normalizes_phone() {
        let record = raw(json!({
            "member_id": "M100",
            "first_name": "Ana",
            "last_name": "Lopez",
            "phone_number": "(555) 000-1111",
            "risk_tier": "high",
            "zip_code": " "
        }));
        let elig = EligibilityRecord::try_from(&record).unwrap();
        assert_eq!(elig.phone.as_str(), "+15550001111");
        assert_eq!(elig.risk_tier, Some(RiskTier::High));
        assert_eq!(elig.zip_code, None);
    }

    #[test]
    fn test_facility_type_inferred_from_name() {
        let record = raw(json!({
            "npi": "1999999999",
            "facility_name": "Mercy Hospital Outpatient Imaging"
        }));
        let facility = FacilityRecord::try_from(&record).unwrap();
        assert_eq!(facility.facility_class, FacilityClass::Hospital);

        let record = raw(json!({
            "npi": "1999999999",
            "facility_name": "Mercy Hospital Outpatient Imaging",
            "facility_type": "imaging_center"
        }));
        let facility = FacilityRecord::try_from(&record).unwrap();
        assert_eq!(facility.facility_class, FacilityClass::Freestanding);
    }
}
