//! Ingestion pipeline
//!
//! Best-effort batches: every record is validated and stored on its own, a
//! failing record adds one line to the report and the batch moves on.
//! Records already stored stay stored. Referral records also run the full
//! decision pipeline, in feed order.

pub mod error;
pub mod records;

pub use error::RecordError;
pub use records::RawRecord;

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use totl_common::config::PolicyConfig;
use tracing::{info, warn};

use crate::db;
use crate::db::members::{NewMember, ProfileUpdate};
use crate::models::{Accumulator, Claim, Facility, Member, Plan, PriceRecord};
use crate::services::consent::ConsentLedger;
use crate::services::steerage::{ReferralRequest, SteerageEngine};
use crate::utils::db_retry::retry_on_lock;
use records::{
    AccumulatorRecord, ClaimRecord, EligibilityRecord, FacilityRecord, PlanRecord, PriceLine,
    ReferralRecord,
};

/// Reason recorded when an opt-out follows a member to a new number
const REASON_CARRIED: &str = "Carried over from previous number";

/// Feed kinds accepted by [`Ingestor::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestKind {
    Eligibility,
    Accumulators,
    Claims,
    Referrals,
    Plans,
    Facilities,
    Prices,
}

impl IngestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestKind::Eligibility => "eligibility",
            IngestKind::Accumulators => "accumulators",
            IngestKind::Claims => "claims",
            IngestKind::Referrals => "referrals",
            IngestKind::Plans => "plans",
            IngestKind::Facilities => "facilities",
            IngestKind::Prices => "prices",
        }
    }
}

impl FromStr for IngestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eligibility" => Ok(IngestKind::Eligibility),
            "accumulators" => Ok(IngestKind::Accumulators),
            "claims" => Ok(IngestKind::Claims),
            "referrals" => Ok(IngestKind::Referrals),
            "plans" => Ok(IngestKind::Plans),
            "facilities" => Ok(IngestKind::Facilities),
            "prices" | "eobs" => Ok(IngestKind::Prices),
            other => Err(format!("unknown ingest kind '{}'", other)),
        }
    }
}

/// Batch outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Ingestor {
    pool: SqlitePool,
    policy: PolicyConfig,
    ledger: ConsentLedger,
    steerage: SteerageEngine,
}

impl Ingestor {
    pub fn new(
        pool: SqlitePool,
        policy: PolicyConfig,
        ledger: ConsentLedger,
        steerage: SteerageEngine,
    ) -> Self {
        Self {
            pool,
            policy,
            ledger,
            steerage,
        }
    }

    /// Process a batch of one kind
    pub async fn ingest(&self, kind: IngestKind, records: &[RawRecord]) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, record) in records.iter().enumerate() {
            match self.ingest_one(kind, record).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    let label = records::record_label(record);
                    warn!(kind = kind.as_str(), index, record = %label, error = %e, "Record rejected");
                    report
                        .errors
                        .push(format!("Record {} ({}): {}", index + 1, label, e));
                }
            }
        }

        info!(
            kind = kind.as_str(),
            processed = report.processed,
            errors = report.errors.len(),
            "Batch ingested"
        );
        report
    }

    async fn ingest_one(&self, kind: IngestKind, record: &RawRecord) -> Result<(), RecordError> {
        match kind {
            IngestKind::Eligibility => self.upsert_member(EligibilityRecord::try_from(record)?).await,
            IngestKind::Accumulators => {
                self.record_accumulator(AccumulatorRecord::try_from(record)?)
                    .await
            }
            IngestKind::Claims => self.append_claim(ClaimRecord::try_from(record)?).await,
            IngestKind::Referrals => self.process_referral(ReferralRecord::try_from(record)?).await,
            IngestKind::Plans => self.upsert_plan(PlanRecord::try_from(record)?).await,
            IngestKind::Facilities => self.upsert_facility(FacilityRecord::try_from(record)?).await,
            IngestKind::Prices => self.append_price(PriceLine::try_from(record)?).await,
        }
    }

    // ------------------------------------------------------------------
    // Eligibility
    // ------------------------------------------------------------------

    /// Create or update a member keyed by external id
    ///
    /// Runs under the phone's consent lock so the member's opt-out flag and
    /// the ledger record for the (possibly new) number stay in agreement.
    async fn upsert_member(&self, record: EligibilityRecord) -> Result<(), RecordError> {
        let _guard = self.ledger.lock(&record.phone).await;
        let pool = &self.pool;
        let record = &record;

        retry_on_lock("upsert member", self.ledger.max_lock_wait_ms(), move || async move {
            let mut tx = pool.begin().await?;
            let outcome = upsert_member_on(&mut tx, record).await;
            match outcome {
                Ok(()) => {
                    tx.commit().await?;
                    Ok(Ok(()))
                }
                Err(RecordError::Storage(e)) => Err(e),
                Err(other) => Ok(Err(other)),
            }
        })
        .await?
    }

    // ------------------------------------------------------------------
    // Accumulators and claims
    // ------------------------------------------------------------------

    async fn record_accumulator(&self, record: AccumulatorRecord) -> Result<(), RecordError> {
        let mut conn = self.pool.acquire().await.map_err(totl_common::Error::from)?;
        let member = find_member(&mut conn, &record.member_id, record.plan_id).await?;

        db::accumulators::record_snapshot(
            &mut conn,
            &Accumulator {
                member_id: member.id,
                deductible_met: record.deductible_met,
                deductible_limit: record
                    .deductible_limit
                    .unwrap_or(self.policy.default_deductible_limit),
                oop_met: record.oop_met,
                oop_limit: record.oop_limit.unwrap_or(self.policy.default_oop_limit),
                recorded_at: record.recorded_at.unwrap_or_else(totl_common::time::now),
            },
        )
        .await?;
        Ok(())
    }

    async fn append_claim(&self, record: ClaimRecord) -> Result<(), RecordError> {
        let mut conn = self.pool.acquire().await.map_err(totl_common::Error::from)?;
        let member = find_member(&mut conn, &record.member_id, record.plan_id).await?;

        db::claims::insert(
            &mut conn,
            &Claim {
                member_id: member.id,
                date_of_service: record.date_of_service,
                cpt_code: record.cpt_code,
                diagnosis_code: record.diagnosis_code,
                allowed_amount: record.allowed_amount,
                provider_npi: record.provider_npi,
            },
        )
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Referrals
    // ------------------------------------------------------------------

    async fn process_referral(&self, record: ReferralRecord) -> Result<(), RecordError> {
        let request = ReferralRequest {
            external_id: record.referral_id,
            member_id: record.member_id.clone(),
            plan_id: record.plan_id,
            cpt_code: record.cpt_code,
            provider_npi: record.provider_npi,
            ordering_provider_npi: record.ordering_provider_npi,
        };

        match self.steerage.process(&request).await {
            Ok(_) => Ok(()),
            Err(totl_common::Error::NotFound(_)) => Err(RecordError::MemberNotFound(record.member_id)),
            Err(e) => Err(RecordError::Storage(e)),
        }
    }

    // ------------------------------------------------------------------
    // Reference data
    // ------------------------------------------------------------------

    async fn upsert_plan(&self, record: PlanRecord) -> Result<(), RecordError> {
        let mut conn = self.pool.acquire().await.map_err(totl_common::Error::from)?;
        db::plans::upsert(
            &mut conn,
            &Plan {
                id: record.plan_id,
                name: record.name,
                sponsor_name: record.sponsor_name,
            },
        )
        .await?;
        Ok(())
    }

    async fn upsert_facility(&self, record: FacilityRecord) -> Result<(), RecordError> {
        let mut conn = self.pool.acquire().await.map_err(totl_common::Error::from)?;
        db::facilities::upsert(
            &mut conn,
            &Facility {
                npi: record.npi,
                facility_name: record.facility_name,
                address: record.address,
                city: record.city,
                state: record.state,
                zip_code: record.zip_code,
                latitude: record.latitude,
                longitude: record.longitude,
                facility_class: record.facility_class,
            },
        )
        .await?;
        Ok(())
    }

    async fn append_price(&self, record: PriceLine) -> Result<(), RecordError> {
        let mut conn = self.pool.acquire().await.map_err(totl_common::Error::from)?;
        db::prices::insert(
            &mut conn,
            &PriceRecord {
                member_ref: record.member_ref,
                plan_id: record.plan_id,
                date_of_service: record.date_of_service,
                cpt_code: record.cpt_code,
                npi: record.npi,
                allowed_amount: record.allowed_amount,
                place_of_service: record.place_of_service,
                facility_name: record.facility_name,
            },
        )
        .await?;
        Ok(())
    }
}

async fn find_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    plan_id: Option<i64>,
) -> Result<Member, RecordError> {
    db::members::find_by_external_id(conn, member_id, plan_id)
        .await?
        .ok_or_else(|| RecordError::MemberNotFound(member_id.to_string()))
}

fn is_placeholder(member: &Member) -> bool {
    member.plan_id.is_none() && member.member_id.starts_with("UNK-")
}

async fn upsert_member_on(
    conn: &mut SqliteConnection,
    record: &EligibilityRecord,
) -> Result<(), RecordError> {
    let plan_id = match record.plan_id {
        Some(id) => {
            if db::plans::find_by_id(conn, id).await?.is_none() {
                return Err(RecordError::PlanNotFound(id));
            }
            Some(id)
        }
        None => db::plans::first_plan_id(conn).await?,
    };

    let existing = db::members::find_by_external_id(conn, &record.member_id, plan_id).await?;
    let phone_owner = db::members::find_by_phone(conn, &record.phone).await?;

    // A number that texted in before its eligibility row arrived
    let (existing, adopted) = match (existing, phone_owner) {
        (Some(mut member), Some(owner)) if owner.id != member.id && is_placeholder(&owner) => {
            // Consent given from the new number stays with it
            db::members::reassign_history(conn, owner.id, member.id).await?;
            db::members::delete(conn, owner.id).await?;
            member.opted_out |= owner.opted_out;
            member.opted_in |= owner.opted_in;
            tracing::info!(
                member_id = %record.member_id,
                placeholder = %owner.member_id,
                "Placeholder merged into member"
            );
            (Some(member), true)
        }
        (Some(member), Some(owner)) if owner.id != member.id => {
            return Err(RecordError::InvalidValue {
                field: "phone_number",
                value: record.phone.to_string(),
                reason: format!("already belongs to member {}", owner.member_id),
            });
        }
        (None, Some(owner)) if is_placeholder(&owner) => {
            db::members::assign_identity(conn, owner.id, &record.member_id, plan_id).await?;
            (Some(owner), true)
        }
        (None, Some(owner)) => {
            return Err(RecordError::InvalidValue {
                field: "phone_number",
                value: record.phone.to_string(),
                reason: format!("already belongs to member {}", owner.member_id),
            });
        }
        (existing, _) => (existing, false),
    };

    let mut ledger_opted_out = db::consent::exists(conn, &record.phone).await?;

    match existing {
        Some(member) => {
            if member.opted_out && !ledger_opted_out {
                db::consent::insert_if_absent(conn, &record.phone, REASON_CARRIED).await?;
                ledger_opted_out = true;
            }

            db::members::update_profile(
                conn,
                member.id,
                &ProfileUpdate {
                    plan_id,
                    first_name: record.first_name.clone(),
                    last_name: record.last_name.clone(),
                    date_of_birth: record.date_of_birth,
                    phone: record.phone.clone(),
                    zip_code: record.zip_code.clone(),
                    risk_tier: record.risk_tier,
                },
            )
            .await?;

            let opted_in = member.opted_in && !ledger_opted_out;
            db::members::set_consent_flags(conn, &record.phone, opted_in, ledger_opted_out).await?;

            tracing::debug!(
                member_id = %record.member_id,
                adopted,
                "Member updated from eligibility"
            );
        }
        None => {
            db::members::insert(
                conn,
                &NewMember {
                    member_id: record.member_id.clone(),
                    plan_id,
                    first_name: record.first_name.clone(),
                    last_name: record.last_name.clone(),
                    date_of_birth: record.date_of_birth,
                    phone: record.phone.clone(),
                    zip_code: record.zip_code.clone(),
                    risk_tier: record.risk_tier.unwrap_or_default(),
                    opted_in: false,
                    opted_out: ledger_opted_out,
                },
            )
            .await?;
        }
    }

    Ok(())
}
