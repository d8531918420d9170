//! Domain models for the steerage engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Members and consent
// ============================================================================

/// Care-management risk tier assigned by the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier '{}'", other)),
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound-contact consent state of a phone number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentState {
    Pending,
    OptedIn,
    OptedOut,
}

/// A covered individual
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    /// Internal row id
    pub id: i64,
    /// External member identifier, unique per plan
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Normalized phone number
    pub phone_number: String,
    pub zip_code: Option<String>,
    pub risk_tier: RiskTier,
    pub opted_in: bool,
    pub opted_out: bool,
    pub opted_in_at: Option<DateTime<Utc>>,
    pub total_savings: f64,
}

impl Member {
    /// Consent state derived from the member flags alone
    ///
    /// Outbound sends must go through the consent ledger, which also
    /// consults the opt-out table.
    pub fn consent_state(&self) -> ConsentState {
        if self.opted_out {
            ConsentState::OptedOut
        } else if self.opted_in {
            ConsentState::OptedIn
        } else {
            ConsentState::Pending
        }
    }
}

/// Health plan and its sponsor (usually the employer)
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub sponsor_name: Option<String>,
}

impl Plan {
    /// Name used in member-facing copy
    pub fn display_sponsor(&self) -> &str {
        self.sponsor_name.as_deref().unwrap_or(&self.name)
    }
}

/// Opt-out ledger entry keyed by normalized phone number
#[derive(Debug, Clone, Serialize)]
pub struct OptOutRecord {
    pub phone_number: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Cost sharing
// ============================================================================

/// Point-in-time deductible and out-of-pocket progress
#[derive(Debug, Clone, Serialize)]
pub struct Accumulator {
    pub member_id: i64,
    pub deductible_met: f64,
    pub deductible_limit: f64,
    pub oop_met: f64,
    pub oop_limit: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Accumulator {
    /// Remaining deductible, floored at zero
    pub fn deductible_remaining(&self) -> f64 {
        (self.deductible_limit - self.deductible_met).max(0.0)
    }

    pub fn deductible_met_in_full(&self) -> bool {
        self.deductible_remaining() <= 0.0
    }
}

/// Historical claim line
#[derive(Debug, Clone, Serialize)]
pub struct Claim {
    pub member_id: i64,
    pub date_of_service: NaiveDate,
    pub cpt_code: String,
    pub diagnosis_code: Option<String>,
    pub allowed_amount: f64,
    pub provider_npi: Option<String>,
}

// ============================================================================
// Facilities and prices
// ============================================================================

/// Billing class of a facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityClass {
    Hospital,
    Freestanding,
}

impl FacilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityClass::Hospital => "hospital",
            FacilityClass::Freestanding => "freestanding",
        }
    }

    /// Class implied by a facility name when the feed does not carry one
    pub fn infer_from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().contains("hospital") {
            FacilityClass::Hospital
        } else {
            FacilityClass::Freestanding
        }
    }
}

impl FromStr for FacilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hospital" | "hospital_outpatient" => Ok(FacilityClass::Hospital),
            "freestanding" | "independent" | "lab" | "imaging_center" => {
                Ok(FacilityClass::Freestanding)
            }
            other => Err(format!("unknown facility type '{}'", other)),
        }
    }
}

/// Billing entity
#[derive(Debug, Clone, Serialize)]
pub struct Facility {
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

impl Facility {
    /// One-line postal address, skipping missing parts
    pub fn display_address(&self) -> String {
        [&self.address, &self.city, &self.state]
            .iter()
            .filter_map(|part| part.as_deref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Observed allowed amount for a (plan, procedure, facility) tuple
#[derive(Debug, Clone, Serialize)]
pub struct PriceRecord {
    pub member_ref: String,
    pub plan_id: i64,
    pub date_of_service: NaiveDate,
    pub cpt_code: String,
    pub npi: String,
    pub allowed_amount: f64,
    pub place_of_service: Option<String>,
    pub facility_name: Option<String>,
}

// ============================================================================
// Referrals and audit log
// ============================================================================

/// Referral lifecycle: received → engaged | suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Received,
    Engaged,
    Suppressed,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Received => "received",
            ReferralStatus::Engaged => "engaged",
            ReferralStatus::Suppressed => "suppressed",
        }
    }
}

impl FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(ReferralStatus::Received),
            "engaged" => Ok(ReferralStatus::Engaged),
            "suppressed" => Ok(ReferralStatus::Suppressed),
            other => Err(format!("unknown referral status '{}'", other)),
        }
    }
}

/// One member referred for one procedure
#[derive(Debug, Clone, Serialize)]
pub struct ReferralEvent {
    pub id: i64,
    pub external_id: Option<String>,
    pub member_id: i64,
    pub cpt_code: String,
    pub service_name: Option<String>,
    pub ordering_provider_npi: Option<String>,
    pub baseline_npi: Option<String>,
    pub baseline_allowed: Option<f64>,
    pub redirected_npi: Option<String>,
    pub redirected_name: Option<String>,
    pub redirected_allowed: Option<f64>,
    pub net_savings: Option<f64>,
    pub status: ReferralStatus,
    pub decision_reason: Option<String>,
    /// When the member was shown the redirect
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Audit log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    InboundText,
    InboundMedia,
    OutboundCampaign,
    OutboundReferralTrigger,
    OutboundSupportReply,
    Suppressed,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::InboundText => "inbound_text",
            InteractionKind::InboundMedia => "inbound_media",
            InteractionKind::OutboundCampaign => "outbound_campaign",
            InteractionKind::OutboundReferralTrigger => "outbound_referral_trigger",
            InteractionKind::OutboundSupportReply => "outbound_support_reply",
            InteractionKind::Suppressed => "suppressed",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound_text" => Ok(InteractionKind::InboundText),
            "inbound_media" => Ok(InteractionKind::InboundMedia),
            "outbound_campaign" => Ok(InteractionKind::OutboundCampaign),
            "outbound_referral_trigger" => Ok(InteractionKind::OutboundReferralTrigger),
            "outbound_support_reply" => Ok(InteractionKind::OutboundSupportReply),
            "suppressed" => Ok(InteractionKind::Suppressed),
            other => Err(format!("unknown interaction kind '{}'", other)),
        }
    }
}

/// Write-once audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct MemberInteraction {
    pub id: i64,
    pub member_id: Option<i64>,
    pub phone_number: String,
    pub kind: InteractionKind,
    pub content: String,
    pub referral_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Support queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportStatus {
    Pending,
    Replied,
    Resolved,
}

impl SupportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportStatus::Pending => "pending",
            SupportStatus::Replied => "replied",
            SupportStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for SupportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SupportStatus::Pending),
            "replied" => Ok(SupportStatus::Replied),
            "resolved" => Ok(SupportStatus::Resolved),
            other => Err(format!("unknown support status '{}'", other)),
        }
    }
}

/// Item in the human-support queue
#[derive(Debug, Clone, Serialize)]
pub struct SupportMessage {
    pub id: i64,
    pub member_id: i64,
    pub message_content: String,
    pub media_url: Option<String>,
    pub status: SupportStatus,
    pub admin_reply: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
