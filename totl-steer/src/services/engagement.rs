//! Engagement decisions
//!
//! Pure functions: given the member, the price match and the viability
//! result, decide whether to reach out and which message to compose. The
//! consent check happens later, at the send boundary.

use serde::Serialize;

use super::messages::MessageCopy;
use super::pricing::PriceMatch;
use super::viability::Viability;
use crate::models::{ConsentState, Member, Plan, RiskTier};

/// Sponsor name used when the member has no plan on file
const FALLBACK_SPONSOR: &str = "your health plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageVariant {
    /// Member has not opted in: ask permission, naming the plan sponsor
    OptInInvitation,
    /// Member opted in: name the matched facility
    Steerage,
    /// Member opted in but no facility matched; nothing to send
    NoCandidates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementDecision {
    pub engage: bool,
    pub variant: Option<MessageVariant>,
    pub reason: String,
}

/// Risk-tier rule, independent of viability
///
/// A member with no accumulator on file is treated as not having met the
/// deductible.
pub fn risk_recommends(tier: RiskTier, deductible_met: bool, price_spread: f64) -> Option<String> {
    match tier {
        RiskTier::High => Some("High risk member, always engage".to_string()),
        RiskTier::Medium => Some(if deductible_met {
            "Medium risk member, engage for care management".to_string()
        } else {
            "Medium risk member with deductible remaining".to_string()
        }),
        RiskTier::Low if !deductible_met && price_spread > 0.0 => Some(format!(
            "Deductible remaining and prices vary by ${:.2}",
            price_spread
        )),
        RiskTier::Low => None,
    }
}

/// Decide whether to engage and with which message variant
pub fn decide(
    member: &Member,
    deductible_met: bool,
    price_match: &PriceMatch,
    viability: &Viability,
) -> EngagementDecision {
    let reason = if viability.viable {
        Some(format!("Zero-cost option: {}", viability.reasoning))
    } else {
        risk_recommends(member.risk_tier, deductible_met, price_match.price_spread)
    };

    let Some(reason) = reason else {
        return EngagementDecision {
            engage: false,
            variant: None,
            reason: format!("Not engaged: {}", viability.reasoning),
        };
    };

    let variant = match member.consent_state() {
        ConsentState::OptedIn if price_match.is_empty() => MessageVariant::NoCandidates,
        ConsentState::OptedIn => MessageVariant::Steerage,
        ConsentState::Pending | ConsentState::OptedOut => MessageVariant::OptInInvitation,
    };

    EngagementDecision {
        engage: true,
        variant: Some(variant),
        reason,
    }
}

/// Text for an engaged decision; `None` when there is nothing to send
pub fn compose_message(
    copy: &MessageCopy,
    variant: MessageVariant,
    member: &Member,
    plan: Option<&Plan>,
    service_name: &str,
    price_match: &PriceMatch,
    viability: &Viability,
) -> Option<String> {
    match variant {
        MessageVariant::OptInInvitation => {
            let sponsor = plan.map(Plan::display_sponsor).unwrap_or(FALLBACK_SPONSOR);
            Some(copy.opt_in_invitation(&member.first_name, sponsor))
        }
        MessageVariant::Steerage => price_match.best().map(|best| {
            copy.steerage(&member.first_name, service_name, &best.name, viability.viable)
        }),
        MessageVariant::NoCandidates => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FacilityClass;
    use crate::services::pricing::Candidate;

    fn member(tier: RiskTier, opted_in: bool) -> Member {
        Member {
            id: 1,
            member_id: "M100".to_string(),
            plan_id: Some(1),
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            date_of_birth: None,
            phone_number: "+15550001111".to_string(),
            zip_code: Some("60601".to_string()),
            risk_tier: tier,
            opted_in,
            opted_out: false,
            opted_in_at: None,
            total_savings: 0.0,
        }
    }

    fn viability(viable: bool) -> Viability {
        Viability {
            viable,
            estimated_oop: 0.0,
            reasoning: "test".to_string(),
        }
    }

    fn matched(spread: f64) -> PriceMatch {
        PriceMatch {
            candidates: vec![Candidate {
                npi: "1".to_string(),
                name: "QuickScan Imaging".to_string(),
                address: None,
                zip_code: None,
                facility_class: FacilityClass::Freestanding,
                price: 450.0,
                distance_miles: Some(3.0),
                savings_vs_max: 0.0,
            }],
            price_spread: spread,
        }
    }

    #[test]
    fn test_viable_always_engages() {
        let d = decide(&member(RiskTier::Low, false), true, &matched(0.0), &viability(true));
        assert!(d.engage);
        assert_eq!(d.variant, Some(MessageVariant::OptInInvitation));
    }

    #[test]
    fn test_low_risk_rules() {
        let low = member(RiskTier::Low, true);
        assert!(!decide(&low, true, &matched(100.0), &viability(false)).engage);
        assert!(!decide(&low, false, &matched(0.0), &viability(false)).engage);

        let d = decide(&low, false, &matched(100.0), &viability(false));
        assert!(d.engage);
        assert_eq!(d.variant, Some(MessageVariant::Steerage));
    }

    #[test]
    fn test_high_risk_without_candidates() {
        let high = member(RiskTier::High, true);
        let d = decide(&high, true, &PriceMatch::default(), &viability(false));
        assert!(d.engage);
        assert_eq!(d.variant, Some(MessageVariant::NoCandidates));

        let copy = MessageCopy::default();
        let text = compose_message(
            &copy,
            MessageVariant::NoCandidates,
            &high,
            None,
            "MRI of the Knee",
            &PriceMatch::default(),
            &viability(false),
        );
        assert!(text.is_none());
    }

    #[test]
    fn test_medium_risk_engages() {
        let medium = member(RiskTier::Medium, false);
        assert!(decide(&medium, false, &PriceMatch::default(), &viability(false)).engage);
    }

    #[test]
    fn test_invitation_falls_back_without_plan() {
        let copy = MessageCopy::default();
        let text = compose_message(
            &copy,
            MessageVariant::OptInInvitation,
            &member(RiskTier::High, false),
            None,
            "MRI of the Knee",
            &matched(0.0),
            &viability(false),
        )
        .unwrap();
        assert!(text.contains("your health plan works with Totl"));
    }
}
