//! Referral decision pipeline
//!
//! Stages run in order and pass plain data:
//! 1. gather: member, plan, baseline price, candidates, accumulator
//! 2. evaluate: viability, then the engagement decision (pure)
//! 3. record: referral row and its terminal status, in one transaction
//! 4. notify: consent-gated send, logged unless consent blocked it; a
//!    delivered redirect marks the referral notified

use serde::Serialize;
use sqlx::SqlitePool;
use totl_common::config::PolicyConfig;
use totl_common::phone::PhoneKey;
use totl_common::{Error, Result};
use tracing::{debug, info};

use super::engagement::{self, EngagementDecision, MessageVariant};
use super::messages::MessageCopy;
use super::outbound::{OutboundGate, SendOutcome};
use super::pricing::{PriceMatch, PricingMatcher};
use super::procedures;
use super::viability::{self, Viability};
use crate::db;
use crate::db::interactions::NewInteraction;
use crate::db::referrals::{NewReferral, ReferralDecision};
use crate::models::{Accumulator, InteractionKind, Member, Plan, ReferralStatus};

/// A referral as delivered by the feed
#[derive(Debug, Clone)]
pub struct ReferralRequest {
    /// Feed idempotency key
    pub external_id: Option<String>,
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub cpt_code: String,
    /// Facility the member was referred to (the baseline)
    pub provider_npi: Option<String>,
    pub ordering_provider_npi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReferralOutcome {
    /// Already processed under the same external id
    Duplicate { referral_id: i64 },
    Suppressed { referral_id: i64, reason: String },
    Engaged {
        referral_id: i64,
        variant: MessageVariant,
        send: Option<SendOutcome>,
    },
}

/// Everything the pure stages need, loaded up front
struct Gathered {
    member: Member,
    plan: Option<Plan>,
    baseline_allowed: f64,
    price_match: PriceMatch,
    accumulator: Option<Accumulator>,
}

#[derive(Clone)]
pub struct SteerageEngine {
    pool: SqlitePool,
    matcher: PricingMatcher,
    policy: PolicyConfig,
    outbound: OutboundGate,
    copy: MessageCopy,
}

impl SteerageEngine {
    pub fn new(
        pool: SqlitePool,
        matcher: PricingMatcher,
        policy: PolicyConfig,
        outbound: OutboundGate,
        copy: MessageCopy,
    ) -> Self {
        Self {
            pool,
            matcher,
            policy,
            outbound,
            copy,
        }
    }

    /// Run one referral through the full pipeline
    pub async fn process(&self, request: &ReferralRequest) -> Result<ReferralOutcome> {
        if let Some(existing) = self.already_processed(request).await? {
            debug!(referral_id = existing, "Duplicate referral delivery ignored");
            return Ok(ReferralOutcome::Duplicate {
                referral_id: existing,
            });
        }

        let gathered = self.gather(request).await?;
        let service_name = procedures::describe(&request.cpt_code);

        let viability = viability::is_zero_cost_viable(
            gathered.accumulator.as_ref(),
            &request.cpt_code,
            &gathered.price_match.candidates,
            &self.policy,
        );
        let deductible_met = gathered
            .accumulator
            .as_ref()
            .is_some_and(Accumulator::deductible_met_in_full);
        let decision = engagement::decide(
            &gathered.member,
            deductible_met,
            &gathered.price_match,
            &viability,
        );

        let referral_id = match self
            .record(request, &gathered, &service_name, &viability, &decision)
            .await
        {
            Ok(id) => id,
            Err(Error::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                // A concurrent delivery of the same external id won the insert
                let existing = self.already_processed(request).await?.unwrap_or_default();
                return Ok(ReferralOutcome::Duplicate {
                    referral_id: existing,
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            referral_id,
            member_id = %gathered.member.member_id,
            cpt_code = %request.cpt_code,
            engage = decision.engage,
            reason = %decision.reason,
            "Referral decided"
        );

        let Some(variant) = decision.variant.filter(|_| decision.engage) else {
            return Ok(ReferralOutcome::Suppressed {
                referral_id,
                reason: decision.reason,
            });
        };

        let message = engagement::compose_message(
            &self.copy,
            variant,
            &gathered.member,
            gathered.plan.as_ref(),
            &service_name,
            &gathered.price_match,
            &viability,
        );

        let send = match message {
            Some(body) => Some(self.notify(&gathered, referral_id, variant, &body).await?),
            None => None,
        };

        Ok(ReferralOutcome::Engaged {
            referral_id,
            variant,
            send,
        })
    }

    async fn already_processed(&self, request: &ReferralRequest) -> Result<Option<i64>> {
        let Some(external_id) = request.external_id.as_deref() else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        Ok(db::referrals::find_by_external_id(&mut conn, external_id)
            .await?
            .map(|r| r.id))
    }

    async fn gather(&self, request: &ReferralRequest) -> Result<Gathered> {
        let mut conn = self.pool.acquire().await?;

        let member = db::members::find_by_external_id(&mut conn, &request.member_id, request.plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Member {}", request.member_id)))?;

        let plan_id = request.plan_id.or(member.plan_id);
        let plan = match plan_id {
            Some(id) => db::plans::find_by_id(&mut conn, id).await?,
            None => None,
        };

        let (baseline_allowed, price_match) = match plan_id {
            Some(plan_id) => {
                let baseline = match request.provider_npi.as_deref() {
                    Some(npi) => {
                        db::prices::latest_price_at(&mut conn, plan_id, &request.cpt_code, npi)
                            .await?
                            .unwrap_or(0.0)
                    }
                    None => 0.0,
                };
                let price_match = self
                    .matcher
                    .find_candidates(
                        &mut conn,
                        plan_id,
                        &request.cpt_code,
                        member.zip_code.as_deref(),
                    )
                    .await?;
                (baseline, price_match)
            }
            None => (0.0, PriceMatch::default()),
        };

        let accumulator = db::accumulators::latest_for_member(&mut conn, member.id).await?;

        Ok(Gathered {
            member,
            plan,
            baseline_allowed,
            price_match,
            accumulator,
        })
    }

    /// Persist the referral and its decision atomically
    async fn record(
        &self,
        request: &ReferralRequest,
        gathered: &Gathered,
        service_name: &str,
        viability: &Viability,
        decision: &EngagementDecision,
    ) -> Result<i64> {
        let best = gathered
            .price_match
            .best()
            .filter(|_| decision.engage);
        let net_savings = best
            .filter(|_| gathered.baseline_allowed > 0.0)
            .map(|b| gathered.baseline_allowed - b.price);

        let mut tx = self.pool.begin().await?;

        let referral_id = db::referrals::insert_received(
            &mut tx,
            &NewReferral {
                external_id: request.external_id.clone(),
                member_id: gathered.member.id,
                cpt_code: request.cpt_code.clone(),
                service_name: service_name.to_string(),
                ordering_provider_npi: request.ordering_provider_npi.clone(),
                baseline_npi: request.provider_npi.clone(),
                baseline_allowed: gathered.baseline_allowed,
            },
        )
        .await?;

        let status = if decision.engage {
            ReferralStatus::Engaged
        } else {
            ReferralStatus::Suppressed
        };

        db::referrals::record_decision(
            &mut tx,
            referral_id,
            &ReferralDecision {
                status,
                redirected_npi: best.map(|b| b.npi.clone()),
                redirected_name: best.map(|b| b.name.clone()),
                redirected_allowed: best.map(|b| b.price),
                net_savings,
                reason: format!("{} ({})", decision.reason, viability.reasoning),
            },
        )
        .await?;

        // Decisions with nothing to send are logged here; deliveries are
        // logged by the outbound gate
        let suppressed_note = match decision.variant {
            _ if !decision.engage => Some(format!(
                "Referral {} suppressed ({}) - no SMS sent",
                request.cpt_code, decision.reason
            )),
            Some(MessageVariant::NoCandidates) => Some(format!(
                "Referral {} engaged but no facility matched - no SMS sent",
                request.cpt_code
            )),
            _ => None,
        };

        if let Some(content) = suppressed_note {
            let phone = PhoneKey::from_stored(gathered.member.phone_number.clone());
            db::interactions::append(
                &mut tx,
                &NewInteraction {
                    member_id: Some(gathered.member.id),
                    phone: &phone,
                    kind: InteractionKind::Suppressed,
                    content,
                    referral_id: Some(referral_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(referral_id)
    }

    async fn notify(
        &self,
        gathered: &Gathered,
        referral_id: i64,
        variant: MessageVariant,
        body: &str,
    ) -> Result<SendOutcome> {
        let outcome = self
            .outbound
            .send_to_member(
                &gathered.member,
                InteractionKind::OutboundReferralTrigger,
                body,
                None,
                Some(referral_id),
            )
            .await?;

        if outcome.is_sent() && variant == MessageVariant::Steerage {
            let mut conn = self.pool.acquire().await?;
            db::referrals::mark_notified(&mut conn, referral_id).await?;
            if let Some(best) = gathered.price_match.best() {
                let savings = gathered.baseline_allowed - best.price;
                if gathered.baseline_allowed > 0.0 && savings > 0.0 {
                    db::members::add_savings(&mut conn, gathered.member.id, savings).await?;
                }
            }
        }

        Ok(outcome)
    }
}
