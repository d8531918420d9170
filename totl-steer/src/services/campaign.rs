//! Onboarding campaign

use serde::Serialize;
use sqlx::SqlitePool;
use totl_common::{Error, Result};
use tracing::info;

use super::messages::MessageCopy;
use super::outbound::{OutboundGate, SendOutcome};
use crate::db;
use crate::models::InteractionKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignReport {
    pub sent: usize,
    pub blocked: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OnboardingCampaign {
    pool: SqlitePool,
    outbound: OutboundGate,
    copy: MessageCopy,
}

impl OnboardingCampaign {
    pub fn new(pool: SqlitePool, outbound: OutboundGate, copy: MessageCopy) -> Self {
        Self {
            pool,
            outbound,
            copy,
        }
    }

    /// Invite every pending member of a plan
    pub async fn send_onboarding(&self, plan_id: i64) -> Result<CampaignReport> {
        let members = {
            let mut conn = self.pool.acquire().await?;
            if db::plans::find_by_id(&mut conn, plan_id).await?.is_none() {
                return Err(Error::NotFound(format!("Plan {}", plan_id)));
            }
            db::members::list_pending_for_plan(&mut conn, plan_id).await?
        };

        let body = self.copy.onboarding();
        let mut report = CampaignReport::default();

        for member in &members {
            match self
                .outbound
                .send_to_member(member, InteractionKind::OutboundCampaign, &body, None, None)
                .await?
            {
                SendOutcome::Sent(_) => report.sent += 1,
                SendOutcome::Blocked => report.blocked += 1,
                SendOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            plan_id,
            sent = report.sent,
            blocked = report.blocked,
            failed = report.failed,
            "Onboarding campaign complete"
        );
        Ok(report)
    }
}
