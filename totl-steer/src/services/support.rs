//! Human-support queue operations

use sqlx::SqlitePool;
use totl_common::{Error, Result};
use tracing::info;

use super::outbound::{OutboundGate, SendOutcome};
use crate::db;
use crate::models::{InteractionKind, SupportMessage};

#[derive(Clone)]
pub struct SupportDesk {
    pool: SqlitePool,
    outbound: OutboundGate,
}

impl SupportDesk {
    pub fn new(pool: SqlitePool, outbound: OutboundGate) -> Self {
        Self { pool, outbound }
    }

    pub async fn list_pending(&self) -> Result<Vec<SupportMessage>> {
        let mut conn = self.pool.acquire().await?;
        db::support::list_pending(&mut conn).await
    }

    /// Text a reply to the member behind a queue item
    ///
    /// The item moves to `replied` only when the message was delivered.
    pub async fn reply(&self, id: i64, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Reply text is empty".to_string()));
        }

        let member = {
            let mut conn = self.pool.acquire().await?;
            let item = db::support::find_by_id(&mut conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Support message {}", id)))?;
            db::members::find_by_id(&mut conn, item.member_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Member {}", item.member_id)))?
        };

        let outcome = self
            .outbound
            .send_to_member(&member, InteractionKind::OutboundSupportReply, text, None, None)
            .await?;

        if outcome.is_sent() {
            let mut conn = self.pool.acquire().await?;
            db::support::mark_replied(&mut conn, id, text).await?;
            info!(support_id = id, member_id = %member.member_id, "Support reply sent");
        }

        Ok(outcome)
    }

    pub async fn resolve(&self, id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !db::support::mark_resolved(&mut conn, id).await? {
            return Err(Error::NotFound(format!("Support message {}", id)));
        }
        info!(support_id = id, "Support message resolved");
        Ok(())
    }
}
