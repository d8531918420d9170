//! Consent-gated outbound sends
//!
//! The only path to a [`MessageTransport`]. A send blocked by consent is
//! dropped without an interaction entry. A delivered message is logged
//! under its own kind and a transport failure as a suppressed entry.

use serde::Serialize;
use std::sync::Arc;
use totl_common::phone::PhoneKey;
use totl_common::Result;
use tracing::{info, warn};

use super::consent::ConsentLedger;
use super::transport::MessageTransport;
use crate::db;
use crate::db::interactions::NewInteraction;
use crate::models::{InteractionKind, Member};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message_id", rename_all = "snake_case")]
pub enum SendOutcome {
    Sent(String),
    /// Opted out; nothing sent or logged
    Blocked,
    /// Transport did not accept the message
    Failed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }
}

#[derive(Clone)]
pub struct OutboundGate {
    ledger: ConsentLedger,
    transport: Arc<dyn MessageTransport>,
}

impl OutboundGate {
    pub fn new(ledger: ConsentLedger, transport: Arc<dyn MessageTransport>) -> Self {
        Self { ledger, transport }
    }

    pub fn ledger(&self) -> &ConsentLedger {
        &self.ledger
    }

    /// Check consent, then hand the message to the transport
    pub async fn send(&self, phone: &PhoneKey, body: &str, media_url: Option<&str>) -> Result<SendOutcome> {
        if !self.ledger.may_contact(phone).await? {
            info!(phone = %phone, "Outbound message blocked by consent");
            return Ok(SendOutcome::Blocked);
        }

        match self.transport.send(phone, body, media_url).await {
            Some(message_id) => Ok(SendOutcome::Sent(message_id)),
            None => {
                warn!(phone = %phone, "Outbound message not delivered");
                Ok(SendOutcome::Failed)
            }
        }
    }

    /// Send to a member and log the attempt unless consent blocked it
    pub async fn send_to_member(
        &self,
        member: &Member,
        kind: InteractionKind,
        body: &str,
        media_url: Option<&str>,
        referral_id: Option<i64>,
    ) -> Result<SendOutcome> {
        let phone = PhoneKey::from_stored(member.phone_number.clone());
        let outcome = self.send(&phone, body, media_url).await?;

        let entry = match &outcome {
            SendOutcome::Blocked => None,
            SendOutcome::Sent(_) => Some((
                kind,
                match media_url {
                    Some(url) => format!("{} [Media: {}]", body, url),
                    None => body.to_string(),
                },
            )),
            SendOutcome::Failed => Some((
                InteractionKind::Suppressed,
                format!("Delivery failed - no SMS sent: {}", body),
            )),
        };

        if let Some((kind, content)) = entry {
            let mut conn = self.ledger.pool().acquire().await?;
            db::interactions::append(
                &mut conn,
                &NewInteraction {
                    member_id: Some(member.id),
                    phone: &phone,
                    kind,
                    content,
                    referral_id,
                },
            )
            .await?;
        }

        Ok(outcome)
    }
}
