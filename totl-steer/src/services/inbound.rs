//! Inbound message router
//!
//! Interprets carrier-delivered texts against the consent ledger and the
//! member record. Each message is handled under the sender's keyed lock in a
//! single transaction and yields exactly one interaction entry and one
//! reply (possibly empty).

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use totl_common::config::PolicyConfig;
use totl_common::phone::PhoneKey;
use totl_common::{Error, Result};
use tracing::info;

use super::consent::{self, ConsentKeyword, ConsentLedger};
use super::messages::MessageCopy;
use super::procedures;
use crate::db;
use crate::db::interactions::NewInteraction;
use crate::db::members::NewMember;
use crate::models::{InteractionKind, Member, Plan, RiskTier};
use crate::utils::db_retry::retry_on_lock;

const HELP_REQUEST: &str = "Member requested help via HELP keyword";

/// Inbound text as delivered by the carrier webhook
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub sender_phone: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_count: u32,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl InboundMessage {
    pub fn text(sender_phone: &str, body: &str) -> Self {
        Self {
            sender_phone: sender_phone.to_string(),
            body: body.to_string(),
            media_count: 0,
            media_url: None,
        }
    }

    fn has_media(&self) -> bool {
        self.media_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundReply {
    pub reply_text: String,
}

/// Keyword class of a message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Stop,
    Start,
    Help,
    Other,
}

/// Classify a body by exact keyword match, ignoring case and surrounding space
pub fn classify(body: &str) -> Keyword {
    match body.trim().to_ascii_uppercase().as_str() {
        "STOP" | "STOPALL" | "UNSUBSCRIBE" | "CANCEL" | "END" | "QUIT" => Keyword::Stop,
        "YES" | "START" | "UNSTOP" => Keyword::Start,
        "HELP" => Keyword::Help,
        _ => Keyword::Other,
    }
}

#[derive(Clone)]
pub struct InboundRouter {
    ledger: ConsentLedger,
    copy: MessageCopy,
    country_code: String,
    pending_referral_days: u32,
}

impl InboundRouter {
    pub fn new(ledger: ConsentLedger, copy: MessageCopy, policy: &PolicyConfig) -> Self {
        Self {
            ledger,
            copy,
            country_code: policy.default_country_code.clone(),
            pending_referral_days: policy.pending_referral_days,
        }
    }

    /// Handle one inbound message and produce the reply
    pub async fn handle(&self, message: &InboundMessage) -> Result<InboundReply> {
        let phone = PhoneKey::parse_with_country(&message.sender_phone, &self.country_code);
        if !phone.has_digits() {
            return Err(Error::InvalidInput(format!(
                "Sender phone '{}' has no digits",
                message.sender_phone
            )));
        }

        let keyword = classify(&message.body);
        info!(phone = %phone, ?keyword, media = message.media_count, "Inbound message");

        let _guard = self.ledger.lock(&phone).await;
        let phone = &phone;

        let reply_text = retry_on_lock("route inbound", self.ledger.max_lock_wait_ms(), move || {
            self.route_once(phone, message, keyword)
        })
        .await?;

        Ok(InboundReply { reply_text })
    }

    async fn route_once(&self, phone: &PhoneKey, message: &InboundMessage, keyword: Keyword) -> Result<String> {
        let mut tx = self.ledger.pool().begin().await?;

        let reply = match db::members::find_by_phone(&mut tx, phone).await? {
            None => self.route_unknown(&mut tx, phone, message, keyword).await?,
            Some(member) => self.route_known(&mut tx, phone, &member, message, keyword).await?,
        };

        tx.commit().await?;
        Ok(reply)
    }

    async fn route_unknown(
        &self,
        conn: &mut SqliteConnection,
        phone: &PhoneKey,
        message: &InboundMessage,
        keyword: Keyword,
    ) -> Result<String> {
        match keyword {
            Keyword::Stop => {
                consent::apply_keyword_on(conn, phone, ConsentKeyword::Stop).await?;
                log_inbound(conn, None, phone, message).await?;
                info!(phone = %phone, "Unknown number opted out");
                Ok(self.copy.opt_out_confirmation())
            }
            Keyword::Start => {
                consent::apply_keyword_on(conn, phone, ConsentKeyword::Start).await?;
                let id = insert_placeholder(conn, phone, true, false).await?;
                log_inbound(conn, Some(id), phone, message).await?;
                info!(phone = %phone, "Unknown number enrolled");
                Ok(self.copy.enrolled())
            }
            Keyword::Help | Keyword::Other => {
                let opted_out = db::consent::exists(conn, phone).await?;
                let id = insert_placeholder(conn, phone, false, opted_out).await?;
                log_inbound(conn, Some(id), phone, message).await?;
                Ok(self.copy.unknown_sender_prompt())
            }
        }
    }

    async fn route_known(
        &self,
        conn: &mut SqliteConnection,
        phone: &PhoneKey,
        member: &Member,
        message: &InboundMessage,
        keyword: Keyword,
    ) -> Result<String> {
        let opted_out = member.opted_out || db::consent::exists(conn, phone).await?;

        if opted_out {
            return match keyword {
                Keyword::Start => {
                    consent::apply_keyword_on(conn, phone, ConsentKeyword::Start).await?;
                    log_inbound(conn, Some(member.id), phone, message).await?;
                    info!(phone = %phone, member_id = %member.member_id, "Member re-enrolled");
                    Ok(self
                        .with_pending_steerage(conn, member, self.copy.welcome_back())
                        .await?)
                }
                Keyword::Stop => {
                    // Repairs a half-recorded opt-out; the reply stays empty
                    consent::apply_keyword_on(conn, phone, ConsentKeyword::Stop).await?;
                    log_inbound(conn, Some(member.id), phone, message).await?;
                    Ok(String::new())
                }
                Keyword::Help | Keyword::Other => {
                    log_inbound(conn, Some(member.id), phone, message).await?;
                    Ok(self.copy.opted_out_prompt())
                }
            };
        }

        match keyword {
            Keyword::Help => {
                db::support::enqueue(conn, member.id, HELP_REQUEST, None).await?;
                log_inbound(conn, Some(member.id), phone, message).await?;
                Ok(self.copy.support_ack())
            }
            Keyword::Stop => {
                consent::apply_keyword_on(conn, phone, ConsentKeyword::Stop).await?;
                log_inbound(conn, Some(member.id), phone, message).await?;
                info!(phone = %phone, member_id = %member.member_id, "Member opted out");
                Ok(self.copy.opt_out_confirmation())
            }
            Keyword::Start => {
                consent::apply_keyword_on(conn, phone, ConsentKeyword::Start).await?;
                log_inbound(conn, Some(member.id), phone, message).await?;
                info!(phone = %phone, member_id = %member.member_id, "Member enrolled");
                self.with_pending_steerage(conn, member, self.copy.enrolled())
                    .await
            }
            Keyword::Other if message.has_media() => {
                let body = message.body.trim();
                let content = if body.is_empty() {
                    "Member sent referral photo".to_string()
                } else {
                    format!("Member sent referral photo: {}", body)
                };
                db::support::enqueue(conn, member.id, &content, message.media_url.as_deref()).await?;
                log_inbound(conn, Some(member.id), phone, message).await?;

                if member.opted_in {
                    Ok(self.copy.media_received_enrolled(&member.first_name))
                } else {
                    let plan = match member.plan_id {
                        Some(id) => db::plans::find_by_id(conn, id).await?,
                        None => None,
                    };
                    let sponsor = plan
                        .as_ref()
                        .map(Plan::display_sponsor)
                        .unwrap_or("your health plan");
                    Ok(self.copy.media_received_invite(&member.first_name, sponsor))
                }
            }
            Keyword::Other => {
                db::support::enqueue(conn, member.id, message.body.trim(), None).await?;
                log_inbound(conn, Some(member.id), phone, message).await?;
                Ok(self.copy.support_ack())
            }
        }
    }

    /// Append the steerage text for a recent referral the member has not
    /// yet been shown, and mark it shown
    async fn with_pending_steerage(
        &self,
        conn: &mut SqliteConnection,
        member: &Member,
        reply: String,
    ) -> Result<String> {
        let since = totl_common::time::now() - Duration::days(i64::from(self.pending_referral_days));
        let Some(referral) = db::referrals::latest_pending_for_member(conn, member.id, &since).await? else {
            return Ok(reply);
        };
        let Some(facility) = referral.redirected_name.as_deref() else {
            return Ok(reply);
        };

        let service = referral
            .service_name
            .clone()
            .unwrap_or_else(|| procedures::describe(&referral.cpt_code));
        let steerage = self
            .copy
            .steerage(&member.first_name, &service, facility, false);
        db::referrals::mark_notified(conn, referral.id).await?;

        Ok(format!("{} {}", reply, steerage))
    }
}

async fn insert_placeholder(
    conn: &mut SqliteConnection,
    phone: &PhoneKey,
    opted_in: bool,
    opted_out: bool,
) -> Result<i64> {
    let digits: String = phone.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
    db::members::insert(
        conn,
        &NewMember {
            member_id: format!("UNK-{}", digits),
            plan_id: None,
            first_name: "Unknown".to_string(),
            last_name: "User".to_string(),
            date_of_birth: None,
            phone: phone.clone(),
            zip_code: None,
            risk_tier: RiskTier::Low,
            opted_in,
            opted_out,
        },
    )
    .await
}

async fn log_inbound(
    conn: &mut SqliteConnection,
    member_id: Option<i64>,
    phone: &PhoneKey,
    message: &InboundMessage,
) -> Result<()> {
    let body = message.body.trim();
    let (kind, content) = if message.has_media() {
        let url = message.media_url.as_deref().unwrap_or("(no url)");
        let content = if body.is_empty() {
            format!("Photo: {}", url)
        } else {
            format!("Photo: {} ({})", url, body)
        };
        (InteractionKind::InboundMedia, content)
    } else {
        (InteractionKind::InboundText, body.to_string())
    };

    db::interactions::append(
        conn,
        &NewInteraction {
            member_id,
            phone,
            kind,
            content,
            referral_id: None,
        },
    )
    .await?;
    Ok(())
}
