//! Referral event persistence

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use super::{opt_timestamp, parse_column};
use crate::models::{ReferralEvent, ReferralStatus};

const REFERRAL_COLUMNS: &str = r#"
    id, external_id, member_id, cpt_code, service_name, ordering_provider_npi,
    baseline_npi, baseline_allowed, redirected_npi, redirected_name,
    redirected_allowed, net_savings, status, decision_reason, notified_at, created_at
"#;

/// Fields known when a referral is first received
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub external_id: Option<String>,
    pub member_id: i64,
    pub cpt_code: String,
    pub service_name: String,
    pub ordering_provider_npi: Option<String>,
    pub baseline_npi: Option<String>,
    pub baseline_allowed: f64,
}

/// Outcome written when a referral leaves `received`
#[derive(Debug, Clone)]
pub struct ReferralDecision {
    pub status: ReferralStatus,
    pub redirected_npi: Option<String>,
    pub redirected_name: Option<String>,
    pub redirected_allowed: Option<f64>,
    pub net_savings: Option<f64>,
    pub reason: String,
}

fn row_to_referral(row: &SqliteRow) -> Result<ReferralEvent> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(ReferralEvent {
        id: row.get("id"),
        external_id: row.get("external_id"),
        member_id: row.get("member_id"),
        cpt_code: row.get("cpt_code"),
        service_name: row.get("service_name"),
        ordering_provider_npi: row.get("ordering_provider_npi"),
        baseline_npi: row.get("baseline_npi"),
        baseline_allowed: row.get("baseline_allowed"),
        redirected_npi: row.get("redirected_npi"),
        redirected_name: row.get("redirected_name"),
        redirected_allowed: row.get("redirected_allowed"),
        net_savings: row.get("net_savings"),
        status: parse_column("status", &status)?,
        decision_reason: row.get("decision_reason"),
        notified_at: opt_timestamp(row.get("notified_at"))?,
        created_at: totl_common::time::parse_timestamp(&created_at)?,
    })
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<ReferralEvent>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM referral_events WHERE id = ?",
        REFERRAL_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_referral).transpose()
}

/// Look up a referral by the feed's idempotency key
pub async fn find_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<ReferralEvent>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM referral_events WHERE external_id = ?",
        REFERRAL_COLUMNS
    ))
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_referral).transpose()
}

/// Insert a referral in `received` status
pub async fn insert_received(conn: &mut SqliteConnection, referral: &NewReferral) -> Result<i64> {
    let now = totl_common::time::now_string();

    let result = sqlx::query(
        r#"
        INSERT INTO referral_events (
            external_id, member_id, cpt_code, service_name, ordering_provider_npi,
            baseline_npi, baseline_allowed, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 'received', ?, ?)
        "#,
    )
    .bind(&referral.external_id)
    .bind(referral.member_id)
    .bind(&referral.cpt_code)
    .bind(&referral.service_name)
    .bind(&referral.ordering_provider_npi)
    .bind(&referral.baseline_npi)
    .bind(referral.baseline_allowed)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Move a received referral to its terminal status
///
/// Only rows still in `received` are touched; returns false when the
/// referral had already been decided.
pub async fn record_decision(
    conn: &mut SqliteConnection,
    id: i64,
    decision: &ReferralDecision,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE referral_events SET
            status = ?,
            redirected_npi = ?,
            redirected_name = ?,
            redirected_allowed = ?,
            net_savings = ?,
            decision_reason = ?,
            updated_at = ?
        WHERE id = ? AND status = 'received'
        "#,
    )
    .bind(decision.status.as_str())
    .bind(&decision.redirected_npi)
    .bind(&decision.redirected_name)
    .bind(decision.redirected_allowed)
    .bind(decision.net_savings)
    .bind(&decision.reason)
    .bind(totl_common::time::now_string())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record that the member has seen the redirect for this referral
///
/// Returns false when it was already marked.
pub async fn mark_notified(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let now = totl_common::time::now_string();
    let result = sqlx::query(
        "UPDATE referral_events SET notified_at = ?, updated_at = ? WHERE id = ? AND notified_at IS NULL",
    )
    .bind(&now)
    .bind(&now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Most recent engaged referral with a matched facility that the member
/// has not yet been shown, created at or after `since`
pub async fn latest_pending_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
    since: &DateTime<Utc>,
) -> Result<Option<ReferralEvent>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {} FROM referral_events
        WHERE member_id = ?
          AND status = 'engaged'
          AND redirected_name IS NOT NULL
          AND notified_at IS NULL
          AND created_at >= ?
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
        REFERRAL_COLUMNS
    ))
    .bind(member_id)
    .bind(totl_common::time::format_timestamp(since))
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_referral).transpose()
}

pub async fn list_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> Result<Vec<ReferralEvent>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM referral_events WHERE member_id = ? ORDER BY id",
        REFERRAL_COLUMNS
    ))
    .bind(member_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_referral).collect()
}
