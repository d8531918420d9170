//! Member persistence

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use totl_common::phone::PhoneKey;
use totl_common::Result;

use super::{opt_date, opt_timestamp, parse_column};
use crate::models::{Member, RiskTier};

const MEMBER_COLUMNS: &str = r#"
    id, member_id, plan_id, first_name, last_name, date_of_birth, phone_number,
    zip_code, risk_tier, opted_in, opted_out, opted_in_at, total_savings
"#;

/// Fields for a member row that does not exist yet
#[derive(Debug, Clone)]
pub struct NewMember {
    pub member_id: String,
    pub plan_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: PhoneKey,
    pub zip_code: Option<String>,
    pub risk_tier: RiskTier,
    pub opted_in: bool,
    pub opted_out: bool,
}

/// Mutable profile fields carried by an eligibility update
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub plan_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: PhoneKey,
    pub zip_code: Option<String>,
    pub risk_tier: Option<RiskTier>,
}

fn row_to_member(row: &SqliteRow) -> Result<Member> {
    let risk_tier: String = row.get("risk_tier");

    Ok(Member {
        id: row.get("id"),
        member_id: row.get("member_id"),
        plan_id: row.get("plan_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        date_of_birth: opt_date(row.get("date_of_birth"))?,
        phone_number: row.get("phone_number"),
        zip_code: row.get("zip_code"),
        risk_tier: parse_column("risk_tier", &risk_tier)?,
        opted_in: row.get("opted_in"),
        opted_out: row.get("opted_out"),
        opted_in_at: opt_timestamp(row.get("opted_in_at"))?,
        total_savings: row.get("total_savings"),
    })
}

/// Load member by internal row id
pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Member>> {
    let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_member).transpose()
}

/// Load member by normalized phone number
pub async fn find_by_phone(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<Option<Member>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM members WHERE phone_number = ?",
        MEMBER_COLUMNS
    ))
    .bind(phone.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_member).transpose()
}

/// Load member by external identifier
///
/// Without a plan the lowest row id wins; identifiers are only unique per plan.
pub async fn find_by_external_id(
    conn: &mut SqliteConnection,
    member_id: &str,
    plan_id: Option<i64>,
) -> Result<Option<Member>> {
    let row = match plan_id {
        Some(plan_id) => {
            sqlx::query(&format!(
                "SELECT {} FROM members WHERE member_id = ? AND plan_id = ?",
                MEMBER_COLUMNS
            ))
            .bind(member_id)
            .bind(plan_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM members WHERE member_id = ? ORDER BY id LIMIT 1",
                MEMBER_COLUMNS
            ))
            .bind(member_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };

    row.as_ref().map(row_to_member).transpose()
}

/// Insert a member and return its row id
pub async fn insert(conn: &mut SqliteConnection, member: &NewMember) -> Result<i64> {
    let now = totl_common::time::now_string();
    let opted_in_at = member.opted_in.then(|| now.clone());

    let result = sqlx::query(
        r#"
        INSERT INTO members (
            member_id, plan_id, first_name, last_name, date_of_birth, phone_number,
            zip_code, risk_tier, opted_in, opted_out, opted_in_at, total_savings,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0.0, ?, ?)
        "#,
    )
    .bind(&member.member_id)
    .bind(member.plan_id)
    .bind(&member.first_name)
    .bind(&member.last_name)
    .bind(member.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(member.phone.as_str())
    .bind(&member.zip_code)
    .bind(member.risk_tier.as_str())
    .bind(member.opted_in)
    .bind(member.opted_out)
    .bind(opted_in_at)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrite mutable profile fields; absent optional values keep the stored ones
pub async fn update_profile(
    conn: &mut SqliteConnection,
    id: i64,
    update: &ProfileUpdate,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE members SET
            plan_id = COALESCE(?, plan_id),
            first_name = ?,
            last_name = ?,
            date_of_birth = COALESCE(?, date_of_birth),
            phone_number = ?,
            zip_code = COALESCE(?, zip_code),
            risk_tier = COALESCE(?, risk_tier),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(update.plan_id)
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(update.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(update.phone.as_str())
    .bind(&update.zip_code)
    .bind(update.risk_tier.map(|t| t.as_str()))
    .bind(totl_common::time::now_string())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Set both consent flags in one statement
///
/// Callers pass at most one `true`; the table CHECK rejects both.
pub async fn set_consent_flags(
    conn: &mut SqliteConnection,
    phone: &PhoneKey,
    opted_in: bool,
    opted_out: bool,
) -> Result<u64> {
    let now = totl_common::time::now_string();

    let result = sqlx::query(
        r#"
        UPDATE members SET
            opted_in = ?,
            opted_out = ?,
            opted_in_at = CASE WHEN ? THEN COALESCE(opted_in_at, ?) ELSE NULL END,
            updated_at = ?
        WHERE phone_number = ?
        "#,
    )
    .bind(opted_in)
    .bind(opted_out)
    .bind(opted_in)
    .bind(&now)
    .bind(&now)
    .bind(phone.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Add realized savings to the member's running total
pub async fn add_savings(conn: &mut SqliteConnection, id: i64, amount: f64) -> Result<()> {
    sqlx::query(
        "UPDATE members SET total_savings = total_savings + ?, updated_at = ? WHERE id = ?",
    )
    .bind(amount)
    .bind(totl_common::time::now_string())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Members of a plan who have neither opted in nor out
pub async fn list_pending_for_plan(
    conn: &mut SqliteConnection,
    plan_id: i64,
) -> Result<Vec<Member>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM members WHERE plan_id = ? AND opted_in = 0 AND opted_out = 0 ORDER BY id",
        MEMBER_COLUMNS
    ))
    .bind(plan_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_member).collect()
}

/// Give a placeholder row the identity an eligibility feed assigns it
pub async fn assign_identity(
    conn: &mut SqliteConnection,
    id: i64,
    member_id: &str,
    plan_id: Option<i64>,
) -> Result<()> {
    sqlx::query("UPDATE members SET member_id = ?, plan_id = ?, updated_at = ? WHERE id = ?")
        .bind(member_id)
        .bind(plan_id)
        .bind(totl_common::time::now_string())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Move a member's log, support and referral rows onto another member
pub async fn reassign_history(conn: &mut SqliteConnection, from_id: i64, to_id: i64) -> Result<()> {
    for table in ["member_interactions", "support_messages", "referral_events"] {
        sqlx::query(&format!("UPDATE {} SET member_id = ? WHERE member_id = ?", table))
            .bind(to_id)
            .bind(from_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Delete a member row; dependent rows still attached are removed with it
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
