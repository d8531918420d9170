//! Member interaction audit log
//!
//! Append-only: there is no update or delete here.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use totl_common::phone::PhoneKey;
use totl_common::Result;

use super::parse_column;
use crate::models::{InteractionKind, MemberInteraction};

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewInteraction<'a> {
    pub member_id: Option<i64>,
    pub phone: &'a PhoneKey,
    pub kind: InteractionKind,
    pub content: String,
    pub referral_id: Option<i64>,
}

fn row_to_interaction(row: &SqliteRow) -> Result<MemberInteraction> {
    let kind: String = row.get("kind");
    let created_at: String = row.get("created_at");

    Ok(MemberInteraction {
        id: row.get("id"),
        member_id: row.get("member_id"),
        phone_number: row.get("phone_number"),
        kind: parse_column("kind", &kind)?,
        content: row.get("content"),
        referral_id: row.get("referral_id"),
        created_at: totl_common::time::parse_timestamp(&created_at)?,
    })
}

pub async fn append(conn: &mut SqliteConnection, entry: &NewInteraction<'_>) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO member_interactions (
            member_id, phone_number, kind, content, referral_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.member_id)
    .bind(entry.phone.as_str())
    .bind(entry.kind.as_str())
    .bind(&entry.content)
    .bind(entry.referral_id)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Entries for a member, oldest first
pub async fn list_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> Result<Vec<MemberInteraction>> {
    let rows = sqlx::query(
        r#"
        SELECT id, member_id, phone_number, kind, content, referral_id, created_at
        FROM member_interactions
        WHERE member_id = ?
        ORDER BY id
        "#,
    )
    .bind(member_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_interaction).collect()
}

/// Entries for a phone number, oldest first (includes entries with no member)
pub async fn list_for_phone(
    conn: &mut SqliteConnection,
    phone: &PhoneKey,
) -> Result<Vec<MemberInteraction>> {
    let rows = sqlx::query(
        r#"
        SELECT id, member_id, phone_number, kind, content, referral_id, created_at
        FROM member_interactions
        WHERE phone_number = ?
        ORDER BY id
        "#,
    )
    .bind(phone.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_interaction).collect()
}

pub async fn count_all(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member_interactions")
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}
