//! Human-support queue

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use super::{opt_timestamp, parse_column};
use crate::models::SupportMessage;

fn row_to_support(row: &SqliteRow) -> Result<SupportMessage> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(SupportMessage {
        id: row.get("id"),
        member_id: row.get("member_id"),
        message_content: row.get("message_content"),
        media_url: row.get("media_url"),
        status: parse_column("status", &status)?,
        admin_reply: row.get("admin_reply"),
        created_at: totl_common::time::parse_timestamp(&created_at)?,
        resolved_at: opt_timestamp(row.get("resolved_at"))?,
    })
}

pub async fn enqueue(
    conn: &mut SqliteConnection,
    member_id: i64,
    content: &str,
    media_url: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO support_messages (member_id, message_content, media_url, status, created_at)
        VALUES (?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(member_id)
    .bind(content)
    .bind(media_url)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<SupportMessage>> {
    let row = sqlx::query(
        r#"
        SELECT id, member_id, message_content, media_url, status, admin_reply,
               created_at, resolved_at
        FROM support_messages
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_support).transpose()
}

/// Pending items, oldest first
pub async fn list_pending(conn: &mut SqliteConnection) -> Result<Vec<SupportMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT id, member_id, message_content, media_url, status, admin_reply,
               created_at, resolved_at
        FROM support_messages
        WHERE status = 'pending'
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_support).collect()
}

pub async fn mark_replied(conn: &mut SqliteConnection, id: i64, reply: &str) -> Result<()> {
    sqlx::query("UPDATE support_messages SET status = 'replied', admin_reply = ? WHERE id = ?")
        .bind(reply)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Returns false when the item does not exist
pub async fn mark_resolved(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result =
        sqlx::query("UPDATE support_messages SET status = 'resolved', resolved_at = ? WHERE id = ?")
            .bind(totl_common::time::now_string())
            .bind(id)
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected() > 0)
}
