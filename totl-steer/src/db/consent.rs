//! Opt-out ledger persistence

use sqlx::{Row, SqliteConnection};
use totl_common::phone::PhoneKey;
use totl_common::Result;

use crate::models::OptOutRecord;

/// Load the opt-out record for a phone number, if any
pub async fn find(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<Option<OptOutRecord>> {
    let row = sqlx::query(
        "SELECT phone_number, reason, created_at FROM opt_outs WHERE phone_number = ?",
    )
    .bind(phone.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let created_at: String = row.get("created_at");
            Ok(Some(OptOutRecord {
                phone_number: row.get("phone_number"),
                reason: row.get("reason"),
                created_at: totl_common::time::parse_timestamp(&created_at)?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn exists(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opt_outs WHERE phone_number = ?")
        .bind(phone.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(count > 0)
}

/// Insert an opt-out record; an existing record keeps its original reason
///
/// Returns true when a new record was written.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    phone: &PhoneKey,
    reason: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO opt_outs (phone_number, reason, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(phone_number) DO NOTHING
        "#,
    )
    .bind(phone.as_str())
    .bind(reason)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete the opt-out record; returns true when one existed
pub async fn delete(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<bool> {
    let result = sqlx::query("DELETE FROM opt_outs WHERE phone_number = ?")
        .bind(phone.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
