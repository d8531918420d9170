//! Historical claims (append-only)

use sqlx::SqliteConnection;
use totl_common::Result;

use crate::models::Claim;

pub async fn insert(conn: &mut SqliteConnection, claim: &Claim) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO claims (
            member_id, date_of_service, cpt_code, diagnosis_code,
            allowed_amount, provider_npi, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(claim.member_id)
    .bind(claim.date_of_service.format("%Y-%m-%d").to_string())
    .bind(&claim.cpt_code)
    .bind(&claim.diagnosis_code)
    .bind(claim.allowed_amount)
    .bind(&claim.provider_npi)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn count_for_member(conn: &mut SqliteConnection, member_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims WHERE member_id = ?")
        .bind(member_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}
