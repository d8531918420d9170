//! Accumulator snapshots

use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use crate::models::Accumulator;

/// Most recent snapshot for a member
pub async fn latest_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> Result<Option<Accumulator>> {
    let row = sqlx::query(
        r#"
        SELECT member_id, deductible_met, deductible_limit, oop_met, oop_limit, recorded_at
        FROM accumulators
        WHERE member_id = ?
        ORDER BY recorded_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(member_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let recorded_at: String = row.get("recorded_at");
            Ok(Some(Accumulator {
                member_id: row.get("member_id"),
                deductible_met: row.get("deductible_met"),
                deductible_limit: row.get("deductible_limit"),
                oop_met: row.get("oop_met"),
                oop_limit: row.get("oop_limit"),
                recorded_at: totl_common::time::parse_timestamp(&recorded_at)?,
            }))
        }
        None => Ok(None),
    }
}

/// Record a new snapshot, which becomes the member's current one
///
/// Rows are never edited in place; earlier snapshots stay as history.
pub async fn record_snapshot(conn: &mut SqliteConnection, snapshot: &Accumulator) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO accumulators (
            member_id, deductible_met, deductible_limit, oop_met, oop_limit, recorded_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.member_id)
    .bind(snapshot.deductible_met)
    .bind(snapshot.deductible_limit)
    .bind(snapshot.oop_met)
    .bind(snapshot.oop_limit)
    .bind(totl_common::time::format_timestamp(&snapshot.recorded_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn count_for_member(conn: &mut SqliteConnection, member_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accumulators WHERE member_id = ?")
        .bind(member_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}
