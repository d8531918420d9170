//! Plan persistence

use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use crate::models::Plan;

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Plan>> {
    let row = sqlx::query("SELECT id, name, sponsor_name FROM plans WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| Plan {
        id: row.get("id"),
        name: row.get("name"),
        sponsor_name: row.get("sponsor_name"),
    }))
}

/// Lowest-numbered plan, used when an eligibility row names none
pub async fn first_plan_id(conn: &mut SqliteConnection) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM plans ORDER BY id LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;

    Ok(id)
}

/// Insert or rename a plan
pub async fn upsert(conn: &mut SqliteConnection, plan: &Plan) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO plans (id, name, sponsor_name, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            sponsor_name = excluded.sponsor_name
        "#,
    )
    .bind(plan.id)
    .bind(&plan.name)
    .bind(&plan.sponsor_name)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
