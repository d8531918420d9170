//! Persistent zip → coordinate cache

use sqlx::{Row, SqliteConnection};
use totl_common::Result;

pub async fn get(conn: &mut SqliteConnection, zip_code: &str) -> Result<Option<(f64, f64)>> {
    let row = sqlx::query("SELECT latitude, longitude FROM geo_cache WHERE zip_code = ?")
        .bind(zip_code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|r| (r.get("latitude"), r.get("longitude"))))
}

pub async fn put(conn: &mut SqliteConnection, zip_code: &str, lat: f64, lon: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO geo_cache (zip_code, latitude, longitude, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(zip_code) DO UPDATE SET
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(zip_code)
    .bind(lat)
    .bind(lon)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM geo_cache")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Evict the least recently written rows until at most `capacity` remain
pub async fn trim_to(conn: &mut SqliteConnection, capacity: usize) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM geo_cache WHERE zip_code IN (
            SELECT zip_code FROM geo_cache
            ORDER BY updated_at DESC
            LIMIT -1 OFFSET ?
        )
        "#,
    )
    .bind(capacity as i64)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
