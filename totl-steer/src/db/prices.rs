//! Historical price records (EOB lines)

use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use crate::models::PriceRecord;

/// Lowest observed price for one facility
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityPrice {
    pub npi: String,
    pub min_price: f64,
    /// Facility name as it appeared on the EOB, for facilities with no reference row
    pub eob_facility_name: Option<String>,
}

pub async fn insert(conn: &mut SqliteConnection, record: &PriceRecord) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO price_records (
            member_ref, plan_id, date_of_service, cpt_code, npi,
            allowed_amount, place_of_service, facility_name, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.member_ref)
    .bind(record.plan_id)
    .bind(record.date_of_service.format("%Y-%m-%d").to_string())
    .bind(&record.cpt_code)
    .bind(&record.npi)
    .bind(record.allowed_amount)
    .bind(&record.place_of_service)
    .bind(&record.facility_name)
    .bind(totl_common::time::now_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Minimum observed price per facility, cheapest first
pub async fn min_price_by_facility(
    conn: &mut SqliteConnection,
    plan_id: i64,
    cpt_code: &str,
) -> Result<Vec<FacilityPrice>> {
    let rows = sqlx::query(
        r#"
        SELECT npi, MIN(allowed_amount) AS min_price, MAX(facility_name) AS facility_name
        FROM price_records
        WHERE plan_id = ? AND cpt_code = ?
        GROUP BY npi
        ORDER BY min_price ASC, npi ASC
        "#,
    )
    .bind(plan_id)
    .bind(cpt_code)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| FacilityPrice {
            npi: row.get("npi"),
            min_price: row.get("min_price"),
            eob_facility_name: row.get("facility_name"),
        })
        .collect())
}

/// Mean of every observed price for the pair
pub async fn average_price(
    conn: &mut SqliteConnection,
    plan_id: i64,
    cpt_code: &str,
) -> Result<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(allowed_amount) FROM price_records WHERE plan_id = ? AND cpt_code = ?",
    )
    .bind(plan_id)
    .bind(cpt_code)
    .fetch_one(&mut *conn)
    .await?;

    Ok(avg)
}

/// Most recently observed price at one facility
pub async fn latest_price_at(
    conn: &mut SqliteConnection,
    plan_id: i64,
    cpt_code: &str,
    npi: &str,
) -> Result<Option<f64>> {
    let price: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT allowed_amount
        FROM price_records
        WHERE plan_id = ? AND cpt_code = ? AND npi = ?
        ORDER BY date_of_service DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(plan_id)
    .bind(cpt_code)
    .bind(npi)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(price)
}
