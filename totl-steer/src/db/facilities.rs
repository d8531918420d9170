//! Facility reference data

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use totl_common::Result;

use super::parse_column;
use crate::models::Facility;

fn row_to_facility(row: &SqliteRow) -> Result<Facility> {
    let facility_type: String = row.get("facility_type");

    Ok(Facility {
        npi: row.get("npi"),
        facility_name: row.get("facility_name"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        facility_class: parse_column("facility_type", &facility_type)?,
    })
}

pub async fn find_by_npi(conn: &mut SqliteConnection, npi: &str) -> Result<Option<Facility>> {
    let row = sqlx::query(
        r#"
        SELECT npi, facility_name, address, city, state, zip_code,
               latitude, longitude, facility_type
        FROM facilities
        WHERE npi = ?
        "#,
    )
    .bind(npi)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_facility).transpose()
}

/// Insert or refresh a facility keyed by NPI
pub async fn upsert(conn: &mut SqliteConnection, facility: &Facility) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO facilities (
            npi, facility_name, address, city, state, zip_code,
            latitude, longitude, facility_type
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(npi) DO UPDATE SET
            facility_name = excluded.facility_name,
            address = excluded.address,
            city = excluded.city,
            state = excluded.state,
            zip_code = excluded.zip_code,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            facility_type = excluded.facility_type
        "#,
    )
    .bind(&facility.npi)
    .bind(&facility.facility_name)
    .bind(&facility.address)
    .bind(&facility.city)
    .bind(&facility.state)
    .bind(&facility.zip_code)
    .bind(facility.latitude)
    .bind(facility.longitude)
    .bind(facility.facility_class.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
