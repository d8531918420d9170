//! Table definitions
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running the schema
//! against an existing database is a no-op.

use crate::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Create every table and index used by the steerage engine
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_plans_table(pool).await?;
    create_members_table(pool).await?;
    create_opt_outs_table(pool).await?;
    create_accumulators_table(pool).await?;
    create_claims_table(pool).await?;
    create_facilities_table(pool).await?;
    create_price_records_table(pool).await?;
    create_referral_events_table(pool).await?;
    create_member_interactions_table(pool).await?;
    create_support_messages_table(pool).await?;
    create_geo_cache_table(pool).await?;

    debug!("Database schema verified");
    Ok(())
}

async fn create_plans_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            sponsor_name TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Members: one row per covered individual
///
/// `opted_in` and `opted_out` are never both set; the CHECK constraint
/// rejects any write that tries.
async fn create_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id TEXT NOT NULL,
            plan_id INTEGER REFERENCES plans(id),
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            phone_number TEXT NOT NULL UNIQUE,
            zip_code TEXT,
            risk_tier TEXT NOT NULL DEFAULT 'Low',
            opted_in INTEGER NOT NULL DEFAULT 0,
            opted_out INTEGER NOT NULL DEFAULT 0,
            opted_in_at TEXT,
            total_savings REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (plan_id, member_id),
            CHECK (NOT (opted_in = 1 AND opted_out = 1))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_member_id ON members(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_opt_outs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS opt_outs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone_number TEXT NOT NULL UNIQUE,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_accumulators_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accumulators (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            deductible_met REAL NOT NULL,
            deductible_limit REAL NOT NULL,
            oop_met REAL NOT NULL,
            oop_limit REAL NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_accumulators_member ON accumulators(member_id, recorded_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_claims_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS claims (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            date_of_service TEXT NOT NULL,
            cpt_code TEXT NOT NULL,
            diagnosis_code TEXT,
            allowed_amount REAL NOT NULL,
            provider_npi TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_facilities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facilities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            npi TEXT NOT NULL UNIQUE,
            facility_name TEXT NOT NULL,
            address TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            latitude REAL,
            longitude REAL,
            facility_type TEXT NOT NULL DEFAULT 'freestanding'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Historical explanation-of-benefit prices (append-only reference data)
async fn create_price_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS price_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_ref TEXT NOT NULL,
            plan_id INTEGER NOT NULL,
            date_of_service TEXT NOT NULL,
            cpt_code TEXT NOT NULL,
            npi TEXT NOT NULL,
            allowed_amount REAL NOT NULL,
            place_of_service TEXT,
            facility_name TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_records_lookup ON price_records(plan_id, cpt_code, npi)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_referral_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS referral_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT UNIQUE,
            member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            cpt_code TEXT NOT NULL,
            service_name TEXT,
            ordering_provider_npi TEXT,
            baseline_npi TEXT,
            baseline_allowed REAL,
            redirected_npi TEXT,
            redirected_name TEXT,
            redirected_allowed REAL,
            net_savings REAL,
            status TEXT NOT NULL DEFAULT 'received',
            decision_reason TEXT,
            notified_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only audit log
///
/// `member_id` is NULL for senders with no member row (an unknown number
/// texting STOP), so every entry also carries the normalized phone number.
async fn create_member_interactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER REFERENCES members(id) ON DELETE CASCADE,
            phone_number TEXT NOT NULL,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            referral_id INTEGER REFERENCES referral_events(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interactions_phone ON member_interactions(phone_number)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_support_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS support_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            message_content TEXT NOT NULL,
            media_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            admin_reply TEXT,
            created_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_geo_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS geo_cache (
            zip_code TEXT PRIMARY KEY,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
