//! Shared fixtures for totl-steer integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use totl_common::config::TomlConfig;
use totl_common::phone::PhoneKey;
use totl_steer::db;
use totl_steer::ingest::{IngestKind, RawRecord};
use totl_steer::services::MessageTransport;
use totl_steer::AppState;

pub const MEMBER_PHONE: &str = "(555) 201-3344";
pub const MEMBER_PHONE_KEY: &str = "+15552013344";

/// Transport that records every accepted message
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    reject: bool,
}

impl RecordingTransport {
    pub fn rejecting() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, to: &PhoneKey, body: &str, _media_url: Option<&str>) -> Option<String> {
        if self.reject {
            return None;
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Some(format!("TEST-{}", sent.len()))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub transport: Arc<RecordingTransport>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_transport(RecordingTransport::default()).await
    }

    pub async fn with_transport(transport: RecordingTransport) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = totl_common::db::init_database(&dir.path().join("totl.db"))
            .await
            .unwrap();

        let transport = Arc::new(transport);
        let state = AppState::new(pool, TomlConfig::default(), transport.clone()).unwrap();

        Self {
            state,
            transport,
            _dir: dir,
        }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.state.db
    }

    /// Ingest a JSON array and assert every record was accepted
    pub async fn ingest_ok(&self, kind: IngestKind, rows: Value) {
        let report = self.state.ingestor.ingest(kind, &records(rows)).await;
        assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    }

    pub async fn interaction_count(&self) -> i64 {
        let mut conn = self.pool().acquire().await.unwrap();
        db::interactions::count_all(&mut conn).await.unwrap()
    }

    /// Plan 1, one freestanding imaging center with a $450 MRI price, and
    /// one Low risk member in the same zip
    pub async fn seed_basic(&self) {
        self.ingest_ok(
            IngestKind::Plans,
            json!([{ "plan_id": 1, "name": "Acme PPO", "sponsor_name": "Acme Corp" }]),
        )
        .await;
        self.ingest_ok(
            IngestKind::Facilities,
            json!([{
                "npi": "1111111111",
                "facility_name": "QuickScan Imaging",
                "address": "12 Main St",
                "city": "Chicago",
                "state": "IL",
                "zip_code": "60601",
                "facility_type": "freestanding"
            }]),
        )
        .await;
        self.ingest_ok(
            IngestKind::Prices,
            json!([{
                "member_id": "HIST-1",
                "plan_id": 1,
                "date_of_service": "2024-01-15",
                "cpt_code": "73721",
                "npi": "1111111111",
                "allowed_amount": "$450.00"
            }]),
        )
        .await;
        self.ingest_ok(
            IngestKind::Eligibility,
            json!([{
                "member_id": "M-100",
                "plan_id": 1,
                "first_name": "Ana",
                "last_name": "Lopez",
                "date_of_birth": "1980-04-02",
                "phone_number": MEMBER_PHONE,
                "zip_code": "60601",
                "risk_tier": "Low"
            }]),
        )
        .await;
    }

    pub async fn deductible_met(&self, member_id: &str) {
        self.ingest_ok(
            IngestKind::Accumulators,
            json!([{
                "member_id": member_id,
                "plan_id": 1,
                "deductible_met": 3000,
                "deductible_limit": 3000,
                "oop_met": 3200,
                "oop_limit": 6000
            }]),
        )
        .await;
    }
}

/// JSON array → raw feed records
pub fn records(rows: Value) -> Vec<RawRecord> {
    match rows {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => panic!("record is not an object: {}", other),
            })
            .collect(),
        other => panic!("records must be an array: {}", other),
    }
}

pub fn member_phone() -> PhoneKey {
    PhoneKey::parse(MEMBER_PHONE)
}
