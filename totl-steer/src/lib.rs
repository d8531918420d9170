//! totl-steer library interface
//!
//! Referral intake, consent ledger and steerage decisions behind an HTTP
//! API. The binary in `main.rs` only wires configuration to [`AppState`].

pub mod api;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use totl_common::config::TomlConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ingest::Ingestor;
use crate::services::geo::{CoordinateStore, Geocoder, GoogleGeocoder, SqliteCoordinateStore};
use crate::services::{
    ConsentLedger, GeoService, InboundRouter, MessageCopy, MessageTransport, OnboardingCampaign,
    OutboundGate, PricingMatcher, SteerageEngine, SupportDesk,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    pub ledger: ConsentLedger,
    pub inbound: InboundRouter,
    pub ingestor: Ingestor,
    pub support: SupportDesk,
    pub campaign: OnboardingCampaign,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every service over one pool and one outbound transport
    pub fn new(
        db: SqlitePool,
        config: TomlConfig,
        transport: Arc<dyn MessageTransport>,
    ) -> totl_common::Result<Self> {
        let store: Arc<dyn CoordinateStore> = Arc::new(SqliteCoordinateStore::new(
            db.clone(),
            config.geocoding.cache_capacity,
        ));
        let geocoder: Option<Arc<dyn Geocoder>> = match &config.geocoding.api_key {
            Some(key) if !key.trim().is_empty() => {
                info!("Geocoding enabled");
                Some(Arc::new(GoogleGeocoder::new(
                    key.clone(),
                    config.geocoding.timeout_ms,
                )?))
            }
            _ => {
                info!("No geocoding key configured, using zip estimates");
                None
            }
        };
        let geo = GeoService::new(store, geocoder);

        let copy = MessageCopy::new(config.messaging.brand_name.clone());
        let ledger = ConsentLedger::new(db.clone());
        let outbound = OutboundGate::new(ledger.clone(), transport);
        let matcher = PricingMatcher::new(config.policy.clone(), geo);

        let steerage = SteerageEngine::new(
            db.clone(),
            matcher,
            config.policy.clone(),
            outbound.clone(),
            copy.clone(),
        );
        let ingestor = Ingestor::new(db.clone(), config.policy.clone(), ledger.clone(), steerage);
        let inbound = InboundRouter::new(ledger.clone(), copy.clone(), &config.policy);
        let support = SupportDesk::new(db.clone(), outbound.clone());
        let campaign = OnboardingCampaign::new(db.clone(), outbound, copy);

        Ok(Self {
            db,
            config: Arc::new(config),
            ledger,
            inbound,
            ingestor,
            support,
            campaign,
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::ingest_routes())
        .merge(api::inbound_routes())
        .merge(api::consent_routes())
        .merge(api::member_routes())
        .merge(api::support_routes())
        .merge(api::campaign_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
