//! Geographic distance between members and facilities
//!
//! Coordinates are resolved in order: facility's stored coordinates, the
//! coordinate cache, then the geocoder (when one is configured). When either
//! side cannot be placed on the map the distance falls back to a
//! deterministic zip-code estimate.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use totl_common::Result;
use tracing::{debug, warn};

use crate::db;
use crate::models::Facility;

const EARTH_RADIUS_MILES: f64 = 3956.0;
const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

// ============================================================================
// Distance math
// ============================================================================

/// Great-circle distance in miles
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * h.sqrt().asin() * EARTH_RADIUS_MILES
}

fn round_tenth(miles: f64) -> f64 {
    (miles * 10.0).round() / 10.0
}

/// Five-digit zip with any ZIP+4 suffix removed
fn zip5(zip: &str) -> Option<&str> {
    let base = zip.trim().split('-').next()?.trim();
    if base.len() == 5 && base.bytes().all(|b| b.is_ascii_digit()) {
        Some(base)
    } else {
        None
    }
}

/// Deterministic distance estimate from zip codes alone
///
/// Same zip is 0; same 3-digit prefix is 5 to 10 miles; anything else is
/// 15 to 30 miles. Returns `None` when either zip is not a 5-digit code.
pub fn estimate_miles(zip_a: &str, zip_b: &str) -> Option<f64> {
    let a = zip5(zip_a)?;
    let b = zip5(zip_b)?;

    if a == b {
        return Some(0.0);
    }

    let prefix_a: i64 = a[..3].parse().ok()?;
    let prefix_b: i64 = b[..3].parse().ok()?;

    if prefix_a == prefix_b {
        let last_a: i64 = a[3..].parse().ok()?;
        let last_b: i64 = b[3..].parse().ok()?;
        let diff = (last_a - last_b).abs() as f64;
        Some((5.0 + diff / 10.0).min(10.0))
    } else {
        let diff = (prefix_a - prefix_b).abs() as f64;
        Some((15.0 + diff).min(30.0))
    }
}

// ============================================================================
// Coordinate cache
// ============================================================================

/// Backing store for zip → coordinate lookups
#[async_trait]
pub trait CoordinateStore: Send + Sync {
    async fn get(&self, zip: &str) -> Result<Option<Coordinates>>;
    async fn put(&self, zip: &str, coords: Coordinates) -> Result<()>;
}

/// Bounded in-memory store; the oldest insertion is evicted first
pub struct MemoryCoordinateStore {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, Coordinates>,
    order: VecDeque<String>,
}

impl MemoryCoordinateStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CoordinateStore for MemoryCoordinateStore {
    async fn get(&self, zip: &str) -> Result<Option<Coordinates>> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        Ok(inner.entries.get(zip).copied())
    }

    async fn put(&self, zip: &str, coords: Coordinates) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        if inner.entries.insert(zip.to_string(), coords).is_none() {
            inner.order.push_back(zip.to_string());
        }

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        Ok(())
    }
}

/// Store backed by the `geo_cache` table, trimmed to `capacity` rows
pub struct SqliteCoordinateStore {
    pool: SqlitePool,
    capacity: usize,
}

impl SqliteCoordinateStore {
    pub fn new(pool: SqlitePool, capacity: usize) -> Self {
        Self {
            pool,
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl CoordinateStore for SqliteCoordinateStore {
    async fn get(&self, zip: &str) -> Result<Option<Coordinates>> {
        let mut conn = self.pool.acquire().await?;
        let found = db::geo_cache::get(&mut conn, zip).await?;
        Ok(found.map(|(lat, lon)| Coordinates::new(lat, lon)))
    }

    async fn put(&self, zip: &str, coords: Coordinates) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        db::geo_cache::put(&mut conn, zip, coords.lat, coords.lon).await?;
        db::geo_cache::trim_to(&mut conn, self.capacity).await?;
        Ok(())
    }
}

// ============================================================================
// Geocoder
// ============================================================================

/// Resolves a zip code to coordinates; `None` on any failure
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, zip: &str) -> Option<Coordinates>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLocation,
}

#[derive(Debug, Deserialize)]
struct GeocodeLocation {
    lat: f64,
    lng: f64,
}

/// Google Geocoding API client, restricted to US postal codes
pub struct GoogleGeocoder {
    http_client: reqwest::Client,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: String, timeout_ms: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| totl_common::Error::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, zip: &str) -> Option<Coordinates> {
        let params = [
            ("address", zip),
            ("key", self.api_key.as_str()),
            ("components", "country:US"),
        ];

        let response = match self
            .http_client
            .get(GOOGLE_GEOCODE_URL)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(zip, error = %e, "Geocoding request failed");
                return None;
            }
        };

        let body: GeocodeResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(zip, error = %e, "Geocoding response unreadable");
                return None;
            }
        };

        if body.status != "OK" {
            debug!(zip, status = %body.status, "Geocoder returned no result");
            return None;
        }

        body.results
            .first()
            .map(|r| Coordinates::new(r.geometry.location.lat, r.geometry.location.lng))
    }
}

// ============================================================================
// Service
// ============================================================================

/// Distance lookups with an injected cache and optional geocoder
#[derive(Clone)]
pub struct GeoService {
    store: Arc<dyn CoordinateStore>,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl GeoService {
    pub fn new(store: Arc<dyn CoordinateStore>, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self { store, geocoder }
    }

    /// Estimate-only service backed by a small in-memory cache
    pub fn offline() -> Self {
        Self::new(Arc::new(MemoryCoordinateStore::new(64)), None)
    }

    /// Resolve coordinates for a zip through the cache, then the geocoder
    pub async fn coordinates_for_zip(&self, zip: &str) -> Option<Coordinates> {
        let key = zip5(zip)?;

        match self.store.get(key).await {
            Ok(Some(coords)) => return Some(coords),
            Ok(None) => {}
            Err(e) => warn!(zip = key, error = %e, "Coordinate cache read failed"),
        }

        let coords = self.geocoder.as_ref()?.geocode(key).await?;

        if let Err(e) = self.store.put(key, coords).await {
            warn!(zip = key, error = %e, "Coordinate cache write failed");
        }

        Some(coords)
    }

    /// Distance in miles from a member zip to a facility
    ///
    /// `None` means the distance is unknown and no ceiling can be applied.
    pub async fn distance_to_facility(&self, member_zip: &str, facility: &Facility) -> Option<f64> {
        let facility_zip = facility.zip_code.as_deref().unwrap_or("");
        let member_zip = member_zip.trim();
        if member_zip.is_empty() {
            return None;
        }

        let facility_coords = match (facility.latitude, facility.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => self.coordinates_for_zip(facility_zip).await,
        };

        if let Some(facility_coords) = facility_coords {
            if let Some(member_coords) = self.coordinates_for_zip(member_zip).await {
                return Some(round_tenth(haversine_miles(member_coords, facility_coords)));
            }
        }

        estimate_miles(member_zip, facility_zip)
    }
}
