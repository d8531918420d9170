//! Bootstrap configuration
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (handled by the binary)
//! 2. Environment variables (handled by the binary via clap `env`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: the service warns and starts on
//! compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file; OS data directory when absent
    pub database_path: Option<PathBuf>,

    /// HTTP bind address
    pub host: String,

    /// HTTP server port
    pub port: u16,

    pub logging: LoggingConfig,
    pub messaging: MessagingConfig,
    pub geocoding: GeocodingConfig,
    pub policy: PolicyConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            host: "127.0.0.1".to_string(),
            port: 5740,
            logging: LoggingConfig::default(),
            messaging: MessagingConfig::default(),
            geocoding: GeocodingConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Database path from TOML, falling back to the OS data directory
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Outbound messaging provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessagingProvider {
    /// Log messages and return synthetic ids
    #[default]
    Simulated,
    /// Twilio Programmable Messaging REST API
    Twilio,
}

/// Outbound messaging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub provider: MessagingProvider,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    /// Name members see in message copy
    pub brand_name: String,
    /// Base URL prepended to relative media links
    pub public_base_url: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: MessagingProvider::Simulated,
            account_sid: None,
            auth_token: None,
            from_number: None,
            brand_name: "Totl".to_string(),
            public_base_url: "http://localhost:5740".to_string(),
        }
    }
}

/// Geocoding configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Google Geocoding API key; distance falls back to the zip estimate without it
    pub api_key: Option<String>,
    /// Maximum number of zip codes held by the coordinate cache
    pub cache_capacity: usize,
    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cache_capacity: 1024,
            timeout_ms: 5000,
        }
    }
}

/// Steerage policy constants
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Facilities priced at or below `cheapest × price_band` are admitted
    pub price_band: f64,
    /// Member share of the allowed amount once the deductible is met
    pub coinsurance_rate: f64,
    /// Coinsurance below this amount is treated as $0
    pub negligible_oop: f64,
    /// Country code assumed for bare national phone numbers
    pub default_country_code: String,
    pub base_distance_miles: f64,
    pub mid_distance_miles: f64,
    pub mid_savings_threshold: f64,
    pub far_distance_miles: f64,
    pub far_savings_threshold: f64,
    /// Maximum candidates returned by the pricing matcher
    pub max_candidates: usize,
    /// Deductible limit assumed when an accumulator row omits it
    pub default_deductible_limit: f64,
    /// Out-of-pocket limit assumed when an accumulator row omits it
    pub default_oop_limit: f64,
    /// Age in days after which an undelivered redirect is no longer offered
    /// on re-enrollment
    pub pending_referral_days: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            price_band: 1.10,
            coinsurance_rate: 0.20,
            negligible_oop: 1.00,
            default_country_code: crate::phone::DEFAULT_COUNTRY_CODE.to_string(),
            base_distance_miles: 10.0,
            mid_distance_miles: 15.0,
            mid_savings_threshold: 500.0,
            far_distance_miles: 25.0,
            far_savings_threshold: 1000.0,
            max_candidates: 3,
            default_deductible_limit: 3000.0,
            default_oop_limit: 6000.0,
            pending_referral_days: 30,
        }
    }
}

impl PolicyConfig {
    /// Distance ceiling for a facility offering `savings` versus the most
    /// expensive observed facility
    pub fn distance_ceiling(&self, savings: f64) -> f64 {
        if savings > self.far_savings_threshold {
            self.far_distance_miles
        } else if savings > self.mid_savings_threshold {
            self.mid_distance_miles
        } else {
            self.base_distance_miles
        }
    }

    /// Validate ranges that would make the policy meaningless
    pub fn validate(&self) -> Result<()> {
        if self.price_band < 1.0 {
            return Err(Error::Config(format!(
                "policy.price_band must be >= 1.0 (got {})",
                self.price_band
            )));
        }
        if !(0.0..=1.0).contains(&self.coinsurance_rate) {
            return Err(Error::Config(format!(
                "policy.coinsurance_rate must be within 0.0..=1.0 (got {})",
                self.coinsurance_rate
            )));
        }
        if self.max_candidates == 0 {
            return Err(Error::Config("policy.max_candidates must be positive".to_string()));
        }
        if self.pending_referral_days == 0 {
            return Err(Error::Config(
                "policy.pending_referral_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the TOML config from an explicit path or the per-user default
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No config file found, using compiled defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse and validate TOML text
pub fn parse_config(content: &str) -> Result<TomlConfig> {
    let config: TomlConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    config.policy.validate()?;
    Ok(config)
}

/// Per-user config file location (`~/.config/totl/totl-steer.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("totl").join("totl-steer.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("totl").join("totl.db"))
        .unwrap_or_else(|| PathBuf::from("./totl_data/totl.db"))
}
