//! HTTP API handlers
//!
//! JSON in, JSON out. Errors render as `{"error": {"code", "message"}}`.

pub mod campaigns;
pub mod consent;
pub mod health;
pub mod inbound;
pub mod ingest;
pub mod members;
pub mod support;

pub use campaigns::campaign_routes;
pub use consent::consent_routes;
pub use health::health_routes;
pub use inbound::inbound_routes;
pub use ingest::ingest_routes;
pub use members::member_routes;
pub use support::support_routes;
