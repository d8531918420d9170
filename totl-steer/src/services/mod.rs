//! Steerage engine services
//!
//! Pure decision stages (`pricing` ranking, `viability`, `engagement`) sit
//! beside the stateful services that load their inputs and act on their
//! outputs.

pub mod campaign;
pub mod consent;
pub mod engagement;
pub mod geo;
pub mod inbound;
pub mod messages;
pub mod outbound;
pub mod pricing;
pub mod procedures;
pub mod steerage;
pub mod support;
pub mod transport;
pub mod viability;

pub use campaign::{CampaignReport, OnboardingCampaign};
pub use consent::ConsentLedger;
pub use geo::GeoService;
pub use inbound::{InboundMessage, InboundReply, InboundRouter};
pub use messages::MessageCopy;
pub use outbound::{OutboundGate, SendOutcome};
pub use pricing::PricingMatcher;
pub use steerage::{ReferralOutcome, ReferralRequest, SteerageEngine};
pub use support::SupportDesk;
pub use transport::MessageTransport;
