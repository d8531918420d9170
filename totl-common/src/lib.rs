//! # Totl Common Library
//!
//! Shared code for the Totl services including:
//! - Error types
//! - Bootstrap configuration loading
//! - Database initialization and schema
//! - Phone number normalization
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod phone;
pub mod time;

pub use error::{Error, Result};
