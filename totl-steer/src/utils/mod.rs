//! Shared helpers

pub mod db_retry;
pub mod keyed_lock;

pub use db_retry::retry_on_lock;
pub use keyed_lock::KeyedLocks;
