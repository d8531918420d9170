//! Consent ledger
//!
//! Opt-out state lives in two places, the `opt_outs` table and the member
//! `opted_out` flag. Every write here changes both inside one transaction,
//! and every read treats either one as an opt-out.
//!
//! Writers for the same phone number are serialized in-process by a keyed
//! lock; SQLite lock contention across processes is retried.

use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use totl_common::phone::PhoneKey;
use totl_common::Result;
use tracing::info;

use crate::db;
use crate::models::ConsentState;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::utils::keyed_lock::{KeyedGuard, KeyedLocks};

/// Reason recorded for opt-outs received by text
pub const REASON_SMS: &str = "User via SMS";

#[derive(Clone)]
pub struct ConsentLedger {
    pool: SqlitePool,
    locks: Arc<KeyedLocks<PhoneKey>>,
    max_lock_wait_ms: u64,
}

impl ConsentLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(KeyedLocks::new()),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn max_lock_wait_ms(&self) -> u64 {
        self.max_lock_wait_ms
    }

    /// Serialize consent changes for one phone number
    pub async fn lock(&self, phone: &PhoneKey) -> KeyedGuard<'_, PhoneKey> {
        self.locks.lock(phone).await
    }

    /// Whether an outbound message to `phone` is allowed
    ///
    /// False when an opt-out record exists OR the member flag is set. A
    /// phone key without digits is never contactable.
    pub async fn may_contact(&self, phone: &PhoneKey) -> Result<bool> {
        if !phone.has_digits() {
            return Ok(false);
        }
        let mut conn = self.pool.acquire().await?;
        Ok(state_on(&mut conn, phone).await? != ConsentState::OptedOut)
    }

    /// Current consent state for a phone number
    pub async fn state(&self, phone: &PhoneKey) -> Result<ConsentState> {
        let mut conn = self.pool.acquire().await?;
        state_on(&mut conn, phone).await
    }

    /// Administrative unlock: drop the opt-out and return the member to pending
    ///
    /// Returns false when the number was not opted out.
    pub async fn clear_opt_out(&self, phone: &PhoneKey) -> Result<bool> {
        let _guard = self.lock(phone).await;
        let pool = &self.pool;

        let cleared = retry_on_lock("clear opt-out", self.max_lock_wait_ms, move || async move {
            let mut tx = pool.begin().await?;
            let cleared = clear_opt_out_on(&mut tx, phone).await?;
            tx.commit().await?;
            Ok(cleared)
        })
        .await?;

        if cleared {
            info!(phone = %phone, "Opt-out cleared by administrator");
        }
        Ok(cleared)
    }

    /// Administrative opt-out
    pub async fn force_opt_out(&self, phone: &PhoneKey, reason: &str) -> Result<()> {
        let _guard = self.lock(phone).await;
        let pool = &self.pool;

        retry_on_lock("force opt-out", self.max_lock_wait_ms, move || async move {
            let mut tx = pool.begin().await?;
            opt_out_on(&mut tx, phone, reason).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(phone = %phone, reason, "Opt-out recorded by administrator");
        Ok(())
    }

    /// Apply a consent keyword from an inbound message
    ///
    /// STOP-class opts out; START-class opts in (a number with no member row
    /// just loses its opt-out record). The inbound router applies the same
    /// transition inside its own transaction.
    pub async fn record_inbound(&self, phone: &PhoneKey, keyword: ConsentKeyword) -> Result<ConsentState> {
        let _guard = self.lock(phone).await;
        let pool = &self.pool;

        retry_on_lock("record inbound consent", self.max_lock_wait_ms, move || async move {
            let mut tx = pool.begin().await?;
            let state = apply_keyword_on(&mut tx, phone, keyword).await?;
            tx.commit().await?;
            Ok(state)
        })
        .await
    }
}

/// Consent keywords the ledger acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentKeyword {
    Stop,
    Start,
}

// ============================================================================
// Transaction-scoped primitives
//
// Callers hold the phone's keyed lock and pass an open transaction, so the
// record and the flag change together or not at all.
// ============================================================================

/// Consent state read from both sources
pub(crate) async fn state_on(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<ConsentState> {
    if db::consent::exists(conn, phone).await? {
        return Ok(ConsentState::OptedOut);
    }
    Ok(match db::members::find_by_phone(conn, phone).await? {
        Some(member) => member.consent_state(),
        None => ConsentState::Pending,
    })
}

/// Apply a consent keyword and return the resulting state
pub(crate) async fn apply_keyword_on(
    conn: &mut SqliteConnection,
    phone: &PhoneKey,
    keyword: ConsentKeyword,
) -> Result<ConsentState> {
    match keyword {
        ConsentKeyword::Stop => opt_out_on(conn, phone, REASON_SMS).await?,
        ConsentKeyword::Start => opt_in_on(conn, phone).await?,
    }
    state_on(conn, phone).await
}

/// Record an opt-out and set the member flag
pub(crate) async fn opt_out_on(conn: &mut SqliteConnection, phone: &PhoneKey, reason: &str) -> Result<()> {
    db::consent::insert_if_absent(conn, phone, reason).await?;
    db::members::set_consent_flags(conn, phone, false, true).await?;
    Ok(())
}

/// Remove any opt-out and mark the member opted in
pub(crate) async fn opt_in_on(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<()> {
    db::consent::delete(conn, phone).await?;
    db::members::set_consent_flags(conn, phone, true, false).await?;
    Ok(())
}

/// Remove any opt-out and return an opted-out member to pending
pub(crate) async fn clear_opt_out_on(conn: &mut SqliteConnection, phone: &PhoneKey) -> Result<bool> {
    let had_record = db::consent::delete(conn, phone).await?;
    let flagged = matches!(
        db::members::find_by_phone(conn, phone).await?,
        Some(member) if member.opted_out
    );
    if flagged {
        db::members::set_consent_flags(conn, phone, false, false).await?;
    }
    Ok(had_record || flagged)
}
