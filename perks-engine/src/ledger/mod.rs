//! Remote Ledger Client
//!
//! The sole boundary through which stamp/redeem/analytics operations and
//! row reads cross into the hosted backend. Everything the engine ever
//! displays came through this trait (or a realtime push of a row this
//! trait could have fetched).
//!
//! Contract notes:
//! - No retries. A failed call is surfaced once; retry is a manual
//!   re-invocation by the user.
//! - Idempotency exists only at the undo level: one `undo = true` call
//!   exactly reverses one prior non-undo call for the same target.
//! - `stamps` is never written client-side; mutations happen behind
//!   `add_stamp` / `redeem_reward` and come back via fetch or push.

mod http;
mod memory;

pub use http::FunctionsClient;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use shared::models::{
    AnalyticsSnapshot, CardDetails, CustomerCardRow, CustomerMatch, CustomerSegments,
    LoyaltyCard, Reward, Store,
};
use uuid::Uuid;

/// Ledger boundary error
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Business-rule rejection from the backend; the message is the
    /// backend's own wording and is shown to the user verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Client for the hosted ledger and its read surface
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Apply (`undo = false`) or reverse (`undo = true`) one stamp.
    async fn add_stamp(
        &self,
        loyalty_card_id: Uuid,
        store_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()>;

    /// Redeem (`undo = false`) or reverse (`undo = true`) a reward.
    async fn redeem_reward(
        &self,
        loyalty_card_id: Uuid,
        reward_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()>;

    /// Aggregate store metrics snapshot.
    async fn fetch_analytics(&self, store_id: Uuid) -> LedgerResult<AnalyticsSnapshot>;

    /// Customer segmentation counts.
    async fn fetch_customer_segments(&self, store_id: Uuid) -> LedgerResult<CustomerSegments>;

    /// All cards at a location, joined with their customers.
    async fn fetch_roster(&self, location_id: Uuid) -> LedgerResult<Vec<CustomerCardRow>>;

    /// One card with its customer, location and store resolved.
    async fn fetch_card(&self, loyalty_card_id: Uuid) -> LedgerResult<CardDetails>;

    /// Active rewards of a store.
    async fn fetch_rewards(&self, store_id: Uuid) -> LedgerResult<Vec<Reward>>;

    /// Directory lookup by email among a store's customers.
    ///
    /// `Ok(None)` when no customer with that email is registered at the
    /// store; a match without a card keeps `loyalty_card_id = None`.
    async fn find_customer(
        &self,
        store_id: Uuid,
        email: &str,
    ) -> LedgerResult<Option<CustomerMatch>>;

    /// Store owned by an auth user, if any (role resolution).
    async fn fetch_store_for_owner(&self, user_id: Uuid) -> LedgerResult<Option<Store>>;

    /// Loyalty card of an auth user, if any (role resolution).
    async fn fetch_card_for_user(&self, user_id: Uuid) -> LedgerResult<Option<LoyaltyCard>>;
}
