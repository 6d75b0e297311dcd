//! Loyalty Card Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Customer, Location, Store};

/// Loyalty card row
///
/// `stamps` is only ever mutated through the remote stamp/redeem
/// endpoints; the engine never writes this field directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyCard {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub location_id: Uuid,
    pub stamps: i32,
    pub max_stamps: i32,
    pub created_at: i64,
}

impl LoyaltyCard {
    pub fn is_full(&self) -> bool {
        self.max_stamps > 0 && self.stamps >= self.max_stamps
    }
}

/// One roster row on the store dashboard (card joined with its customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCardRow {
    pub loyalty_card_id: Uuid,
    pub customer_id: Uuid,
    pub full_name: String,
    pub stamps: i32,
    pub max_stamps: i32,
}

/// Fully resolved card for the customer-facing view: the card plus the
/// customer, location (card design) and store it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub card: LoyaltyCard,
    pub customer: Customer,
    pub location: Location,
    pub store: Store,
}
