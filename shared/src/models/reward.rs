//! Reward Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward entity
///
/// Read-only from the workflow's perspective: rewards gate whether
/// redemption is offered, the remote endpoint enforces the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub store_id: Uuid,
    pub stamps_required: i32,
    pub description: String,
    pub is_active: bool,
}

impl Reward {
    /// Whether redemption should be offered for a card holding `stamps`.
    pub fn is_redeemable_with(&self, stamps: i32) -> bool {
        self.is_active && stamps >= self.stamps_required
    }
}
