//! Customer Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    /// Auth-provider user id this profile is linked to
    pub user_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    /// Unique code used to build referral links
    pub referral_code: Option<String>,
}

/// Result of a customer directory lookup (manual stamp flow).
///
/// `loyalty_card_id` is `None` when the customer has an account but never
/// signed up through this store's QR code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerMatch {
    pub customer_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub loyalty_card_id: Option<Uuid>,
}
