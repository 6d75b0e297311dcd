//! Location Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Location entity
///
/// A location is the unit a signup QR code encodes; every loyalty card
/// belongs to exactly one location. Card design attributes live here so
/// each location can brand the customer-facing card independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub card_bg_color: Option<String>,
    pub card_text_color: Option<String>,
    pub card_stamp_color: Option<String>,
    pub logo_url: Option<String>,
}
