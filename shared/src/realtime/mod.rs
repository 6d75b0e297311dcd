//! Realtime channel types
//!
//! These types are shared between the workflow engine and any realtime
//! transport implementation (in-process hub, network client).
//!
//! # Channels
//!
//! ```text
//! store-dashboard-{store_id}    presence (live viewers) + stamp_update broadcast
//! customer-card-{customer_id}   row-update pushes for that customer's card
//! ```

use uuid::Uuid;

pub mod payload;
pub use payload::*;

/// Topic of the per-store dashboard channel (presence + broadcasts).
pub fn store_dashboard_topic(store_id: Uuid) -> String {
    format!("store-dashboard-{store_id}")
}

/// Topic of the per-customer card channel (row-update pushes).
pub fn customer_card_topic(customer_id: Uuid) -> String {
    format!("customer-card-{customer_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_naming() {
        let id: Uuid = "6191c5b2-c451-4eeb-9be2-51ec2f4048c3".parse().unwrap();
        assert_eq!(
            store_dashboard_topic(id),
            "store-dashboard-6191c5b2-c451-4eeb-9be2-51ec2f4048c3"
        );
        assert_eq!(
            customer_card_topic(id),
            "customer-card-6191c5b2-c451-4eeb-9be2-51ec2f4048c3"
        );
    }
}
