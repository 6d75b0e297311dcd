//! Store Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription lifecycle as reported by the billing backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

/// Store entity
///
/// One store owns many locations and rewards; customers reference it
/// indirectly through the location their signup QR code encodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub store_name: String,
    pub owner_id: Uuid,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub referral_enabled: bool,
    pub stripe_payment_link: Option<String>,
}

impl Store {
    pub fn is_trialing(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Trialing
    }

    /// Whole days left in the trial, clamped at zero.
    ///
    /// `None` when the store has no trial end date (paid plans).
    pub fn trial_days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        let ends_at = self.trial_ends_at?;
        let remaining = ends_at.signed_duration_since(now);
        Some(remaining.num_days().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_store(trial_ends_at: Option<DateTime<Utc>>) -> Store {
        Store {
            id: Uuid::new_v4(),
            store_name: "Test Store".to_string(),
            owner_id: Uuid::new_v4(),
            subscription_status: SubscriptionStatus::Trialing,
            trial_ends_at,
            referral_enabled: false,
            stripe_payment_link: None,
        }
    }

    #[test]
    fn test_trial_days_left_counts_down() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let ends = Utc.with_ymd_and_hms(2025, 6, 8, 12, 0, 0).unwrap();
        let store = make_store(Some(ends));
        assert_eq!(store.trial_days_left(now), Some(7));
    }

    #[test]
    fn test_trial_days_left_clamps_at_zero() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap();
        let ends = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let store = make_store(Some(ends));
        assert_eq!(store.trial_days_left(now), Some(0));
    }

    #[test]
    fn test_trial_days_left_none_without_trial() {
        let store = make_store(None);
        assert_eq!(store.trial_days_left(Utc::now()), None);
    }

    #[test]
    fn test_subscription_status_serde() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
        let back: SubscriptionStatus = serde_json::from_str("\"trialing\"").unwrap();
        assert_eq!(back, SubscriptionStatus::Trialing);
    }
}
