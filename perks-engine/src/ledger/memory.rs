//! In-process ledger
//!
//! Implements the ledger contract against in-memory tables, with the
//! backend's observable business rules: stamps never go negative, a
//! redemption needs enough stamps, an undo exactly reverses one prior
//! call. When wired to a [`MemoryHub`], successful mutations fan out the
//! same realtime events the hosted backend emits: a `stamp_update`
//! broadcast on the store's dashboard channel and a row update on the
//! customer's card channel.
//!
//! Used by tests, demos and offline development.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::realtime::MemoryHub;
use shared::models::{
    AnalyticsSnapshot, CardDetails, Customer, CustomerCardRow, CustomerMatch, CustomerSegments,
    Location, LoyaltyCard, Reward, SegmentCounts, Store, VisitStats,
};
use shared::realtime::{CardRowUpdate, ChannelEvent, StampUpdate};
use shared::realtime::{customer_card_topic, store_dashboard_topic};

use super::{LedgerClient, LedgerError, LedgerResult};

/// In-process ledger backed by in-memory tables
#[derive(Default)]
pub struct MemoryLedger {
    stores: DashMap<Uuid, Store>,
    locations: DashMap<Uuid, Location>,
    customers: DashMap<Uuid, Customer>,
    cards: DashMap<Uuid, LoyaltyCard>,
    rewards: DashMap<Uuid, Reward>,
    analytics: DashMap<Uuid, AnalyticsSnapshot>,
    segments: DashMap<Uuid, CustomerSegments>,
    hub: Option<MemoryHub>,
    /// Next mutating call fails with this message instead of applying
    inject_rejection: Mutex<Option<String>>,
    /// Simulated round-trip latency for mutating calls
    latency: Mutex<Option<std::time::Duration>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire a hub so mutations emit realtime events like the hosted
    /// backend does.
    pub fn with_hub(mut self, hub: MemoryHub) -> Self {
        self.hub = Some(hub);
        self
    }

    // ========== Seeding ==========

    pub fn seed_store(&self, store: Store) {
        self.stores.insert(store.id, store);
    }

    pub fn seed_location(&self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn seed_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn seed_card(&self, card: LoyaltyCard) {
        self.cards.insert(card.id, card);
    }

    pub fn seed_reward(&self, reward: Reward) {
        self.rewards.insert(reward.id, reward);
    }

    /// Signup shortcut: create a customer and their card at a location,
    /// the way the hosted signup flow does.
    pub fn register_customer(
        &self,
        location_id: Uuid,
        full_name: impl Into<String>,
        email: impl Into<String>,
        max_stamps: i32,
    ) -> (Customer, LoyaltyCard) {
        let customer = Customer {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            full_name: full_name.into(),
            email: Some(email.into()),
            referral_code: None,
        };
        let card = LoyaltyCard {
            id: Uuid::new_v4(),
            customer_id: customer.id,
            location_id,
            stamps: 0,
            max_stamps,
            created_at: shared::util::now_millis(),
        };
        self.seed_customer(customer.clone());
        self.seed_card(card.clone());
        (customer, card)
    }

    pub fn seed_analytics(&self, store_id: Uuid, snapshot: AnalyticsSnapshot) {
        self.analytics.insert(store_id, snapshot);
    }

    pub fn seed_segments(&self, store_id: Uuid, segments: CustomerSegments) {
        self.segments.insert(store_id, segments);
    }

    /// Make the next mutating call fail with `message` (test hook for
    /// backend rejections).
    pub fn reject_next(&self, message: impl Into<String>) {
        *self.inject_rejection.lock() = Some(message.into());
    }

    /// Add simulated latency to mutating calls (test hook for in-flight
    /// overlap).
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Current stamp count of a card (test inspection).
    pub fn stamps_of(&self, loyalty_card_id: Uuid) -> Option<i32> {
        self.cards.get(&loyalty_card_id).map(|c| c.stamps)
    }

    // ========== Internals ==========

    fn take_injected_rejection(&self) -> Option<String> {
        self.inject_rejection.lock().take()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn publish_card_update(&self, card: &LoyaltyCard, store_id: Uuid) {
        let Some(hub) = &self.hub else {
            return;
        };
        hub.publish(
            &store_dashboard_topic(store_id),
            ChannelEvent::stamp_update(StampUpdate {
                id: card.id,
                stamps: card.stamps,
            }),
        );
        hub.publish(
            &customer_card_topic(card.customer_id),
            ChannelEvent::RowUpdate(CardRowUpdate {
                id: card.id,
                customer_id: card.customer_id,
                stamps: card.stamps,
                max_stamps: card.max_stamps,
            }),
        );
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn add_stamp(
        &self,
        loyalty_card_id: Uuid,
        store_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()> {
        self.simulate_latency().await;
        if let Some(message) = self.take_injected_rejection() {
            return Err(LedgerError::Rejected(message));
        }

        let updated = {
            let mut card = self
                .cards
                .get_mut(&loyalty_card_id)
                .ok_or_else(|| LedgerError::NotFound("Loyalty card not found".to_string()))?;
            if undo {
                if card.stamps == 0 {
                    return Err(LedgerError::Rejected("Nothing to undo".to_string()));
                }
                card.stamps -= 1;
            } else {
                card.stamps += 1;
            }
            card.clone()
        };

        self.publish_card_update(&updated, store_id);
        Ok(())
    }

    async fn redeem_reward(
        &self,
        loyalty_card_id: Uuid,
        reward_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()> {
        self.simulate_latency().await;
        if let Some(message) = self.take_injected_rejection() {
            return Err(LedgerError::Rejected(message));
        }

        let required = self
            .rewards
            .get(&reward_id)
            .ok_or_else(|| LedgerError::NotFound("Reward not found".to_string()))?
            .stamps_required;

        let (updated, store_id) = {
            let mut card = self
                .cards
                .get_mut(&loyalty_card_id)
                .ok_or_else(|| LedgerError::NotFound("Loyalty card not found".to_string()))?;
            if undo {
                card.stamps += required;
            } else {
                if card.stamps < required {
                    return Err(LedgerError::Rejected(
                        "Insufficient stamps for this reward".to_string(),
                    ));
                }
                card.stamps -= required;
            }
            let store_id = self
                .locations
                .get(&card.location_id)
                .map(|l| l.store_id)
                .unwrap_or_default();
            (card.clone(), store_id)
        };

        self.publish_card_update(&updated, store_id);
        Ok(())
    }

    async fn fetch_analytics(&self, store_id: Uuid) -> LedgerResult<AnalyticsSnapshot> {
        Ok(self
            .analytics
            .get(&store_id)
            .map(|s| s.clone())
            .unwrap_or(AnalyticsSnapshot {
                total_customers: 0,
                repeat_customers: 0,
                stamps_issued: 0,
                prizes_redeemed: 0,
                avg_visit_frequency: 0.0,
                top_customer: None,
                referral_signups: 0,
                top_referrer: None,
                is_live: false,
            }))
    }

    async fn fetch_customer_segments(&self, store_id: Uuid) -> LedgerResult<CustomerSegments> {
        Ok(self
            .segments
            .get(&store_id)
            .map(|s| s.clone())
            .unwrap_or(CustomerSegments {
                segments: SegmentCounts {
                    new: 0,
                    loyal: 0,
                    vips: 0,
                    at_risk: 0,
                },
                visit_stats: VisitStats {
                    total_visits: 0,
                    avg_visits_per_customer: 0.0,
                },
            }))
    }

    async fn fetch_roster(&self, location_id: Uuid) -> LedgerResult<Vec<CustomerCardRow>> {
        let mut rows = Vec::new();
        for card in self.cards.iter() {
            if card.location_id != location_id {
                continue;
            }
            let Some(customer) = self.customers.get(&card.customer_id) else {
                continue;
            };
            rows.push(CustomerCardRow {
                loyalty_card_id: card.id,
                customer_id: customer.id,
                full_name: customer.full_name.clone(),
                stamps: card.stamps,
                max_stamps: card.max_stamps,
            });
        }
        Ok(rows)
    }

    async fn fetch_card(&self, loyalty_card_id: Uuid) -> LedgerResult<CardDetails> {
        let card = self
            .cards
            .get(&loyalty_card_id)
            .map(|c| c.clone())
            .ok_or_else(|| {
                LedgerError::NotFound(
                    "No Loyalty Card Found. Please sign up using a valid QR code from a store."
                        .to_string(),
                )
            })?;
        let customer = self
            .customers
            .get(&card.customer_id)
            .map(|c| c.clone())
            .ok_or_else(|| LedgerError::NotFound("Customer profile not found".to_string()))?;
        let location = self
            .locations
            .get(&card.location_id)
            .map(|l| l.clone())
            .ok_or_else(|| LedgerError::NotFound("Location not found".to_string()))?;
        let store = self
            .stores
            .get(&location.store_id)
            .map(|s| s.clone())
            .ok_or_else(|| LedgerError::NotFound("Store not found".to_string()))?;

        Ok(CardDetails {
            card,
            customer,
            location,
            store,
        })
    }

    async fn fetch_rewards(&self, store_id: Uuid) -> LedgerResult<Vec<Reward>> {
        let mut rewards: Vec<Reward> = self
            .rewards
            .iter()
            .filter(|r| r.store_id == store_id && r.is_active)
            .map(|r| r.clone())
            .collect();
        rewards.sort_by_key(|r| r.stamps_required);
        Ok(rewards)
    }

    async fn find_customer(
        &self,
        store_id: Uuid,
        email: &str,
    ) -> LedgerResult<Option<CustomerMatch>> {
        let location_ids: Vec<Uuid> = self
            .locations
            .iter()
            .filter(|l| l.store_id == store_id)
            .map(|l| l.id)
            .collect();

        // Email match first, card lookup second: a customer with an
        // account but no card at this store still counts as found.
        let matched = self.customers.iter().find_map(|customer| {
            let customer_email = customer.email.as_ref()?;
            customer_email
                .eq_ignore_ascii_case(email)
                .then(|| (customer.id, customer.full_name.clone(), customer_email.clone()))
        });
        let Some((customer_id, full_name, email)) = matched else {
            return Ok(None);
        };

        let loyalty_card_id = self
            .cards
            .iter()
            .find(|card| {
                card.customer_id == customer_id && location_ids.contains(&card.location_id)
            })
            .map(|card| card.id);

        Ok(Some(CustomerMatch {
            customer_id,
            full_name,
            email,
            loyalty_card_id,
        }))
    }

    async fn fetch_store_for_owner(&self, user_id: Uuid) -> LedgerResult<Option<Store>> {
        Ok(self
            .stores
            .iter()
            .find(|s| s.owner_id == user_id)
            .map(|s| s.clone()))
    }

    async fn fetch_card_for_user(&self, user_id: Uuid) -> LedgerResult<Option<LoyaltyCard>> {
        let Some(customer) = self.customers.iter().find(|c| c.user_id == user_id) else {
            return Ok(None);
        };
        let customer_id = customer.id;
        drop(customer);
        Ok(self
            .cards
            .iter()
            .find(|c| c.customer_id == customer_id)
            .map(|c| c.clone()))
    }
}
