//! Customer Card Session
//!
//! The customer-facing workflow: load the card with its store branding,
//! offer redeemable rewards, and keep the displayed count in sync with
//! server pushes.
//!
//! While mounted, the session holds two channel subscriptions: its own
//! card channel (row-update pushes) and the store's dashboard channel,
//! where it tracks presence so the operator sees a live entry. Both are
//! scoped resources released on [`close`](CardSession::close).

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::actions::{ActionTarget, ActionTracker};
use crate::core::Config;
use crate::ledger::LedgerClient;
use crate::realtime::{RealtimeTransport, Subscription};
use crate::utils::{AppError, AppResult};
use shared::models::{CardDetails, Reward};
use shared::realtime::{
    ChannelEvent, PresenceMeta, customer_card_topic, store_dashboard_topic,
};

/// Session for one customer's loyalty card view
pub struct CardSession {
    ledger: Arc<dyn LedgerClient>,
    loyalty_card_id: Uuid,
    details: RwLock<Option<CardDetails>>,
    rewards: RwLock<Vec<Reward>>,
    actions: Mutex<ActionTracker>,
    card_channel: Mutex<Option<Subscription>>,
    presence_channel: Mutex<Option<Subscription>>,
}

impl CardSession {
    pub fn new(config: &Config, ledger: Arc<dyn LedgerClient>, loyalty_card_id: Uuid) -> Self {
        Self {
            ledger,
            loyalty_card_id,
            details: RwLock::new(None),
            rewards: RwLock::new(Vec::new()),
            actions: Mutex::new(ActionTracker::new(config.undo_window())),
            card_channel: Mutex::new(None),
            presence_channel: Mutex::new(None),
        }
    }

    pub fn loyalty_card_id(&self) -> Uuid {
        self.loyalty_card_id
    }

    /// Fetch the card and the store's active rewards.
    ///
    /// A missing card is a hard error (the view shows it); a failed
    /// rewards fetch only logs, like the source of record it decorates.
    pub async fn load(&self) -> AppResult<CardDetails> {
        let details = self.ledger.fetch_card(self.loyalty_card_id).await?;

        match self.ledger.fetch_rewards(details.store.id).await {
            Ok(rewards) => *self.rewards.write() = rewards,
            Err(err) => tracing::warn!(error = %err, "Rewards fetch failed"),
        }

        *self.details.write() = Some(details.clone());
        Ok(details)
    }

    /// Subscribe to the card's row-update channel and announce presence
    /// on the store's dashboard channel. Requires a prior
    /// [`load`](Self::load).
    pub async fn connect(&self, transport: &dyn RealtimeTransport) -> AppResult<()> {
        let (customer, store_id, stamps, max_stamps) = {
            let guard = self.details.read();
            let details = guard
                .as_ref()
                .ok_or_else(|| AppError::conflict("Card not loaded"))?;
            (
                details.customer.clone(),
                details.store.id,
                details.card.stamps,
                details.card.max_stamps,
            )
        };
        if self.card_channel.lock().is_some() {
            return Err(AppError::conflict("Card view already connected"));
        }

        let card_channel = transport
            .subscribe(&customer_card_topic(customer.id))
            .await?;

        let presence_channel = match transport
            .subscribe(&store_dashboard_topic(store_id))
            .await
        {
            Ok(channel) => channel,
            Err(err) => {
                // Acquire both or neither
                drop(card_channel);
                return Err(err.into());
            }
        };
        presence_channel.track(PresenceMeta::viewer(
            customer.user_id,
            self.loyalty_card_id,
            customer.full_name.clone(),
            stamps,
            max_stamps,
        ));

        *self.card_channel.lock() = Some(card_channel);
        *self.presence_channel.lock() = Some(presence_channel);
        Ok(())
    }

    /// Release both channel subscriptions. Mandatory on teardown.
    pub fn close(&self) {
        if let Some(mut channel) = self.card_channel.lock().take() {
            channel.leave();
        }
        if let Some(mut channel) = self.presence_channel.lock().take() {
            channel.leave();
        }
    }

    /// Redeem a reward for this card. The control is gated by
    /// [`redeemable_rewards`](Self::redeemable_rewards); the backend
    /// still has the final word.
    pub async fn redeem(&self, reward_id: Uuid) -> AppResult<()> {
        let target = ActionTarget::redeem(self.loyalty_card_id, reward_id);
        self.actions
            .lock()
            .begin(target.clone())
            .map_err(|err| AppError::conflict(err.to_string()))?;

        match self
            .ledger
            .redeem_reward(self.loyalty_card_id, reward_id, false)
            .await
        {
            Ok(()) => {
                self.actions.lock().settle_complete(&target);
                if let Err(err) = self.load().await {
                    tracing::warn!(error = %err, "Re-fetch after redeem failed");
                }
                Ok(())
            }
            Err(err) => {
                self.actions.lock().settle_failure(&target);
                Err(err.into())
            }
        }
    }

    /// Apply one channel event.
    ///
    /// A row update for this card shows the pushed count immediately,
    /// then re-fetches the full record; updates for other rows and
    /// presence noise are ignored.
    pub async fn handle_event(&self, event: &ChannelEvent) {
        let ChannelEvent::RowUpdate(update) = event else {
            return;
        };
        if update.id != self.loyalty_card_id {
            return;
        }

        {
            let mut guard = self.details.write();
            if let Some(details) = guard.as_mut() {
                details.card.stamps = update.stamps;
            }
        }
        if let Err(err) = self.load().await {
            tracing::warn!(error = %err, "Re-fetch after row update failed");
        }
    }

    /// Drain and apply every already-delivered channel event.
    pub async fn pump_events(&self) {
        let mut drained = Vec::new();
        {
            let mut guard = self.card_channel.lock();
            if let Some(channel) = guard.as_mut() {
                while let Some(event) = channel.try_recv() {
                    drained.push(event);
                }
            }
        }
        {
            // Presence traffic on the store channel is not this view's
            // concern; drain it so the buffer never backs up
            let mut guard = self.presence_channel.lock();
            if let Some(channel) = guard.as_mut() {
                while channel.try_recv().is_some() {}
            }
        }
        for event in drained {
            self.handle_event(&event).await;
        }
    }

    /// Event loop until shutdown or channel teardown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let taken = self.card_channel.lock().take();
        let Some(mut card_channel) = taken else {
            tracing::warn!("Card run() without an active subscription");
            return;
        };
        let presence_taken = self.presence_channel.lock().take();
        let Some(mut presence_channel) = presence_taken else {
            tracing::warn!("Card run() without a presence subscription");
            return;
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    card_channel.leave();
                    presence_channel.leave();
                    break;
                }
                event = card_channel.recv() => match event {
                    Some(event) => self.handle_event(&event).await,
                    None => {
                        tracing::warn!("Card channel closed");
                        presence_channel.leave();
                        break;
                    }
                },
                event = presence_channel.recv() => {
                    // Keep draining; nothing to apply here
                    if event.is_none() {
                        tracing::warn!("Store channel closed");
                        card_channel.leave();
                        break;
                    }
                }
            }
        }
    }

    // ========== View accessors ==========

    pub fn details(&self) -> Option<CardDetails> {
        self.details.read().clone()
    }

    /// Last server-confirmed stamp count.
    pub fn stamps(&self) -> Option<i32> {
        self.details.read().as_ref().map(|d| d.card.stamps)
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.rewards.read().clone()
    }

    /// Rewards offered at the current confirmed count.
    pub fn redeemable_rewards(&self) -> Vec<Reward> {
        let Some(stamps) = self.stamps() else {
            return Vec::new();
        };
        self.rewards
            .read()
            .iter()
            .filter(|r| r.is_redeemable_with(stamps))
            .cloned()
            .collect()
    }

    /// Whether the redeem control for a reward should show its spinner.
    pub fn is_redeeming(&self, reward_id: Uuid) -> bool {
        let target = ActionTarget::redeem(self.loyalty_card_id, reward_id);
        self.actions.lock().is_busy(&target, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::realtime::MemoryHub;
    use shared::models::{Customer, Location, LoyaltyCard, Store, SubscriptionStatus};
    use shared::realtime::CardRowUpdate;

    struct Fixture {
        session: Arc<CardSession>,
        ledger: Arc<MemoryLedger>,
        hub: MemoryHub,
        card_id: Uuid,
        customer_id: Uuid,
        store_id: Uuid,
        reward_id: Uuid,
    }

    fn fixture(stamps: i32) -> Fixture {
        let hub = MemoryHub::new();
        let ledger = MemoryLedger::new().with_hub(hub.clone());

        let store_id = Uuid::new_v4();
        let location_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let card_id = Uuid::new_v4();
        let reward_id = Uuid::new_v4();

        ledger.seed_store(Store {
            id: store_id,
            store_name: "Puff Perks".to_string(),
            owner_id: Uuid::new_v4(),
            subscription_status: SubscriptionStatus::Active,
            trial_ends_at: None,
            referral_enabled: true,
            stripe_payment_link: None,
        });
        ledger.seed_location(Location {
            id: location_id,
            store_id,
            name: "Main St".to_string(),
            address: None,
            card_bg_color: Some("#111827".to_string()),
            card_text_color: None,
            card_stamp_color: None,
            logo_url: None,
        });
        ledger.seed_customer(Customer {
            id: customer_id,
            user_id: Uuid::new_v4(),
            full_name: "Alice".to_string(),
            email: Some("alice@example.com".to_string()),
            referral_code: Some("ALICE10".to_string()),
        });
        ledger.seed_card(LoyaltyCard {
            id: card_id,
            customer_id,
            location_id,
            stamps,
            max_stamps: 10,
            created_at: 0,
        });
        ledger.seed_reward(Reward {
            id: reward_id,
            store_id,
            stamps_required: 10,
            description: "Free coffee".to_string(),
            is_active: true,
        });

        let ledger = Arc::new(ledger);
        let session = Arc::new(CardSession::new(
            &Config::with_backend("http://unused.invalid"),
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            card_id,
        ));

        Fixture {
            session,
            ledger,
            hub,
            card_id,
            customer_id,
            store_id,
            reward_id,
        }
    }

    #[tokio::test]
    async fn test_load_resolves_card_and_rewards() {
        let f = fixture(4);
        let details = f.session.load().await.unwrap();
        assert_eq!(details.card.stamps, 4);
        assert_eq!(details.customer.full_name, "Alice");
        assert_eq!(details.store.store_name, "Puff Perks");
        assert_eq!(f.session.rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_card_is_not_found() {
        let f = fixture(4);
        let session = CardSession::new(
            &Config::with_backend("http://unused.invalid"),
            Arc::clone(&f.ledger) as Arc<dyn LedgerClient>,
            Uuid::new_v4(),
        );
        let err = session.load().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redeem_gating_at_threshold() {
        let f = fixture(8);
        f.session.load().await.unwrap();
        assert!(f.session.redeemable_rewards().is_empty());

        // Two stamps later (8 -> 10) the control appears
        f.ledger.add_stamp(f.card_id, f.store_id, false).await.unwrap();
        f.ledger.add_stamp(f.card_id, f.store_id, false).await.unwrap();
        f.session.load().await.unwrap();
        assert_eq!(f.session.redeemable_rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_success_refetches() {
        let f = fixture(10);
        f.session.load().await.unwrap();

        f.session.redeem(f.reward_id).await.unwrap();
        assert_eq!(f.session.stamps(), Some(0));
        assert!(!f.session.is_redeeming(f.reward_id));
    }

    #[tokio::test]
    async fn test_redeem_failure_surfaces_verbatim() {
        let f = fixture(8);
        f.session.load().await.unwrap();

        let err = f.session.redeem(f.reward_id).await.unwrap_err();
        assert_eq!(err.user_message(), "Insufficient stamps for this reward");
        assert_eq!(f.session.stamps(), Some(8));
    }

    #[tokio::test]
    async fn test_row_update_applies_push_then_refetch() {
        let f = fixture(4);
        f.session.load().await.unwrap();

        // Server truth moved to 5; the push carries the new row
        f.ledger.add_stamp(f.card_id, f.store_id, false).await.unwrap();
        f.session
            .handle_event(&ChannelEvent::RowUpdate(CardRowUpdate {
                id: f.card_id,
                customer_id: f.customer_id,
                stamps: 5,
                max_stamps: 10,
            }))
            .await;
        assert_eq!(f.session.stamps(), Some(5));
    }

    #[tokio::test]
    async fn test_row_update_for_other_card_ignored() {
        let f = fixture(4);
        f.session.load().await.unwrap();

        f.session
            .handle_event(&ChannelEvent::RowUpdate(CardRowUpdate {
                id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                stamps: 9,
                max_stamps: 10,
            }))
            .await;
        assert_eq!(f.session.stamps(), Some(4));
    }

    #[tokio::test]
    async fn test_connect_requires_load_and_close_releases() {
        let f = fixture(4);

        let err = f.session.connect(&f.hub).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        f.session.load().await.unwrap();
        f.session.connect(&f.hub).await.unwrap();

        let card_topic = customer_card_topic(f.customer_id);
        let store_topic = store_dashboard_topic(f.store_id);
        assert_eq!(f.hub.subscriber_count(&card_topic), 1);
        assert_eq!(f.hub.subscriber_count(&store_topic), 1);

        f.session.close();
        assert_eq!(f.hub.subscriber_count(&card_topic), 0);
        assert_eq!(f.hub.subscriber_count(&store_topic), 0);
    }
}
