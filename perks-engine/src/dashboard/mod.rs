//! Store Dashboard Session
//!
//! The operator-facing workflow: live presence, the customer roster, and
//! the stamp/redeem actions with their undo windows.
//!
//! # Event Flow
//!
//! ```text
//! operator action ──► ActionTracker(begin) ──► LedgerClient call
//!        │                                          │
//!        │                        success: undo window opens,
//!        │                        roster re-fetched (never incremented)
//!        │                        failure: back to Idle, error verbatim
//!        ▼
//! realtime channel ──► PresenceSynchronizer ──► live badge update
//!                               │
//!                        stamp_update ──► silent roster + analytics re-fetch
//! ```
//!
//! All remote calls are suspension points on one logical event loop; a
//! realtime push can arrive while an action is in flight. Displayed counts
//! therefore only ever come from server-confirmed values, and the tracker
//! serializes mutating calls per action target.

#[cfg(test)]
mod tests;

use chrono::Datelike;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::actions::{ActionTarget, ActionTracker};
use crate::core::Config;
use crate::ledger::LedgerClient;
use crate::realtime::{
    PresenceEntry, PresenceSynchronizer, RealtimeTransport, Subscription, SyncOutcome,
};
use crate::reconciler::Roster;
use crate::tasks::{BackgroundTasks, TaskKind};
use crate::utils::{AppError, AppResult};
use shared::models::{
    AnalyticsSnapshot, CustomerCardRow, CustomerSegments, Reward, StoreHours, store_hours,
};
use shared::realtime::{ChannelEvent, PresenceMeta, store_dashboard_topic};

/// Identity of the store page one session serves
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub store_id: Uuid,
    pub location_id: Uuid,
    /// Auth user id of the operator (their own presence entry is filtered
    /// out of the live view)
    pub operator_id: Uuid,
    /// Operating hours gating the silent auto-refresh
    pub store_hours: Vec<StoreHours>,
}

/// Operator session for one store dashboard
pub struct DashboardSession {
    config: Config,
    ctx: StoreContext,
    ledger: Arc<dyn LedgerClient>,
    actions: Mutex<ActionTracker>,
    synchronizer: Mutex<PresenceSynchronizer>,
    roster: RwLock<Roster>,
    rewards: RwLock<Vec<Reward>>,
    analytics: RwLock<Option<AnalyticsSnapshot>>,
    segments: RwLock<Option<CustomerSegments>>,
    subscription: Mutex<Option<Subscription>>,
}

impl DashboardSession {
    pub fn new(config: Config, ctx: StoreContext, ledger: Arc<dyn LedgerClient>) -> Self {
        let undo_window = config.undo_window();
        let operator_id = ctx.operator_id;
        Self {
            config,
            ctx,
            ledger,
            actions: Mutex::new(ActionTracker::new(undo_window)),
            synchronizer: Mutex::new(PresenceSynchronizer::new(operator_id)),
            roster: RwLock::new(Roster::new()),
            rewards: RwLock::new(Vec::new()),
            analytics: RwLock::new(None),
            segments: RwLock::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    // ========== Channel lifecycle ==========

    /// Subscribe to the store's realtime channel and track the operator's
    /// presence. One subscription per mounted dashboard.
    pub async fn connect(&self, transport: &dyn RealtimeTransport) -> AppResult<()> {
        if self.subscription.lock().is_some() {
            return Err(AppError::conflict("Dashboard already connected"));
        }
        self.synchronizer.lock().mark_subscribing();

        let topic = store_dashboard_topic(self.ctx.store_id);
        let subscription = match transport.subscribe(&topic).await {
            Ok(subscription) => subscription,
            Err(err) => {
                self.synchronizer.lock().mark_disconnected();
                return Err(err.into());
            }
        };
        subscription.track(PresenceMeta::owner(self.ctx.operator_id));

        self.synchronizer.lock().mark_subscribed();
        *self.subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Release the channel subscription. Mandatory on teardown; also
    /// invoked by [`run`](Self::run) on shutdown.
    pub fn disconnect(&self) {
        if let Some(mut subscription) = self.subscription.lock().take() {
            subscription.leave();
        }
        self.synchronizer.lock().mark_disconnected();
    }

    // ========== Fetches ==========

    /// Fetch the roster, rewards, analytics and segments.
    ///
    /// The roster is the authoritative list, so its failure propagates;
    /// analytics and segments are decoration and fail soft.
    pub async fn refresh(&self) -> AppResult<()> {
        let rows = self.ledger.fetch_roster(self.ctx.location_id).await?;
        self.roster.write().apply_fetch(rows);

        match self.ledger.fetch_rewards(self.ctx.store_id).await {
            Ok(rewards) => *self.rewards.write() = rewards,
            Err(err) => tracing::warn!(error = %err, "Rewards fetch failed"),
        }
        match self.ledger.fetch_analytics(self.ctx.store_id).await {
            Ok(snapshot) => *self.analytics.write() = Some(snapshot),
            Err(err) => tracing::warn!(error = %err, "Analytics fetch failed"),
        }
        match self.ledger.fetch_customer_segments(self.ctx.store_id).await {
            Ok(segments) => *self.segments.write() = Some(segments),
            Err(err) => tracing::warn!(error = %err, "Segments fetch failed"),
        }
        Ok(())
    }

    /// Background variant of [`refresh`](Self::refresh): failures are
    /// logged, never surfaced.
    pub async fn refresh_silent(&self) {
        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "Silent refresh failed");
        }
    }

    // ========== Actions ==========

    /// Add one stamp to a card. On success the undo window opens and the
    /// roster re-fetches; the displayed count is never incremented
    /// locally.
    pub async fn add_stamp(&self, loyalty_card_id: Uuid) -> AppResult<()> {
        let target = ActionTarget::add_stamp(loyalty_card_id);
        self.begin(&target)?;

        match self
            .ledger
            .add_stamp(loyalty_card_id, self.ctx.store_id, false)
            .await
        {
            Ok(()) => {
                self.actions.lock().settle_success(&target, Instant::now());
                self.refresh_silent().await;
                Ok(())
            }
            Err(err) => {
                self.actions.lock().settle_failure(&target);
                Err(err.into())
            }
        }
    }

    /// Reverse the stamp added by the last successful
    /// [`add_stamp`](Self::add_stamp), while its undo window is open.
    ///
    /// Whatever the compensating call returns, the window stays closed -
    /// a failed undo is reported, not retried.
    pub async fn undo_add_stamp(&self, loyalty_card_id: Uuid) -> AppResult<()> {
        let target = ActionTarget::add_stamp(loyalty_card_id);
        self.begin_undo(&target)?;

        let result = self
            .ledger
            .add_stamp(loyalty_card_id, self.ctx.store_id, true)
            .await;
        self.actions.lock().settle_undo(&target);

        match result {
            Ok(()) => {
                self.refresh_silent().await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(card_id = %loyalty_card_id, error = %err, "Undo call failed");
                Err(err.into())
            }
        }
    }

    /// Redeem a reward for a card. Same lifecycle as
    /// [`add_stamp`](Self::add_stamp), tracked per (card, reward) target.
    pub async fn redeem_reward(&self, loyalty_card_id: Uuid, reward_id: Uuid) -> AppResult<()> {
        let target = ActionTarget::redeem(loyalty_card_id, reward_id);
        self.begin(&target)?;

        match self
            .ledger
            .redeem_reward(loyalty_card_id, reward_id, false)
            .await
        {
            Ok(()) => {
                self.actions.lock().settle_success(&target, Instant::now());
                self.refresh_silent().await;
                Ok(())
            }
            Err(err) => {
                self.actions.lock().settle_failure(&target);
                Err(err.into())
            }
        }
    }

    /// Reverse a redemption while its undo window is open.
    pub async fn undo_redeem(&self, loyalty_card_id: Uuid, reward_id: Uuid) -> AppResult<()> {
        let target = ActionTarget::redeem(loyalty_card_id, reward_id);
        self.begin_undo(&target)?;

        let result = self
            .ledger
            .redeem_reward(loyalty_card_id, reward_id, true)
            .await;
        self.actions.lock().settle_undo(&target);

        match result {
            Ok(()) => {
                self.refresh_silent().await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(card_id = %loyalty_card_id, error = %err, "Undo call failed");
                Err(err.into())
            }
        }
    }

    /// Manual stamp flow: look the customer up by email, then apply
    /// `count` stamps as independent invocations.
    ///
    /// The invocations run in parallel; on a partial failure the first
    /// error is reported and the stamps that already landed stay applied.
    /// Returns how many were applied.
    pub async fn add_stamps_manually(&self, email: &str, count: u32) -> AppResult<u32> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::validation("Please enter an email address"));
        }
        if count == 0 {
            return Err(AppError::validation("Stamp count must be at least 1"));
        }

        let found = self
            .ledger
            .find_customer(self.ctx.store_id, email)
            .await?
            .ok_or_else(|| {
                AppError::not_found("No customer with this email is registered at your store")
            })?;
        let card_id = found.loyalty_card_id.ok_or_else(|| {
            AppError::not_found("No loyalty card found for this customer")
        })?;

        // N independent invocations, not one batched call
        let calls =
            (0..count).map(|_| self.ledger.add_stamp(card_id, self.ctx.store_id, false));
        let results = futures::future::join_all(calls).await;
        let applied = results.iter().filter(|r| r.is_ok()).count() as u32;
        let first_error = results.into_iter().find_map(Result::err);

        self.refresh_silent().await;

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(applied),
        }
    }

    // ========== Realtime ==========

    /// Apply one channel event.
    pub async fn handle_event(&self, event: &ChannelEvent) {
        let outcome = self.synchronizer.lock().handle_event(event);
        if let SyncOutcome::StampUpdate { .. } = outcome {
            // The live badge updated in place; the roster shows the pushed
            // row immediately and the re-fetch stays authoritative.
            if let Some(update) = event.as_stamp_update() {
                self.roster.write().apply_stamp_update(&update);
            }
            self.refresh_silent().await;
        }
    }

    /// Drain and apply every already-delivered channel event.
    pub async fn pump_events(&self) {
        let mut drained = Vec::new();
        {
            let mut guard = self.subscription.lock();
            if let Some(subscription) = guard.as_mut() {
                while let Some(event) = subscription.try_recv() {
                    drained.push(event);
                }
            }
        }
        for event in drained {
            self.handle_event(&event).await;
        }
    }

    /// Close undo windows whose deadline has passed.
    pub fn expire_undo_windows(&self) -> Vec<ActionTarget> {
        self.actions.lock().expire(Instant::now())
    }

    /// Event loop: channel events, undo-window expiry, and the silent
    /// roster refresh while the store is open. Runs until shutdown or
    /// until the channel is gone (no automatic resubscribe).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let taken = self.subscription.lock().take();
        let Some(mut subscription) = taken else {
            tracing::warn!("Dashboard run() without an active subscription");
            return;
        };

        let mut refresh = tokio::time::interval(self.config.roster_refresh_interval());
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        refresh.tick().await; // the first tick completes immediately

        loop {
            let next_deadline = self.actions.lock().next_deadline();
            tokio::select! {
                _ = shutdown.cancelled() => {
                    subscription.leave();
                    self.synchronizer.lock().mark_disconnected();
                    break;
                }
                event = subscription.recv() => match event {
                    Some(event) => self.handle_event(&event).await,
                    None => {
                        tracing::warn!("Dashboard channel closed");
                        self.synchronizer.lock().mark_disconnected();
                        break;
                    }
                },
                _ = sleep_until_opt(next_deadline) => {
                    self.expire_undo_windows();
                }
                _ = refresh.tick() => {
                    if self.should_auto_refresh() {
                        self.refresh_silent().await;
                    }
                }
            }
        }
    }

    /// Register the event loop on a task registry.
    pub fn spawn_into(self: &Arc<Self>, tasks: &mut BackgroundTasks) {
        let session = Arc::clone(self);
        let token = tasks.shutdown_token();
        tasks.spawn("dashboard_events", TaskKind::Listener, async move {
            session.run(token).await;
        });
    }

    // ========== View accessors ==========

    /// Whether the silent refresh should run right now, per store hours.
    pub fn should_auto_refresh(&self) -> bool {
        let now = chrono::Local::now();
        let day = now.weekday().num_days_from_sunday() as u8;
        store_hours::is_open_at(&self.ctx.store_hours, day, now.time())
    }

    pub fn presence_entries(&self) -> Vec<PresenceEntry> {
        self.synchronizer.lock().presence().entries().to_vec()
    }

    pub fn roster_rows(&self) -> Vec<CustomerCardRow> {
        self.roster.read().rows()
    }

    /// Last server-confirmed stamp count for a card.
    pub fn stamps_for(&self, loyalty_card_id: Uuid) -> Option<i32> {
        self.roster.read().stamps(loyalty_card_id)
    }

    pub fn analytics(&self) -> Option<AnalyticsSnapshot> {
        self.analytics.read().clone()
    }

    pub fn segments(&self) -> Option<CustomerSegments> {
        self.segments.read().clone()
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.rewards.read().clone()
    }

    /// Rewards currently offered for a card, by its confirmed count.
    pub fn redeemable_rewards(&self, loyalty_card_id: Uuid) -> Vec<Reward> {
        let Some(stamps) = self.stamps_for(loyalty_card_id) else {
            return Vec::new();
        };
        self.rewards
            .read()
            .iter()
            .filter(|r| r.is_redeemable_with(stamps))
            .cloned()
            .collect()
    }

    /// Whether the add-stamp control should show its spinner.
    pub fn is_adding(&self, loyalty_card_id: Uuid) -> bool {
        let target = ActionTarget::add_stamp(loyalty_card_id);
        self.actions.lock().is_busy(&target, Instant::now())
    }

    /// Whether the undo control should be offered for a card's last add.
    pub fn can_undo_add(&self, loyalty_card_id: Uuid) -> bool {
        let target = ActionTarget::add_stamp(loyalty_card_id);
        self.actions.lock().can_undo(&target, Instant::now())
    }

    // ========== Internals ==========

    fn begin(&self, target: &ActionTarget) -> AppResult<()> {
        self.actions
            .lock()
            .begin(target.clone())
            .map_err(|err| AppError::conflict(err.to_string()))
    }

    fn begin_undo(&self, target: &ActionTarget) -> AppResult<()> {
        self.actions
            .lock()
            .begin_undo(target, Instant::now())
            .map_err(|err| AppError::conflict(err.to_string()))
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}
