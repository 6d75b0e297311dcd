//! Presence Synchronizer
//!
//! Maintains the dashboard's live view of customers currently looking at
//! their card, and merges server-pushed stamp updates into it.
//!
//! On every presence event the set is rebuilt from the full snapshot: the
//! operator's own entry is excluded, only viewers carrying a loyalty card
//! id are kept, and at most one entry survives per distinct card.

use shared::realtime::{ChannelEvent, PresenceState, StampUpdate};
use std::collections::HashSet;
use uuid::Uuid;

use super::ChannelState;

/// One live viewer on the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub loyalty_card_id: Uuid,
    pub name: Option<String>,
    pub stamps: i32,
    pub max_stamps: i32,
}

/// The set of live viewers, rebuilt wholesale on each presence event
#[derive(Debug, Default)]
pub struct PresenceSet {
    entries: Vec<PresenceEntry>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a full presence snapshot.
    ///
    /// Filters out `self_user` (the operator tracks presence too) and any
    /// meta without a card id; keeps one entry per distinct card.
    pub fn rebuild(state: &PresenceState, self_user: Uuid) -> Self {
        let mut entries = Vec::new();
        let mut seen_cards = HashSet::new();

        for metas in state.values() {
            let viewer = metas
                .iter()
                .find_map(|m| {
                    let card_id = m.loyalty_card_id?;
                    (m.user_id != self_user).then_some((m, card_id))
                });
            let Some((meta, card_id)) = viewer else {
                continue;
            };
            if !seen_cards.insert(card_id) {
                continue;
            }
            entries.push(PresenceEntry {
                user_id: meta.user_id,
                loyalty_card_id: card_id,
                name: meta.name.clone(),
                stamps: meta.stamps.unwrap_or(0),
                max_stamps: meta.max_stamps.unwrap_or(0),
            });
        }

        Self { entries }
    }

    /// Update the entry tracking `update.id` in place.
    ///
    /// Returns whether an entry matched; an update for an absent card
    /// changes nothing.
    pub fn apply_stamp_update(&mut self, update: &StampUpdate) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.loyalty_card_id == update.id)
        {
            Some(entry) => {
                entry.stamps = update.stamps;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[PresenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_by_card(&self, loyalty_card_id: Uuid) -> Option<&PresenceEntry> {
        self.entries
            .iter()
            .find(|e| e.loyalty_card_id == loyalty_card_id)
    }
}

/// What a handled event means for the owning view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing the view cares about
    None,
    /// The live viewer set changed
    PresenceChanged,
    /// A stamp update arrived; the authoritative roster should re-fetch
    /// whether or not a live entry matched
    StampUpdate { merged: bool },
}

/// Per-channel presence state machine
#[derive(Debug)]
pub struct PresenceSynchronizer {
    self_user: Uuid,
    state: ChannelState,
    set: PresenceSet,
}

impl PresenceSynchronizer {
    pub fn new(self_user: Uuid) -> Self {
        Self {
            self_user,
            state: ChannelState::Disconnected,
            set: PresenceSet::new(),
        }
    }

    pub fn channel_state(&self) -> ChannelState {
        self.state
    }

    pub fn mark_subscribing(&mut self) {
        self.state = ChannelState::Subscribing;
    }

    pub fn mark_subscribed(&mut self) {
        self.state = ChannelState::Subscribed;
    }

    /// Teardown: the presence view is meaningless once unsubscribed.
    pub fn mark_disconnected(&mut self) {
        self.state = ChannelState::Disconnected;
        self.set = PresenceSet::new();
    }

    pub fn presence(&self) -> &PresenceSet {
        &self.set
    }

    /// Apply one channel event.
    pub fn handle_event(&mut self, event: &ChannelEvent) -> SyncOutcome {
        if let Some(state) = event.presence_state() {
            self.set = PresenceSet::rebuild(state, self.self_user);
            return SyncOutcome::PresenceChanged;
        }
        if let Some(update) = event.as_stamp_update() {
            let merged = self.set.apply_stamp_update(&update);
            if !merged {
                tracing::debug!(card_id = %update.id, "Stamp update for card not in presence set");
            }
            return SyncOutcome::StampUpdate { merged };
        }
        SyncOutcome::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::realtime::PresenceMeta;

    fn state_with(metas: Vec<PresenceMeta>) -> PresenceState {
        let mut state = PresenceState::new();
        for meta in metas {
            state
                .entry(meta.user_id.to_string())
                .or_default()
                .push(meta);
        }
        state
    }

    #[test]
    fn test_rebuild_excludes_operator() {
        let operator = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let state = state_with(vec![
            PresenceMeta::owner(operator),
            PresenceMeta::viewer(viewer, Uuid::new_v4(), "Alice", 4, 10),
        ]);

        let set = PresenceSet::rebuild(&state, operator);
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].user_id, viewer);
    }

    #[test]
    fn test_rebuild_skips_metas_without_card() {
        let operator = Uuid::new_v4();
        // Another owner-like participant with no card: not a live customer
        let state = state_with(vec![PresenceMeta::owner(Uuid::new_v4())]);
        let set = PresenceSet::rebuild(&state, operator);
        assert!(set.is_empty());
    }

    #[test]
    fn test_rebuild_one_entry_per_card() {
        let operator = Uuid::new_v4();
        let card = Uuid::new_v4();
        // Same card open in two browser sessions
        let state = state_with(vec![
            PresenceMeta::viewer(Uuid::new_v4(), card, "Alice", 4, 10),
            PresenceMeta::viewer(Uuid::new_v4(), card, "Alice", 4, 10),
        ]);

        let set = PresenceSet::rebuild(&state, operator);
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].loyalty_card_id, card);
    }

    #[test]
    fn test_stamp_update_merges_in_place() {
        let operator = Uuid::new_v4();
        let card = Uuid::new_v4();
        let state = state_with(vec![PresenceMeta::viewer(
            Uuid::new_v4(),
            card,
            "Alice",
            4,
            10,
        )]);
        let mut set = PresenceSet::rebuild(&state, operator);

        assert!(set.apply_stamp_update(&StampUpdate { id: card, stamps: 5 }));
        assert_eq!(set.get_by_card(card).unwrap().stamps, 5);
    }

    #[test]
    fn test_stamp_update_unknown_card_ignored() {
        let mut set = PresenceSet::new();
        let merged = set.apply_stamp_update(&StampUpdate {
            id: Uuid::new_v4(),
            stamps: 3,
        });
        assert!(!merged);
        assert!(set.is_empty());
    }

    #[test]
    fn test_synchronizer_presence_event_rebuilds() {
        let operator = Uuid::new_v4();
        let mut sync = PresenceSynchronizer::new(operator);
        sync.mark_subscribed();

        let card = Uuid::new_v4();
        let state = state_with(vec![
            PresenceMeta::owner(operator),
            PresenceMeta::viewer(Uuid::new_v4(), card, "Alice", 4, 10),
        ]);

        let outcome = sync.handle_event(&ChannelEvent::PresenceJoin(state.clone()));
        assert_eq!(outcome, SyncOutcome::PresenceChanged);
        assert_eq!(sync.presence().len(), 1);

        // A leave event with an empty snapshot clears the set
        let outcome = sync.handle_event(&ChannelEvent::PresenceLeave(PresenceState::new()));
        assert_eq!(outcome, SyncOutcome::PresenceChanged);
        assert!(sync.presence().is_empty());
    }

    #[test]
    fn test_synchronizer_stamp_update_signals_refetch_even_unmatched() {
        let mut sync = PresenceSynchronizer::new(Uuid::new_v4());
        sync.mark_subscribed();

        let outcome = sync.handle_event(&ChannelEvent::stamp_update(StampUpdate {
            id: Uuid::new_v4(),
            stamps: 7,
        }));
        // No live entry matched, but the roster still needs a re-fetch
        assert_eq!(outcome, SyncOutcome::StampUpdate { merged: false });
    }

    #[test]
    fn test_disconnect_clears_presence() {
        let operator = Uuid::new_v4();
        let mut sync = PresenceSynchronizer::new(operator);
        sync.mark_subscribed();
        let state = state_with(vec![PresenceMeta::viewer(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Alice",
            1,
            10,
        )]);
        sync.handle_event(&ChannelEvent::PresenceSync(state));
        assert_eq!(sync.presence().len(), 1);

        sync.mark_disconnected();
        assert_eq!(sync.channel_state(), ChannelState::Disconnected);
        assert!(sync.presence().is_empty());
    }
}
