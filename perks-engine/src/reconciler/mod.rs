//! Roster Reconciler
//!
//! View state for the dashboard's customer list. The one rule here: a
//! displayed stamp count only ever comes from a server-confirmed source -
//! a ledger fetch replacing the whole roster, or a realtime push carrying
//! the updated row. There is no API to increment a count locally, so an
//! optimistic UI cannot drift from server truth; it can only lag one
//! re-fetch behind it.

use shared::models::CustomerCardRow;
use shared::realtime::StampUpdate;
use std::collections::HashMap;
use uuid::Uuid;

/// Customer roster keyed by loyalty card id
#[derive(Debug, Default)]
pub struct Roster {
    cards: HashMap<Uuid, CustomerCardRow>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a freshly fetched snapshot.
    pub fn apply_fetch(&mut self, rows: Vec<CustomerCardRow>) {
        self.cards = rows
            .into_iter()
            .map(|row| (row.loyalty_card_id, row))
            .collect();
    }

    /// Merge a pushed stamp update for a known card.
    ///
    /// Updates for cards not in the roster are ignored: a push never
    /// creates a partial record.
    pub fn apply_stamp_update(&mut self, update: &StampUpdate) -> bool {
        match self.cards.get_mut(&update.id) {
            Some(row) => {
                row.stamps = update.stamps;
                true
            }
            None => false,
        }
    }

    pub fn stamps(&self, loyalty_card_id: Uuid) -> Option<i32> {
        self.cards.get(&loyalty_card_id).map(|row| row.stamps)
    }

    pub fn get(&self, loyalty_card_id: Uuid) -> Option<&CustomerCardRow> {
        self.cards.get(&loyalty_card_id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Rows sorted by customer name for display.
    pub fn rows(&self) -> Vec<CustomerCardRow> {
        let mut rows: Vec<CustomerCardRow> = self.cards.values().cloned().collect();
        rows.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        rows
    }
}
