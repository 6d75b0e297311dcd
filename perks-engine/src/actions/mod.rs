//! Action State Machine
//!
//! Tracks the lifecycle of stamp/redeem operations per action target: a
//! `(loyalty_card_id, kind)` pair. Each target moves through:
//!
//! ```text
//! Idle ──begin──► Pending ──settle_success──► UndoWindowOpen(deadline)
//!                    │                              │
//!              settle_failure                 begin_undo / expire
//!                    ▼                              ▼
//!                  Idle ◄──settle_undo── Pending (compensating)
//! ```
//!
//! Invariants:
//! - At most one call is in flight per target; `begin` while Pending is
//!   rejected, never queued.
//! - `begin_undo` closes the window immediately, so a second undo for the
//!   same success is impossible.
//! - `settle_undo` always lands on Idle, whatever the compensating call
//!   returned.
//!
//! The tracker is pure state; callers pass `Instant`s in, and drive window
//! expiry from their event loop via [`ActionTracker::next_deadline`].

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Kind of mutating action on a loyalty card
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    AddStamp,
    RedeemReward { reward_id: Uuid },
}

/// The unit the state machine tracks independently
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionTarget {
    pub loyalty_card_id: Uuid,
    pub kind: ActionKind,
}

impl ActionTarget {
    pub fn add_stamp(loyalty_card_id: Uuid) -> Self {
        Self {
            loyalty_card_id,
            kind: ActionKind::AddStamp,
        }
    }

    pub fn redeem(loyalty_card_id: Uuid, reward_id: Uuid) -> Self {
        Self {
            loyalty_card_id,
            kind: ActionKind::RedeemReward { reward_id },
        }
    }
}

/// Externally visible state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    /// A mutating call (original or compensating) is in flight
    Pending,
    /// Last call succeeded; undo is offered until the deadline
    UndoWindowOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("An action for this card is already in progress")]
    Busy,
    #[error("Nothing to undo")]
    NotUndoable,
}

/// Internal slot state. `UndoPending` is `Pending` from the outside; the
/// distinction only blocks re-entering the undo path.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Pending,
    UndoOpen { deadline: Instant },
    UndoPending,
}

/// Per-target action lifecycle tracker
#[derive(Debug)]
pub struct ActionTracker {
    undo_window: Duration,
    slots: HashMap<ActionTarget, Slot>,
}

impl ActionTracker {
    pub fn new(undo_window: Duration) -> Self {
        Self {
            undo_window,
            slots: HashMap::new(),
        }
    }

    /// Start a new action for `target`.
    ///
    /// Rejected while another call for the same target is in flight. An
    /// open undo window is superseded: starting a new action forfeits the
    /// undo of the previous one.
    pub fn begin(&mut self, target: ActionTarget) -> Result<(), ActionError> {
        match self.slots.get(&target) {
            Some(Slot::Pending) | Some(Slot::UndoPending) => Err(ActionError::Busy),
            _ => {
                self.slots.insert(target, Slot::Pending);
                Ok(())
            }
        }
    }

    /// The in-flight call succeeded: open the undo window.
    pub fn settle_success(&mut self, target: &ActionTarget, now: Instant) {
        self.slots.insert(
            target.clone(),
            Slot::UndoOpen {
                deadline: now + self.undo_window,
            },
        );
    }

    /// The in-flight call failed: back to Idle, nothing retained.
    pub fn settle_failure(&mut self, target: &ActionTarget) {
        self.slots.remove(target);
    }

    /// The in-flight call succeeded for a flow without an undo
    /// affordance: straight back to Idle, no window.
    pub fn settle_complete(&mut self, target: &ActionTarget) {
        self.slots.remove(target);
    }

    /// Invoke undo for `target`.
    ///
    /// Only legal while the undo window is open and unexpired. Closes the
    /// window immediately: double-undo is impossible from this point on.
    pub fn begin_undo(&mut self, target: &ActionTarget, now: Instant) -> Result<(), ActionError> {
        match self.slots.get(target) {
            Some(Slot::UndoOpen { deadline }) if now < *deadline => {
                self.slots.insert(target.clone(), Slot::UndoPending);
                Ok(())
            }
            _ => Err(ActionError::NotUndoable),
        }
    }

    /// The compensating call settled. Always lands on Idle regardless of
    /// its outcome; a failure is the caller's to surface.
    pub fn settle_undo(&mut self, target: &ActionTarget) {
        self.slots.remove(target);
    }

    /// Close every window whose deadline has passed; returns the targets
    /// that expired.
    pub fn expire(&mut self, now: Instant) -> Vec<ActionTarget> {
        let expired: Vec<ActionTarget> = self
            .slots
            .iter()
            .filter_map(|(target, slot)| match slot {
                Slot::UndoOpen { deadline } if now >= *deadline => Some(target.clone()),
                _ => None,
            })
            .collect();
        for target in &expired {
            self.slots.remove(target);
        }
        expired
    }

    /// Effective state of `target` at `now`. A window past its deadline
    /// reads as Idle even before [`expire`](Self::expire) sweeps it.
    pub fn state(&self, target: &ActionTarget, now: Instant) -> ActionState {
        match self.slots.get(target) {
            None => ActionState::Idle,
            Some(Slot::Pending) | Some(Slot::UndoPending) => ActionState::Pending,
            Some(Slot::UndoOpen { deadline }) => {
                if now < *deadline {
                    ActionState::UndoWindowOpen
                } else {
                    ActionState::Idle
                }
            }
        }
    }

    pub fn is_busy(&self, target: &ActionTarget, now: Instant) -> bool {
        self.state(target, now) == ActionState::Pending
    }

    pub fn can_undo(&self, target: &ActionTarget, now: Instant) -> bool {
        self.state(target, now) == ActionState::UndoWindowOpen
    }

    /// Earliest open-window deadline, for the event loop's sleep arm.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| match slot {
                Slot::UndoOpen { deadline } => Some(*deadline),
                _ => None,
            })
            .min()
    }
}
