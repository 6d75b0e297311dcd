use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Broadcast event name for stamp-count pushes on the dashboard channel.
pub const STAMP_UPDATE_EVENT: &str = "stamp_update";

// ==================== Presence ====================

/// Presence metadata one connected viewer tracks on a channel.
///
/// Store owners track `{user_id, is_owner: true}` only; customers viewing
/// their card additionally carry the card id and its last known counts so
/// the dashboard can render a live entry without a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_owner: bool,
    pub loyalty_card_id: Option<Uuid>,
    pub name: Option<String>,
    pub stamps: Option<i32>,
    pub max_stamps: Option<i32>,
}

impl PresenceMeta {
    /// Owner-side presence: identifies the operator, carries no card.
    pub fn owner(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_owner: true,
            loyalty_card_id: None,
            name: None,
            stamps: None,
            max_stamps: None,
        }
    }

    /// Customer-side presence: a viewer with their card's last known state.
    pub fn viewer(
        user_id: Uuid,
        loyalty_card_id: Uuid,
        name: impl Into<String>,
        stamps: i32,
        max_stamps: i32,
    ) -> Self {
        Self {
            user_id,
            is_owner: false,
            loyalty_card_id: Some(loyalty_card_id),
            name: Some(name.into()),
            stamps: Some(stamps),
            max_stamps: Some(max_stamps),
        }
    }
}

/// Full presence state snapshot: presence key -> metas tracked under it.
///
/// Keys are viewer user ids. Consumers rebuild their view from this whole
/// snapshot on every presence event; there is no incremental patching.
pub type PresenceState = HashMap<String, Vec<PresenceMeta>>;

// ==================== Payloads ====================

/// `stamp_update` broadcast payload: the updated card row's id and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampUpdate {
    pub id: Uuid,
    pub stamps: i32,
}

/// Row-update push on a customer-card channel (the updated card row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRowUpdate {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub stamps: i32,
    pub max_stamps: i32,
}

// ==================== Events ====================

/// One event delivered on a channel subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelEvent {
    /// Initial (and re-) synchronization of the full presence state
    PresenceSync(PresenceState),
    /// A viewer joined; carries the full state after the join
    PresenceJoin(PresenceState),
    /// A viewer left; carries the full state after the leave
    PresenceLeave(PresenceState),
    /// Named broadcast with a JSON payload
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    /// Database row update pushed to a customer-card channel
    RowUpdate(CardRowUpdate),
}

impl ChannelEvent {
    /// Build a `stamp_update` broadcast event.
    pub fn stamp_update(update: StampUpdate) -> Self {
        Self::Broadcast {
            event: STAMP_UPDATE_EVENT.to_string(),
            payload: serde_json::to_value(update)
                .expect("Failed to serialize stamp update"),
        }
    }

    /// Parse this event as a `stamp_update` broadcast, if it is one.
    pub fn as_stamp_update(&self) -> Option<StampUpdate> {
        match self {
            Self::Broadcast { event, payload } if event == STAMP_UPDATE_EVENT => {
                serde_json::from_value(payload.clone()).ok()
            }
            _ => None,
        }
    }

    /// Presence state carried by this event, if it is a presence event.
    pub fn presence_state(&self) -> Option<&PresenceState> {
        match self {
            Self::PresenceSync(state)
            | Self::PresenceJoin(state)
            | Self::PresenceLeave(state) => Some(state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_update_round_trip() {
        let update = StampUpdate {
            id: Uuid::new_v4(),
            stamps: 5,
        };
        let event = ChannelEvent::stamp_update(update);
        assert_eq!(event.as_stamp_update(), Some(update));
    }

    #[test]
    fn test_other_broadcast_is_not_stamp_update() {
        let event = ChannelEvent::Broadcast {
            event: "something_else".to_string(),
            payload: serde_json::json!({"id": Uuid::new_v4(), "stamps": 3}),
        };
        assert_eq!(event.as_stamp_update(), None);
    }

    #[test]
    fn test_presence_state_accessor() {
        let mut state = PresenceState::new();
        let meta = PresenceMeta::owner(Uuid::new_v4());
        state.insert(meta.user_id.to_string(), vec![meta]);

        let event = ChannelEvent::PresenceJoin(state.clone());
        assert_eq!(event.presence_state(), Some(&state));

        let update = ChannelEvent::stamp_update(StampUpdate {
            id: Uuid::new_v4(),
            stamps: 1,
        });
        assert_eq!(update.presence_state(), None);
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = ChannelEvent::RowUpdate(CardRowUpdate {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            stamps: 7,
            max_stamps: 10,
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: ChannelEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
