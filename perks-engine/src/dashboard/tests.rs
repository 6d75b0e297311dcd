use super::*;
use crate::ledger::MemoryLedger;
use crate::realtime::MemoryHub;
use shared::models::{Customer, Location, LoyaltyCard, Reward};
use shared::realtime::StampUpdate;
use std::time::Duration;

struct Fixture {
    session: Arc<DashboardSession>,
    ledger: Arc<MemoryLedger>,
    hub: MemoryHub,
    card_id: Uuid,
    reward_id: Uuid,
}

/// Store with one location, one customer holding a 4/10 card, and a
/// 10-stamp reward.
fn fixture() -> Fixture {
    let hub = MemoryHub::new();
    let ledger = MemoryLedger::new().with_hub(hub.clone());

    let store_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let card_id = Uuid::new_v4();
    let reward_id = Uuid::new_v4();

    ledger.seed_location(Location {
        id: location_id,
        store_id,
        name: "Main St".to_string(),
        address: None,
        card_bg_color: None,
        card_text_color: None,
        card_stamp_color: None,
        logo_url: None,
    });
    ledger.seed_customer(Customer {
        id: customer_id,
        user_id: Uuid::new_v4(),
        full_name: "Alice".to_string(),
        email: Some("alice@example.com".to_string()),
        referral_code: None,
    });
    ledger.seed_card(LoyaltyCard {
        id: card_id,
        customer_id,
        location_id,
        stamps: 4,
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
    let ctx = StoreContext {
        store_id,
        location_id,
        operator_id: Uuid::new_v4(),
        store_hours: Vec::new(),
    };
    let session = Arc::new(DashboardSession::new(
        Config::with_backend("http://unused.invalid"),
        ctx,
        Arc::clone(&ledger) as Arc<dyn LedgerClient>,
    ));

    Fixture {
        session,
        ledger,
        hub,
        card_id,
        reward_id,
    }
}

#[tokio::test]
async fn test_add_stamp_updates_displayed_count_from_server() {
    let f = fixture();
    f.session.refresh().await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));

    f.session.add_stamp(f.card_id).await.unwrap();

    // Displayed value is the re-fetched server value
    assert_eq!(f.session.stamps_for(f.card_id), Some(5));
    assert!(f.session.can_undo_add(f.card_id));
}

#[tokio::test]
async fn test_add_then_undo_round_trips_to_pre_add_count() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    f.session.add_stamp(f.card_id).await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(5));

    f.session.undo_add_stamp(f.card_id).await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));
    // The undo control disappears once used
    assert!(!f.session.can_undo_add(f.card_id));
}

#[tokio::test]
async fn test_double_undo_is_prohibited() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    f.session.add_stamp(f.card_id).await.unwrap();
    f.session.undo_add_stamp(f.card_id).await.unwrap();

    let err = f.session.undo_add_stamp(f.card_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_undo_window_expires_without_interaction() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    f.session.add_stamp(f.card_id).await.unwrap();
    assert!(f.session.can_undo_add(f.card_id));

    tokio::time::advance(Duration::from_millis(3001)).await;
    assert!(!f.session.can_undo_add(f.card_id));

    let expired = f.session.expire_undo_windows();
    assert_eq!(expired, vec![ActionTarget::add_stamp(f.card_id)]);

    // Past the window, undo is rejected and nothing changes
    let err = f.session.undo_add_stamp(f.card_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(f.session.stamps_for(f.card_id), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_double_invocation_sends_one_call() {
    let f = fixture();
    f.session.refresh().await.unwrap();
    f.ledger.set_latency(Duration::from_millis(200));

    let session = Arc::clone(&f.session);
    let card_id = f.card_id;
    let first = tokio::spawn(async move { session.add_stamp(card_id).await });
    tokio::task::yield_now().await; // let the first call reach the ledger

    // Second invocation while the first is in flight: rejected, no call
    let err = f.session.add_stamp(f.card_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    first.await.unwrap().unwrap();
    // Exactly one stamp landed
    assert_eq!(f.ledger.stamps_of(f.card_id), Some(5));
}

#[tokio::test]
async fn test_remote_rejection_surfaces_verbatim_and_leaves_state() {
    let f = fixture();
    f.session.refresh().await.unwrap();
    f.ledger.reject_next("insufficient permissions");

    let err = f.session.add_stamp(f.card_id).await.unwrap_err();
    assert_eq!(err.user_message(), "insufficient permissions");

    // No stamp count changed anywhere, and the target is Idle again
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));
    assert_eq!(f.ledger.stamps_of(f.card_id), Some(4));
    assert!(!f.session.is_adding(f.card_id));
    assert!(!f.session.can_undo_add(f.card_id));

    // Retry is a manual re-invocation, and it works
    f.session.add_stamp(f.card_id).await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(5));
}

#[tokio::test]
async fn test_redeem_control_gated_by_confirmed_stamps() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    // 4/10: reward requires 10, none offered
    assert!(f.session.redeemable_rewards(f.card_id).is_empty());

    for _ in 0..6 {
        f.session.add_stamp(f.card_id).await.unwrap();
    }
    assert_eq!(f.session.stamps_for(f.card_id), Some(10));

    let offered = f.session.redeemable_rewards(f.card_id);
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0].id, f.reward_id);
}

#[tokio::test]
async fn test_redeem_and_undo_round_trip() {
    let f = fixture();
    f.session.refresh().await.unwrap();
    for _ in 0..6 {
        f.session.add_stamp(f.card_id).await.unwrap();
    }

    f.session.redeem_reward(f.card_id, f.reward_id).await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(0));

    f.session.undo_redeem(f.card_id, f.reward_id).await.unwrap();
    assert_eq!(f.session.stamps_for(f.card_id), Some(10));
}

#[tokio::test]
async fn test_insufficient_stamps_rejection_is_verbatim() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    let err = f
        .session
        .redeem_reward(f.card_id, f.reward_id)
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Insufficient stamps for this reward");
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));
}

#[tokio::test]
async fn test_manual_add_validates_email_before_any_call() {
    let f = fixture();
    // If a call were made, this injected rejection would be consumed
    f.ledger.reject_next("should never be seen");

    let err = f.session.add_stamps_manually("  ", 3).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The injection is still pending: no remote call happened
    let err = f.session.add_stamp(f.card_id).await.unwrap_err();
    assert_eq!(err.user_message(), "should never be seen");
}

#[tokio::test]
async fn test_manual_add_distinguishes_not_found() {
    let f = fixture();
    let err = f
        .session
        .add_stamps_manually("bob@example.com", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_manual_add_applies_n_independent_stamps() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    let applied = f
        .session
        .add_stamps_manually("alice@example.com", 3)
        .await
        .unwrap();
    assert_eq!(applied, 3);
    assert_eq!(f.session.stamps_for(f.card_id), Some(7));
}

#[tokio::test]
async fn test_manual_add_partial_failure_keeps_applied_stamps() {
    let f = fixture();
    f.session.refresh().await.unwrap();
    // One of the three parallel invocations will take the rejection
    f.ledger.reject_next("stamp limit reached");

    let err = f
        .session
        .add_stamps_manually("alice@example.com", 3)
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "stamp limit reached");

    // The two calls that landed are not rolled back
    assert_eq!(f.ledger.stamps_of(f.card_id), Some(6));
    assert_eq!(f.session.stamps_for(f.card_id), Some(6));
}

#[tokio::test]
async fn test_stamp_update_event_refetches_roster() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    // Another operator's action: the backend row moved without us
    f.ledger
        .add_stamp(f.card_id, f.session.context().store_id, false)
        .await
        .unwrap();

    f.session
        .handle_event(&ChannelEvent::stamp_update(StampUpdate {
            id: f.card_id,
            stamps: 5,
        }))
        .await;
    assert_eq!(f.session.stamps_for(f.card_id), Some(5));
}

#[tokio::test]
async fn test_stamp_update_for_unknown_card_is_ignored() {
    let f = fixture();
    f.session.refresh().await.unwrap();

    f.session
        .handle_event(&ChannelEvent::stamp_update(StampUpdate {
            id: Uuid::new_v4(),
            stamps: 9,
        }))
        .await;

    // No partial record appeared; the known card is untouched
    assert_eq!(f.session.roster_rows().len(), 1);
    assert_eq!(f.session.stamps_for(f.card_id), Some(4));
}

#[tokio::test]
async fn test_connect_is_single_acquisition_and_disconnect_releases() {
    let f = fixture();
    let topic = store_dashboard_topic(f.session.context().store_id);

    f.session.connect(&f.hub).await.unwrap();
    assert_eq!(f.hub.subscriber_count(&topic), 1);

    // A second mount must not duplicate the subscription
    let err = f.session.connect(&f.hub).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(f.hub.subscriber_count(&topic), 1);

    f.session.disconnect();
    assert_eq!(f.hub.subscriber_count(&topic), 0);
    assert!(f.session.presence_entries().is_empty());
}

#[tokio::test]
async fn test_auto_refresh_disabled_without_store_hours() {
    let f = fixture();
    // No configured hours: treated as closed
    assert!(!f.session.should_auto_refresh());
}
