// Expiration tracking:
//  - tokenExpired fires once `exp` is reached and flips is_expired
//  - an already expired token is flagged synchronously and still notified
//  - every update replaces the pending timers; dropping the manager cancels them

#[cfg(test)]
mod test {

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::manager::{Event, EventKind, TokenManager};
use crate::tests::common::{next_event, record, sample_token, settle, token_expiring_in, MALFORMED_TOKEN};

#[tokio::test]
async fn token_expired_fires_when_exp_is_reached() {
    let manager = TokenManager::new(token_expiring_in(1, "carol"));
    let (_, mut expired) = manager.listen(EventKind::TokenExpired);
    assert!(!manager.is_expired());

    let event = next_event(&mut expired, Duration::from_secs(3)).await;
    match event {
        Some(Event::TokenExpired(m)) => assert!(m.is_expired()),
        other => panic!("expected tokenExpired, got {other:?}"),
    }
    assert!(manager.is_expired());
    assert_eq!(manager.scheduled_timers().0, false);
}

#[tokio::test]
async fn past_exp_is_expired_right_after_update() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    let expired = record(&manager, EventKind::TokenExpired);

    manager.update_token(token_expiring_in(-30, "carol")).await.unwrap();
    assert!(manager.is_expired());
    assert!(manager.expires().unwrap() < Utc::now());

    // the expiration timer still runs, on the next turn
    assert!(expired.lock().unwrap().is_empty());
    settle().await;
    assert_eq!(expired.lock().unwrap().len(), 1);
    assert!(manager.is_expired());
}

#[tokio::test]
async fn expired_stays_expired_until_successful_update() {
    let manager = TokenManager::new(token_expiring_in(-5, "carol"));
    settle().await;
    assert!(manager.is_expired());

    let _ = manager.update_token(MALFORMED_TOKEN).await;
    settle().await;
    assert!(manager.is_expired());

    manager.update_token(token_expiring_in(3600, "carol")).await.unwrap();
    assert!(!manager.is_expired());
}

#[tokio::test]
async fn update_cancels_previous_expiration_timer() {
    let manager = TokenManager::new(token_expiring_in(-5, "carol"));
    let expired = record(&manager, EventKind::TokenExpired);

    // replaces the already-due timer of the initial token before it ran
    manager.update_token(token_expiring_in(3600, "carol")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(expired.lock().unwrap().is_empty());
    assert!(!manager.is_expired());
    assert_eq!(manager.scheduled_timers(), (true, false));
}

#[tokio::test]
async fn one_timer_of_each_kind_while_pending() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    assert_eq!(manager.scheduled_timers(), (true, true));

    manager.update_token(token_expiring_in(7200, "carol")).await.unwrap();
    assert_eq!(manager.scheduled_timers(), (true, true));

    settle().await;
    assert_eq!(manager.scheduled_timers(), (true, false));
}

#[tokio::test]
async fn token_without_exp_never_expires() {
    let manager = TokenManager::new(sample_token(json!({ "grants": { "identity": "carol" } })));

    assert_eq!(manager.expires(), None);
    assert!(!manager.is_expired());
    assert_eq!(manager.scheduled_timers().0, false);
    assert_eq!(manager.identity().as_deref(), Some("carol"));
}

#[tokio::test]
async fn dropping_manager_cancels_notifications() {
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let manager = TokenManager::new(token_expiring_in(-5, "carol"));
        let counter = fired.clone();
        manager.subscribe(EventKind::TokenExpired, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = fired.clone();
        manager.subscribe(EventKind::TokenUpdated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn listeners_attached_after_construction_see_initial_events() {
    // same order as the `watch` command: construct, subscribe, then yield
    for _ in 0..20 {
        let manager = TokenManager::new(token_expiring_in(-5, "carol"));
        let updated = Arc::new(AtomicUsize::new(0));
        let counter = updated.clone();
        manager.on_token_updated(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (_, mut expired) = manager.listen(EventKind::TokenExpired);

        let event = next_event(&mut expired, Duration::from_secs(1)).await;
        assert!(matches!(event, Some(Event::TokenExpired(_))), "{event:?}");
        settle().await;
        assert_eq!(updated.load(Ordering::SeqCst), 1);
    }

    let manager = TokenManager::new(MALFORMED_TOKEN);
    let (_, mut errors) = manager.listen(EventKind::Error);
    let event = next_event(&mut errors, Duration::from_secs(1)).await;
    assert!(matches!(event, Some(Event::Error(_))), "{event:?}");
}

}
