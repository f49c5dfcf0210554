// Overlapping update_token calls: only the latest issued update may report
// a failure on the shared `error` channel.

#[cfg(test)]
mod test {

use serial_test::serial;

use crate::errors::TokenError;
use crate::manager::{Event, EventKind, TokenManager};
use crate::observability::metrics::get_metrics;
use crate::tests::common::{record, settle, token_expiring_in, MALFORMED_TOKEN};

#[tokio::test]
#[serial]
async fn bad_then_good_keeps_good_and_swallows_error() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    settle().await;
    let errors = record(&manager, EventKind::Error);
    let updates = record(&manager, EventKind::TokenUpdated);
    let suppressed_before = get_metrics().suppressed_errors.get();

    let bad = manager.update_token(MALFORMED_TOKEN);
    let good_token = token_expiring_in(3600, "dave");
    let good = manager.update_token(good_token.clone());

    assert!(matches!(bad.await, Err(TokenError::Malformed { .. })));
    good.await.unwrap();

    settle().await;
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(updates.lock().unwrap().len(), 1);
    assert_eq!(manager.token(), good_token);
    assert_eq!(manager.identity().as_deref(), Some("dave"));
    assert!(get_metrics().suppressed_errors.get() > suppressed_before);
}

#[tokio::test]
async fn good_then_bad_reports_error_and_keeps_good() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    settle().await;
    let errors = record(&manager, EventKind::Error);
    let updates = record(&manager, EventKind::TokenUpdated);

    let good_token = token_expiring_in(3600, "dave");
    let good = manager.update_token(good_token.clone());
    let bad = manager.update_token("x.y");

    good.await.unwrap();
    assert!(bad.await.is_err());

    settle().await;
    // the failed update did not cancel the pending notification of the good one
    assert_eq!(updates.lock().unwrap().len(), 1);
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Event::Error(TokenError::Malformed { segments: 2 })));
    assert_eq!(manager.token(), good_token);
}

#[tokio::test]
async fn failing_initial_token_superseded_by_update() {
    let manager = TokenManager::new(MALFORMED_TOKEN);
    let errors = record(&manager, EventKind::Error);

    manager.update_token(token_expiring_in(3600, "carol")).await.unwrap();

    settle().await;
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(manager.identity().as_deref(), Some("carol"));
}

#[tokio::test]
async fn each_call_gets_a_newer_update_id() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    let first = manager.pending_update();

    let _ = manager.update_token(MALFORMED_TOKEN).await;
    let second = manager.pending_update();
    manager.update_token(token_expiring_in(3600, "dave")).await.unwrap();
    let third = manager.pending_update();

    assert!(first < second);
    assert!(second < third);
}

#[tokio::test]
async fn rapid_updates_collapse_into_one_notification() {
    let manager = TokenManager::new(token_expiring_in(3600, "carol"));
    let updates = record(&manager, EventKind::TokenUpdated);

    manager.update_token(token_expiring_in(3600, "dave")).await.unwrap();
    manager.update_token(token_expiring_in(3600, "erin")).await.unwrap();

    settle().await;
    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    match &updates[0] {
        Event::TokenUpdated(m) => assert_eq!(m.identity().as_deref(), Some("erin")),
        other => panic!("expected tokenUpdated, got {other:?}"),
    }
}

}
