// tests/common/mod.rs
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast::Receiver;

use crate::manager::{Event, EventKind, TokenManager};

/// Unsigned token for tests: `{"alg":"HS256"}.<claims>.signature`
pub fn sample_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// Token with an identity grant expiring `seconds` from now (negative: already expired)
pub fn token_expiring_in(seconds: i64, identity: &str) -> String {
    let exp = Utc::now().timestamp() + seconds;
    sample_token(json!({ "exp": exp, "grants": { "identity": identity } }))
}

pub const MALFORMED_TOKEN: &str = "not-a-token";

/// Record every event of `kind` in arrival order
pub fn record(manager: &TokenManager, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.subscribe(kind, move |event| sink.lock().unwrap().push(event.clone()));
    events
}

/// Let spawned next-turn tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn next_event(receiver: &mut Receiver<Event>, within: Duration) -> Option<Event> {
    tokio::time::timeout(within, receiver.recv())
        .await
        .ok()
        .and_then(|received| received.ok())
}
