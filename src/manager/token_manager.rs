use std::fmt;
use std::future::{ready, Future};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::Receiver;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::errors::TokenError;
use crate::helpers::time::{duration_until, expires_at_from_exp_claim, now};
use crate::manager::events::{Event, EventKind, Listener, ListenerRegistry, SubscriptionId};
use crate::observability::metrics::get_metrics;
use crate::parser::{get_identity, parse_payload, TokenPayload};
use crate::utils::channel;

static EXP_CLAIM: &str = "exp";

/// Identifies one `update_token` call. Increases with every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(u64);

impl UpdateId {
    fn next(self) -> Self {
        UpdateId(self.0 + 1)
    }
}

/// Consistent view of the derived token state.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSnapshot {
    pub token: String,
    pub token_payload: Option<TokenPayload>,
    pub identity: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

/// Manages an Access Token: decodes it, tracks its expiration and notifies
/// subscribers with `tokenUpdated`, `tokenExpired` and `error` events.
///
/// Cloning yields another handle to the same manager. Timers and deferred
/// notifications run as Tokio tasks, so the manager should be created and
/// updated from within a Tokio runtime. Use a current-thread runtime: there
/// every notification fires on a later turn than the call that caused it,
/// so listeners attached right after a call always receive its events.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    listeners: Mutex<ListenerRegistry>,
}

#[derive(Default)]
struct State {
    token: String,
    token_payload: Option<TokenPayload>,
    identity: Option<String>,
    expires: Option<DateTime<Utc>>,
    is_expired: bool,
    /// most recently issued update
    pending_update: UpdateId,
    /// update whose token is installed
    installed_update: UpdateId,
    expiration_timer: Option<AbortHandle>,
    updated_timer: Option<AbortHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `task` on the current Tokio runtime. Outside a runtime nothing is
/// scheduled: state updates still land, notifications are not delivered.
fn spawn_deferred<F>(what: &'static str, task: F) -> Option<AbortHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(task).abort_handle()),
        Err(e) => {
            error!(task = what, error = %e, "no Tokio runtime, notification dropped");
            None
        }
    }
}

impl TokenManager {
    /// Create a manager and start decoding `initial_token`.
    ///
    /// Never fails or panics: a malformed initial token is reported on the
    /// `error` channel on the next turn, and derived fields stay unset.
    /// Called outside a Tokio runtime the token is still decoded, but no
    /// timer runs and no event is emitted.
    pub fn new(initial_token: impl Into<String>) -> Self {
        let initial_token = initial_token.into();
        let manager = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    token: initial_token.clone(),
                    ..State::default()
                }),
                listeners: Mutex::new(ListenerRegistry::default()),
            }),
        };

        // nobody awaits the initial update; failures go to `error` listeners
        let _ = manager.apply_update(initial_token);
        manager
    }

    /// Replace the current Access Token.
    ///
    /// The token is decoded and the manager state replaced before this
    /// returns; the future is already resolved. `tokenUpdated` fires on a
    /// later turn, so listeners attached right after this call still see it.
    /// A failure leaves the previous token in place and is also emitted on
    /// `error` unless a newer update has been issued by then.
    pub fn update_token(
        &self,
        new_token: impl Into<String>,
    ) -> impl Future<Output = Result<TokenManager, TokenError>> + Send + 'static {
        ready(self.apply_update(new_token.into()))
    }

    fn apply_update(&self, new_token: String) -> Result<TokenManager, TokenError> {
        let metrics = get_metrics();
        let mut state = lock(&self.inner.state);

        let update_id = state.pending_update.next();
        state.pending_update = update_id;

        let decoded = parse_payload(&new_token)
            .and_then(|payload| get_identity(&payload).map(|identity| (payload, identity)));

        let (payload, identity) = match decoded {
            Ok(decoded) => decoded,
            Err(error) => {
                drop(state);
                warn!(update = update_id.0, reason = error.reason(), error = %error, "token update failed");
                metrics.token_updates.with_label_values(&["failed"]).inc();
                metrics.update_failures.with_label_values(&[error.reason()]).inc();
                self.report_error(update_id, error.clone());
                return Err(error);
            }
        };

        let expires = payload
            .get(EXP_CLAIM)
            .and_then(Value::as_f64)
            .and_then(expires_at_from_exp_claim);
        let is_expired = expires.map(|at| now() >= at).unwrap_or(false);

        // at most one timer of each kind
        if let Some(timer) = state.expiration_timer.take() {
            timer.abort();
        }
        if let Some(timer) = state.updated_timer.take() {
            timer.abort();
        }

        state.installed_update = update_id;
        state.identity = identity;
        state.expires = expires;
        state.is_expired = is_expired;
        state.token = new_token;
        state.token_payload = Some(payload);
        state.expiration_timer = expires.and_then(|at| self.schedule_expiration(update_id, at));
        state.updated_timer = self.schedule_token_updated(update_id);

        info!(
            update = update_id.0,
            identity = state.identity.as_deref().unwrap_or(""),
            expires = ?state.expires,
            is_expired,
            "token updated"
        );
        drop(state);

        metrics.token_updates.with_label_values(&["ok"]).inc();
        if let Some(at) = expires {
            metrics.token_expiry_unix.set(at.timestamp());
        }

        Ok(self.clone())
    }

    fn schedule_expiration(&self, update_id: UpdateId, at: DateTime<Utc>) -> Option<AbortHandle> {
        let weak = Arc::downgrade(&self.inner);
        let delay = duration_until(at);
        debug!(update = update_id.0, delay_ms = delay.as_millis() as u64, "expiration timer scheduled");

        spawn_deferred(EventKind::TokenExpired.as_str(), async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = TokenManager::upgrade(&weak) {
                manager.expiration_timer_fired(update_id);
            }
        })
    }

    fn expiration_timer_fired(&self, update_id: UpdateId) {
        {
            let mut state = lock(&self.inner.state);
            if state.installed_update != update_id {
                return;
            }
            state.is_expired = true;
            state.expiration_timer = None;
        }

        info!(update = update_id.0, "token expired");
        get_metrics().token_expirations.inc();
        self.emit(Event::TokenExpired(self.clone()));
    }

    fn schedule_token_updated(&self, update_id: UpdateId) -> Option<AbortHandle> {
        let weak = Arc::downgrade(&self.inner);

        spawn_deferred(EventKind::TokenUpdated.as_str(), async move {
            if let Some(manager) = TokenManager::upgrade(&weak) {
                manager.updated_timer_fired(update_id);
            }
        })
    }

    fn updated_timer_fired(&self, update_id: UpdateId) {
        {
            let mut state = lock(&self.inner.state);
            if state.installed_update != update_id {
                return;
            }
            state.updated_timer = None;
        }
        self.emit(Event::TokenUpdated(self.clone()));
    }

    /// Emit `error` on the next turn if `update_id` is still the latest update.
    fn report_error(&self, update_id: UpdateId, error: TokenError) {
        let weak = Arc::downgrade(&self.inner);

        spawn_deferred(EventKind::Error.as_str(), async move {
            let Some(manager) = TokenManager::upgrade(&weak) else {
                return;
            };
            let latest = lock(&manager.inner.state).pending_update;
            if latest == update_id {
                manager.emit(Event::Error(error));
            } else {
                debug!(update = update_id.0, latest = latest.0, error = %error, "superseded update failure suppressed");
                get_metrics().suppressed_errors.inc();
            }
        });
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<TokenManager> {
        weak.upgrade().map(|inner| TokenManager { inner })
    }

    fn emit(&self, event: Event) {
        let kind = event.kind();
        let listeners = lock(&self.inner.listeners).listeners(kind);
        debug!(event = %kind, listeners = listeners.len(), "emitting");
        get_metrics().events_emitted.with_label_values(&[kind.as_str()]).inc();

        for listener in listeners {
            listener(&event);
        }
    }

    // -------------------------------
    // Subscriptions
    // -------------------------------

    /// Register `listener` for `kind`. Listeners run in registration order.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        lock(&self.inner.listeners).subscribe(kind, listener)
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner.listeners).unsubscribe(id)
    }

    pub fn on_error<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TokenError) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Error, move |event| {
            if let Event::Error(error) = event {
                listener(error);
            }
        })
    }

    pub fn on_token_updated<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TokenManager) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::TokenUpdated, move |event| {
            if let Event::TokenUpdated(manager) = event {
                listener(manager);
            }
        })
    }

    pub fn on_token_expired<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TokenManager) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::TokenExpired, move |event| {
            if let Event::TokenExpired(manager) = event {
                listener(manager);
            }
        })
    }

    /// Stream events of `kind` through a broadcast channel.
    ///
    /// Buffered events hold manager handles; unsubscribe to release them.
    pub fn listen(&self, kind: EventKind) -> (SubscriptionId, Receiver<Event>) {
        let (sender, receiver) = channel::event_channel();
        let id = self.subscribe(kind, move |event| {
            let _ = sender.send(event.clone());
        });
        (id, receiver)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.inner.listeners).count(kind)
    }

    // -------------------------------
    // Read-only state
    // -------------------------------

    pub fn token(&self) -> String {
        lock(&self.inner.state).token.clone()
    }

    pub fn token_payload(&self) -> Option<TokenPayload> {
        lock(&self.inner.state).token_payload.clone()
    }

    /// `None` until the first successful update, or when the token grants none.
    pub fn identity(&self) -> Option<String> {
        lock(&self.inner.state).identity.clone()
    }

    /// `None` until the first successful update, or when the token has no `exp`.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.state).expires
    }

    pub fn is_expired(&self) -> bool {
        lock(&self.inner.state).is_expired
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let state = lock(&self.inner.state);
        TokenSnapshot {
            token: state.token.clone(),
            token_payload: state.token_payload.clone(),
            identity: state.identity.clone(),
            expires: state.expires,
            is_expired: state.is_expired,
        }
    }

    pub fn pending_update(&self) -> UpdateId {
        lock(&self.inner.state).pending_update
    }

    #[cfg(test)]
    pub(crate) fn scheduled_timers(&self) -> (bool, bool) {
        let state = lock(&self.inner.state);
        (state.expiration_timer.is_some(), state.updated_timer.is_some())
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("TokenManager")
            .field("identity", &state.identity)
            .field("expires", &state.expires)
            .field("is_expired", &state.is_expired)
            .field("pending_update", &state.pending_update)
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.expiration_timer.take() {
            timer.abort();
        }
        if let Some(timer) = state.updated_timer.take() {
            timer.abort();
        }
    }
}
