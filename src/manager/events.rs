use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::TokenError;
use crate::manager::token_manager::TokenManager;

/// Kinds of notification a [`TokenManager`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    TokenExpired,
    TokenUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            EventKind::Error => "error",
            EventKind::TokenExpired => "tokenExpired",
            EventKind::TokenUpdated => "tokenUpdated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// The latest `update_token` call failed.
    Error(TokenError),
    /// The current Access Token reached its `exp`.
    TokenExpired(TokenManager),
    /// A new Access Token was installed.
    TokenUpdated(TokenManager),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Error(_) => EventKind::Error,
            Event::TokenExpired(_) => EventKind::TokenExpired,
            Event::TokenUpdated(_) => EventKind::TokenUpdated,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Event kind -> listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(SubscriptionId, Listener)>>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe(&mut self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for entries in self.listeners.values_mut() {
            if let Some(position) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(position);
                return true;
            }
        }
        false
    }

    /// Snapshot of the current listeners, so emission runs without the
    /// registry locked and listeners may (un)subscribe re-entrantly.
    pub(crate) fn listeners(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }
}
