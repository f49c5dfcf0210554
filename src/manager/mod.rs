//! Access Token lifecycle: state machine, timers and notifications.

pub mod events;
pub mod token_manager;

pub use events::{Event, EventKind, Listener, SubscriptionId};
pub use token_manager::{TokenManager, TokenSnapshot, UpdateId};
