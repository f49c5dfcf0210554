//! # Access Manager Library
//!
//! Keeps a client's Access Token fresh: decodes the token's claims,
//! derives the granted identity, tracks expiration and notifies
//! subscribers when the token is updated or expires.
//!
//! Modules:
//! - `manager` — `TokenManager` state machine and event registry
//! - `parser` — token payload decoding and identity extraction
//! - `errors` — `TokenError`
//! - `config` — YAML configuration for the `access-manager` binary
//! - `observability` — prometheus metrics

pub mod config;
pub mod errors;
pub mod helpers;
pub mod manager;
pub mod observability;
pub mod parser;
pub mod utils;
#[cfg(test)]
mod tests;


pub use crate::errors::TokenError;
pub use crate::manager::{Event, EventKind, SubscriptionId, TokenManager, TokenSnapshot, UpdateId};
pub use crate::parser::{get_identity, parse_payload};
