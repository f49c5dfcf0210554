//! Access Token decoding: payload segment and identity claims.

pub mod identity;
pub mod payload;

pub use identity::get_identity;
pub use payload::{decode_base64url, parse_payload, TokenPayload};
