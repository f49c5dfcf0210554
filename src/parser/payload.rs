use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::TokenError;

/// Decoded claims of an Access Token.
pub type TokenPayload = Map<String, Value>;

const SEGMENT_SEPARATOR: char = '.';
const TOKEN_SEGMENTS: usize = 3;

/// Standard alphabet, lenient about padding and trailing bits the way
/// browser `atob` is.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Parse the payload (middle segment) of a header.payload.signature token.
///
/// Header and signature are neither decoded nor verified.
pub fn parse_payload(token: &str) -> Result<TokenPayload, TokenError> {
    let segments: Vec<&str> = token.split(SEGMENT_SEPARATOR).collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(TokenError::Malformed { segments: segments.len() });
    }

    let decoded = decode_base64url(segments[1])?;

    let payload: Value = serde_json::from_slice(&decoded).map_err(|e| TokenError::InvalidPayload {
        reason: format!("payload is not valid JSON: {}", e),
    })?;

    match payload {
        Value::Object(claims) => {
            debug!(claims = claims.len(), "token payload parsed");
            Ok(claims)
        }
        other => Err(TokenError::InvalidPayload {
            reason: format!("payload must be a JSON object, got {}", json_kind(&other)),
        }),
    }
}

/// Decode a base64url segment: translate the url-safe alphabet, right-pad
/// with `=` to a multiple of 4, then decode as standard base64.
pub fn decode_base64url(encoded: &str) -> Result<Vec<u8>, TokenError> {
    let mut standard: String = encoded
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let remainder = standard.len() % 4;
    if remainder > 0 {
        standard.extend(std::iter::repeat('=').take(4 - remainder));
    }

    PAYLOAD_ENGINE
        .decode(standard.as_bytes())
        .map_err(|e| TokenError::InvalidPayload {
            reason: format!("base64 decode error: {}", e),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
