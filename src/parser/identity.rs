use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::errors::TokenError;
use crate::parser::payload::TokenPayload;

static GRANTS_FIELD: &str = "grants";
static SCOPE_FIELD: &str = "scope";
static RES_FIELD: &str = "res";
static IDENTITY_FIELD: &str = "identity";

fn capability_scope_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)identity%3D(.*?)(?:%26|$)").expect("static regex"))
}

fn sip_resource_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sip:(.*)@").expect("static regex"))
}

/// Get the identity granted by a token payload.
///
/// Three payload shapes are recognised, tried in order:
/// - capability token: no `grants`, a url-encoded `scope` string
/// - scoped access token: `grants` is an array of `{res: "sip:<identity>@..."}`
/// - first-person token: `grants` is an object with an `identity` string
///
/// Any other shape has no identity.
pub fn get_identity(payload: &TokenPayload) -> Result<Option<String>, TokenError> {
    let grants = payload.get(GRANTS_FIELD).filter(|g| !g.is_null());

    match (grants, payload.get(SCOPE_FIELD)) {
        (None, Some(Value::String(scope))) => identity_from_capability_scope(scope),
        (Some(Value::Array(grants)), _) => identity_from_sat_grants(grants),
        (Some(Value::Object(grants)), _) => Ok(identity_from_fpa_grants(grants)),
        _ => Ok(None),
    }
}

/// The identity is matched inside the still-encoded scope, then the capture
/// alone is decoded.
fn identity_from_capability_scope(scope: &str) -> Result<Option<String>, TokenError> {
    capability_scope_regex()
        .captures(scope)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_uri_component(m.as_str()))
        .transpose()
}

fn identity_from_sat_grants(grants: &[Value]) -> Result<Option<String>, TokenError> {
    for grant in grants {
        let Some(res) = grant.get(RES_FIELD).and_then(Value::as_str) else {
            continue;
        };
        if let Some(caps) = sip_resource_regex().captures(res) {
            trace!(res, "identity taken from sip grant");
            return decode_uri_component(&caps[1]).map(Some);
        }
    }
    Ok(None)
}

fn identity_from_fpa_grants(grants: &serde_json::Map<String, Value>) -> Option<String> {
    grants
        .get(IDENTITY_FIELD)
        .and_then(Value::as_str)
        .filter(|identity| !identity.is_empty())
        .map(str::to_owned)
}

/// Percent-decode like `decodeURIComponent`: `+` stays literal, every `%`
/// must start a two hex digit escape and the result must be UTF-8.
fn decode_uri_component(encoded: &str) -> Result<String, TokenError> {
    if let Some(position) = malformed_escape(encoded) {
        return Err(TokenError::InvalidIdentity {
            reason: format!("'{}' has a malformed percent escape at byte {}", encoded, position),
        });
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| TokenError::InvalidIdentity {
            reason: format!("'{}' is not valid percent-encoded UTF-8: {}", encoded, e),
        })
}

/// Byte offset of the first `%` not followed by two hex digits.
fn malformed_escape(encoded: &str) -> Option<usize> {
    let bytes = encoded.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == b'%')
        .map(|(position, _)| position)
        .find(|&position| {
            !matches!(
                bytes.get(position + 1..position + 3),
                Some([high, low]) if high.is_ascii_hexdigit() && low.is_ascii_hexdigit()
            )
        })
}
