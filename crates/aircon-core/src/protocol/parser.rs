//! Classification of inbound control-channel lines.
//!
//! # The line protocol (for beginners)
//!
//! The appliance does not frame its messages with lengths or ids.  It sends
//! newline-terminated UTF-8 lines, each containing one or more XML-like
//! self-closing elements, and it never echoes a request id back.  The only
//! way to understand the stream is to classify each decoded line against a
//! fixed set of patterns, in a fixed precedence order, and react to the
//! first match.
//!
//! That is exactly what [`classify_line`] does: an ordered list of
//! (predicate, extractor) rules producing a [`LineEvent`], or `None` when no
//! rule matches.  Unrecognized lines are *not* errors; newer firmware adds
//! lines freely, and dropping them is the forward-compatible behaviour.
//!
//! # Tolerant extraction
//!
//! Full device-state responses concatenate self-closing `Attr` elements with
//! no separating whitespace, e.g.
//!
//! ```text
//! ...Status="Okay"/><Attr ID="AC_FUN_POWER" Type="Enum" Value="On" /><Attr ...
//! ```
//!
//! so the line is split on the `"><"` boundary before per-fragment attribute
//! extraction.  A malformed fragment is skipped individually; it never fails
//! the whole message.

use tracing::trace;

use crate::protocol::request::GREETING;

/// Exact invalidate-account notice, sent by the device right after the
/// greeting to demand (re-)authentication.
pub const INVALIDATE_ACCOUNT: &str =
    r#"<?xml version="1.0" encoding="utf-8" ?><Update Type="InvalidateAccount"/>"#;

const GET_TOKEN_READY: &str = r#"Response Type="GetToken" Status="Ready""#;
const AUTH_FAIL: &str = r#"Response Status="Fail" Type="Authenticate""#;
const GET_TOKEN_COMPLETED: &str = r#"Update Type="GetToken" Status="Completed""#;
const AUTH_OKAY: &str = r#"Response Type="AuthToken" Status="Okay""#;
const STATUS_UPDATE: &str = r#"Update Type="Status""#;
const DEVICE_STATE_OKAY: &str = r#"Response Type="DeviceState" Status="Okay""#;

/// One structured event decoded from a single control-channel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// The fixed `DRC-1.00` greeting; the line protocol has started.
    Greeting,
    /// The device invalidated the account and expects a login request.
    InvalidateAccount,
    /// Pairing is armed; the device must be power-cycled within a bounded
    /// window to complete it.
    GetTokenReady,
    /// Explicit authentication failure with the vendor's error code.
    AuthFailure { error_code: String },
    /// Pairing completed; the device issued a fresh session token.
    GetTokenCompleted { token: String },
    /// Token login accepted.
    AuthSuccess,
    /// Asynchronous single-attribute status update.
    StatusUpdate { id: String, value: String },
    /// Full device-state response: every attribute the device reported.
    DeviceStateResponse { attributes: Vec<(String, String)> },
}

/// Classifies one decoded line into a [`LineEvent`].
///
/// Rules are applied in precedence order (greeting, invalidate-account,
/// get-token-ready, auth-fail, get-token-completed, auth-success,
/// status-update, device-state-response); the first match wins.  Returns
/// `None` for anything unrecognized.
pub fn classify_line(line: &str) -> Option<LineEvent> {
    if line == GREETING {
        return Some(LineEvent::Greeting);
    }
    if line == INVALIDATE_ACCOUNT {
        return Some(LineEvent::InvalidateAccount);
    }
    if line.contains(GET_TOKEN_READY) {
        return Some(LineEvent::GetTokenReady);
    }
    if line.contains(AUTH_FAIL) {
        let error_code = attribute(line, "ErrorCode").unwrap_or_default();
        return Some(LineEvent::AuthFailure { error_code });
    }
    if line.contains(GET_TOKEN_COMPLETED) {
        // A completed notice without a token is useless; fall through to
        // the no-op rather than report an empty credential.
        return attribute(line, "Token").map(|token| LineEvent::GetTokenCompleted { token });
    }
    if line.contains(AUTH_OKAY) {
        return Some(LineEvent::AuthSuccess);
    }
    if line.contains(STATUS_UPDATE) {
        let (id, value) = attribute_pair(line)?;
        return Some(LineEvent::StatusUpdate { id, value });
    }
    if line.contains(DEVICE_STATE_OKAY) {
        return Some(LineEvent::DeviceStateResponse {
            attributes: parse_state_attributes(line),
        });
    }
    trace!(line, "ignoring unrecognized control line");
    None
}

/// Splits a full device-state line on the `"><"` element boundary and
/// extracts every well-formed `Attr` element, skipping malformed fragments.
fn parse_state_attributes(line: &str) -> Vec<(String, String)> {
    line.split("><")
        .filter(|fragment| fragment.contains("Attr ") && fragment.contains(" Type=\""))
        .filter_map(attribute_pair)
        .collect()
}

/// Extracts the (`ID`, `Value`) pair from a fragment containing one `Attr`
/// element, or `None` if either attribute is missing.
fn attribute_pair(fragment: &str) -> Option<(String, String)> {
    let id = attribute(fragment, "ID")?;
    let value = attribute(fragment, "Value")?;
    Some((id, value))
}

/// Extracts the value of `name="..."` from `fragment`.
///
/// The needle is prefixed with a space so that `ID` does not match inside
/// `DUID` or `CommandID`.
fn attribute(fragment: &str, name: &str) -> Option<String> {
    let needle = format!(" {name}=\"");
    let start = fragment.find(&needle)? + needle.len();
    let rest = &fragment[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_owned())
}
