//! Outbound request lines and wire constants for the control channel.
//!
//! Every request is a single XML-like line, written to the socket followed
//! by CRLF.  The literal forms below must match the appliance byte-for-byte
//! (excluding the dynamic fields); the device rejects or silently drops
//! anything else, so the builders are `format!` templates rather than a
//! serializer.

/// Greeting line the appliance sends immediately after TLS establishment.
pub const GREETING: &str = "DRC-1.00";

/// TCP port of the TLS control channel.
pub const CONTROL_PORT: u16 = 2878;

/// UDP port used for discovery announcements and advertisements.
pub const DISCOVERY_PORT: u16 = 1900;

/// Model code carried in advertisements from the targeted appliance class.
pub const EXPECTED_MODEL_CODE: &str = "SAMSUNG_DEVICE";

/// Token login request, sent in response to the invalidate-account notice
/// when a session token is already known.
pub fn auth_token(token: &str) -> String {
    format!(r#"<Request Type="AuthToken"><User Token="{token}" /></Request>"#)
}

/// Pairing request, sent in response to the invalidate-account notice when
/// no token is known.  The device answers with a `GetToken Ready` notice
/// and expects a physical power-cycle to complete the exchange.
pub fn get_token() -> String {
    r#"<Request Type="GetToken" />"#.to_owned()
}

/// Full device-state request, keyed by the device's MAC address (its DUID).
pub fn device_state(duid: &str) -> String {
    format!(r#"<Request Type="DeviceState" DUID="{duid}"></Request>"#)
}

/// Single-attribute control request.  `command_id` is a caller-generated
/// pseudo-random number; the device never echoes it back, so it correlates
/// nothing.  It only has to be present.
pub fn device_control(duid: &str, command_id: u32, attribute_id: &str, value: &str) -> String {
    format!(
        r#"<Request Type="DeviceControl"><Control CommandID="cmd{command_id}" DUID="{duid}"><Attr ID="{attribute_id}" Value="{value}" /></Control></Request>"#
    )
}
