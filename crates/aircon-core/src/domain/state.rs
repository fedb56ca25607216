//! The converging key/value picture of one appliance.
//!
//! `DeviceState` is owned exclusively by its session and mutated only from
//! the line-handling path (single writer).  Every incoming structured event
//! merges into it left-biased (new keys overwrite old ones), and it is
//! never reset wholesale after construction, so the picture only converges
//! as more lines arrive.

use std::collections::BTreeMap;

use serde::Serialize;

/// Attribute map plus session-control flags for one device session.
///
/// The flags are part of the state on purpose: the handshake and the
/// status-fetch wait loops are both driven by watching them flip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    /// Vendor attribute id → last reported value.  A `BTreeMap` keeps the
    /// serialized output stable for logging and the CLI.
    pub attributes: BTreeMap<String, String>,
    /// A full device-state response has been requested but not yet merged.
    pub pending_status: bool,
    /// The device accepted authentication (token login or completed pairing).
    pub login_success: bool,
    /// Pairing is armed and waiting on a physical power-cycle.
    pub waiting: bool,
    /// Human-readable note about the current session phase; empty when idle.
    pub message: String,
}

impl DeviceState {
    /// Merges a single attribute, overwriting any previous value.
    pub fn merge_attribute(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(id.into(), value.into());
    }

    /// Merges a batch of attributes at once, left-biased per key.
    pub fn merge_attributes<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.attributes.extend(pairs);
    }

    /// Returns the last reported value of `id`, if any.
    pub fn attribute(&self, id: &str) -> Option<&str> {
        self.attributes.get(id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_attribute_overwrites_existing_key() {
        let mut state = DeviceState::default();
        state.merge_attribute("AC_FUN_TEMPSET", "20");
        state.merge_attribute("AC_FUN_TEMPSET", "23");

        assert_eq!(state.attribute("AC_FUN_TEMPSET"), Some("23"));
        assert_eq!(state.attributes.len(), 1);
    }

    #[test]
    fn test_merge_attributes_is_idempotent() {
        let pairs = vec![
            ("AC_FUN_POWER".to_owned(), "On".to_owned()),
            ("AC_FUN_TEMPSET".to_owned(), "23".to_owned()),
        ];

        let mut once = DeviceState::default();
        once.merge_attributes(pairs.clone());

        let mut twice = DeviceState::default();
        twice.merge_attributes(pairs.clone());
        twice.merge_attributes(pairs);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_does_not_clear_unrelated_keys() {
        let mut state = DeviceState::default();
        state.merge_attribute("AC_FUN_POWER", "On");
        state.merge_attributes(vec![("AC_FUN_TEMPSET".to_owned(), "23".to_owned())]);

        assert_eq!(state.attribute("AC_FUN_POWER"), Some("On"));
        assert_eq!(state.attribute("AC_FUN_TEMPSET"), Some("23"));
    }
}
