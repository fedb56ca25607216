//! Discovery-side domain types: the advertisement a device broadcasts and
//! the descriptor a caller uses to open exactly one session.

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Vendor header carrying the model code in an advertisement.
pub const MODEL_CODE_HEADER: &str = "MODELCODE";

/// Vendor header carrying the device MAC address in an advertisement.
pub const MAC_ADDRESS_HEADER: &str = "MAC_ADDR";

/// One inbound NOTIFY-style advertisement, as reported by the device.
///
/// Ephemeral: consumed by the discovery listener to decide whether the
/// sender is the targeted appliance class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAdvertisement {
    /// Vendor model code, when present.
    pub model_code: Option<String>,
    /// Device MAC address, when present.
    pub mac_address: Option<String>,
    /// Source address the datagram arrived from.
    pub source: Ipv4Addr,
    /// The raw vendor header block, verbatim.
    pub headers: HashMap<String, String>,
}

impl DeviceAdvertisement {
    /// Parses a NOTIFY-style datagram into an advertisement.
    ///
    /// The first line (the request line) is skipped; every following
    /// `KEY: value` line becomes a header.  Malformed lines are dropped
    /// individually; vendor firmware is not strict about its own format.
    pub fn parse(datagram: &str, source: Ipv4Addr) -> Self {
        let mut headers = HashMap::new();
        for line in datagram.lines().skip(1) {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_owned(), value.trim().to_owned());
            }
        }
        let model_code = headers.get(MODEL_CODE_HEADER).cloned();
        let mac_address = headers.get(MAC_ADDRESS_HEADER).cloned();
        Self {
            model_code,
            mac_address,
            source,
            headers,
        }
    }

    /// Whether this advertisement came from the expected appliance class.
    pub fn matches(&self, expected_model_code: &str) -> bool {
        self.model_code.as_deref() == Some(expected_model_code)
    }
}

/// Identity of one discovered appliance, used to construct exactly one
/// device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device MAC address; doubles as the protocol-level DUID.
    pub mac: String,
    /// Address the device advertised from.
    pub ip: Ipv4Addr,
    /// The raw vendor headers from the winning advertisement.
    pub info: HashMap<String, String>,
}

impl DeviceDescriptor {
    /// Builds a descriptor from a matching advertisement.
    ///
    /// Returns `None` when the advertisement carries no MAC address; a
    /// session cannot be keyed without a DUID.
    pub fn from_advertisement(advertisement: &DeviceAdvertisement) -> Option<Self> {
        let mac = advertisement.mac_address.clone()?;
        Some(Self {
            mac,
            ip: advertisement.source,
            info: advertisement.headers.clone(),
        })
    }
}
