//! # aircon-core
//!
//! Shared library for Aircon-Over-LAN containing the line-oriented control
//! protocol, the device-state domain model, and the classful broadcast math
//! used by discovery.
//!
//! This crate is used by the controller application.  It has zero
//! dependencies on OS APIs or network sockets: everything here is pure
//! logic that can be unit-tested without a device on the network.
//!
//! # Architecture overview
//!
//! The targeted appliance speaks two protocols, and this crate models the
//! data side of both:
//!
//! - **`protocol`** – The control channel.  Newline-terminated UTF-8 lines
//!   over TLS, each an XML-like self-closing element.  `protocol::request`
//!   builds the outbound request lines; `protocol::parser` classifies each
//!   inbound line into a [`LineEvent`].  There is deliberately no DOM-style
//!   XML parser here: the vendor's dialect is handled as line-pattern
//!   matching, which is what real deployments are bit-compatible with.
//!
//! - **`domain`** – The converging key/value picture of one appliance:
//!   [`DeviceState`] (attribute map plus session flags), the
//!   [`DeviceAdvertisement`] parsed from a discovery datagram, and the
//!   [`DeviceDescriptor`] handed to a session.
//!
//! - **`net`** – [`broadcast_for`], the legacy classful broadcast-address
//!   derivation used when announcing the controller on a subnet.

pub mod domain;
pub mod net;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `aircon_core::DeviceState` instead of the full module path.
pub use domain::device::{DeviceAdvertisement, DeviceDescriptor};
pub use domain::state::DeviceState;
pub use net::broadcast::broadcast_for;
pub use protocol::parser::{classify_line, LineEvent};
