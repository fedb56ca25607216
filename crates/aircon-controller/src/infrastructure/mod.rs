//! Infrastructure layer: OS-facing adapters.
//!
//! Contains network sockets (discovery and the TLS control channel), the
//! certificate store, and file-system configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `aircon_core`, but MUST NOT be imported by the domain layer.

pub mod certificate;
pub mod network;
pub mod storage;
