//! Application layer use cases.
//!
//! Sits between the pure domain in `aircon-core` and the OS-facing
//! infrastructure: orchestrates discovery and session establishment to
//! fulfil a user goal, without owning any socket or file handle itself.

pub mod acquire_device;
