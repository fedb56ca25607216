//! Pure domain model: device state, discovery descriptors, and the typed
//! arguments of the climate convenience commands.  No OS calls, no network
//! I/O, no file system access.

pub mod climate;
pub mod device;
pub mod state;
