//! Network infrastructure: interface enumeration, discovery announcements,
//! the per-interface discovery listeners, and the TLS device session.

pub mod advertiser;
pub mod discovery;
pub mod netif;
pub mod session;
