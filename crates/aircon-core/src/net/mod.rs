//! Network math with no sockets: only pure address derivation lives here.

pub mod broadcast;
