//! The appliance's line-oriented control protocol.
//!
//! - **`request`** – outbound request-line builders and wire constants.
//! - **`parser`** – inbound line classification into [`parser::LineEvent`].

pub mod parser;
pub mod request;
