//! Server message decoding and fan-out
//!
//! Inbound payloads are decoded by `ServerProtocolDecoder` and published on an
//! `EventBus` keyed by the message's `type` tag:
//! - `transcript` / `status` - recognized server messages
//! - `unrecognized` - decodable messages of unknown type
//! - `protocol_error` - frames that could not be decoded
//! - `connection` - transport lifecycle changes

mod bus;
mod decoder;
mod messages;

pub use bus::{EventBus, Subscription};
pub use decoder::ServerProtocolDecoder;
pub use messages::{topics, ServerEvent, ServerMessage, ServerStatus};
