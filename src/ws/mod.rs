//! WebSocket transport and wire format

pub mod codec;
pub mod handler;
pub mod protocol;
