//! Wire protocol module.
//!
//! Defines message framing and the client/server message types.
//!
//! ## Wire Format
//!
//! Frames are length-prefixed JSON:
//! ```text
//! [4 bytes: length (big-endian u32)][JSON payload]
//! ```
//!
//! The format deliberately has no compression or content negotiation;
//! frames that carry a compressed payload are refused at the framing layer.

mod message;
mod response;
mod wire;

pub use message::ClientMessage;
pub use response::{ErrorBody, Response};
pub use wire::{read_frame, read_frame_with_timeout, write_frame, write_frame_with_timeout};
