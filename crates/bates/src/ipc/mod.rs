//! Parent/worker transport.
//!
//! - [`channel`] - the socket pair and its owned ends.
//! - [`codec`] - MessagePack encoding of the request and response frames.

pub mod channel;
pub mod codec;

pub use channel::{Channel, Endpoint};
pub use codec::{MAX_FRAME_LEN, Request, Response};
