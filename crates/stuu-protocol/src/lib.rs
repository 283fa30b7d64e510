//! Wire protocol for the stuu native engine.
//!
//! The engine and its controller exchange frames over a Unix stream socket:
//!
//! ```text
//! +----------------+--------------------------------+
//! | length (4 BE)  |  one encoded Value (length B)  |
//! +----------------+--------------------------------+
//! ```
//!
//! Frame bodies use a MessagePack-compatible subset (see [`codec`]). Every
//! body decodes to a single map that is either a request, a response or an
//! unsolicited event (see [`message`]).
//!
//! # Example
//!
//! ```rust
//! use stuu_protocol::{FrameBuffer, Request, encode_frame};
//!
//! let request = Request::new(7, "transport.get_state");
//! let bytes = encode_frame(&request.to_value()).unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.feed(&bytes);
//! let body = buffer.next_frame().unwrap().unwrap();
//! assert_eq!(body.len() + 4, bytes.len());
//! ```

pub mod codec;
mod error;
pub mod fields;
pub mod framing;
mod json;
pub mod message;
mod value;

pub use codec::{MAX_DECODE_DEPTH, decode, encode, encode_into};
pub use error::{DecodeError, ProtocolError, ProtocolResult};
pub use fields::Fields;
pub use framing::{
    FRAME_HEADER_LEN, FrameBuffer, FrameReader, FrameWriter, decode_body, encode_frame,
};
pub use message::{Event, Request, RequestRejection, Response, TICK_EVENT, snapshot_map};
pub use value::{Map, Value};

/// Maximum frame body size (1 MiB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;
