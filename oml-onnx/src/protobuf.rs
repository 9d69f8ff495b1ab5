//! Low-level Protocol Buffers message decoder.
//!
//! Messages are decoded from a byte slice. See
//! <https://protobuf.dev/programming-guides/encoding/> for a guide to the
//! wire format.
//!
//! To deserialize a message type, implement [`DecodeMessage`] for it and call
//! [`DecodeMessage::decode`] with the encoded bytes. Implementations iterate
//! over [`Fields`] and update the matching struct field for each
//! [`Field`] number, ignoring unknown fields.

mod errors;
mod field;
mod message;
pub mod varint;

pub use errors::{ErrorKind, ProtobufError};
pub use field::{Field, FieldValue, Fields, MAX_MESSAGE_DEPTH, Repeated};
pub use message::DecodeMessage;
