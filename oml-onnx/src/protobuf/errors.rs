use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::protobuf::varint::VarintError;

/// Errors parsing Protocol Buffers messages.
#[derive(Debug)]
pub struct ProtobufError {
    kind: ErrorKind,
    context: Option<&'static str>,
    field: Option<u64>,
}

impl ProtobufError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            field: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Return the message type associated with this error.
    pub fn context(&self) -> Option<&str> {
        self.context
    }

    /// Return the field number associated with this error.
    pub fn field(&self) -> Option<u64> {
        self.field
    }

    /// Associate a message type and/or field number with this error.
    ///
    /// Context that is already set is kept, so the innermost message which
    /// reported the error is the one that is displayed.
    pub fn with_context(mut self, context: Option<&'static str>, field: Option<u64>) -> Self {
        if self.context.is_none() {
            self.context = context;
            self.field = field;
        }
        self
    }
}

impl Display for ProtobufError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.context, self.field) {
            (Some(context), Some(field)) => {
                write!(f, "error in message {} field {}: {}", context, field, self.kind)
            }
            (Some(context), None) => write!(f, "error in message {}: {}", context, self.kind),
            _ => self.kind.fmt(f),
        }
    }
}

impl Error for ProtobufError {}

impl From<VarintError> for ProtobufError {
    fn from(val: VarintError) -> Self {
        match val {
            VarintError::Eof => Self::new(ErrorKind::Eof),
            VarintError::InvalidVarint => Self::new(ErrorKind::InvalidVarint),
        }
    }
}

/// Enum describing the kind of a [`ProtobufError`] error.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid varint value was encountered.
    ///
    /// This is reported if a varint contains more than 64 bits of value data,
    /// or the input ends part-way through a varint.
    InvalidVarint,

    /// The end of the input was reached unexpectedly.
    Eof,

    /// Attempted to read a field value of a type that doesn't match the wire
    /// type.
    FieldTypeMismatch,

    /// A packed repeated field has a length that is not a multiple of the
    /// element size.
    FieldLengthMismatch,

    /// A field has an invalid wire type.
    ///
    /// Protocol Buffers defines 6 wire types, but uses 3 bits to encode them.
    /// Hence there are two unused values.
    InvalidWireType,

    /// A string field contained invalid UTF-8.
    InvalidUtf8,

    /// Embedded messages are nested more deeply than
    /// [`MAX_MESSAGE_DEPTH`](crate::protobuf::MAX_MESSAGE_DEPTH).
    RecursionLimit,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidVarint => write!(f, "invalid varint"),
            ErrorKind::Eof => write!(f, "unexpected end of message"),
            ErrorKind::FieldTypeMismatch => write!(f, "field type mismatch"),
            ErrorKind::FieldLengthMismatch => write!(f, "field length mismatch"),
            ErrorKind::InvalidWireType => write!(f, "invalid wire type"),
            ErrorKind::InvalidUtf8 => write!(f, "invalid UTF-8 in string"),
            ErrorKind::RecursionLimit => write!(f, "messages nested too deeply"),
        }
    }
}
