use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

use crate::type_code::TypeCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building, querying, flattening, or unflattening a
/// [`Message`][crate::Message].
///
/// Accessor errors name the operation (`"add"`, `"find"`, `"replace"`, ...) and the field they
/// were working on. Decoding errors name the decoding step or the field being decoded.
#[derive(Debug, Error)]
pub enum Error {
    /// No field with the requested name exists.
    #[error("field {name:?} not found")]
    NameNotFound { name: String },
    /// The field exists, but holds a different type than the one requested. This is also what
    /// adding a value of a new type under an existing name reports, with `op` set to `"add"`.
    #[error("{op}: field {name:?} holds {found} values, not {expected}")]
    TypeMismatch {
        op: &'static str,
        name: String,
        expected: TypeCode,
        found: TypeCode,
    },
    /// The field exists, but has fewer values than the requested index requires.
    #[error("{op}: index {index} is out of range for field {name:?} with {count} values")]
    IndexOutOfRange {
        op: &'static str,
        name: String,
        index: usize,
        count: usize,
    },
    /// A field name is already used by another field.
    #[error("field name {name:?} is already in use")]
    DuplicateName { name: String },
    /// A field name is empty, too long for the wire format, or not UTF-8.
    #[error("invalid field name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    /// A field would grow past what a 32-bit count or data size can describe.
    #[error("field {name:?} is too large to flatten")]
    FieldTooLarge { name: String },
    /// The destination buffer given to `flatten` can't hold the flattened message.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    /// The buffer doesn't start with the current format marker.
    #[error("bad format marker 0x{found:08x}")]
    BadFormatTag { found: u32 },
    /// The buffer ended before a declared length was satisfied.
    #[error("truncated data on step [{step}]: need {needed} bytes, have {available}")]
    Truncated {
        step: &'static str,
        needed: usize,
        available: usize,
    },
    /// A field descriptor used a type code that isn't in the type registry.
    #[error("unknown field type code 0x{code:08x}")]
    BadFieldType { code: u32 },
    /// A field descriptor declared zero values.
    #[error("field {name:?} declares no values")]
    EmptyField { name: String },
    /// A field's declared data size doesn't match the values it holds.
    #[error("field {name:?} declares {expected} data bytes, but its values use {actual}")]
    FieldSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    /// A fixed-size value was decoded from the wrong number of bytes.
    #[error("{type_code} value needs {expected} bytes, got {actual}")]
    BadValueSize {
        type_code: TypeCode,
        expected: usize,
        actual: usize,
    },
    /// A string value isn't valid UTF-8.
    #[error("string value in field {name:?} is not valid UTF-8")]
    InvalidString {
        name: String,
        #[source]
        source: std::str::Utf8Error,
    },
    /// Bytes were left over after the last field's data.
    #[error("{extra} bytes of trailing data after the message")]
    TrailingData { extra: usize },
    /// Nested messages went deeper than the configured limit.
    #[error("message nesting exceeded the depth limit of {max}")]
    DepthLimitExceeded { max: usize },
    /// The input was larger than the configured size limit.
    #[error("message of {actual} bytes exceeds the size limit of {max}")]
    MessageTooLarge { max: usize, actual: usize },
    /// The data store could not grow to hold more values.
    #[error("could not allocate {requested} more bytes of message data")]
    AllocationFailure {
        requested: usize,
        #[source]
        source: TryReserveError,
    },
    /// Writing a flattened message to a stream failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Attach a field name to a value decoding error that was raised without one.
    pub(crate) fn in_field(self, field: &str) -> Self {
        match self {
            Error::InvalidString { name, source } if name.is_empty() => Error::InvalidString {
                name: field.to_owned(),
                source,
            },
            other => other,
        }
    }
}
