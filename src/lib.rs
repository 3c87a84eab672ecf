//! A typed, named key-value message container, wire compatible with a fixed flattened layout.
//!
//! A [`Message`] carries a 32-bit `what` code and an ordered set of named fields. Every field holds
//! one or more values of a single type from the type registry ([`TypeCode`]): booleans, signed and
//! unsigned integers, floats, geometric aggregates ([`Point`], [`Size`], [`Rect`], [`RgbColor`]),
//! strings, raw byte blobs, and nested messages.
//!
//! Messages can be flattened to a single byte buffer and rebuilt from it. Unflattening checks the
//! whole buffer first, so a malformed or truncated buffer is rejected with a structured [`Error`]
//! instead of producing a partial message. See [`format`] for the exact byte layout.
//!
//! ```
//! use bmessage::{four_cc, Message};
//!
//! let mut msg = Message::new(four_cc(b"lnda"));
//! msg.add_string("name", "application/x-vnd.haiku-registrar")?;
//! msg.add_int32("user", 0)?;
//!
//! let flat = msg.flatten_to_vec();
//! let back = Message::unflatten(&flat)?;
//! assert_eq!(back.find_str("name", 0)?, "application/x-vnd.haiku-registrar");
//! assert_eq!(back.find_int32("user", 0)?, 0);
//! # Ok::<(), bmessage::Error>(())
//! ```
//!
//! Every typed accessor is a thin wrapper over the generic [`Message::add`], [`Message::find`],
//! and [`Message::replace`], which work for any [`Flattenable`] type. [`Value`] covers the case
//! where the type is only known at runtime.
//!
//! Nothing in this crate prints. Flattening and unflattening emit `tracing` events at the trace
//! and debug levels, which only show up if the host installs a subscriber.

mod codec;
mod data_store;
mod error;
mod field;
mod flattenable;
mod geometry;
mod message;
mod options;
mod type_code;
mod value;

pub mod format;

pub use codec::{FIELD_HEADER_SIZE, FORMAT_MARKER, HEADER_SIZE};
pub use error::{Error, Result};
pub use field::FieldInfo;
pub use flattenable::Flattenable;
pub use geometry::{Point, Rect, RgbColor, Size};
pub use message::Message;
pub use options::UnflattenOptions;
pub use type_code::{four_cc, four_cc_str, TypeCode, TypeInfo, Width};
pub use value::Value;

/// The default limit on nested messages below the top-level one.
pub const MAX_DEPTH: usize = 64;
/// The default limit on the size of a flattened message. Unbounded, as the wire format can
/// describe messages of any size; set [`UnflattenOptions::max_size`] when reading untrusted input.
pub const MAX_MESSAGE_SIZE: usize = usize::MAX;
