use std::convert::TryFrom;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::flattenable::Flattenable;
use crate::geometry::{Point, Rect, RgbColor, Size};
use crate::message::Message;
use crate::type_code::TypeCode;

/// A single field value of any registered type.
///
/// Nested messages are boxed so a `Value` stays small; each one is an independent copy.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Color(RgbColor),
    String(String),
    Raw(Vec<u8>),
    Message(Box<Message>),
}

// Expands a match over every variant, binding the payload to `$v` and running `$body`, which is
// always a call into the payload's `Flattenable` implementation.
macro_rules! each_value {
    ($value: expr, $v: ident => $body: expr) => {
        match $value {
            Value::Bool($v) => $body,
            Value::Int8($v) => $body,
            Value::Int16($v) => $body,
            Value::Int32($v) => $body,
            Value::Int64($v) => $body,
            Value::UInt8($v) => $body,
            Value::UInt16($v) => $body,
            Value::UInt32($v) => $body,
            Value::UInt64($v) => $body,
            Value::Float($v) => $body,
            Value::Double($v) => $body,
            Value::Point($v) => $body,
            Value::Size($v) => $body,
            Value::Rect($v) => $body,
            Value::Color($v) => $body,
            Value::String($v) => $body,
            Value::Raw($v) => $body,
            Value::Message($v) => $body,
        }
    };
}

impl Value {
    pub fn type_code(&self) -> TypeCode {
        each_value!(self, v => v.type_code())
    }

    /// Size of the value itself, without any length prefix.
    pub fn flattened_size(&self) -> usize {
        each_value!(self, v => v.flattened_size())
    }

    pub fn flatten_into(&self, buf: &mut Vec<u8>) {
        each_value!(self, v => v.flatten_into(buf))
    }

    /// Decode one value of type `type_code` from exactly the bytes it was flattened to.
    pub fn unflatten(type_code: TypeCode, data: &[u8]) -> Result<Value> {
        Self::decode(type_code, data, false)
    }

    /// Decode a value held by a message, without re-applying the nesting limit to messages.
    pub(crate) fn unflatten_stored(type_code: TypeCode, data: &[u8]) -> Result<Value> {
        Self::decode(type_code, data, true)
    }

    fn decode(type_code: TypeCode, data: &[u8], stored: bool) -> Result<Value> {
        fn read<T: Flattenable>(data: &[u8], stored: bool) -> Result<T> {
            if stored {
                T::unflatten_stored(data)
            } else {
                T::unflatten(data)
            }
        }
        Ok(match type_code {
            TypeCode::Bool => Value::Bool(read(data, stored)?),
            TypeCode::Int8 => Value::Int8(read(data, stored)?),
            TypeCode::Int16 => Value::Int16(read(data, stored)?),
            TypeCode::Int32 => Value::Int32(read(data, stored)?),
            TypeCode::Int64 => Value::Int64(read(data, stored)?),
            TypeCode::UInt8 => Value::UInt8(read(data, stored)?),
            TypeCode::UInt16 => Value::UInt16(read(data, stored)?),
            TypeCode::UInt32 => Value::UInt32(read(data, stored)?),
            TypeCode::UInt64 => Value::UInt64(read(data, stored)?),
            TypeCode::Float => Value::Float(read(data, stored)?),
            TypeCode::Double => Value::Double(read(data, stored)?),
            TypeCode::Point => Value::Point(read(data, stored)?),
            TypeCode::Size => Value::Size(read(data, stored)?),
            TypeCode::Rect => Value::Rect(read(data, stored)?),
            TypeCode::Color => Value::Color(read(data, stored)?),
            TypeCode::String => Value::String(read(data, stored)?),
            TypeCode::Raw => Value::Raw(read(data, stored)?),
            TypeCode::Message => Value::Message(Box::new(read(data, stored)?)),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(ref val) = *self {
            Some(val.as_str())
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        if let Value::Raw(ref val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        if let Value::Message(ref val) = *self {
            Some(val)
        } else {
            None
        }
    }

    /// Widen any integer value to `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v),
            Value::UInt8(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_value_from {
    ($t: ty, $p: ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$p(v)
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i8, Int8);
impl_value_from!(i16, Int16);
impl_value_from!(i32, Int32);
impl_value_from!(i64, Int64);
impl_value_from!(u8, UInt8);
impl_value_from!(u16, UInt16);
impl_value_from!(u32, UInt32);
impl_value_from!(u64, UInt64);
impl_value_from!(f32, Float);
impl_value_from!(f64, Double);
impl_value_from!(Point, Point);
impl_value_from!(Size, Size);
impl_value_from!(Rect, Rect);
impl_value_from!(RgbColor, Color);
impl_value_from!(String, String);
impl_value_from!(Vec<u8>, Raw);

impl From<Message> for Value {
    fn from(v: Message) -> Self {
        Value::Message(Box::new(v))
    }
}

impl<'a> From<&'a str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<'a> From<&'a [u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Raw(v.into())
    }
}

macro_rules! impl_try_from_value {
    ($t: ty, $p: ident) => {
        impl TryFrom<Value> for $t {
            type Error = Value;
            fn try_from(v: Value) -> Result<Self, Self::Error> {
                match v {
                    Value::$p(v) => Ok(v),
                    _ => Err(v),
                }
            }
        }
    };
}

impl_try_from_value!(bool, Bool);
impl_try_from_value!(i8, Int8);
impl_try_from_value!(i16, Int16);
impl_try_from_value!(i32, Int32);
impl_try_from_value!(i64, Int64);
impl_try_from_value!(u8, UInt8);
impl_try_from_value!(u16, UInt16);
impl_try_from_value!(u32, UInt32);
impl_try_from_value!(u64, UInt64);
impl_try_from_value!(f32, Float);
impl_try_from_value!(f64, Double);
impl_try_from_value!(Point, Point);
impl_try_from_value!(Size, Size);
impl_try_from_value!(Rect, Rect);
impl_try_from_value!(RgbColor, Color);
impl_try_from_value!(String, String);
impl_try_from_value!(Vec<u8>, Raw);

impl TryFrom<Value> for Message {
    type Error = Value;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Message(v) => Ok(*v),
            _ => Err(v),
        }
    }
}

/// Prints the value the way it shows up in a message dump: the type name, then the value in
/// parentheses. Nested messages print on a single line; use the message's own `Display` for an
/// indented dump.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.type_code().name();
        match self {
            Value::Bool(v) => write!(f, "{}({})", name, v),
            Value::Int8(v) => write!(f, "{}({})", name, v),
            Value::Int16(v) => write!(f, "{}({})", name, v),
            Value::Int32(v) => write!(f, "{}({})", name, v),
            Value::Int64(v) => write!(f, "{}({})", name, v),
            Value::UInt8(v) => write!(f, "{}(0x{:02x} or {})", name, v, v),
            Value::UInt16(v) => write!(f, "{}({})", name, v),
            Value::UInt32(v) => write!(f, "{}({})", name, v),
            Value::UInt64(v) => write!(f, "{}({})", name, v),
            Value::Float(v) => write!(f, "{}({:.4})", name, v),
            Value::Double(v) => write!(f, "{}({:.8})", name, v),
            Value::Point(v) => write!(f, "{}{}", name, v),
            Value::Size(v) => write!(f, "{}{}", name, v),
            Value::Rect(v) => write!(f, "{}{}", name, v),
            Value::Color(v) => write!(f, "{}{}", name, v),
            Value::String(v) => write!(f, "{}({:?}, {} bytes)", name, v, v.len()),
            Value::Raw(v) => {
                write!(f, "{}({} bytes:", name, v.len())?;
                for b in v.iter().take(16) {
                    write!(f, " {:02x}", b)?;
                }
                if v.len() > 16 {
                    f.write_str(" ...")?;
                }
                f.write_str(")")
            }
            Value::Message(v) => write!(f, "{}({} fields)", name, v.count_names()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int8(v) => serializer.serialize_i8(*v),
            Value::Int16(v) => serializer.serialize_i16(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::UInt8(v) => serializer.serialize_u8(*v),
            Value::UInt16(v) => serializer.serialize_u16(*v),
            Value::UInt32(v) => serializer.serialize_u32(*v),
            Value::UInt64(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Point(v) => v.serialize(serializer),
            Value::Size(v) => v.serialize(serializer),
            Value::Rect(v) => v.serialize(serializer),
            Value::Color(v) => v.serialize(serializer),
            Value::String(v) => serializer.serialize_str(v),
            Value::Raw(v) => {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&STANDARD.encode(v))
                } else {
                    serializer.serialize_bytes(v)
                }
            }
            Value::Message(v) => v.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::four_cc;

    #[test]
    fn from_and_back() {
        let v = Value::from(1234u16);
        assert_eq!(v.type_code(), TypeCode::UInt16);
        assert_eq!(u16::try_from(v.clone()), Ok(1234));
        assert_eq!(i32::try_from(v.clone()), Err(v));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(&b"\x00\x01"[..]).as_slice(), Some(&[0u8, 1u8][..]));
    }

    #[test]
    fn flatten_dispatch() {
        let values = vec![
            Value::from(true),
            Value::from(-5i64),
            Value::from(Rect::new(0.0, 0.0, 10.0, 20.0)),
            Value::from(RgbColor::new(255, 0, 0, 255)),
            Value::from("text"),
            Value::from(vec![9u8, 8, 7]),
            Value::from(Message::new(four_cc(b"nest"))),
        ];
        for v in values {
            let mut buf = Vec::new();
            v.flatten_into(&mut buf);
            assert_eq!(buf.len(), v.flattened_size());
            if let Some(width) = v.type_code().fixed_size() {
                assert_eq!(buf.len(), width);
            }
            assert_eq!(Value::unflatten(v.type_code(), &buf).unwrap(), v);
        }
    }

    #[test]
    fn widening() {
        assert_eq!(Value::from(200u8).as_i64(), Some(200));
        assert_eq!(Value::from(u64::MAX).as_i64(), None);
        assert_eq!(Value::from(1.5f32).as_f64(), Some(1.5));
        assert_eq!(Value::from("x").as_i64(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Value::from(97u8).to_string(), "uint8(0x61 or 97)");
        assert_eq!(Value::from(1234u16).to_string(), "uint16(1234)");
        assert_eq!(Value::from("ab").to_string(), "string(\"ab\", 2 bytes)");
        assert_eq!(
            Value::from(vec![1u8, 0xff]).to_string(),
            "raw(2 bytes: 01 ff)"
        );
    }

    #[test]
    fn serialize_json() {
        assert_eq!(serde_json::to_string(&Value::from(-3i16)).unwrap(), "-3");
        assert_eq!(
            serde_json::to_string(&Value::from(vec![0u8, 1, 2])).unwrap(),
            "\"AAEC\""
        );
        assert_eq!(
            serde_json::to_string(&Value::from(Point::new(1.0, 2.0))).unwrap(),
            "{\"x\":1.0,\"y\":2.0}"
        );
    }
}
