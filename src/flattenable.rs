//! Flattening and unflattening of individual values.
//!
//! Flattening is the Haiku concept of storing any type of data as a byte stream and reading it
//! back. Every type a [`Message`][crate::Message] field can hold implements [`Flattenable`], which
//! is what the message's generic `add`, `find`, and `replace` accessors are built on.

use crate::error::{Error, Result};
use crate::type_code::TypeCode;

/// A type that has an entry in the type registry and a byte encoding.
///
/// `flatten_into` writes only the value itself. For variable-size types, the message adds the
/// length prefix around it, so `unflatten` always receives exactly the bytes `flatten_into`
/// produced.
pub trait Flattenable: Sized {
    /// The registry type this Rust type is stored as.
    const TYPE: TypeCode;

    /// Number of bytes `flatten_into` will write.
    fn flattened_size(&self) -> usize;

    /// Append the flattened value to `buf`.
    fn flatten_into(&self, buf: &mut Vec<u8>);

    /// Read a value back from exactly the bytes produced by `flatten_into`.
    fn unflatten(data: &[u8]) -> Result<Self>;

    /// Read back a value a message already holds. These bytes were checked when they were
    /// stored, so a type may skip limits meant for untrusted input.
    #[doc(hidden)]
    fn unflatten_stored(data: &[u8]) -> Result<Self> {
        Self::unflatten(data)
    }

    fn type_code(&self) -> TypeCode {
        Self::TYPE
    }

    /// Check if flattened values of this type always have the same size.
    fn is_fixed_size(&self) -> bool {
        Self::TYPE.is_fixed_size()
    }

    /// Return a flattened copy of this value.
    fn flatten(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.flattened_size());
        self.flatten_into(&mut buf);
        buf
    }
}

/// Return `data` as a fixed-size array, or fail with the size the type expected.
pub(crate) fn fixed<const N: usize>(type_code: TypeCode, data: &[u8]) -> Result<[u8; N]> {
    data.try_into().map_err(|_| Error::BadValueSize {
        type_code,
        expected: N,
        actual: data.len(),
    })
}

macro_rules! impl_flattenable_number {
    ($t: ty, $p: ident) => {
        impl Flattenable for $t {
            const TYPE: TypeCode = TypeCode::$p;

            fn flattened_size(&self) -> usize {
                std::mem::size_of::<$t>()
            }

            fn flatten_into(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn unflatten(data: &[u8]) -> Result<Self> {
                Ok(<$t>::from_le_bytes(fixed(Self::TYPE, data)?))
            }
        }
    };
}

impl_flattenable_number!(i8, Int8);
impl_flattenable_number!(i16, Int16);
impl_flattenable_number!(i32, Int32);
impl_flattenable_number!(i64, Int64);
impl_flattenable_number!(u8, UInt8);
impl_flattenable_number!(u16, UInt16);
impl_flattenable_number!(u32, UInt32);
impl_flattenable_number!(u64, UInt64);
impl_flattenable_number!(f32, Float);
impl_flattenable_number!(f64, Double);

impl Flattenable for bool {
    const TYPE: TypeCode = TypeCode::Bool;

    fn flattened_size(&self) -> usize {
        1
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }

    // Any non-zero byte reads as true.
    fn unflatten(data: &[u8]) -> Result<Self> {
        let [v] = fixed::<1>(Self::TYPE, data)?;
        Ok(v != 0)
    }
}

impl Flattenable for String {
    const TYPE: TypeCode = TypeCode::String;

    fn flattened_size(&self) -> usize {
        self.len()
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        std::str::from_utf8(data)
            .map(str::to_owned)
            .map_err(|source| Error::InvalidString {
                name: String::new(),
                source,
            })
    }
}

/// Raw bytes are stored untouched.
impl Flattenable for Vec<u8> {
    const TYPE: TypeCode = TypeCode::Raw;

    fn flattened_size(&self) -> usize {
        self.len()
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn little_endian_numbers() {
        assert_eq!(1234u16.flatten(), vec![0xd2, 0x04]);
        assert_eq!((-2i32).flatten(), vec![0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(1.0f32.flatten(), vec![0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(u64::unflatten(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap(), 1);
        assert_eq!(f64::unflatten(&2.5f64.flatten()).unwrap(), 2.5);
    }

    #[test]
    fn wrong_width() {
        match i32::unflatten(&[1, 2, 3]) {
            Err(Error::BadValueSize {
                type_code,
                expected,
                actual,
            }) => {
                assert_eq!(type_code, TypeCode::Int32);
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected BadValueSize, got {:?}", other),
        }
        assert!(bool::unflatten(&[]).is_err());
    }

    #[test]
    fn bools() {
        assert_eq!(true.flatten(), vec![1]);
        assert_eq!(false.flatten(), vec![0]);
        assert!(bool::unflatten(&[0x7f]).unwrap());
        assert!(!bool::unflatten(&[0]).unwrap());
    }

    #[test]
    fn strings() {
        let s = String::from("application/x-vnd.haiku-registrar");
        assert_eq!(s.flattened_size(), s.len());
        assert_eq!(String::unflatten(&s.flatten()).unwrap(), s);
        assert!(matches!(
            String::unflatten(&[0xff, 0xfe]),
            Err(Error::InvalidString { .. })
        ));
    }

    #[test]
    fn type_codes() {
        assert_eq!(7u8.type_code(), TypeCode::UInt8);
        assert!(7u8.is_fixed_size());
        assert_eq!(vec![1u8, 2].type_code(), TypeCode::Raw);
        assert!(!String::new().is_fixed_size());
    }
}
