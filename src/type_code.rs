use std::fmt;

use serde::ser::{Serialize, Serializer};

/// Build a four-character code the same way Haiku's multi-character constants are built: the
/// first byte lands in the most significant position.
///
/// ```
/// assert_eq!(bmessage::four_cc(b"abcd"), 0x6162_6364);
/// ```
pub const fn four_cc(code: &[u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | (code[3] as u32)
}

/// Render a code as its four characters if they're all printable ASCII.
pub fn four_cc_str(code: u32) -> Option<String> {
    let bytes = code.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        None
    }
}

/// Storage class of a type on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    /// Every value takes exactly this many bytes, and values are packed back-to-back.
    Fixed(usize),
    /// Every value is preceded by a u32 byte length.
    Variable,
}

/// One row of the type registry.
#[derive(Clone, Copy, Debug)]
pub struct TypeInfo {
    pub type_code: TypeCode,
    pub code: u32,
    pub width: Width,
    pub name: &'static str,
}

/// The closed set of value types a message field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeCode {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Point,
    Size,
    Rect,
    Color,
    String,
    Raw,
    Message,
}

// Indexed by the `TypeCode` discriminant; `registry_is_indexed_by_discriminant` keeps the two in
// step.
static REGISTRY: [TypeInfo; 18] = [
    entry(TypeCode::Bool, b"BOOL", Width::Fixed(1), "bool"),
    entry(TypeCode::Int8, b"BYTE", Width::Fixed(1), "int8"),
    entry(TypeCode::Int16, b"SHRT", Width::Fixed(2), "int16"),
    entry(TypeCode::Int32, b"LONG", Width::Fixed(4), "int32"),
    entry(TypeCode::Int64, b"LLNG", Width::Fixed(8), "int64"),
    entry(TypeCode::UInt8, b"UBYT", Width::Fixed(1), "uint8"),
    entry(TypeCode::UInt16, b"USHT", Width::Fixed(2), "uint16"),
    entry(TypeCode::UInt32, b"ULNG", Width::Fixed(4), "uint32"),
    entry(TypeCode::UInt64, b"ULLG", Width::Fixed(8), "uint64"),
    entry(TypeCode::Float, b"FLOT", Width::Fixed(4), "float"),
    entry(TypeCode::Double, b"DBLE", Width::Fixed(8), "double"),
    entry(TypeCode::Point, b"BPNT", Width::Fixed(8), "point"),
    entry(TypeCode::Size, b"SIZE", Width::Fixed(8), "size"),
    entry(TypeCode::Rect, b"RECT", Width::Fixed(16), "rect"),
    entry(TypeCode::Color, b"RGBC", Width::Fixed(4), "rgb_color"),
    entry(TypeCode::String, b"CSTR", Width::Variable, "string"),
    entry(TypeCode::Raw, b"RAWT", Width::Variable, "raw"),
    entry(TypeCode::Message, b"MSGG", Width::Variable, "message"),
];

const fn entry(type_code: TypeCode, code: &[u8; 4], width: Width, name: &'static str) -> TypeInfo {
    TypeInfo {
        type_code,
        code: four_cc(code),
        width,
        name,
    }
}

impl TypeCode {
    /// Look up this type's registry entry.
    pub fn info(self) -> &'static TypeInfo {
        &REGISTRY[self as usize]
    }

    /// Every registered type, in registry order.
    pub fn all() -> impl Iterator<Item = TypeCode> {
        REGISTRY.iter().map(|info| info.type_code)
    }

    /// The 32-bit code written on the wire for this type.
    pub fn code(self) -> u32 {
        self.info().code
    }

    /// Resolve a wire code back to a type. Returns `None` if the code isn't registered.
    pub fn from_code(code: u32) -> Option<TypeCode> {
        REGISTRY
            .iter()
            .find(|info| info.code == code)
            .map(|info| info.type_code)
    }

    pub fn width(self) -> Width {
        self.info().width
    }

    /// Byte width of one value, or `None` for length-prefixed types.
    pub fn fixed_size(self) -> Option<usize> {
        match self.width() {
            Width::Fixed(size) => Some(size),
            Width::Variable => None,
        }
    }

    pub fn is_fixed_size(self) -> bool {
        self.fixed_size().is_some()
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TypeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_is_indexed_by_discriminant() {
        for (i, info) in REGISTRY.iter().enumerate() {
            assert_eq!(info.type_code as usize, i, "Registry row {} is out of order", i);
        }
    }

    #[test]
    fn codes_roundtrip() {
        let mut seen = HashSet::new();
        for t in TypeCode::all() {
            assert!(seen.insert(t.code()), "Duplicate code for {}", t);
            assert_eq!(TypeCode::from_code(t.code()), Some(t));
        }
        assert_eq!(seen.len(), 18);
        assert_eq!(TypeCode::from_code(four_cc(b"NOPE")), None);
    }

    #[test]
    fn haiku_constants() {
        assert_eq!(TypeCode::Int32.code(), 0x4c4f_4e47);
        assert_eq!(TypeCode::String.code(), four_cc(b"CSTR"));
        assert_eq!(TypeCode::Message.code(), four_cc(b"MSGG"));
        assert_eq!(TypeCode::UInt8.code(), four_cc(b"UBYT"));
    }

    #[test]
    fn widths() {
        assert_eq!(TypeCode::Bool.fixed_size(), Some(1));
        assert_eq!(TypeCode::Int64.fixed_size(), Some(8));
        assert_eq!(TypeCode::Rect.fixed_size(), Some(16));
        assert_eq!(TypeCode::Color.fixed_size(), Some(4));
        assert!(!TypeCode::String.is_fixed_size());
        assert!(!TypeCode::Raw.is_fixed_size());
        assert!(!TypeCode::Message.is_fixed_size());
    }

    #[test]
    fn four_cc_rendering() {
        assert_eq!(four_cc_str(four_cc(b"abcd")).as_deref(), Some("abcd"));
        assert_eq!(four_cc_str(0x0000_0001), None);
    }
}
