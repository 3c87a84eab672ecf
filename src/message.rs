use std::fmt;
use std::io::Write;
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use serde::ser::{Error as _, Serialize, SerializeSeq, SerializeStruct, Serializer};

use crate::codec;
use crate::data_store::DataStore;
use crate::error::{Error, Result};
use crate::field::{FieldEntry, FieldInfo, FieldTable};
use crate::flattenable::Flattenable;
use crate::geometry::{Point, Rect, RgbColor, Size};
use crate::options::UnflattenOptions;
use crate::type_code::{four_cc_str, TypeCode};
use crate::value::Value;
use crate::MAX_DEPTH;

const OP_ADD: &str = "add";
const OP_FIND: &str = "find";
const OP_REPLACE: &str = "replace";
const OP_REMOVE: &str = "remove";

/// Length prefix in front of every variable-size value.
const PREFIX_SIZE: usize = 4;

/// A typed, named key-value container with a 32-bit `what` code.
///
/// Each field has a unique name, a single [`TypeCode`], and one or more values. Fields keep the
/// order they were first added in, and values keep the order they were added to their field.
/// Values are held in their flattened form, so [`flatten`](Self::flatten) is a header write plus
/// one copy of the value bytes, and [`flattened_size`](Self::flattened_size) is computed from the
/// field table alone.
///
/// Two messages are equal when their `what` codes, field order, names, types, and value bytes all
/// match.
///
/// ```
/// use bmessage::{four_cc, Message};
///
/// let mut msg = Message::new(four_cc(b"efgh"));
/// msg.add_uint8("UInt8", b'a')?;
/// msg.add_uint16("UInt16", 1234)?;
///
/// let flat = msg.flatten_to_vec();
/// assert_eq!(flat.len(), msg.flattened_size());
/// let back = Message::unflatten(&flat)?;
/// assert_eq!(back.find_uint16("UInt16", 0)?, 1234);
/// assert_eq!(back, msg);
/// # Ok::<(), bmessage::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    what: u32,
    fields: FieldTable,
    data: DataStore,
}

/// Wrap one value for storage: fixed-size values are stored as-is, variable-size values get a u32
/// length prefix.
fn encode_item<F>(name: &str, type_code: TypeCode, size: usize, write: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut Vec<u8>),
{
    let prefixed = !type_code.is_fixed_size();
    let total = if prefixed { size + PREFIX_SIZE } else { size };
    let mut item = Vec::new();
    item.try_reserve_exact(total)
        .map_err(|source| Error::AllocationFailure {
            requested: total,
            source,
        })?;
    if prefixed {
        let len = u32::try_from(size).map_err(|_| Error::FieldTooLarge { name: name.into() })?;
        item.extend_from_slice(&len.to_le_bytes());
    }
    write(&mut item);
    if type_code == TypeCode::Message {
        check_nesting(&item[PREFIX_SIZE..])?;
    }
    Ok(item)
}

/// A nested message may reach at most `MAX_DEPTH` levels below the message holding it, which is
/// the limit `unflatten` applies by default.
fn check_nesting(flattened: &[u8]) -> Result<()> {
    if codec::nested_depth(flattened)? + 1 > MAX_DEPTH {
        return Err(Error::DepthLimitExceeded { max: MAX_DEPTH });
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: String::new(),
            reason: "empty",
        });
    }
    if name.len() > u16::MAX as usize {
        return Err(Error::InvalidName {
            name: name.into(),
            reason: "longer than 65535 bytes",
        });
    }
    Ok(())
}

/// Check that a field's new count and data size still fit their u32 descriptor slots.
fn check_field_limits(name: &str, count: usize, size: usize) -> Result<()> {
    if count > u32::MAX as usize || size > u32::MAX as usize {
        return Err(Error::FieldTooLarge { name: name.into() });
    }
    Ok(())
}

impl Message {
    pub fn new(what: u32) -> Self {
        Self {
            what,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(what: u32, fields: FieldTable, data: DataStore) -> Self {
        Self { what, fields, data }
    }

    pub(crate) fn field_table(&self) -> &FieldTable {
        &self.fields
    }

    pub(crate) fn data_store(&self) -> &DataStore {
        &self.data
    }

    pub fn what(&self) -> u32 {
        self.what
    }

    pub fn set_what(&mut self, what: u32) {
        self.what = what;
    }

    /// Check if the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove every field. The `what` code is kept.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.data.clear();
    }

    /// Number of fields in the message.
    pub fn count_names(&self) -> usize {
        self.fields.len()
    }

    /// Number of fields holding values of the given type.
    pub fn count_names_of(&self, type_code: TypeCode) -> usize {
        self.fields
            .iter()
            .filter(|entry| entry.type_code == type_code)
            .count()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.fields.position(name).is_some()
    }

    /// Get the type and value count of a field.
    pub fn get_info(&self, name: &str) -> Result<(TypeCode, usize)> {
        let info = self.field_info(name)?;
        Ok((info.type_code, info.count))
    }

    pub fn field_info(&self, name: &str) -> Result<FieldInfo<'_>> {
        self.fields
            .find(name)
            .map(FieldEntry::info)
            .ok_or_else(|| Error::NameNotFound { name: name.into() })
    }

    /// Get a field by its position in the message.
    pub fn field_at(&self, index: usize) -> Option<FieldInfo<'_>> {
        self.fields.get(index).map(FieldEntry::info)
    }

    /// Iterate over every field, in the order they were added.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = FieldInfo<'_>> + '_ {
        self.fields.iter().map(FieldEntry::info)
    }

    /// Append a value to the field `name`, creating the field if it doesn't exist yet.
    ///
    /// Fails with [`Error::TypeMismatch`] if the field already holds a different type, in which
    /// case the message is left unchanged.
    pub fn add<T: Flattenable>(&mut self, name: &str, value: T) -> Result<()> {
        let item = encode_item(name, T::TYPE, value.flattened_size(), |buf| {
            value.flatten_into(buf)
        })?;
        self.add_item(name, T::TYPE, &item)
    }

    pub fn add_value(&mut self, name: &str, value: &Value) -> Result<()> {
        let type_code = value.type_code();
        let item = encode_item(name, type_code, value.flattened_size(), |buf| {
            value.flatten_into(buf)
        })?;
        self.add_item(name, type_code, &item)
    }

    pub fn add_string(&mut self, name: &str, value: &str) -> Result<()> {
        let item = encode_item(name, TypeCode::String, value.len(), |buf| {
            buf.extend_from_slice(value.as_bytes())
        })?;
        self.add_item(name, TypeCode::String, &item)
    }

    pub fn add_raw(&mut self, name: &str, value: &[u8]) -> Result<()> {
        let item = encode_item(name, TypeCode::Raw, value.len(), |buf| {
            buf.extend_from_slice(value)
        })?;
        self.add_item(name, TypeCode::Raw, &item)
    }

    /// Add a copy of `value` as a nested message.
    pub fn add_message(&mut self, name: &str, value: &Message) -> Result<()> {
        let item = encode_item(name, TypeCode::Message, value.flattened_size(), |buf| {
            codec::flatten_into(value, buf)
        })?;
        self.add_item(name, TypeCode::Message, &item)
    }

    fn add_item(&mut self, name: &str, type_code: TypeCode, item: &[u8]) -> Result<()> {
        let pos = match self.fields.position(name) {
            Some(pos) => pos,
            None => {
                check_name(name)?;
                check_field_limits(name, 1, item.len())?;
                let offset = self.data.append(item)?;
                return self.fields.push(FieldEntry {
                    name: name.into(),
                    type_code,
                    count: 1,
                    offset,
                    size: item.len(),
                });
            }
        };
        let entry = self.entry(pos);
        if entry.type_code != type_code {
            return Err(Error::TypeMismatch {
                op: OP_ADD,
                name: name.into(),
                expected: type_code,
                found: entry.type_code,
            });
        }
        let count = entry.count + 1;
        let size = entry.size + item.len();
        let at = entry.end();
        check_field_limits(name, count, size)?;
        self.data.insert(at, item)?;
        self.fields.resize(pos, size, count);
        Ok(())
    }

    fn entry(&self, pos: usize) -> &FieldEntry {
        self.fields.at(pos)
    }

    /// Find the field for an indexed access, checking its type when one is expected.
    fn lookup(
        &self,
        op: &'static str,
        name: &str,
        expected: Option<TypeCode>,
        index: usize,
    ) -> Result<usize> {
        let pos = self
            .fields
            .position(name)
            .ok_or_else(|| Error::NameNotFound { name: name.into() })?;
        let entry = self.entry(pos);
        if let Some(expected) = expected {
            if entry.type_code != expected {
                return Err(Error::TypeMismatch {
                    op,
                    name: name.into(),
                    expected,
                    found: entry.type_code,
                });
            }
        }
        if index >= entry.count {
            return Err(Error::IndexOutOfRange {
                op,
                name: name.into(),
                index,
                count: entry.count,
            });
        }
        Ok(pos)
    }

    /// Locate value `index` of a field in the data store. Returns the range of the whole stored
    /// item, and the range of the value without its length prefix.
    fn item_range(&self, entry: &FieldEntry, index: usize) -> (Range<usize>, Range<usize>) {
        if let Some(width) = entry.type_code.fixed_size() {
            let start = entry.offset + index * width;
            return (start..start + width, start..start + width);
        }
        let data = self.data.as_slice();
        let mut start = entry.offset;
        for _ in 0..index {
            start += PREFIX_SIZE + LittleEndian::read_u32(&data[start..]) as usize;
        }
        let len = LittleEndian::read_u32(&data[start..]) as usize;
        let end = start + PREFIX_SIZE + len;
        (start..end, start + PREFIX_SIZE..end)
    }

    fn value_bytes(&self, pos: usize, index: usize) -> &[u8] {
        let (_, value) = self.item_range(self.entry(pos), index);
        self.data.get(value)
    }

    /// Get value `index` of the field `name`.
    pub fn find<T: Flattenable>(&self, name: &str, index: usize) -> Result<T> {
        let pos = self.lookup(OP_FIND, name, Some(T::TYPE), index)?;
        T::unflatten_stored(self.value_bytes(pos, index)).map_err(|e| e.in_field(name))
    }

    /// Get value `index` of the field `name`, whatever its type.
    pub fn find_value(&self, name: &str, index: usize) -> Result<Value> {
        let pos = self.lookup(OP_FIND, name, None, index)?;
        Value::unflatten_stored(self.entry(pos).type_code, self.value_bytes(pos, index))
            .map_err(|e| e.in_field(name))
    }

    /// Borrow a string value without copying it.
    pub fn find_str(&self, name: &str, index: usize) -> Result<&str> {
        let pos = self.lookup(OP_FIND, name, Some(TypeCode::String), index)?;
        std::str::from_utf8(self.value_bytes(pos, index)).map_err(|source| {
            Error::InvalidString {
                name: name.into(),
                source,
            }
        })
    }

    /// Borrow a raw byte value without copying it.
    pub fn find_raw(&self, name: &str, index: usize) -> Result<&[u8]> {
        let pos = self.lookup(OP_FIND, name, Some(TypeCode::Raw), index)?;
        Ok(self.value_bytes(pos, index))
    }

    pub fn find_string(&self, name: &str, index: usize) -> Result<String> {
        self.find_str(name, index).map(str::to_owned)
    }

    pub fn find_message(&self, name: &str, index: usize) -> Result<Message> {
        self.find(name, index)
    }

    /// Overwrite value `index` of the field `name`. The value count doesn't change.
    pub fn replace<T: Flattenable>(&mut self, name: &str, index: usize, value: T) -> Result<()> {
        let pos = self.lookup(OP_REPLACE, name, Some(T::TYPE), index)?;
        let item = encode_item(name, T::TYPE, value.flattened_size(), |buf| {
            value.flatten_into(buf)
        })?;
        self.replace_item(pos, index, &item)
    }

    pub fn replace_value(&mut self, name: &str, index: usize, value: &Value) -> Result<()> {
        let type_code = value.type_code();
        let pos = self.lookup(OP_REPLACE, name, Some(type_code), index)?;
        let item = encode_item(name, type_code, value.flattened_size(), |buf| {
            value.flatten_into(buf)
        })?;
        self.replace_item(pos, index, &item)
    }

    pub fn replace_string(&mut self, name: &str, index: usize, value: &str) -> Result<()> {
        let pos = self.lookup(OP_REPLACE, name, Some(TypeCode::String), index)?;
        let item = encode_item(name, TypeCode::String, value.len(), |buf| {
            buf.extend_from_slice(value.as_bytes())
        })?;
        self.replace_item(pos, index, &item)
    }

    pub fn replace_raw(&mut self, name: &str, index: usize, value: &[u8]) -> Result<()> {
        let pos = self.lookup(OP_REPLACE, name, Some(TypeCode::Raw), index)?;
        let item = encode_item(name, TypeCode::Raw, value.len(), |buf| {
            buf.extend_from_slice(value)
        })?;
        self.replace_item(pos, index, &item)
    }

    pub fn replace_message(&mut self, name: &str, index: usize, value: &Message) -> Result<()> {
        let pos = self.lookup(OP_REPLACE, name, Some(TypeCode::Message), index)?;
        let item = encode_item(name, TypeCode::Message, value.flattened_size(), |buf| {
            codec::flatten_into(value, buf)
        })?;
        self.replace_item(pos, index, &item)
    }

    fn replace_item(&mut self, pos: usize, index: usize, item: &[u8]) -> Result<()> {
        let entry = self.entry(pos);
        let (old, _) = self.item_range(entry, index);
        let size = entry.size - old.len() + item.len();
        let count = entry.count;
        check_field_limits(&entry.name, count, size)?;
        self.data.replace(old, item)?;
        self.fields.resize(pos, size, count);
        Ok(())
    }

    /// Remove a field and all of its values.
    pub fn remove_name(&mut self, name: &str) -> Result<()> {
        let pos = self
            .fields
            .position(name)
            .ok_or_else(|| Error::NameNotFound { name: name.into() })?;
        if let Some(entry) = self.fields.remove(pos) {
            self.data.remove(entry.range());
        }
        Ok(())
    }

    /// Remove value `index` from the field `name`. Removing a field's last value removes the
    /// field.
    pub fn remove_value(&mut self, name: &str, index: usize) -> Result<()> {
        let pos = self.lookup(OP_REMOVE, name, None, index)?;
        let entry = self.entry(pos);
        if entry.count == 1 {
            return self.remove_name(name);
        }
        let (old, _) = self.item_range(entry, index);
        let size = entry.size - old.len();
        let count = entry.count - 1;
        self.data.remove(old);
        self.fields.resize(pos, size, count);
        Ok(())
    }

    /// Give a field a new name. The field keeps its position.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let pos = self
            .fields
            .position(old)
            .ok_or_else(|| Error::NameNotFound { name: old.into() })?;
        check_name(new)?;
        if old == new {
            return Ok(());
        }
        if self.has_name(new) {
            return Err(Error::DuplicateName { name: new.into() });
        }
        self.fields.rename(pos, new.into());
        Ok(())
    }

    /// Exact number of bytes [`flatten`](Self::flatten) will write.
    pub fn flattened_size(&self) -> usize {
        codec::flattened_size(self)
    }

    /// Flatten into `buf`, returning the number of bytes written. Bytes past that are left
    /// untouched.
    pub fn flatten(&self, buf: &mut [u8]) -> Result<usize> {
        codec::flatten(self, buf)
    }

    pub fn flatten_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::flatten_into(self, &mut buf);
        buf
    }

    /// Flatten onto a stream, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize> {
        Ok(codec::write_message(self, writer)?)
    }

    /// Rebuild a message from its flattened form, using the default [`UnflattenOptions`].
    ///
    /// The whole buffer must be a single message. Nothing is returned unless every descriptor and
    /// value in it checks out.
    pub fn unflatten(buf: &[u8]) -> Result<Message> {
        codec::unflatten(buf, &UnflattenOptions::default())
    }

    pub fn unflatten_with(buf: &[u8], opts: &UnflattenOptions) -> Result<Message> {
        codec::unflatten(buf, opts)
    }

    fn print(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result {
        match four_cc_str(self.what) {
            Some(what) => writeln!(f, "BMessage('{}') {{", what)?,
            None => writeln!(f, "BMessage(0x{:08x}) {{", self.what)?,
        }
        let pad = (indent + 1) * 4;
        for entry in self.fields.iter() {
            for index in 0..entry.count {
                if entry.count > 1 {
                    write!(f, "{:pad$}{}[{}] = ", "", entry.name, index, pad = pad)?;
                } else {
                    write!(f, "{:pad$}{} = ", "", entry.name, pad = pad)?;
                }
                let (_, range) = self.item_range(entry, index);
                match Value::unflatten_stored(entry.type_code, self.data.get(range)) {
                    Ok(Value::Message(inner)) => {
                        inner.print(f, indent + 1)?;
                        writeln!(f)?;
                    }
                    Ok(value) => writeln!(f, "{}", value)?,
                    Err(_) => writeln!(f, "<unreadable {}>", entry.type_code)?,
                }
            }
        }
        write!(f, "{:pad$}}}", "", pad = indent * 4)
    }
}

// Typed shorthands for the generic accessors.
macro_rules! typed_accessors {
    ($($t: ty => $add: ident, $find: ident, $replace: ident;)*) => {
        $(
            pub fn $add(&mut self, name: &str, value: $t) -> Result<()> {
                self.add(name, value)
            }

            pub fn $find(&self, name: &str, index: usize) -> Result<$t> {
                self.find(name, index)
            }

            pub fn $replace(&mut self, name: &str, index: usize, value: $t) -> Result<()> {
                self.replace(name, index, value)
            }
        )*
    };
}

impl Message {
    typed_accessors! {
        bool => add_bool, find_bool, replace_bool;
        i8 => add_int8, find_int8, replace_int8;
        i16 => add_int16, find_int16, replace_int16;
        i32 => add_int32, find_int32, replace_int32;
        i64 => add_int64, find_int64, replace_int64;
        u8 => add_uint8, find_uint8, replace_uint8;
        u16 => add_uint16, find_uint16, replace_uint16;
        u32 => add_uint32, find_uint32, replace_uint32;
        u64 => add_uint64, find_uint64, replace_uint64;
        f32 => add_float, find_float, replace_float;
        f64 => add_double, find_double, replace_double;
        Point => add_point, find_point, replace_point;
        Size => add_size, find_size, replace_size;
        Rect => add_rect, find_rect, replace_rect;
        RgbColor => add_color, find_color, replace_color;
    }
}

impl Flattenable for Message {
    const TYPE: TypeCode = TypeCode::Message;

    fn flattened_size(&self) -> usize {
        codec::flattened_size(self)
    }

    fn flatten_into(&self, buf: &mut Vec<u8>) {
        codec::flatten_into(self, buf)
    }

    fn unflatten(data: &[u8]) -> Result<Self> {
        codec::unflatten(data, &UnflattenOptions::default())
    }

    // Stored messages had their nesting checked when they went in.
    fn unflatten_stored(data: &[u8]) -> Result<Self> {
        codec::unflatten(data, &UnflattenOptions::unbounded())
    }
}

/// Dumps the message the way Haiku's `PrintToStream` does: the `what` code, then one line per
/// value, with nested messages indented.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.print(f, 0)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Message", 2)?;
        state.serialize_field("what", &self.what)?;
        state.serialize_field("fields", &SerFields(self))?;
        state.end()
    }
}

struct SerFields<'a>(&'a Message);

impl Serialize for SerFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let msg = self.0;
        let mut seq = serializer.serialize_seq(Some(msg.fields.len()))?;
        for (pos, entry) in msg.fields.iter().enumerate() {
            let values = (0..entry.count)
                .map(|index| Value::unflatten_stored(entry.type_code, msg.value_bytes(pos, index)))
                .collect::<Result<Vec<_>>>()
                .map_err(S::Error::custom)?;
            seq.serialize_element(&SerField {
                name: &entry.name,
                type_code: entry.type_code,
                values,
            })?;
        }
        seq.end()
    }
}

#[derive(serde::Serialize)]
struct SerField<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_code: TypeCode,
    values: Vec<Value>,
}
