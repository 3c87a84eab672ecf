//! Flattening a whole message to bytes and back.
//!
//! See [`format`][crate::format] for the byte layout. Flattening writes the header, the field
//! descriptors, and then the message's data store verbatim, since the store already holds every
//! value in wire form. Unflattening checks every declared length against the remaining input
//! before touching it, and only builds a [`Message`] once the whole buffer has been validated.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use tracing::{debug, trace};

use crate::data_store::DataStore;
use crate::error::{Error, Result};
use crate::field::{FieldEntry, FieldTable};
use crate::message::Message;
use crate::options::UnflattenOptions;
use crate::type_code::{four_cc, TypeCode};

/// Marks the current wire format. Written little-endian, it shows up as the bytes `HMF1`.
pub const FORMAT_MARKER: u32 = four_cc(b"1FMH");
/// Format marker, `what`, and field count.
pub const HEADER_SIZE: usize = 4 + 4 + 4;
/// Fixed part of a field descriptor: name length, type code, value count, and data size. The
/// name itself follows the name length.
pub const FIELD_HEADER_SIZE: usize = 2 + 4 + 4 + 4;

/// Size of the header plus every field descriptor.
fn header_size(msg: &Message) -> usize {
    let descriptors: usize = msg
        .field_table()
        .iter()
        .map(|entry| FIELD_HEADER_SIZE + entry.name.len())
        .sum();
    HEADER_SIZE + descriptors
}

/// Exact number of bytes a flattened message takes, computed from the field table alone.
pub(crate) fn flattened_size(msg: &Message) -> usize {
    header_size(msg) + msg.data_store().len()
}

/// Write the header and field descriptors into `out`, which must be exactly
/// [`header_size`] bytes long. Field names, counts, and sizes were range-checked when they were
/// added, so the narrowing casts here can't truncate.
fn encode_header(msg: &Message, out: &mut [u8]) {
    let fields = msg.field_table();
    LittleEndian::write_u32(&mut out[0..4], FORMAT_MARKER);
    LittleEndian::write_u32(&mut out[4..8], msg.what());
    LittleEndian::write_u32(&mut out[8..12], fields.len() as u32);
    let mut pos = HEADER_SIZE;
    for entry in fields.iter() {
        let name = entry.name.as_bytes();
        LittleEndian::write_u16(&mut out[pos..pos + 2], name.len() as u16);
        pos += 2;
        out[pos..pos + name.len()].copy_from_slice(name);
        pos += name.len();
        LittleEndian::write_u32(&mut out[pos..pos + 4], entry.type_code.code());
        LittleEndian::write_u32(&mut out[pos + 4..pos + 8], entry.count as u32);
        LittleEndian::write_u32(&mut out[pos + 8..pos + 12], entry.size as u32);
        pos += 12;
    }
}

/// Write the whole message into `out`, which must be exactly [`flattened_size`] bytes long.
fn encode(msg: &Message, out: &mut [u8]) {
    let (header, data) = out.split_at_mut(header_size(msg));
    encode_header(msg, header);
    data.copy_from_slice(msg.data_store().as_slice());
}

/// Flatten into a caller-provided buffer, returning the number of bytes written.
pub(crate) fn flatten(msg: &Message, out: &mut [u8]) -> Result<usize> {
    let size = flattened_size(msg);
    if out.len() < size {
        return Err(Error::BufferTooSmall {
            needed: size,
            available: out.len(),
        });
    }
    encode(msg, &mut out[..size]);
    trace!(what = msg.what(), size, "flattened message");
    Ok(size)
}

/// Append the flattened message to a vector.
pub(crate) fn flatten_into(msg: &Message, buf: &mut Vec<u8>) {
    let start = buf.len();
    buf.resize(start + flattened_size(msg), 0);
    encode(msg, &mut buf[start..]);
}

/// Flatten onto a stream, returning the number of bytes written. Value bytes go straight from
/// the data store to the writer.
pub(crate) fn write_message<W: Write>(msg: &Message, w: &mut W) -> io::Result<usize> {
    let mut header = vec![0u8; header_size(msg)];
    encode_header(msg, &mut header);
    let data = msg.data_store().as_slice();
    w.write_all(&header)?;
    w.write_all(data)?;
    trace!(what = msg.what(), size = header.len() + data.len(), "wrote message");
    Ok(header.len() + data.len())
}

/// Levels of nested messages inside a flattened message that is already known to be valid:
/// 0 when none of its values is a message.
pub(crate) fn nested_depth(buf: &[u8]) -> Result<usize> {
    let mut reader = Reader::new(buf);
    reader.bytes(8, "header")?;
    let field_count = reader.u32("field count")? as usize;
    let mut fields =
        Vec::with_capacity(field_count.min(reader.remaining() / (FIELD_HEADER_SIZE + 1)));
    let mut data_size = 0usize;
    for _ in 0..field_count {
        let entry = read_descriptor(&mut reader, data_size)?;
        data_size = entry.end();
        fields.push(entry);
    }
    let data = reader.into_rest();
    let mut depth = 0;
    for entry in fields.iter().filter(|e| e.type_code == TypeCode::Message) {
        let field = data.get(entry.range()).ok_or(Error::Truncated {
            step: "field data",
            needed: entry.end(),
            available: data.len(),
        })?;
        let mut values = Reader::new(field);
        for _ in 0..entry.count {
            depth = depth.max(nested_depth(values.value()?)? + 1);
        }
    }
    Ok(depth)
}

pub(crate) fn unflatten(buf: &[u8], opts: &UnflattenOptions) -> Result<Message> {
    trace!(len = buf.len(), "unflattening message");
    let result = unflatten_at(buf, opts, 0);
    if let Err(ref err) = result {
        debug!(%err, len = buf.len(), "rejected flattened message");
    }
    result
}

/// Byte reader that reports which step ran out of input.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn u16(&mut self, step: &'static str) -> Result<u16> {
        let available = self.data.len();
        self.data
            .read_u16::<LittleEndian>()
            .map_err(|_| Error::Truncated {
                step,
                needed: 2,
                available,
            })
    }

    fn u32(&mut self, step: &'static str) -> Result<u32> {
        let available = self.data.len();
        self.data
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Truncated {
                step,
                needed: 4,
                available,
            })
    }

    fn bytes(&mut self, len: usize, step: &'static str) -> Result<&'a [u8]> {
        if len > self.data.len() {
            return Err(Error::Truncated {
                step,
                needed: len,
                available: self.data.len(),
            });
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    /// Read one length-prefixed value.
    fn value(&mut self) -> Result<&'a [u8]> {
        let len = self.u32("value length")? as usize;
        self.bytes(len, "value data")
    }

    fn into_rest(self) -> &'a [u8] {
        self.data
    }
}

fn unflatten_at(buf: &[u8], opts: &UnflattenOptions, depth: usize) -> Result<Message> {
    opts.check_depth(depth)?;
    opts.check_size(buf.len())?;

    let mut reader = Reader::new(buf);
    let marker = reader.u32("format marker")?;
    if marker != FORMAT_MARKER {
        return Err(Error::BadFormatTag { found: marker });
    }
    let what = reader.u32("what")?;
    let field_count = reader.u32("field count")? as usize;

    // Each descriptor needs at least FIELD_HEADER_SIZE + 1 bytes, so a bogus count can't make us
    // over-allocate.
    let mut fields =
        FieldTable::with_capacity(field_count.min(reader.remaining() / (FIELD_HEADER_SIZE + 1)));
    let mut data_size = 0usize;
    for _ in 0..field_count {
        let entry = read_descriptor(&mut reader, data_size)?;
        data_size = entry.end();
        fields.push(entry)?;
    }

    let data = reader.into_rest();
    if data.len() < data_size {
        return Err(Error::Truncated {
            step: "field data",
            needed: data_size,
            available: data.len(),
        });
    }
    if data.len() > data_size {
        return Err(Error::TrailingData {
            extra: data.len() - data_size,
        });
    }
    for entry in fields.iter() {
        validate_values(entry, &data[entry.range()], opts, depth)?;
    }

    let store = DataStore::copy_from(data)?;
    trace!(what, fields = fields.len(), depth, "unflattened message");
    Ok(Message::from_parts(what, fields, store))
}

fn read_descriptor(reader: &mut Reader, offset: usize) -> Result<FieldEntry> {
    let name_len = reader.u16("field name length")? as usize;
    let raw_name = reader.bytes(name_len, "field name")?;
    let name = std::str::from_utf8(raw_name).map_err(|_| Error::InvalidName {
        name: String::from_utf8_lossy(raw_name).into_owned(),
        reason: "not valid UTF-8",
    })?;
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: String::new(),
            reason: "empty",
        });
    }
    let code = reader.u32("field type")?;
    let type_code = TypeCode::from_code(code).ok_or(Error::BadFieldType { code })?;
    let count = reader.u32("value count")? as usize;
    let size = reader.u32("field data size")? as usize;

    if count == 0 {
        return Err(Error::EmptyField { name: name.into() });
    }
    if let Some(width) = type_code.fixed_size() {
        let actual = count.saturating_mul(width);
        if actual != size {
            return Err(Error::FieldSizeMismatch {
                name: name.into(),
                expected: size,
                actual,
            });
        }
    }
    Ok(FieldEntry {
        name: name.into(),
        type_code,
        count,
        offset,
        size,
    })
}

/// Walk a variable-size field's length prefixes and check each value's contents. Fixed-size
/// fields were fully checked against their descriptor already.
fn validate_values(
    entry: &FieldEntry,
    data: &[u8],
    opts: &UnflattenOptions,
    depth: usize,
) -> Result<()> {
    if entry.type_code.is_fixed_size() {
        return Ok(());
    }
    let mut values = Reader::new(data);
    for _ in 0..entry.count {
        let value = values.value()?;
        match entry.type_code {
            TypeCode::String => {
                std::str::from_utf8(value).map_err(|source| Error::InvalidString {
                    name: entry.name.clone(),
                    source,
                })?;
            }
            TypeCode::Message => {
                unflatten_at(value, opts, depth + 1)?;
            }
            _ => (),
        }
    }
    if values.remaining() != 0 {
        return Err(Error::FieldSizeMismatch {
            name: entry.name.clone(),
            expected: entry.size,
            actual: entry.size - values.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn efgh() -> Message {
        let mut msg = Message::new(four_cc(b"efgh"));
        msg.add_uint8("UInt8", b'a').unwrap();
        msg.add_uint16("UInt16", 1234).unwrap();
        msg
    }

    /// Hand-build a buffer with a single field descriptor and the given value region.
    fn single_field(name: &[u8], code: u32, count: u32, size: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&FORMAT_MARKER.to_le_bytes());
        buf.extend_from_slice(&four_cc(b"test").to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&code.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn empty_message_bytes() {
        let msg = Message::new(four_cc(b"abcd"));
        let expected = vec![
            b'H', b'M', b'F', b'1', // marker
            b'd', b'c', b'b', b'a', // what
            0, 0, 0, 0, // field count
        ];
        assert_eq!(flattened_size(&msg), HEADER_SIZE);
        assert_eq!(msg.flatten_to_vec(), expected);
    }

    #[test]
    fn two_field_bytes() {
        let mut expected = vec![b'H', b'M', b'F', b'1', b'h', b'g', b'f', b'e', 2, 0, 0, 0];
        expected.extend_from_slice(&[5, 0]);
        expected.extend_from_slice(b"UInt8");
        expected.extend_from_slice(b"TYBU");
        expected.extend_from_slice(&[1, 0, 0, 0, 1, 0, 0, 0]);
        expected.extend_from_slice(&[6, 0]);
        expected.extend_from_slice(b"UInt16");
        expected.extend_from_slice(b"THSU");
        expected.extend_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        expected.extend_from_slice(&[0x61, 0xd2, 0x04]);

        let msg = efgh();
        assert_eq!(flattened_size(&msg), 54);
        assert_eq!(msg.flatten_to_vec(), expected);
    }

    #[test]
    fn variable_values_are_length_prefixed() {
        let mut msg = Message::new(0);
        msg.add_string("s", "ab").unwrap();
        msg.add_string("s", "").unwrap();
        let enc = msg.flatten_to_vec();
        let data = &enc[enc.len() - 10..];
        assert_eq!(data, &[2, 0, 0, 0, b'a', b'b', 0, 0, 0, 0]);
        // count and data size in the descriptor
        assert_eq!(&enc[HEADER_SIZE + 3 + 4..HEADER_SIZE + 3 + 12], &[2, 0, 0, 0, 10, 0, 0, 0]);
    }

    #[test]
    fn buffer_too_small() {
        let msg = efgh();
        let mut buf = vec![0u8; 53];
        match flatten(&msg, &mut buf) {
            Err(Error::BufferTooSmall { needed, available }) => {
                assert_eq!(needed, 54);
                assert_eq!(available, 53);
            }
            other => panic!("Expected BufferTooSmall, got {:?}", other),
        }
        let mut buf = vec![0xAAu8; 60];
        assert_eq!(flatten(&msg, &mut buf).unwrap(), 54);
        assert_eq!(&buf[..54], &msg.flatten_to_vec()[..]);
        assert!(buf[54..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn bad_marker() {
        let mut enc = efgh().flatten_to_vec();
        enc[3] = b'2';
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::BadFormatTag { found }) if found == four_cc(b"2FMH")
        ));
    }

    #[test]
    fn every_prefix_is_truncated() {
        let mut msg = efgh();
        msg.add_string("name", "application/x-vnd.haiku-registrar")
            .unwrap();
        let mut inner = Message::new(four_cc(b"innr"));
        inner.add_raw("blob", &[1, 2, 3]).unwrap();
        msg.add_message("inner", &inner).unwrap();
        let enc = msg.flatten_to_vec();
        for len in 0..enc.len() {
            match unflatten(&enc[..len], &UnflattenOptions::default()) {
                Err(Error::Truncated { .. }) => (),
                other => panic!("Prefix of {} bytes gave {:?}", len, other),
            }
        }
        assert_eq!(unflatten(&enc, &UnflattenOptions::default()).unwrap(), msg);
    }

    #[test]
    fn trailing_data() {
        let mut enc = efgh().flatten_to_vec();
        enc.push(0);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::TrailingData { extra: 1 })
        ));
    }

    #[test]
    fn unknown_type_code() {
        let enc = single_field(b"x", four_cc(b"NOPE"), 1, 1, &[0]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::BadFieldType { code }) if code == four_cc(b"NOPE")
        ));
    }

    #[test]
    fn bad_names() {
        let code = TypeCode::UInt8.code();
        let enc = single_field(b"", code, 1, 1, &[0]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::InvalidName { .. })
        ));
        let enc = single_field(&[0xff, 0xfe], code, 1, 1, &[0]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn empty_field() {
        let enc = single_field(b"x", TypeCode::Int32.code(), 0, 0, &[]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::EmptyField { .. })
        ));
    }

    #[test]
    fn fixed_size_mismatch() {
        let enc = single_field(b"x", TypeCode::Int32.code(), 2, 4, &[0; 4]);
        match unflatten(&enc, &UnflattenOptions::default()) {
            Err(Error::FieldSizeMismatch {
                name,
                expected,
                actual,
            }) => {
                assert_eq!(name, "x");
                assert_eq!(expected, 4);
                assert_eq!(actual, 8);
            }
            other => panic!("Expected FieldSizeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn variable_values_must_fill_field() {
        // One 1-byte string plus a stray byte inside the field's declared size
        let enc = single_field(b"s", TypeCode::String.code(), 1, 6, &[1, 0, 0, 0, b'a', 0]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::FieldSizeMismatch { .. })
        ));
        // Value length pointing past the field
        let enc = single_field(b"s", TypeCode::Raw.code(), 1, 5, &[9, 0, 0, 0, 0]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::Truncated { step: "value data", .. })
        ));
    }

    #[test]
    fn strings_must_be_utf8() {
        let enc = single_field(b"s", TypeCode::String.code(), 1, 6, &[2, 0, 0, 0, 0xc3, 0x28]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::InvalidString { name, .. }) if name == "s"
        ));
    }

    #[test]
    fn duplicate_names() {
        let mut enc = Vec::new();
        enc.extend_from_slice(&FORMAT_MARKER.to_le_bytes());
        enc.extend_from_slice(&0u32.to_le_bytes());
        enc.extend_from_slice(&2u32.to_le_bytes());
        for _ in 0..2 {
            enc.extend_from_slice(&[1, 0, b'x']);
            enc.extend_from_slice(&TypeCode::UInt8.code().to_le_bytes());
            enc.extend_from_slice(&1u32.to_le_bytes());
            enc.extend_from_slice(&1u32.to_le_bytes());
        }
        enc.extend_from_slice(&[1, 2]);
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::DuplicateName { name }) if name == "x"
        ));
    }

    #[test]
    fn huge_field_count_does_not_allocate() {
        let mut enc = Vec::new();
        enc.extend_from_slice(&FORMAT_MARKER.to_le_bytes());
        enc.extend_from_slice(&0u32.to_le_bytes());
        enc.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::Truncated { step: "field name length", .. })
        ));
    }

    fn nested(levels: usize) -> Message {
        let mut msg = Message::new(four_cc(b"leaf"));
        msg.add_int32("depth", levels as i32).unwrap();
        for i in 0..levels {
            let mut outer = Message::new(four_cc(b"nest"));
            outer.add_int32("depth", i as i32).unwrap();
            outer.add_message("inner", &msg).unwrap();
            msg = outer;
        }
        msg
    }

    #[test]
    fn depth_limit() {
        let msg = nested(3);
        let enc = msg.flatten_to_vec();
        let opts = UnflattenOptions {
            max_depth: 2,
            ..Default::default()
        };
        assert!(matches!(
            unflatten(&enc, &opts),
            Err(Error::DepthLimitExceeded { max: 2 })
        ));
        let opts = UnflattenOptions {
            max_depth: 3,
            ..Default::default()
        };
        assert_eq!(unflatten(&enc, &opts).unwrap(), msg);
    }

    #[test]
    fn nested_depth_counts_levels() {
        assert_eq!(nested_depth(&Message::new(0).flatten_to_vec()).unwrap(), 0);
        assert_eq!(nested_depth(&nested(5).flatten_to_vec()).unwrap(), 5);
        assert!(nested_depth(&[0; 4]).is_err());
    }

    #[test]
    fn deep_input_within_raised_limit() {
        // Wrap by hand, past the depth `add_message` accepts
        let levels = crate::MAX_DEPTH + 10;
        let mut enc = Message::new(four_cc(b"leaf")).flatten_to_vec();
        for _ in 0..levels {
            let mut data = (enc.len() as u32).to_le_bytes().to_vec();
            data.extend_from_slice(&enc);
            enc = single_field(b"x", TypeCode::Message.code(), 1, data.len() as u32, &data);
        }
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::DepthLimitExceeded { .. })
        ));
        let opts = UnflattenOptions {
            max_depth: 100,
            ..Default::default()
        };
        let msg = unflatten(&enc, &opts).unwrap();
        assert_eq!(msg.flatten_to_vec(), enc);
        let inner = msg.find_message("x", 0).unwrap();
        assert_eq!(nested_depth(&inner.flatten_to_vec()).unwrap(), levels - 1);
        assert!(msg.to_string().contains("BMessage('leaf')"));
        assert!(serde_json::to_value(&msg).is_ok());
        // Already too deep to go back in
        let mut outer = Message::new(0);
        assert!(matches!(
            outer.add_message("x", &inner),
            Err(Error::DepthLimitExceeded { .. })
        ));
    }

    #[test]
    fn size_limit() {
        let enc = efgh().flatten_to_vec();
        let opts = UnflattenOptions {
            max_size: enc.len() - 1,
            ..Default::default()
        };
        assert!(matches!(
            unflatten(&enc, &opts),
            Err(Error::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn nested_message_is_bad() {
        let mut inner = Message::new(1).flatten_to_vec();
        inner[0] = 0;
        let mut data = Vec::new();
        data.extend_from_slice(&(inner.len() as u32).to_le_bytes());
        data.extend_from_slice(&inner);
        let enc = single_field(
            b"m",
            TypeCode::Message.code(),
            1,
            data.len() as u32,
            &data,
        );
        assert!(matches!(
            unflatten(&enc, &UnflattenOptions::default()),
            Err(Error::BadFormatTag { .. })
        ));
    }
}
