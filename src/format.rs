/*!

The flattened message format.

A flattened message is a header, a table of field descriptors, and a data region holding the
values of every field. All integers are little-endian.

# Header

| Bytes | Contents |
| -- | -- |
| 4 | Format marker, `0x31464D48`. On the wire this reads as the ASCII bytes `HMF1`. |
| 4 | The message's `what` code. |
| 4 | Number of fields. |

A message with no fields is just this 12-byte header.

# Field Descriptors

One descriptor per field, in the order the fields were added:

| Bytes | Contents |
| -- | -- |
| 2 | Length of the field name, in bytes. Must be at least 1. |
| *n* | The field name, UTF-8, with no terminator. |
| 4 | Type code. |
| 4 | Number of values in the field. Must be at least 1. |
| 4 | Size of the field's data, in bytes. |

Names are unique within a message. Each descriptor takes 14 bytes plus the name.

# Data Region

The data of each field, concatenated in descriptor order, with nothing before, between, or after
them. The data sizes from the descriptors must add up to exactly the rest of the buffer.

Within a field, values are stored in order:

- Fixed-size types are packed back to back, so the data size must be exactly the value count times
    the type's width.
- Variable-size types prefix each value with its length as a u32. The values must exactly fill the
    field's data size.

# Type Codes

Type codes are Haiku's four-character constants, with the first character in the most significant
byte.

| Type | Code | Encoding |
| -- | -- | -- |
| bool | `BOOL` | 1 byte, 0 or 1. Any non-zero byte decodes as true. |
| int8 | `BYTE` | 1 byte |
| int16 | `SHRT` | 2 bytes |
| int32 | `LONG` | 4 bytes |
| int64 | `LLNG` | 8 bytes |
| uint8 | `UBYT` | 1 byte |
| uint16 | `USHT` | 2 bytes |
| uint32 | `ULNG` | 4 bytes |
| uint64 | `ULLG` | 8 bytes |
| float | `FLOT` | 4 bytes, IEEE 754 single precision |
| double | `DBLE` | 8 bytes, IEEE 754 double precision |
| point | `BPNT` | x, y as floats: 8 bytes |
| size | `SIZE` | width, height as floats: 8 bytes |
| rect | `RECT` | left, top, right, bottom as floats: 16 bytes |
| rgb_color | `RGBC` | red, green, blue, alpha as bytes: 4 bytes |
| string | `CSTR` | Variable. UTF-8, no terminator. |
| raw | `RAWT` | Variable. Arbitrary bytes. |
| message | `MSGG` | Variable. A complete flattened message, held to this same format. |

A descriptor with any other type code makes the whole buffer invalid.

# Example

A message with `what` set to `'efgh'`, a uint8 field `UInt8` holding `'a'`, and a uint16 field
`UInt16` holding 1234, flattens to 54 bytes:

```text
48 4D 46 31  68 67 66 65  02 00 00 00                   "HMF1", 'efgh', 2 fields
05 00 55 49 6E 74 38  54 59 42 55  01 00 00 00  01 00 00 00
06 00 55 49 6E 74 31 36  54 48 53 55  01 00 00 00  02 00 00 00
61  D2 04                                               data
```

*/
