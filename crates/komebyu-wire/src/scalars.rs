use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::reader::{WireCursor, WireError, WIRE_FIXED64, WIRE_LEN, WIRE_VARINT};

/// Integer field tolerant of the three observed encodings: raw varint,
/// little-endian fixed64, and the length-delimited `Int64Value` wrapper.
/// A wire type outside those three consumes the value and yields `None`.
pub fn read_int64_field(
    cursor: &mut WireCursor<'_>,
    wire_type: u8,
) -> Result<Option<i64>, WireError> {
    match wire_type {
        WIRE_VARINT => Ok(Some(cursor.read_var_u64()? as i64)),
        WIRE_FIXED64 => Ok(Some(cursor.read_fixed64()? as i64)),
        WIRE_LEN => Ok(unwrap_int64_value(cursor.read_len_delimited()?)),
        other => {
            cursor.skip(other)?;
            Ok(None)
        }
    }
}

fn unwrap_int64_value(bytes: &[u8]) -> Option<i64> {
    let mut cursor = WireCursor::new(bytes);
    let mut value = None;
    while let Ok(Some((field, wire_type))) = cursor.read_tag() {
        if field == 1 && wire_type == WIRE_VARINT {
            value = Some(cursor.read_var_u64().ok()? as i64);
        } else if cursor.skip(wire_type).is_err() {
            return None;
        }
    }
    value
}

/// String field tolerant of the `StringValue` wrapper: a strict single-field
/// `{1: bytes}` message consuming the whole buffer yields the inner text,
/// otherwise the raw bytes are taken as UTF-8, otherwise `None`.
pub fn flexible_string(bytes: &[u8]) -> Option<String> {
    if let Some(inner) = unwrap_string_value(bytes) {
        return Some(inner);
    }
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

fn unwrap_string_value(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mut cursor = WireCursor::new(bytes);
    let mut value = None;
    while let Some((field, wire_type)) = cursor.read_tag().ok()? {
        if field != 1 || wire_type != WIRE_LEN {
            return None;
        }
        let inner = cursor.read_len_delimited().ok()?;
        value = Some(std::str::from_utf8(inner).ok()?.to_owned());
    }
    value
}

/// Stream position token. UTF-8 cursors pass through as text; binary cursors
/// are base64-encoded with the raw bytes preserved alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueCursor {
    pub text: String,
    pub raw: Option<Vec<u8>>,
}

impl OpaqueCursor {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                text: text.to_owned(),
                raw: None,
            },
            Err(_) => Self {
                text: BASE64.encode(bytes),
                raw: Some(bytes.to_vec()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{flexible_string, read_int64_field, OpaqueCursor};
    use crate::reader::WireCursor;

    fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    #[test]
    fn int64_field_reads_raw_varint() {
        let bytes = varint(1_700_000_000);
        let mut cursor = WireCursor::new(&bytes);
        assert_eq!(read_int64_field(&mut cursor, 0).unwrap(), Some(1_700_000_000));
    }

    #[test]
    fn int64_field_reads_fixed64() {
        let bytes = 1_700_000_000_u64.to_le_bytes();
        let mut cursor = WireCursor::new(&bytes);
        assert_eq!(read_int64_field(&mut cursor, 1).unwrap(), Some(1_700_000_000));
    }

    #[test]
    fn int64_field_unwraps_int64_value() {
        let mut wrapper = vec![0x08];
        wrapper.extend(varint(1_700_000_000));
        let mut bytes = varint(wrapper.len() as u64);
        bytes.extend(wrapper);
        let mut cursor = WireCursor::new(&bytes);
        assert_eq!(read_int64_field(&mut cursor, 2).unwrap(), Some(1_700_000_000));
    }

    #[test]
    fn int64_field_skips_mismatched_wire_type() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let mut cursor = WireCursor::new(&bytes);
        assert_eq!(read_int64_field(&mut cursor, 5).unwrap(), None);
        assert!(cursor.is_empty());
    }

    #[test]
    fn flexible_string_unwraps_string_value() {
        let mut bytes = vec![0x0a, 5];
        bytes.extend_from_slice(b"hello");
        assert_eq!(flexible_string(&bytes).as_deref(), Some("hello"));
    }

    #[test]
    fn flexible_string_accepts_plain_utf8() {
        assert_eq!(
            flexible_string("https://example".as_bytes()).as_deref(),
            Some("https://example")
        );
    }

    #[test]
    fn flexible_string_rejects_invalid_utf8() {
        assert_eq!(flexible_string(&[0xff, 0xfe, 0xfd]), None);
    }

    #[test]
    fn wrapper_with_foreign_field_falls_back_to_raw_text() {
        // Field 2 instead of 1: not a StringValue, but valid UTF-8 as-is.
        let bytes = [0x12, 0x01, b'x'];
        assert_eq!(flexible_string(&bytes).as_deref(), Some("\u{12}\u{1}x"));
    }

    #[test]
    fn opaque_cursor_keeps_utf8_text() {
        let cursor = OpaqueCursor::from_bytes(b"segment:42");
        assert_eq!(cursor.text, "segment:42");
        assert_eq!(cursor.raw, None);
    }

    #[test]
    fn opaque_cursor_base64_encodes_binary() {
        let cursor = OpaqueCursor::from_bytes(&[0xff, 0x00, 0x80]);
        assert_eq!(cursor.text, "/wCA");
        assert_eq!(cursor.raw.as_deref(), Some(&[0xff, 0x00, 0x80][..]));
    }
}
