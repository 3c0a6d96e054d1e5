use crate::reader::{WireCursor, WireError, WIRE_LEN};
use crate::scalars::{flexible_string, read_int64_field, OpaqueCursor};

/// One logical entry from the view stream. Entry field numbers:
/// 1 segment, 2 next, 3 previous, 4 reconnect, 5 ping, 6 history.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEntry {
    Segment(SegmentEntry),
    Next(WalkDirective),
    Previous(WalkDirective),
    Reconnect(ReconnectDirective),
    Ping,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentEntry {
    pub uri: Option<String>,
    pub from: Option<i64>,
    pub until: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalkDirective {
    pub at: Option<i64>,
    pub cursor: Option<OpaqueCursor>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconnectDirective {
    pub at: Option<i64>,
    pub stream_uri: Option<String>,
    pub cursor: Option<OpaqueCursor>,
}

/// Raw view-stream frame to entries. Peeks the first tag: fields 1 and 2
/// under wire type 2 are a chunked envelope of repeated entries, anything
/// else is a single entry message. Empty frames carry no entries.
pub fn decode_view_payload(buf: &[u8]) -> Result<Vec<ViewEntry>, WireError> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let mut peek = WireCursor::new(buf);
    match peek.read_tag()? {
        Some((1 | 2, WIRE_LEN)) => decode_chunked_entry(buf),
        _ => Ok(decode_entry_message(buf)),
    }
}

fn decode_chunked_entry(buf: &[u8]) -> Result<Vec<ViewEntry>, WireError> {
    let mut cursor = WireCursor::new(buf);
    let mut entries = Vec::new();
    while let Some((field, wire_type)) = cursor.read_tag()? {
        match (field, wire_type) {
            (1 | 2, WIRE_LEN) => {
                entries.extend(decode_entry_message(cursor.read_len_delimited()?));
            }
            _ => cursor.skip(wire_type)?,
        }
    }
    Ok(entries)
}

/// One encoded entry message normally sets exactly one field, but observed
/// traffic occasionally carries several; every recognized field becomes its
/// own logical entry, in field order. Malformed tails drop silently with
/// whatever decoded before them.
fn decode_entry_message(buf: &[u8]) -> Vec<ViewEntry> {
    let mut cursor = WireCursor::new(buf);
    let mut entries = Vec::new();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return entries;
        };
        let decoded = match (field, wire_type) {
            (1, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(ViewEntry::Segment(decode_segment(inner)))),
            (2, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(ViewEntry::Next(decode_walk_directive(inner)))),
            (3, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(ViewEntry::Previous(decode_walk_directive(inner)))),
            (4, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(ViewEntry::Reconnect(decode_reconnect(inner)))),
            (5, _) => cursor.skip(wire_type).map(|()| Some(ViewEntry::Ping)),
            (6, _) => cursor.skip(wire_type).map(|()| Some(ViewEntry::History)),
            _ => cursor.skip(wire_type).map(|()| None),
        };
        match decoded {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(_) => return entries,
        }
    }
}

fn decode_segment(buf: &[u8]) -> SegmentEntry {
    let mut cursor = WireCursor::new(buf);
    let mut segment = SegmentEntry::default();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return segment;
        };
        let ok = match field {
            1 if wire_type == WIRE_LEN => match cursor.read_len_delimited() {
                Ok(bytes) => {
                    segment.uri = flexible_string(bytes);
                    true
                }
                Err(_) => false,
            },
            2 => match read_int64_field(&mut cursor, wire_type) {
                Ok(value) => {
                    segment.from = value.or(segment.from);
                    true
                }
                Err(_) => false,
            },
            3 => match read_int64_field(&mut cursor, wire_type) {
                Ok(value) => {
                    segment.until = value.or(segment.until);
                    true
                }
                Err(_) => false,
            },
            _ => cursor.skip(wire_type).is_ok(),
        };
        if !ok {
            return segment;
        }
    }
}

/// Next/previous entries at one server revision arrive as bare URL strings
/// instead of nested messages. The string path is probed first; a payload
/// that is not an `http(s)` URL falls back to nested-message decoding, and
/// whichever form decodes first is preserved.
fn decode_walk_directive(buf: &[u8]) -> WalkDirective {
    if let Some(text) = flexible_string(buf) {
        if is_http_url(&text) {
            return WalkDirective {
                uri: Some(text),
                ..WalkDirective::default()
            };
        }
    }

    let mut cursor = WireCursor::new(buf);
    let mut directive = WalkDirective::default();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return directive;
        };
        let ok = match field {
            1 => match read_int64_field(&mut cursor, wire_type) {
                Ok(value) => {
                    directive.at = value.or(directive.at);
                    true
                }
                Err(_) => false,
            },
            2 if wire_type == WIRE_LEN => match cursor.read_len_delimited() {
                Ok(bytes) => {
                    directive.cursor = Some(OpaqueCursor::from_bytes(bytes));
                    true
                }
                Err(_) => false,
            },
            3 if wire_type == WIRE_LEN => match cursor.read_len_delimited() {
                Ok(bytes) => {
                    directive.uri = flexible_string(bytes);
                    true
                }
                Err(_) => false,
            },
            _ => cursor.skip(wire_type).is_ok(),
        };
        if !ok {
            return directive;
        }
    }
}

fn decode_reconnect(buf: &[u8]) -> ReconnectDirective {
    let mut cursor = WireCursor::new(buf);
    let mut reconnect = ReconnectDirective::default();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return reconnect;
        };
        let ok = match field {
            1 => match read_int64_field(&mut cursor, wire_type) {
                Ok(value) => {
                    reconnect.at = value.or(reconnect.at);
                    true
                }
                Err(_) => false,
            },
            2 if wire_type == WIRE_LEN => match cursor.read_len_delimited() {
                Ok(bytes) => {
                    reconnect.stream_uri = flexible_string(bytes);
                    true
                }
                Err(_) => false,
            },
            3 if wire_type == WIRE_LEN => match cursor.read_len_delimited() {
                Ok(bytes) => {
                    reconnect.cursor = Some(OpaqueCursor::from_bytes(bytes));
                    true
                }
                Err(_) => false,
            },
            _ => cursor.skip(wire_type).is_ok(),
        };
        if !ok {
            return reconnect;
        }
    }
}

fn is_http_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}
