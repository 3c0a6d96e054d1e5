use crate::entries::ReconnectDirective;
use crate::reader::{WireCursor, WireError, WIRE_LEN, WIRE_VARINT};
use crate::scalars::{flexible_string, read_int64_field, OpaqueCursor};

/// One decoded message from a segment stream. Carrier field numbers:
/// 1 chat, 2 reconnect, 3 statistics, 4 ping, 5 end.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentMessage {
    Chat(ChatPayload),
    Reconnect(ReconnectDirective),
    Statistics(Statistics),
    Ping,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatPayload {
    pub room_name: Option<String>,
    pub thread_id: Option<String>,
    pub no: Option<i64>,
    pub vpos: Option<i64>,
    pub content: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub mail: Option<String>,
    pub anonymous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub viewers: Option<i64>,
    pub comments: Option<i64>,
    pub ad_points: Option<i64>,
    pub gift_points: Option<i64>,
}

/// Chunked envelope from a segment stream: repeated messages under field 1.
pub fn decode_chunked_message(buf: &[u8]) -> Result<Vec<SegmentMessage>, WireError> {
    let mut cursor = WireCursor::new(buf);
    let mut messages = Vec::new();
    while let Some((field, wire_type)) = cursor.read_tag()? {
        match (field, wire_type) {
            (1, WIRE_LEN) => {
                messages.extend(decode_message(cursor.read_len_delimited()?));
            }
            _ => cursor.skip(wire_type)?,
        }
    }
    Ok(messages)
}

fn decode_message(buf: &[u8]) -> Vec<SegmentMessage> {
    let mut cursor = WireCursor::new(buf);
    let mut messages = Vec::new();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return messages;
        };
        let decoded = match (field, wire_type) {
            (1, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(SegmentMessage::Chat(decode_chat(inner)))),
            (2, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(SegmentMessage::Reconnect(decode_reconnect(inner)))),
            (3, WIRE_LEN) => cursor
                .read_len_delimited()
                .map(|inner| Some(SegmentMessage::Statistics(decode_statistics(inner)))),
            (4, _) => cursor.skip(wire_type).map(|()| Some(SegmentMessage::Ping)),
            (5, _) => cursor.skip(wire_type).map(|()| Some(SegmentMessage::End)),
            _ => cursor.skip(wire_type).map(|()| None),
        };
        match decoded {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(_) => return messages,
        }
    }
}

fn decode_chat(buf: &[u8]) -> ChatPayload {
    let mut cursor = WireCursor::new(buf);
    let mut chat = ChatPayload::default();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return chat;
        };
        let ok = match field {
            1 => read_string_into(&mut cursor, wire_type, &mut chat.room_name),
            2 => read_string_into(&mut cursor, wire_type, &mut chat.thread_id),
            3 => read_int64_into(&mut cursor, wire_type, &mut chat.no),
            4 => read_int64_into(&mut cursor, wire_type, &mut chat.vpos),
            5 => read_string_into(&mut cursor, wire_type, &mut chat.content),
            6 => read_string_into(&mut cursor, wire_type, &mut chat.user_id),
            7 => read_string_into(&mut cursor, wire_type, &mut chat.name),
            8 => read_string_into(&mut cursor, wire_type, &mut chat.mail),
            9 if wire_type == WIRE_VARINT => match cursor.read_var_u64() {
                Ok(value) => {
                    chat.anonymous = value != 0;
                    true
                }
                Err(_) => false,
            },
            _ => cursor.skip(wire_type).is_ok(),
        };
        if !ok {
            return chat;
        }
    }
}

fn decode_statistics(buf: &[u8]) -> Statistics {
    let mut cursor = WireCursor::new(buf);
    let mut statistics = Statistics::default();
    loop {
        let Ok(Some((field, wire_type))) = cursor.read_tag() else {
            return statistics;
        };
        let ok = match field {
            1 => read_int64_into(&mut cursor, wire_type, &mut statistics.viewers),
            2 => read_int64_into(&mut cursor, wire_type, &mut statistics.comments),
            3 => read_int64_into(&mut cursor, wire_type, &mut statistics.ad_points),
            4 => read_int64_into(&mut cursor, wire_type, &mut statistics.gift_points),
            _ => cursor.skip(wire_type).is_ok(),
        };
        if !ok {
            return statistics;
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
            1 => read_int64_into(&mut cursor, wire_type, &mut reconnect.at),
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

fn read_int64_into(cursor: &mut WireCursor<'_>, wire_type: u8, slot: &mut Option<i64>) -> bool {
    match read_int64_field(cursor, wire_type) {
        Ok(value) => {
            *slot = value.or(*slot);
            true
        }
        Err(_) => false,
    }
}

fn read_string_into(cursor: &mut WireCursor<'_>, wire_type: u8, slot: &mut Option<String>) -> bool {
    if wire_type != WIRE_LEN {
        return cursor.skip(wire_type).is_ok();
    }
    match cursor.read_len_delimited() {
        Ok(bytes) => {
            *slot = flexible_string(bytes).or_else(|| slot.take());
            true
        }
        Err(_) => false,
    }
}
