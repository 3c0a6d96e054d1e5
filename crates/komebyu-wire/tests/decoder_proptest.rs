use komebyu_wire::{decode_view_payload, OpaqueCursor, ViewEntry};
use proptest::prelude::*;

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

fn field(number: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = varint(u64::from(number) << 3 | 2);
    out.extend(varint(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, Clone, Copy)]
enum IntVariant {
    RawVarint,
    Fixed64,
    Int64Value,
}

fn encode_int_field(number: u32, value: u64, variant: IntVariant) -> Vec<u8> {
    match variant {
        IntVariant::RawVarint => {
            let mut out = varint(u64::from(number) << 3);
            out.extend(varint(value));
            out
        }
        IntVariant::Fixed64 => {
            let mut out = varint(u64::from(number) << 3 | 1);
            out.extend_from_slice(&value.to_le_bytes());
            out
        }
        IntVariant::Int64Value => {
            let mut wrapper = varint(1 << 3);
            wrapper.extend(varint(value));
            field(number, &wrapper)
        }
    }
}

fn int_variant() -> impl Strategy<Value = IntVariant> {
    prop_oneof![
        Just(IntVariant::RawVarint),
        Just(IntVariant::Fixed64),
        Just(IntVariant::Int64Value),
    ]
}

proptest! {
    #[test]
    fn reconnect_at_is_invariant_under_wire_variants(
        at in 0_u64..=i64::MAX as u64,
        variant in int_variant(),
    ) {
        let reconnect = encode_int_field(1, at, variant);
        let frame = field(4, &reconnect);

        let entries = decode_view_payload(&frame).unwrap();
        prop_assert_eq!(entries.len(), 1);
        match &entries[0] {
            ViewEntry::Reconnect(reconnect) => {
                prop_assert_eq!(reconnect.at, Some(at as i64));
            }
            other => prop_assert!(false, "unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn next_at_is_invariant_under_wire_variants(
        at in 0_u64..=i64::MAX as u64,
        variant in int_variant(),
    ) {
        let next = encode_int_field(1, at, variant);
        let frame = field(2, &field(2, &next));

        let entries = decode_view_payload(&frame).unwrap();
        // The nested path must win: a varint payload is never an http URL.
        prop_assert_eq!(entries.len(), 1);
        match &entries[0] {
            ViewEntry::Next(next) => prop_assert_eq!(next.at, Some(at as i64)),
            other => prop_assert!(false, "unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn opaque_cursor_round_trips_utf8_or_base64(
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let cursor = OpaqueCursor::from_bytes(&bytes);
        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                prop_assert_eq!(cursor.text.as_str(), text);
                prop_assert_eq!(cursor.raw, None);
            }
            Err(_) => {
                use base64::Engine;
                let expected = base64::engine::general_purpose::STANDARD.encode(&bytes);
                prop_assert_eq!(cursor.text, expected);
                prop_assert_eq!(cursor.raw, Some(bytes));
            }
        }
    }
}
