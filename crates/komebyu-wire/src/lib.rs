mod assembler;
mod entries;
mod messages;
mod reader;
mod scalars;

pub use assembler::{
    FrameAssembler, FrameMalformed, FrameMalformedCode, FrameRecord, DEFAULT_MAX_FRAME_LEN,
};
pub use entries::{
    decode_view_payload, ReconnectDirective, SegmentEntry, ViewEntry, WalkDirective,
};
pub use messages::{decode_chunked_message, ChatPayload, SegmentMessage, Statistics};
pub use reader::{
    WireCursor, WireError, WIRE_END_GROUP, WIRE_FIXED32, WIRE_FIXED64, WIRE_LEN, WIRE_VARINT,
};
pub use scalars::{flexible_string, read_int64_field, OpaqueCursor};
