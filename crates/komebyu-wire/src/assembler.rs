use bytes::{Buf, Bytes, BytesMut};

use crate::reader::{WireCursor, WireError};

pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMalformedCode {
    Oversized,
    BadLengthPrefix,
    TruncatedTail,
}

impl FrameMalformedCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oversized => "oversized",
            Self::BadLengthPrefix => "bad_length_prefix",
            Self::TruncatedTail => "truncated_tail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMalformed {
    pub code: FrameMalformedCode,
    pub declared_len: Option<u64>,
    pub buffered_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRecord {
    Payload(Bytes),
    Malformed(FrameMalformed),
}

/// Reassembles length-prefixed frames (varint length, then payload) from an
/// HTTP body delivered in arbitrary chunks. Partial prefixes and partial
/// payloads stay buffered across calls. A length above the configured bound
/// discards the buffer; the error is recoverable and later chunks start a
/// fresh prefix.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    max_frame_len: usize,
    finished: bool,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameAssembler {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len: max_frame_len.max(1),
            finished: false,
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<FrameRecord> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            let mut prefix = WireCursor::new(&self.buffer);
            let declared = match prefix.read_var_u64() {
                Ok(declared) => declared,
                Err(WireError::UnexpectedEof { .. }) => break,
                Err(_) => {
                    out.push(FrameRecord::Malformed(FrameMalformed {
                        code: FrameMalformedCode::BadLengthPrefix,
                        declared_len: None,
                        buffered_bytes: self.buffer.len(),
                    }));
                    self.buffer.clear();
                    break;
                }
            };
            let prefix_len = prefix.position();

            if declared > self.max_frame_len as u64 {
                out.push(FrameRecord::Malformed(FrameMalformed {
                    code: FrameMalformedCode::Oversized,
                    declared_len: Some(declared),
                    buffered_bytes: self.buffer.len(),
                }));
                self.buffer.clear();
                break;
            }

            let frame_len = declared as usize;
            if self.buffer.len() < prefix_len + frame_len {
                break;
            }

            self.buffer.advance(prefix_len);
            out.push(FrameRecord::Payload(
                self.buffer.split_to(frame_len).freeze(),
            ));
        }
        out
    }

    /// End of the body stream. Reports bytes stuck in a partial frame.
    pub fn finish(&mut self) -> Option<FrameMalformed> {
        if self.finished {
            return None;
        }
        self.finished = true;
        if self.buffer.is_empty() {
            return None;
        }
        let declared = WireCursor::new(&self.buffer).read_var_u64().ok();
        Some(FrameMalformed {
            code: FrameMalformedCode::TruncatedTail,
            declared_len: declared,
            buffered_bytes: self.buffer.len(),
        })
    }
}
