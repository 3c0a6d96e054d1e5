use thiserror::Error;

/// Recovery policy class for an ingest failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Non-2xx (other than 422), socket close, connect failure: back off
    /// and retry silently until cancelled.
    TransientNetwork,
    /// View endpoint 422: rebuild the cursor at `now` and retry on its own
    /// schedule.
    TransientSchema,
    /// Malformed frame: drop it, keep reading the stream.
    Decode,
    /// Server told us to stop (signaling disconnect, view 404/410):
    /// terminate the connection with a visible reason.
    ProtocolFatal,
    /// Bad input or missing landing data: never retried.
    Config,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::TransientSchema => "transient_schema",
            Self::Decode => "decode",
            Self::ProtocolFatal => "protocol_fatal",
            Self::Config => "config",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::TransientSchema | Self::Decode
        )
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request to {url} failed: {detail}")]
    Network { url: String, detail: String },
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("view endpoint asked for a cursor rebuild (422)")]
    CursorRebuild,
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("server closed the connection: {reason}")]
    Disconnected { reason: String },
    #[error("input not recognized: {0:?}")]
    UnrecognizedInput(String),
    #[error("landing page has no usable signaling endpoint")]
    MissingSignalingEndpoint,
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. } => ErrorClass::TransientNetwork,
            Self::Status { status, .. } => match status {
                404 | 410 => ErrorClass::ProtocolFatal,
                422 => ErrorClass::TransientSchema,
                _ => ErrorClass::TransientNetwork,
            },
            Self::CursorRebuild => ErrorClass::TransientSchema,
            Self::Decode(_) => ErrorClass::Decode,
            Self::Disconnected { .. } => ErrorClass::ProtocolFatal,
            Self::UnrecognizedInput(_) | Self::MissingSignalingEndpoint => ErrorClass::Config,
        }
    }
}
