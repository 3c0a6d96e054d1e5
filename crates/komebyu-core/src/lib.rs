mod backoff;
mod cursor;
mod error;
mod events;
mod input;
mod int64;
mod shutdown;

pub use backoff::Backoff;
pub use cursor::{normalize_at, Cursor};
pub use error::{ErrorClass, IngestError};
pub use events::{
    ChatEvent, ConnectionHandle, ConnectionKind, HostEvent, ServiceUpdate, TerminalStatus,
};
pub use input::ConnectTarget;
pub use int64::Int64;
pub use shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
