mod supervisor;

pub use komebyu_core::{
    ChatEvent, ConnectTarget, ConnectionHandle, ConnectionKind, HostEvent, ServiceUpdate,
};
pub use supervisor::{ServiceEnvelope, Supervisor, SupervisorOptions};
