use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Twitch,
    Niconico,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::Niconico => "niconico",
        }
    }

    /// Globally unique handle id: `<kind>:<natural key>`.
    pub fn handle_id(self, natural_key: &str) -> String {
        format!("{}:{natural_key}", self.as_str())
    }
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-visible view of one live connection. Status is a human-readable
/// string mutated only by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHandle {
    pub id: String,
    pub kind: ConnectionKind,
    pub label: String,
    pub status: String,
}

/// Normalized chat line, identical in shape for every source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEvent {
    pub connection_id: String,
    pub source: ConnectionKind,
    pub user: String,
    pub text: String,
    pub badges: BTreeMap<String, String>,
    pub emotes: Option<BTreeMap<String, Vec<(u32, u32)>>>,
}

/// How a connection left the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Cancelled,
    Disconnected,
    Failed,
}

impl TerminalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

/// What a service task reports back to the supervisor. Status strings end
/// up on the connection handle; chat events pass straight through to the
/// host; `Terminated` is the last update a task sends.
#[derive(Debug, Clone)]
pub enum ServiceUpdate {
    Status { status: String },
    Chat(ChatEvent),
    Terminated { status: TerminalStatus, reason: String },
}

/// Outbound event stream to the UI host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Status { global: String },
    Message(ChatEvent),
    Connections { connections: Vec<ConnectionHandle> },
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{ChatEvent, ConnectionHandle, ConnectionKind, HostEvent};

    #[test]
    fn handle_ids_are_kind_prefixed() {
        assert_eq!(ConnectionKind::Niconico.handle_id("lv42"), "niconico:lv42");
        assert_eq!(ConnectionKind::Twitch.handle_id("somechan"), "twitch:somechan");
    }

    #[test]
    fn host_events_serialize_tagged() {
        let status = HostEvent::Status {
            global: "connecting".to_owned(),
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"type":"status","global":"connecting"}"#
        );

        let message = HostEvent::Message(ChatEvent {
            connection_id: "niconico:lv42".to_owned(),
            source: ConnectionKind::Niconico,
            user: "niconico".to_owned(),
            text: "hi".to_owned(),
            badges: BTreeMap::new(),
            emotes: None,
        });
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.starts_with(r#"{"type":"message""#));
        assert!(json.contains(r#""source":"niconico""#));

        let connections = HostEvent::Connections {
            connections: vec![ConnectionHandle {
                id: "twitch:somechan".to_owned(),
                kind: ConnectionKind::Twitch,
                label: "somechan".to_owned(),
                status: "open".to_owned(),
            }],
        };
        let json = serde_json::to_string(&connections).unwrap();
        assert!(json.contains(r#""type":"connections""#));
        assert!(json.contains(r#""id":"twitch:somechan""#));
    }
}
