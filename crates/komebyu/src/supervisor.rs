use std::collections::HashMap;

use komebyu_core::{
    shutdown_pair, ConnectTarget, ConnectionHandle, ConnectionKind, HostEvent, ServiceUpdate,
    ShutdownHandle,
};
use komebyu_niconico::{BroadcastConfig, NiconicoOptions};
use komebyu_twitch::ChannelConfig;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub niconico: NiconicoOptions,
    pub irc_ws_url: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            niconico: NiconicoOptions::default(),
            irc_ws_url: komebyu_twitch::DEFAULT_IRC_WS_URL.to_owned(),
        }
    }
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    shutdown: ShutdownHandle,
}

/// Service updates tagged with the connection they belong to.
pub type ServiceEnvelope = (String, ServiceUpdate);

/// Owns the live-connection set. Handles are registered before any service
/// task runs, so duplicate ids are rejected deterministically; removal
/// happens only when the service reports its terminal update.
pub struct Supervisor {
    options: SupervisorOptions,
    events: mpsc::UnboundedSender<HostEvent>,
    updates_tx: mpsc::UnboundedSender<ServiceEnvelope>,
    connections: HashMap<String, ConnectionEntry>,
}

impl Supervisor {
    pub fn new(
        events: mpsc::UnboundedSender<HostEvent>,
        options: SupervisorOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEnvelope>) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        (
            Self {
                options,
                events,
                updates_tx,
                connections: HashMap::new(),
            },
            updates_rx,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connections(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = self
            .connections
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    pub fn connect(&mut self, input: &str) {
        let Some(target) = ConnectTarget::classify(input) else {
            self.status(format!("input not recognized: {input:?}"));
            return;
        };
        let kind = match &target {
            ConnectTarget::Niconico { .. } => ConnectionKind::Niconico,
            ConnectTarget::Twitch { .. } => ConnectionKind::Twitch,
        };
        let id = kind.handle_id(target.natural_key());

        if self.connections.contains_key(&id) {
            self.status(format!("already connected: {id}"));
            return;
        }

        let (shutdown_handle, shutdown_token) = shutdown_pair();
        let (service_tx, service_rx) = mpsc::unbounded_channel();
        spawn_forwarder(id.clone(), service_rx, self.updates_tx.clone());

        match &target {
            ConnectTarget::Niconico { broadcast_id } => {
                tokio::spawn(komebyu_niconico::run_broadcast(
                    BroadcastConfig {
                        connection_id: id.clone(),
                        broadcast_id: broadcast_id.clone(),
                        options: self.options.niconico.clone(),
                    },
                    service_tx,
                    shutdown_token,
                ));
            }
            ConnectTarget::Twitch { channel } => {
                let mut config = ChannelConfig::new(id.clone(), channel.clone());
                config.irc_ws_url = self.options.irc_ws_url.clone();
                tokio::spawn(komebyu_twitch::run_channel(
                    config,
                    service_tx,
                    shutdown_token,
                ));
            }
        }

        info!(%id, "connection registered");
        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                handle: ConnectionHandle {
                    id: id.clone(),
                    kind,
                    label: target.natural_key().to_owned(),
                    status: "connecting".to_owned(),
                },
                shutdown: shutdown_handle,
            },
        );
        self.status(format!("connecting {id}"));
        self.snapshot();
    }

    /// With an id, cancel that subtree; without, cancel everything.
    pub fn disconnect(&mut self, id: Option<&str>) {
        match id {
            Some(id) => match self.connections.get(id) {
                Some(entry) => {
                    entry.shutdown.shutdown();
                    self.status(format!("disconnecting {id}"));
                }
                None => self.status(format!("no such connection: {id}")),
            },
            None => {
                for entry in self.connections.values() {
                    entry.shutdown.shutdown();
                }
                if !self.connections.is_empty() {
                    self.status("disconnecting all connections".to_owned());
                }
            }
        }
    }

    pub fn apply_update(&mut self, id: &str, update: ServiceUpdate) {
        match update {
            ServiceUpdate::Status { status } => {
                let Some(entry) = self.connections.get_mut(id) else {
                    debug!(%id, "status update for unknown connection");
                    return;
                };
                entry.handle.status = status;
                self.snapshot();
            }
            ServiceUpdate::Chat(chat) => {
                let _ = self.events.send(HostEvent::Message(chat));
            }
            ServiceUpdate::Terminated { status, reason } => {
                if self.connections.remove(id).is_none() {
                    return;
                }
                self.status(format!("{id}: {} ({reason})", status.as_str()));
                self.snapshot();
            }
        }
    }

    fn status(&self, global: String) {
        let _ = self.events.send(HostEvent::Status { global });
    }

    fn snapshot(&self) {
        let _ = self.events.send(HostEvent::Connections {
            connections: self.connections(),
        });
    }
}

/// Tags one connection's updates with its id for the shared pump.
fn spawn_forwarder(
    id: String,
    mut service_rx: mpsc::UnboundedReceiver<ServiceUpdate>,
    updates_tx: mpsc::UnboundedSender<ServiceEnvelope>,
) {
    tokio::spawn(async move {
        while let Some(update) = service_rx.recv().await {
            if updates_tx.send((id.clone(), update)).is_err() {
                return;
            }
        }
    });
}
