use std::collections::BTreeMap;

use futures_util::{SinkExt, StreamExt};
use komebyu_core::{
    Backoff, ChatEvent, ConnectionKind, ServiceUpdate, ShutdownToken, TerminalStatus,
};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::irc::{parse_badges, parse_emotes, parse_line, IrcMessage};

pub const DEFAULT_IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub connection_id: String,
    pub channel: String,
    /// Overridable for tests.
    pub irc_ws_url: String,
}

impl ChannelConfig {
    pub fn new(connection_id: String, channel: String) -> Self {
        Self {
            connection_id,
            channel,
            irc_ws_url: DEFAULT_IRC_WS_URL.to_owned(),
        }
    }
}

/// Anonymous reader for one channel. Reconnects with backoff until
/// cancelled; the only terminal outcome it reports on its own is
/// cancellation.
pub async fn run_channel(
    config: ChannelConfig,
    updates: mpsc::UnboundedSender<ServiceUpdate>,
    mut shutdown: ShutdownToken,
) {
    let mut backoff = Backoff::reconnect();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let connected = tokio::select! {
            connected = tokio_tungstenite::connect_async(config.irc_ws_url.as_str()) => connected,
            () = shutdown.cancelled() => break,
        };

        match connected {
            Ok((socket, _response)) => {
                backoff.reset();
                if drive_socket(socket, &config, &updates, &mut shutdown).await {
                    break;
                }
            }
            Err(error) => {
                warn!(url = %config.irc_ws_url, %error, "irc connect failed");
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.cancelled() => break,
        }
    }

    let _ = updates.send(ServiceUpdate::Terminated {
        status: TerminalStatus::Cancelled,
        reason: "disconnected".to_owned(),
    });
}

/// True when the session was cancelled (as opposed to the socket closing).
async fn drive_socket(
    mut socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &ChannelConfig,
    updates: &mpsc::UnboundedSender<ServiceUpdate>,
    shutdown: &mut ShutdownToken,
) -> bool {
    let nick = format!("justinfan{}", rand::thread_rng().gen_range(10_000..100_000));
    let login = [
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_owned(),
        format!("NICK {nick}"),
        format!("JOIN #{}", config.channel),
    ];
    for line in login {
        if socket.send(Message::Text(line)).await.is_err() {
            return false;
        }
    }
    let _ = updates.send(ServiceUpdate::Status {
        status: format!("joined #{}", config.channel),
    });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = socket.close(None).await;
                return true;
            }
            frame = socket.next() => {
                let Some(Ok(frame)) = frame else {
                    return false;
                };
                match frame {
                    Message::Text(text) => {
                        // One frame can batch several CRLF-separated lines.
                        for line in text.lines() {
                            let Some(message) = parse_line(line) else {
                                continue;
                            };
                            match message.command.as_str() {
                                "PING" => {
                                    let payload = message.trailing().unwrap_or("tmi.twitch.tv");
                                    if socket
                                        .send(Message::Text(format!("PONG :{payload}")))
                                        .await
                                        .is_err()
                                    {
                                        return false;
                                    }
                                }
                                "PRIVMSG" => {
                                    if let Some(chat) = chat_event(config, &message) {
                                        let _ = updates.send(ServiceUpdate::Chat(chat));
                                    }
                                }
                                "RECONNECT" => {
                                    debug!(channel = %config.channel, "server requested reconnect");
                                    let _ = socket.close(None).await;
                                    return false;
                                }
                                _ => {}
                            }
                        }
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            return false;
                        }
                    }
                    Message::Close(_) => return false,
                    _ => {}
                }
            }
        }
    }
}

fn chat_event(config: &ChannelConfig, message: &IrcMessage) -> Option<ChatEvent> {
    let text = message.trailing()?.to_owned();
    if text.is_empty() {
        return None;
    }
    let user = message
        .tag("display-name")
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .or_else(|| message.prefix_nick().map(str::to_owned))?;

    let badges = message
        .tag("badges")
        .map(parse_badges)
        .unwrap_or_else(BTreeMap::new);
    let emotes = message.tag("emotes").and_then(parse_emotes);

    Some(ChatEvent {
        connection_id: config.connection_id.clone(),
        source: ConnectionKind::Twitch,
        user,
        text,
        badges,
        emotes,
    })
}

#[cfg(test)]
mod tests {
    use super::{chat_event, ChannelConfig};
    use crate::irc::parse_line;

    fn config() -> ChannelConfig {
        ChannelConfig::new("twitch:somechan".to_owned(), "somechan".to_owned())
    }

    #[test]
    fn privmsg_becomes_a_normalized_event() {
        let line = "@badges=vip/1;display-name=Viewer;emotes=25:0-4 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechan :Kappa hi";
        let message = parse_line(line).unwrap();
        let chat = chat_event(&config(), &message).unwrap();

        assert_eq!(chat.connection_id, "twitch:somechan");
        assert_eq!(chat.user, "Viewer");
        assert_eq!(chat.text, "Kappa hi");
        assert_eq!(chat.badges.get("vip").map(String::as_str), Some("1"));
        let emotes = chat.emotes.unwrap();
        assert_eq!(emotes.get("25").unwrap(), &vec![(0, 4)]);
    }

    #[test]
    fn missing_display_name_falls_back_to_the_nick() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechan :plain";
        let message = parse_line(line).unwrap();
        let chat = chat_event(&config(), &message).unwrap();
        assert_eq!(chat.user, "viewer");
        assert_eq!(chat.emotes, None);
        assert!(chat.badges.is_empty());
    }

    #[test]
    fn empty_messages_are_dropped() {
        let line = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechan :";
        let message = parse_line(line).unwrap();
        assert!(chat_event(&config(), &message).is_none());
    }
}
