use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use komebyu_core::{Backoff, IngestError, ServiceUpdate, ShutdownToken};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const KEEP_SEAT_INTERVAL: Duration = Duration::from_secs(30);
const VIEW_API_MARKER: &str = "mpn.live.nicovideo.jp/api/view";

/// What a classified inbound signaling frame asks of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalAction {
    ReportViewEndpoint(String),
    ReplyPong,
    ReplyKeepSeat,
    Disconnect { reason: String },
    Ignore,
}

/// Inbound frames are JSON objects with a top-level `type`. Frames that
/// fail to parse are ignored; the socket stays up.
pub fn classify_frame(text: &str) -> SignalAction {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return SignalAction::Ignore;
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return SignalAction::Ignore;
    };
    let data = value.get("data");

    match kind {
        "ping" => SignalAction::ReplyPong,
        "disconnect" => {
            let reason = data
                .and_then(|data| data.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("server disconnect")
                .to_owned();
            SignalAction::Disconnect { reason }
        }
        // Out-of-band experimental endpoint; never followed.
        "akashicMessageServer" => SignalAction::Ignore,
        "messageServer" | "room" => match data.and_then(find_view_uri) {
            Some(uri) => SignalAction::ReportViewEndpoint(uri),
            None if kind == "room" => SignalAction::ReplyKeepSeat,
            None => SignalAction::Ignore,
        },
        "seat" => SignalAction::ReplyKeepSeat,
        _ => SignalAction::Ignore,
    }
}

/// Depth-first scan for a string carrying the NDGR view API path. The exact
/// key has moved between server revisions, so the shape is not trusted.
fn find_view_uri(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if text.contains(VIEW_API_MARKER) => Some(text.clone()),
        Value::Object(map) => map.values().find_map(find_view_uri),
        Value::Array(items) => items.iter().find_map(find_view_uri),
        _ => None,
    }
}

pub fn start_watching_payload() -> Value {
    json!({
        "type": "startWatching",
        "data": {
            "stream": {
                "quality": "abr",
                "protocol": "hls",
                "latency": "low",
                "chasePlay": false,
            },
            "room": {
                "protocol": "webSocket",
                "commentable": true,
            },
            "reconnect": false,
        },
    })
}

fn keep_seat_payload() -> Value {
    json!({"type": "keepSeat"})
}

fn pong_payload() -> Value {
    json!({"type": "pong"})
}

/// Long-lived signaling session. Discovered view endpoints go out through
/// `view_tx` exactly once per distinct URL. Returns `Ok(())` when
/// cancelled, `Err` only for a server-issued disconnect.
pub async fn run_signaling(
    url: String,
    view_tx: mpsc::UnboundedSender<String>,
    updates: mpsc::UnboundedSender<ServiceUpdate>,
    mut shutdown: ShutdownToken,
) -> Result<(), IngestError> {
    let mut reported: HashSet<String> = HashSet::new();
    let mut backoff = Backoff::reconnect();

    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let connected = tokio::select! {
            connected = tokio_tungstenite::connect_async(url.as_str()) => connected,
            () = shutdown.cancelled() => return Ok(()),
        };

        match connected {
            Ok((socket, _response)) => {
                let _ = updates.send(ServiceUpdate::Status {
                    status: "signaling open".to_owned(),
                });
                backoff.reset();
                match drive_socket(socket, &view_tx, &mut reported, &mut shutdown).await {
                    SocketOutcome::Cancelled => return Ok(()),
                    SocketOutcome::Disconnected { reason } => {
                        return Err(IngestError::Disconnected { reason });
                    }
                    SocketOutcome::Closed => {}
                }
            }
            Err(error) => {
                warn!(%url, %error, "signaling connect failed");
            }
        }

        let delay = backoff.next_delay();
        debug!(?delay, "signaling reconnect scheduled");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.cancelled() => return Ok(()),
        }
    }
}

enum SocketOutcome {
    Closed,
    Cancelled,
    Disconnected { reason: String },
}

async fn drive_socket(
    mut socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    view_tx: &mpsc::UnboundedSender<String>,
    reported: &mut HashSet<String>,
    shutdown: &mut ShutdownToken,
) -> SocketOutcome {
    if send_json(&mut socket, start_watching_payload()).await.is_err() {
        return SocketOutcome::Closed;
    }

    let mut keep_seat = interval(KEEP_SEAT_INTERVAL);
    keep_seat.tick().await; // immediate first tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = socket.close(None).await;
                return SocketOutcome::Cancelled;
            }
            _ = keep_seat.tick() => {
                if send_json(&mut socket, keep_seat_payload()).await.is_err() {
                    return SocketOutcome::Closed;
                }
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    return SocketOutcome::Closed;
                }
            }
            frame = socket.next() => {
                let Some(Ok(frame)) = frame else {
                    return SocketOutcome::Closed;
                };
                match frame {
                    Message::Text(text) => {
                        match classify_frame(&text) {
                            SignalAction::ReplyPong => {
                                if send_json(&mut socket, pong_payload()).await.is_err() {
                                    return SocketOutcome::Closed;
                                }
                            }
                            SignalAction::ReplyKeepSeat => {
                                if send_json(&mut socket, keep_seat_payload()).await.is_err() {
                                    return SocketOutcome::Closed;
                                }
                            }
                            SignalAction::ReportViewEndpoint(uri) => {
                                if reported.insert(uri.clone()) {
                                    let _ = view_tx.send(uri);
                                } else {
                                    debug!(%uri, "view endpoint repeated; suppressed");
                                }
                            }
                            SignalAction::Disconnect { reason } => {
                                let _ = socket.close(None).await;
                                return SocketOutcome::Disconnected { reason };
                            }
                            SignalAction::Ignore => {}
                        }
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            return SocketOutcome::Closed;
                        }
                    }
                    Message::Close(_) => return SocketOutcome::Closed,
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    payload: Value,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    socket.send(Message::Text(payload.to_string())).await
}

#[cfg(test)]
mod tests {
    use super::{classify_frame, start_watching_payload, SignalAction};

    #[test]
    fn ping_gets_a_pong() {
        assert_eq!(classify_frame(r#"{"type":"ping"}"#), SignalAction::ReplyPong);
    }

    #[test]
    fn message_server_reports_the_view_endpoint() {
        let frame = r#"{"type":"messageServer","data":{"viewUri":"https://mpn.live.nicovideo.jp/api/view/v4/x?at=now"}}"#;
        assert_eq!(
            classify_frame(frame),
            SignalAction::ReportViewEndpoint(
                "https://mpn.live.nicovideo.jp/api/view/v4/x?at=now".to_owned()
            )
        );
    }

    #[test]
    fn room_with_nested_view_uri_reports_it() {
        let frame = r#"{"type":"room","data":{"messageServer":{"uri":"https://mpn.live.nicovideo.jp/api/view/v4/y"}}}"#;
        assert_eq!(
            classify_frame(frame),
            SignalAction::ReportViewEndpoint(
                "https://mpn.live.nicovideo.jp/api/view/v4/y".to_owned()
            )
        );
    }

    #[test]
    fn room_acknowledgement_keeps_the_seat() {
        let frame = r#"{"type":"room","data":{"name":"co1"}}"#;
        assert_eq!(classify_frame(frame), SignalAction::ReplyKeepSeat);
        assert_eq!(
            classify_frame(r#"{"type":"seat","data":{"keepIntervalSec":30}}"#),
            SignalAction::ReplyKeepSeat
        );
    }

    #[test]
    fn akashic_endpoint_is_ignored() {
        let frame = r#"{"type":"akashicMessageServer","data":{"uri":"https://mpn.live.nicovideo.jp/api/view/v4/akashic"}}"#;
        assert_eq!(classify_frame(frame), SignalAction::Ignore);
    }

    #[test]
    fn disconnect_carries_the_reason() {
        let frame = r#"{"type":"disconnect","data":{"reason":"TAKEOVER"}}"#;
        assert_eq!(
            classify_frame(frame),
            SignalAction::Disconnect {
                reason: "TAKEOVER".to_owned()
            }
        );
        assert_eq!(
            classify_frame(r#"{"type":"disconnect"}"#),
            SignalAction::Disconnect {
                reason: "server disconnect".to_owned()
            }
        );
    }

    #[test]
    fn unknown_and_malformed_frames_are_ignored() {
        assert_eq!(classify_frame(r#"{"type":"statistics"}"#), SignalAction::Ignore);
        assert_eq!(classify_frame("not json"), SignalAction::Ignore);
        assert_eq!(classify_frame(r#"{"data":{}}"#), SignalAction::Ignore);
    }

    #[test]
    fn start_watching_payload_has_the_fixed_shape() {
        let payload = start_watching_payload();
        assert_eq!(payload["type"], "startWatching");
        assert_eq!(payload["data"]["reconnect"], false);
        assert_eq!(payload["data"]["stream"]["chasePlay"], false);
        assert_eq!(payload["data"]["room"]["commentable"], true);
    }
}
