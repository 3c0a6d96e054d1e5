use std::collections::BTreeMap;

use futures_util::StreamExt;
use komebyu_core::{
    normalize_at, Backoff, ChatEvent, ConnectionKind, IngestError, ServiceUpdate, ShutdownToken,
};
use komebyu_wire::{decode_chunked_message, FrameAssembler, FrameRecord, SegmentMessage};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::http::ndgr_get;

/// Position to resume a segment stream from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentQuery {
    Now,
    At(i64),
    Cursor(String),
}

/// Request to start (or replace) a segment runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLaunch {
    pub uri: String,
    pub query: SegmentQuery,
}

impl SegmentLaunch {
    /// Runner identity: the exact fully-qualified URL, query included.
    pub fn key(&self) -> Result<String, IngestError> {
        segment_url(&self.uri, &self.query).map(|url| url.to_string())
    }
}

pub(crate) fn segment_url(uri: &str, query: &SegmentQuery) -> Result<Url, IngestError> {
    let base = Url::parse(uri).map_err(|error| IngestError::Network {
        url: uri.to_owned(),
        detail: error.to_string(),
    })?;
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "at" && key != "cursor")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut out = base.clone();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        match query {
            SegmentQuery::Now => {
                pairs.append_pair("at", "now");
            }
            SegmentQuery::At(seconds) => {
                pairs.append_pair("at", &seconds.to_string());
            }
            SegmentQuery::Cursor(cursor) => {
                pairs.append_pair("cursor", cursor);
            }
        }
    }
    Ok(out)
}

enum StreamEnd {
    Drained,
    ReconnectIssued,
    Terminal,
    Cancelled,
}

/// Independent long-poll stream for one segment endpoint. Lives until the
/// server ends it, a reconnect directive replaces it, or the connection is
/// cancelled.
pub async fn run_segment(
    client: Client,
    connection_id: String,
    launch: SegmentLaunch,
    updates: mpsc::UnboundedSender<ServiceUpdate>,
    replace_tx: mpsc::UnboundedSender<SegmentLaunch>,
    mut shutdown: ShutdownToken,
) {
    let mut query = launch.query.clone();
    let mut recorded: Option<SegmentQuery> = None;
    let mut backoff = Backoff::segment();

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let url = match segment_url(&launch.uri, &query) {
            Ok(url) => url,
            Err(error) => {
                warn!(uri = %launch.uri, %error, "segment url unusable; runner stopped");
                return;
            }
        };

        let response = tokio::select! {
            response = ndgr_get(&client, url.clone()).send() => response,
            () = shutdown.cancelled() => return,
        };

        let end = match response {
            Ok(response) if response.status().is_success() => {
                backoff.reset();
                consume_segment_body(
                    response,
                    &launch.uri,
                    &connection_id,
                    &updates,
                    &replace_tx,
                    &mut recorded,
                    &mut shutdown,
                )
                .await
            }
            Ok(response) => {
                let status = response.status().as_u16();
                if status == 404 || status == 410 {
                    debug!(url = %url, status, "segment endpoint gone; runner stopped");
                    StreamEnd::Terminal
                } else {
                    warn!(url = %url, status, "segment poll returned non-success");
                    StreamEnd::Drained
                }
            }
            Err(error) => {
                warn!(url = %url, %error, "segment poll failed");
                StreamEnd::Drained
            }
        };

        match end {
            StreamEnd::Cancelled | StreamEnd::Terminal | StreamEnd::ReconnectIssued => return,
            StreamEnd::Drained => {
                if sleep_or_cancel(backoff.next_delay(), &mut shutdown).await {
                    return;
                }
                // Resume from whatever the server last told us, else live.
                query = recorded.clone().unwrap_or(SegmentQuery::Now);
            }
        }
    }
}

async fn consume_segment_body(
    response: reqwest::Response,
    current_uri: &str,
    connection_id: &str,
    updates: &mpsc::UnboundedSender<ServiceUpdate>,
    replace_tx: &mpsc::UnboundedSender<SegmentLaunch>,
    recorded: &mut Option<SegmentQuery>,
    shutdown: &mut ShutdownToken,
) -> StreamEnd {
    let mut body = response.bytes_stream();
    let mut assembler = FrameAssembler::default();
    let mut reconnect_issued = false;

    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            () = shutdown.cancelled() => return StreamEnd::Cancelled,
        };
        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                warn!(%error, "segment body read failed");
                break;
            }
            None => break,
        };

        for record in assembler.push_chunk(&chunk) {
            let payload = match record {
                FrameRecord::Payload(payload) => payload,
                FrameRecord::Malformed(malformed) => {
                    warn!(
                        code = malformed.code.as_str(),
                        "dropping malformed segment frame"
                    );
                    continue;
                }
            };
            let messages = match decode_chunked_message(&payload) {
                Ok(messages) => messages,
                Err(error) => {
                    warn!(%error, "dropping undecodable segment frame");
                    continue;
                }
            };

            for message in messages {
                match message {
                    SegmentMessage::Chat(chat) => {
                        let Some(content) = chat.content.filter(|text| !text.is_empty()) else {
                            continue;
                        };
                        let user = chat
                            .name
                            .filter(|name| !name.is_empty())
                            .or(chat.user_id.filter(|id| !id.is_empty()))
                            .unwrap_or_else(|| "niconico".to_owned());
                        let _ = updates.send(ServiceUpdate::Chat(ChatEvent {
                            connection_id: connection_id.to_owned(),
                            source: ConnectionKind::Niconico,
                            user,
                            text: content,
                            badges: BTreeMap::new(),
                            emotes: None,
                        }));
                    }
                    SegmentMessage::Reconnect(reconnect) => {
                        if let Some(cursor) = &reconnect.cursor {
                            *recorded = Some(SegmentQuery::Cursor(cursor.text.clone()));
                        } else if let Some(at) = reconnect.at {
                            *recorded = Some(SegmentQuery::At(normalize_at(at)));
                        }
                        if let Some(stream_uri) = &reconnect.stream_uri {
                            if stream_uri != current_uri {
                                let _ = replace_tx.send(SegmentLaunch {
                                    uri: stream_uri.clone(),
                                    query: recorded.clone().unwrap_or(SegmentQuery::Now),
                                });
                                reconnect_issued = true;
                            }
                        }
                    }
                    SegmentMessage::End => return StreamEnd::Terminal,
                    SegmentMessage::Statistics(statistics) => {
                        debug!(?statistics, "segment statistics");
                    }
                    SegmentMessage::Ping => {}
                }
            }
        }
    }

    if reconnect_issued {
        StreamEnd::ReconnectIssued
    } else {
        StreamEnd::Drained
    }
}

async fn sleep_or_cancel(delay: std::time::Duration, shutdown: &mut ShutdownToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        () = shutdown.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{segment_url, SegmentLaunch, SegmentQuery};

    #[test]
    fn segment_urls_carry_the_requested_position() {
        let now = segment_url(
            "https://mpn.live.nicovideo.jp/data/segment/v4/a",
            &SegmentQuery::Now,
        )
        .unwrap();
        assert_eq!(
            now.as_str(),
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?at=now"
        );

        let at = segment_url(
            "https://mpn.live.nicovideo.jp/data/segment/v4/a",
            &SegmentQuery::At(1_700_000_000),
        )
        .unwrap();
        assert_eq!(
            at.as_str(),
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?at=1700000000"
        );

        let cursor = segment_url(
            "https://mpn.live.nicovideo.jp/data/segment/v4/a",
            &SegmentQuery::Cursor("c:9".to_owned()),
        )
        .unwrap();
        assert_eq!(
            cursor.as_str(),
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?cursor=c%3A9"
        );
    }

    #[test]
    fn stale_position_parameters_are_replaced() {
        let url = segment_url(
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?at=123&keep=1",
            &SegmentQuery::Cursor("next".to_owned()),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?keep=1&cursor=next"
        );
    }

    #[test]
    fn launch_keys_are_fully_qualified() {
        let launch = SegmentLaunch {
            uri: "https://mpn.live.nicovideo.jp/data/segment/v4/a".to_owned(),
            query: SegmentQuery::At(5),
        };
        assert_eq!(
            launch.key().unwrap(),
            "https://mpn.live.nicovideo.jp/data/segment/v4/a?at=5"
        );

        let same_uri_different_cursor = SegmentLaunch {
            uri: "https://mpn.live.nicovideo.jp/data/segment/v4/a".to_owned(),
            query: SegmentQuery::At(6),
        };
        assert_ne!(
            launch.key().unwrap(),
            same_uri_different_cursor.key().unwrap()
        );
    }
}
