use futures_util::StreamExt;
use komebyu_core::{normalize_at, Backoff, Cursor, IngestError, ServiceUpdate, ShutdownToken};
use komebyu_wire::{decode_view_payload, FrameAssembler, FrameRecord, ViewEntry};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::http::ndgr_get;
use crate::segment::{SegmentLaunch, SegmentQuery};

/// What one decoded entry asks of the walker. Exactly one action per
/// entry: segment launch, then cursor movement, then reconnect launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryAction {
    Launch(SegmentLaunch),
    Move { at: i64, uri: Option<String> },
    Nothing,
}

pub(crate) fn entry_action(entry: &ViewEntry) -> EntryAction {
    match entry {
        ViewEntry::Segment(segment) => match &segment.uri {
            Some(uri) => EntryAction::Launch(SegmentLaunch {
                uri: uri.clone(),
                query: SegmentQuery::Now,
            }),
            None => EntryAction::Nothing,
        },
        ViewEntry::Reconnect(reconnect) => {
            if let Some(at) = reconnect.at {
                return EntryAction::Move {
                    at: normalize_at(at),
                    uri: None,
                };
            }
            match &reconnect.stream_uri {
                Some(stream_uri) => EntryAction::Launch(SegmentLaunch {
                    uri: stream_uri.clone(),
                    query: match &reconnect.cursor {
                        Some(cursor) => SegmentQuery::Cursor(cursor.text.clone()),
                        None => SegmentQuery::Now,
                    },
                }),
                None => EntryAction::Nothing,
            }
        }
        ViewEntry::Next(next) => match next.at {
            Some(at) => EntryAction::Move {
                at: normalize_at(at),
                uri: next.uri.clone(),
            },
            None => EntryAction::Nothing,
        },
        // Historical backfill: decoded, surfaced in logs, never walked.
        ViewEntry::Previous(previous) => {
            debug!(uri = ?previous.uri, at = ?previous.at, "ignoring previous entry");
            EntryAction::Nothing
        }
        ViewEntry::Ping | ViewEntry::History => EntryAction::Nothing,
    }
}

/// Overwrite the `at` query parameter, preserving everything else.
pub(crate) fn with_at(url: &Url, cursor: Cursor) -> Url {
    let mut out = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "at")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("at", &cursor.query_value());
    }
    out
}

enum PollResult {
    Moved { at: i64, uri: Option<String> },
    Quiet,
    Cancelled,
}

/// Walks the open-ended view sequence for the life of the connection.
/// Returns `Ok(())` when cancelled; `Err` only for protocol-fatal
/// conditions the broadcast owner must surface.
pub async fn run_view_walker(
    client: Client,
    initial_view_url: String,
    initial_cursor: Cursor,
    launch_tx: mpsc::UnboundedSender<SegmentLaunch>,
    updates: mpsc::UnboundedSender<ServiceUpdate>,
    mut shutdown: ShutdownToken,
) -> Result<(), IngestError> {
    let mut view_url = Url::parse(&initial_view_url).map_err(|error| IngestError::Network {
        url: initial_view_url.clone(),
        detail: error.to_string(),
    })?;
    let mut cursor = initial_cursor;
    let mut rebuild = Backoff::cursor_rebuild();
    let mut idle = Backoff::reconnect();

    let _ = updates.send(ServiceUpdate::Status {
        status: "polling view".to_owned(),
    });

    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let poll_url = with_at(&view_url, cursor);
        let response = tokio::select! {
            response = ndgr_get(&client, poll_url.clone()).send() => response,
            () = shutdown.cancelled() => return Ok(()),
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!(url = %poll_url, %error, "view poll failed");
                if sleep_or_cancel(idle.next_delay(), &mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
        };

        let status = response.status().as_u16();
        if status == 422 {
            // Server wants the cursor rebuilt from scratch.
            debug!(url = %poll_url, "view returned 422; resetting cursor to now");
            cursor = Cursor::Now;
            if sleep_or_cancel(rebuild.next_delay(), &mut shutdown).await {
                return Ok(());
            }
            continue;
        }
        if status == 404 || status == 410 {
            return Err(IngestError::Status {
                endpoint: poll_url.to_string(),
                status,
            });
        }
        if !response.status().is_success() {
            warn!(url = %poll_url, status, "view poll returned non-success");
            if sleep_or_cancel(idle.next_delay(), &mut shutdown).await {
                return Ok(());
            }
            continue;
        }
        rebuild.reset();

        match consume_view_body(response, &launch_tx, &mut shutdown).await {
            PollResult::Moved { at, uri } => {
                cursor = Cursor::At(at);
                if let Some(uri) = uri {
                    match Url::parse(&uri) {
                        Ok(next_url) => view_url = next_url,
                        Err(error) => warn!(%uri, %error, "ignoring unparseable next view url"),
                    }
                }
                idle.reset();
            }
            PollResult::Quiet => {
                if sleep_or_cancel(idle.next_delay(), &mut shutdown).await {
                    return Ok(());
                }
            }
            PollResult::Cancelled => return Ok(()),
        }
    }
}

/// Streams one long-poll body. Segment launches go out as they decode; the
/// first cursor movement aborts the poll (dropping the response) and hands
/// the walk position back to the caller.
async fn consume_view_body(
    response: reqwest::Response,
    launch_tx: &mpsc::UnboundedSender<SegmentLaunch>,
    shutdown: &mut ShutdownToken,
) -> PollResult {
    let mut body = response.bytes_stream();
    let mut assembler = FrameAssembler::default();

    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            () = shutdown.cancelled() => return PollResult::Cancelled,
        };
        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                warn!(%error, "view body read failed");
                return PollResult::Quiet;
            }
            None => return PollResult::Quiet,
        };

        for record in assembler.push_chunk(&chunk) {
            let payload = match record {
                FrameRecord::Payload(payload) => payload,
                FrameRecord::Malformed(malformed) => {
                    warn!(code = malformed.code.as_str(), "dropping malformed view frame");
                    continue;
                }
            };
            let entries = match decode_view_payload(&payload) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(%error, "dropping undecodable view frame");
                    continue;
                }
            };
            for entry in &entries {
                match entry_action(entry) {
                    EntryAction::Launch(launch) => {
                        let _ = launch_tx.send(launch);
                    }
                    EntryAction::Move { at, uri } => {
                        return PollResult::Moved { at, uri };
                    }
                    EntryAction::Nothing => {}
                }
            }
        }
    }
}

/// True when cancelled during the sleep.
async fn sleep_or_cancel(delay: std::time::Duration, shutdown: &mut ShutdownToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        () = shutdown.cancelled() => true,
    }
}
