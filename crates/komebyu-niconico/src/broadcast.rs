use std::collections::HashMap;

use komebyu_core::{
    shutdown_pair, Cursor, ErrorClass, IngestError, ServiceUpdate, ShutdownToken, TerminalStatus,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::http::build_client;
use crate::landing::{discover_signaling_url, fetch_watch_page};
use crate::segment::run_segment;
use crate::signaling::run_signaling;
use crate::view::run_view_walker;

pub const DEFAULT_WATCH_PAGE_BASE: &str = "https://live.nicovideo.jp/watch/";

#[derive(Debug, Clone)]
pub struct NiconicoOptions {
    /// Base URL the broadcast id is joined onto. Overridable for tests.
    pub watch_page_base: String,
}

impl Default for NiconicoOptions {
    fn default() -> Self {
        Self {
            watch_page_base: DEFAULT_WATCH_PAGE_BASE.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub connection_id: String,
    pub broadcast_id: String,
    pub options: NiconicoOptions,
}

/// Live segment runners keyed by the exact fully-qualified URL they are
/// addressing. A launch for a URL that is already live is a no-op.
#[derive(Debug, Default)]
struct RunnerSet {
    runners: HashMap<String, JoinHandle<()>>,
}

impl RunnerSet {
    fn try_claim(&mut self, key: &str) -> bool {
        self.runners.retain(|_, handle| !handle.is_finished());
        !self.runners.contains_key(key)
    }

    fn insert(&mut self, key: String, handle: JoinHandle<()>) {
        self.runners.insert(key, handle);
    }

    fn len(&self) -> usize {
        self.runners.len()
    }

    async fn drain(self) {
        for (_, handle) in self.runners {
            let _ = handle.await;
        }
    }
}

/// Owns one broadcast end to end: landing discovery, the signaling
/// session, the view walker, and every segment runner. The last update it
/// sends is always `Terminated`.
pub async fn run_broadcast(
    config: BroadcastConfig,
    updates: mpsc::UnboundedSender<ServiceUpdate>,
    mut shutdown: ShutdownToken,
) {
    let send_status = |status: &str| {
        let _ = updates.send(ServiceUpdate::Status {
            status: status.to_owned(),
        });
    };
    let terminate = |status: TerminalStatus, reason: String| {
        let _ = updates.send(ServiceUpdate::Terminated { status, reason });
    };

    send_status("fetching watch page");
    let client = match build_client() {
        Ok(client) => client,
        Err(error) => {
            terminate(TerminalStatus::Failed, error.to_string());
            return;
        }
    };

    let html = tokio::select! {
        html = fetch_watch_page(&client, &config.options.watch_page_base, &config.broadcast_id) => html,
        () = shutdown.cancelled() => {
            terminate(TerminalStatus::Cancelled, "disconnected".to_owned());
            return;
        }
    };
    let html = match html {
        Ok(html) => html,
        Err(error) => {
            terminate(TerminalStatus::Failed, error.to_string());
            return;
        }
    };
    let signaling_url = match discover_signaling_url(&html) {
        Ok(url) => url,
        Err(error) => {
            terminate(TerminalStatus::Failed, error.to_string());
            return;
        }
    };

    send_status("opening signaling socket");

    // Children share one cancellation channel; flipping it tears down the
    // signaling socket, the walker, and the runners together.
    let (child_handle, child_token) = shutdown_pair();
    let (view_tx, mut view_rx) = mpsc::unbounded_channel::<String>();
    let (launch_tx, mut launch_rx) = mpsc::unbounded_channel();

    let mut signaling_task: Option<JoinHandle<Result<(), IngestError>>> =
        Some(tokio::spawn(run_signaling(
            signaling_url,
            view_tx,
            updates.clone(),
            child_token.clone(),
        )));
    let mut walker_task: Option<JoinHandle<Result<(), IngestError>>> = None;
    let mut runners = RunnerSet::default();

    let (terminal, reason) = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                break (TerminalStatus::Cancelled, "disconnected".to_owned());
            }

            Some(view_url) = view_rx.recv() => {
                if walker_task.is_some() {
                    debug!(%view_url, "view walker already running; ignoring endpoint");
                    continue;
                }
                walker_task = Some(tokio::spawn(run_view_walker(
                    client.clone(),
                    view_url,
                    Cursor::Now,
                    launch_tx.clone(),
                    updates.clone(),
                    child_token.clone(),
                )));
            }

            Some(launch) = launch_rx.recv() => {
                let key = match launch.key() {
                    Ok(key) => key,
                    Err(error) => {
                        warn!(%error, "segment launch request with unusable url");
                        continue;
                    }
                };
                if !runners.try_claim(&key) {
                    debug!(%key, "segment runner already live; launch ignored");
                    continue;
                }
                let handle = tokio::spawn(run_segment(
                    client.clone(),
                    config.connection_id.clone(),
                    launch,
                    updates.clone(),
                    launch_tx.clone(),
                    child_token.clone(),
                ));
                runners.insert(key, handle);
                send_status(&format!("receiving segments ({})", runners.len()));
            }

            result = async {
                signaling_task
                    .as_mut()
                    .expect("guard keeps signaling task present")
                    .await
            }, if signaling_task.is_some() => {
                signaling_task = None;
                match result {
                    Ok(Err(error)) => {
                        let terminal = if error.class() == ErrorClass::ProtocolFatal {
                            TerminalStatus::Disconnected
                        } else {
                            TerminalStatus::Failed
                        };
                        break (terminal, error.to_string());
                    }
                    Ok(Ok(())) => {
                        break (TerminalStatus::Failed, "signaling session ended".to_owned());
                    }
                    Err(join_error) => {
                        break (TerminalStatus::Failed, format!("signaling task failed: {join_error}"));
                    }
                }
            }

            result = async {
                walker_task
                    .as_mut()
                    .expect("guard keeps walker task present")
                    .await
            }, if walker_task.is_some() => {
                walker_task = None;
                match result {
                    Ok(Err(error)) => {
                        break (TerminalStatus::Failed, error.to_string());
                    }
                    Ok(Ok(())) => {
                        // Walker only returns cleanly when cancelled; keep
                        // draining the other branches until the owner acts.
                    }
                    Err(join_error) => {
                        break (TerminalStatus::Failed, format!("view walker task failed: {join_error}"));
                    }
                }
            }
        }
    };

    // Teardown order: signaling socket, view walker, segment runners.
    child_handle.shutdown();
    if let Some(task) = signaling_task {
        let _ = task.await;
    }
    if let Some(task) = walker_task {
        let _ = task.await;
    }
    runners.drain().await;

    terminate(terminal, reason);
}
