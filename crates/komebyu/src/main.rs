use clap::Parser;
use komebyu::{HostEvent, Supervisor, SupervisorOptions};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Aggregates live chat from niconico broadcasts and twitch channels into
/// one normalized event stream on stdout.
#[derive(Debug, Parser)]
#[command(name = "komebyu", version)]
struct Args {
    /// Broadcast ids (lv…), watch-page URLs, or twitch channel names.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Human-readable output instead of JSON lines.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (mut supervisor, mut updates_rx) = Supervisor::new(events_tx, SupervisorOptions::default());

    for input in &args.inputs {
        supervisor.connect(input);
    }

    // Runs until every connection has reached a terminal state; ctrl-c
    // just asks the supervisor to cancel them all.
    let mut ctrl_c_armed = true;
    while !supervisor.is_empty() {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                print_event(&event, args.pretty);
            }
            Some((id, update)) = updates_rx.recv() => {
                supervisor.apply_update(&id, update);
            }
            signal = tokio::signal::ctrl_c(), if ctrl_c_armed => {
                ctrl_c_armed = false;
                if let Err(error) = signal {
                    warn!(%error, "ctrl-c handler failed; shutting down");
                }
                supervisor.disconnect(None);
            }
        }
    }

    while let Ok(event) = events_rx.try_recv() {
        print_event(&event, args.pretty);
    }
}

fn print_event(event: &HostEvent, pretty: bool) {
    if !pretty {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(error) => warn!(%error, "event did not serialize"),
        }
        return;
    }

    match event {
        HostEvent::Status { global } => println!("-- {global}"),
        HostEvent::Message(chat) => {
            println!("[{}] {}: {}", chat.connection_id, chat.user, chat.text);
        }
        HostEvent::Connections { connections } => {
            let summary: Vec<String> = connections
                .iter()
                .map(|handle| format!("{} ({})", handle.id, handle.status))
                .collect();
            println!("== connections: {}", summary.join(", "));
        }
    }
}
