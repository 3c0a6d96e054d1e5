use std::sync::LazyLock;

use regex::Regex;

static BROADCAST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^lv\d+$").expect("broadcast id pattern"));
static BROADCAST_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(lv\d+)(?:[/?#]|$)").expect("broadcast path pattern"));
static TWITCH_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:www\.)?twitch\.tv/").expect("twitch url pattern"));

/// Classified user input: a broadcast id for the niconico pipeline or a
/// channel name for the twitch adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Niconico { broadcast_id: String },
    Twitch { channel: String },
}

impl ConnectTarget {
    /// Anything shaped like `lv<digits>` (bare, or as a path segment of a
    /// watch URL) is a broadcast id; everything else is a twitch channel,
    /// lowercased and stripped of `#` and URL prefixes.
    pub fn classify(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if BROADCAST_ID.is_match(trimmed) {
            return Some(Self::Niconico {
                broadcast_id: trimmed.to_owned(),
            });
        }
        if let Some(captures) = BROADCAST_PATH.captures(trimmed) {
            return Some(Self::Niconico {
                broadcast_id: captures[1].to_owned(),
            });
        }

        let channel = TWITCH_PREFIX.replace(trimmed, "");
        let channel = channel
            .trim_start_matches('#')
            .trim_end_matches('/')
            .to_ascii_lowercase();
        if channel.is_empty() {
            return None;
        }
        Some(Self::Twitch { channel })
    }

    pub fn natural_key(&self) -> &str {
        match self {
            Self::Niconico { broadcast_id } => broadcast_id,
            Self::Twitch { channel } => channel,
        }
    }
}
