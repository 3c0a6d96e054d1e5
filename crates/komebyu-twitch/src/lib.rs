mod connection;
mod irc;

pub use connection::{run_channel, ChannelConfig, DEFAULT_IRC_WS_URL};
pub use irc::{parse_badges, parse_emotes, parse_line, unescape_tag_value, IrcMessage};
