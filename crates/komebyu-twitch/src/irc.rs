use std::collections::BTreeMap;

/// One parsed IRC line: IRCv3 tags, optional prefix, command, parameters
/// (trailing parameter included as the last element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: BTreeMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Nick portion of the prefix (`nick!user@host`).
    pub fn prefix_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

pub fn parse_line(line: &str) -> Option<IrcMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let mut rest = line;
    let mut tags = BTreeMap::new();
    if let Some(tagged) = rest.strip_prefix('@') {
        let (raw_tags, remainder) = tagged.split_once(' ')?;
        for tag in raw_tags.split(';') {
            match tag.split_once('=') {
                Some((key, value)) => {
                    tags.insert(key.to_owned(), unescape_tag_value(value));
                }
                None => {
                    tags.insert(tag.to_owned(), String::new());
                }
            }
        }
        rest = remainder;
    }

    let mut prefix = None;
    if let Some(prefixed) = rest.strip_prefix(':') {
        let (raw_prefix, remainder) = prefixed.split_once(' ')?;
        prefix = Some(raw_prefix.to_owned());
        rest = remainder;
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };
    let mut words = head.split_ascii_whitespace();
    let command = words.next()?.to_owned();
    let mut params: Vec<String> = words.map(str::to_owned).collect();
    if let Some(trailing) = trailing {
        params.push(trailing.to_owned());
    }

    Some(IrcMessage {
        tags,
        prefix,
        command,
        params,
    })
}

/// IRCv3 tag value unescaping: `\:` `\s` `\\` `\r` `\n`.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// `badges=subscriber/12,vip/1` into a name → version map.
pub fn parse_badges(tag: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for badge in tag.split(',') {
        if badge.is_empty() {
            continue;
        }
        match badge.split_once('/') {
            Some((name, version)) => out.insert(name.to_owned(), version.to_owned()),
            None => out.insert(badge.to_owned(), String::new()),
        };
    }
    out
}

/// `emotes=25:0-4,12-16/1902:6-10` into id → character ranges.
pub fn parse_emotes(tag: &str) -> Option<BTreeMap<String, Vec<(u32, u32)>>> {
    if tag.is_empty() {
        return None;
    }
    let mut out = BTreeMap::new();
    for emote in tag.split('/') {
        let (id, raw_ranges) = emote.split_once(':')?;
        let mut ranges = Vec::new();
        for range in raw_ranges.split(',') {
            let (start, end) = range.split_once('-')?;
            ranges.push((start.parse().ok()?, end.parse().ok()?));
        }
        out.insert(id.to_owned(), ranges);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::{parse_badges, parse_emotes, parse_line, unescape_tag_value};

    #[test]
    fn plain_ping_parses() {
        let message = parse_line("PING :tmi.twitch.tv").unwrap();
        assert_eq!(message.command, "PING");
        assert_eq!(message.trailing(), Some("tmi.twitch.tv"));
        assert!(message.tags.is_empty());
    }

    #[test]
    fn tagged_privmsg_parses_every_part() {
        let line = "@badges=subscriber/12;display-name=Viewer;emotes=25:0-4 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #somechan :Kappa hello";
        let message = parse_line(line).unwrap();
        assert_eq!(message.command, "PRIVMSG");
        assert_eq!(message.prefix_nick(), Some("viewer"));
        assert_eq!(message.params[0], "#somechan");
        assert_eq!(message.trailing(), Some("Kappa hello"));
        assert_eq!(message.tag("display-name"), Some("Viewer"));
        assert_eq!(message.tag("badges"), Some("subscriber/12"));
    }

    #[test]
    fn tag_values_unescape() {
        assert_eq!(unescape_tag_value(r"semi\:space\sback\\slash"), "semi;space back\\slash");
        assert_eq!(unescape_tag_value(r"line\r\nbreak"), "line\r\nbreak");
        assert_eq!(unescape_tag_value(r"dangling\"), "dangling");
    }

    #[test]
    fn badges_split_into_name_and_version() {
        let badges = parse_badges("subscriber/12,vip/1");
        assert_eq!(badges.get("subscriber").map(String::as_str), Some("12"));
        assert_eq!(badges.get("vip").map(String::as_str), Some("1"));
        assert!(parse_badges("").is_empty());
    }

    #[test]
    fn emote_ranges_decode_per_id() {
        let emotes = parse_emotes("25:0-4,12-16/1902:6-10").unwrap();
        assert_eq!(emotes.get("25").unwrap(), &vec![(0, 4), (12, 16)]);
        assert_eq!(emotes.get("1902").unwrap(), &vec![(6, 10)]);
        assert_eq!(parse_emotes(""), None);
        assert_eq!(parse_emotes("broken"), None);
    }

    #[test]
    fn multiline_frames_parse_per_line() {
        let frame = "PING :a\r\nPING :b\r\n";
        let commands: Vec<_> = frame
            .lines()
            .filter_map(parse_line)
            .map(|message| message.command)
            .collect();
        assert_eq!(commands, vec!["PING", "PING"]);
    }
}
