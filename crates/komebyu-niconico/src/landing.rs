use std::sync::LazyLock;

use komebyu_core::IngestError;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<script\b[^>]*>").expect("script tag pattern"));
static DATA_PROPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-props="([^"]*)""#).expect("data-props pattern"));
static WS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"wss?://[^\s"'<>\\]+"#).expect("ws url pattern"));

/// JSON paths probed for the signaling endpoint, in order. Page revisions
/// have moved the watch server block several times.
const WATCH_SERVER_PATHS: &[&str] = &[
    "/site/relive/watchServer/url",
    "/site/program/watchServer/url",
    "/program/broadcaster/socialGroup/watchServer/url",
    "/program/broadcast/watchServer/url",
    "/watchServer/url",
];

pub async fn fetch_watch_page(
    client: &Client,
    watch_page_base: &str,
    broadcast_id: &str,
) -> Result<String, IngestError> {
    let url = Url::parse(watch_page_base)
        .and_then(|base| base.join(broadcast_id))
        .map_err(|error| IngestError::Network {
            url: watch_page_base.to_owned(),
            detail: error.to_string(),
        })?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|error| crate::http::network_error(&url, &error))?;
    if !response.status().is_success() {
        return Err(IngestError::Status {
            endpoint: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|error| crate::http::network_error(&url, &error))
}

/// Signaling endpoint out of the landing HTML: embedded-data props first,
/// then a raw `ws(s)://` scan of the page.
pub fn discover_signaling_url(html: &str) -> Result<String, IngestError> {
    if let Some(props) = extract_embedded_props(html) {
        let decoded = decode_html_entities(&props);
        match serde_json::from_str::<Value>(&decoded) {
            Ok(value) => {
                if let Some(url) = watch_server_url(&value) {
                    return Ok(url);
                }
                debug!("embedded-data present but no watch server path matched");
            }
            Err(error) => debug!(%error, "embedded-data props did not parse as JSON"),
        }
    }

    WS_URL
        .find(html)
        .map(|found| found.as_str().to_owned())
        .ok_or(IngestError::MissingSignalingEndpoint)
}

/// The `data-props` attribute of `<script id="embedded-data" …>`,
/// HTML-escaped JSON. Attribute order within the tag is not fixed.
pub fn extract_embedded_props(html: &str) -> Option<String> {
    for tag in SCRIPT_TAG.find_iter(html) {
        let tag_text = tag.as_str();
        if !tag_text.contains(r#"id="embedded-data""#) {
            continue;
        }
        if let Some(captures) = DATA_PROPS.captures(tag_text) {
            return Some(captures[1].to_owned());
        }
    }
    None
}

pub fn watch_server_url(props: &Value) -> Option<String> {
    for path in WATCH_SERVER_PATHS {
        if let Some(url) = props.pointer(path).and_then(Value::as_str) {
            if !url.is_empty() {
                return Some(url.to_owned());
            }
        }
    }
    None
}

/// Named entities the page actually uses, plus numeric references.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let end = rest
            .char_indices()
            .take(12)
            .find(|(_, ch)| *ch == ';')
            .map(|(index, _)| index);
        let Some(end) = end else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => decode_numeric_entity(entity),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric_entity(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::{
        decode_html_entities, discover_signaling_url, extract_embedded_props, watch_server_url,
    };

    const LANDING: &str = r#"<html><body>
<script id="embedded-data" data-props="{&quot;site&quot;:{&quot;relive&quot;:{&quot;watchServer&quot;:{&quot;url&quot;:&quot;wss://a.example/ws&quot;}}}}"></script>
</body></html>"#;

    #[test]
    fn embedded_data_props_yield_the_signaling_url() {
        assert_eq!(
            discover_signaling_url(LANDING).unwrap(),
            "wss://a.example/ws"
        );
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let html = r#"<script data-props="{&quot;watchServer&quot;:{&quot;url&quot;:&quot;wss://b.example/ws&quot;}}" id="embedded-data"></script>"#;
        assert_eq!(
            discover_signaling_url(html).unwrap(),
            "wss://b.example/ws"
        );
    }

    #[test]
    fn probes_every_known_watch_server_path() {
        for json in [
            r#"{"site":{"relive":{"watchServer":{"url":"wss://x/1"}}}}"#,
            r#"{"site":{"program":{"watchServer":{"url":"wss://x/1"}}}}"#,
            r#"{"program":{"broadcaster":{"socialGroup":{"watchServer":{"url":"wss://x/1"}}}}}"#,
            r#"{"program":{"broadcast":{"watchServer":{"url":"wss://x/1"}}}}"#,
            r#"{"watchServer":{"url":"wss://x/1"}}"#,
        ] {
            let value = serde_json::from_str(json).unwrap();
            assert_eq!(watch_server_url(&value).as_deref(), Some("wss://x/1"), "{json}");
        }
    }

    #[test]
    fn falls_back_to_a_raw_ws_url_scan() {
        let html = r#"<html><script>var server = "wss://fallback.example/ws?x=1";</script></html>"#;
        assert_eq!(
            discover_signaling_url(html).unwrap(),
            "wss://fallback.example/ws?x=1"
        );
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let error = discover_signaling_url("<html></html>").unwrap_err();
        assert_eq!(
            error.class(),
            komebyu_core::ErrorClass::Config
        );
    }

    #[test]
    fn named_and_numeric_entities_decode() {
        assert_eq!(
            decode_html_entities("a&amp;b&lt;c&gt;d&quot;e&apos;f&nbsp;g"),
            "a&b<c>d\"e'f\u{a0}g"
        );
        assert_eq!(decode_html_entities("&#65;&#x42;&#X43;"), "ABC");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode_html_entities("&bogus; &#zz; &"), "&bogus; &#zz; &");
        assert_eq!(decode_html_entities("no entities"), "no entities");
    }

    #[test]
    fn props_extraction_requires_the_embedded_data_id() {
        let html = r#"<script id="other" data-props="x"></script>"#;
        assert_eq!(extract_embedded_props(html), None);
    }
}
