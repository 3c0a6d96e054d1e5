use komebyu_core::IngestError;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder};
use url::Url;

pub const USER_AGENT: &str = "komebyu/1.0 (+https://github.com/)";

const LIVE_ORIGIN: &str = "https://live.nicovideo.jp";
const LIVE_REFERER: &str = "https://live.nicovideo.jp/";

pub fn build_client() -> Result<Client, IngestError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|error| IngestError::Network {
            url: "client".to_owned(),
            detail: error.to_string(),
        })
}

/// GET for the binary view/segment endpoints with the headers the server
/// expects from a live player.
pub fn ndgr_get(client: &Client, url: Url) -> RequestBuilder {
    client
        .get(url)
        .header(ACCEPT, "application/octet-stream")
        .header(ORIGIN, LIVE_ORIGIN)
        .header(REFERER, LIVE_REFERER)
}

pub fn network_error(url: &Url, error: &reqwest::Error) -> IngestError {
    IngestError::Network {
        url: url.to_string(),
        detail: error.to_string(),
    }
}
