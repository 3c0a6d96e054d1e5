mod broadcast;
mod http;
mod landing;
mod segment;
mod signaling;
mod view;

pub use broadcast::{run_broadcast, BroadcastConfig, NiconicoOptions, DEFAULT_WATCH_PAGE_BASE};
pub use http::USER_AGENT;
pub use landing::{
    decode_html_entities, discover_signaling_url, extract_embedded_props, watch_server_url,
};
pub use segment::{run_segment, SegmentLaunch, SegmentQuery};
pub use signaling::{classify_frame, run_signaling, start_watching_payload, SignalAction};
pub use view::run_view_walker;
