//! Play-manifest request adapter
//!
//! Decorates play-manifest URLs with the client tag, the play session id and
//! the base64-encoded referrer before the engine requests them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

/// Client tag sent with backend and play-manifest requests
pub const CLIENT_TAG: &str = concat!("tvplayer-rust-", env!("CARGO_PKG_VERSION"));

/// Rewrites content request URLs before they are fetched
pub trait RequestAdapter: std::fmt::Debug {
    fn adapt(&self, url: &str, session_id: &str) -> String;
}

/// Adapter installed on every engine created by a player
#[derive(Debug, Clone)]
pub struct PlayManifestAdapter {
    referrer: String,
}

impl PlayManifestAdapter {
    pub fn new(referrer: impl Into<String>) -> Self {
        Self {
            referrer: referrer.into(),
        }
    }
}

impl RequestAdapter for PlayManifestAdapter {
    fn adapt(&self, url: &str, session_id: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };
        if !parsed.path().contains("/playManifest/") {
            return url.to_string();
        }

        {
            let mut query = parsed.query_pairs_mut();
            query.append_pair("clientTag", CLIENT_TAG);
            query.append_pair("playSessionId", session_id);
            if !self.referrer.is_empty() {
                query.append_pair("referrer", &STANDARD.encode(self.referrer.as_bytes()));
            }
        }
        parsed.to_string()
    }
}
