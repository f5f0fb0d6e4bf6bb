//! UI configuration service
//!
//! Fetches player UI configurations by id and caches them for the lifetime of
//! the process.

use crate::adapter::CLIENT_TAG;
use crate::error::{Error, Result};
use crate::provider::{base_url, HttpTransport, SharedTransport};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Server used when the options carry no UI configuration server
pub const DEFAULT_UI_CONF_SERVER_URL: &str = "https://cdnapisec.kaltura.com/";

static CACHE: Lazy<Mutex<HashMap<i64, Value>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn cache() -> std::sync::MutexGuard<'static, HashMap<i64, Value>> {
    CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client for `uiConf.get`
#[derive(Clone)]
pub struct UiConfService {
    transport: SharedTransport,
    server_url: String,
}

impl std::fmt::Debug for UiConfService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiConfService")
            .field("server_url", &self.server_url)
            .finish()
    }
}

impl UiConfService {
    pub fn new(transport: SharedTransport, server_url: Option<&str>) -> Self {
        Self {
            transport,
            server_url: server_url
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_UI_CONF_SERVER_URL)
                .to_string(),
        }
    }

    /// Service over HTTP
    pub fn http(server_url: Option<&str>) -> Self {
        Self::new(Arc::new(HttpTransport::new()), server_url)
    }

    /// Fetch a UI configuration, serving repeated ids from the cache
    #[instrument(skip(self, ks))]
    pub async fn load(&self, id: i64, partner_id: Option<i64>, ks: Option<&str>) -> Result<Value> {
        if let Some(cached) = cached(id) {
            debug!(id, "UI configuration served from cache");
            return Ok(cached);
        }

        let url = base_url(&self.server_url)?.join("api_v3/service/uiconf/action/get")?;
        let mut body = json!({
            "id": id,
            "format": 1,
            "clientTag": CLIENT_TAG,
        });
        if let Some(partner_id) = partner_id.filter(|p| *p > 0) {
            body["partnerId"] = json!(partner_id);
        }
        if let Some(ks) = ks.filter(|ks| !ks.is_empty()) {
            body["ks"] = json!(ks);
        }

        let response = self
            .transport
            .post_json(&url, &body)
            .await
            .map_err(|e| Error::UiConfLoad { id, reason: e.to_string() })?;
        let document = parse_ui_conf(id, response)?;

        cache().insert(id, document.clone());
        info!(id, "UI configuration loaded");
        Ok(document)
    }
}

/// Cached document for `id`
pub fn cached(id: i64) -> Option<Value> {
    cache().get(&id).cloned()
}

/// Drop every cached document
pub fn clear_cache() {
    cache().clear();
}

/// Normalize a `uiConf.get` response: `config` may be a JSON string
fn parse_ui_conf(id: i64, mut response: Value) -> Result<Value> {
    if let Some(err) = crate::provider::api_exception(&response) {
        return Err(Error::UiConfLoad { id, reason: err.to_string() });
    }
    let Some(object) = response.as_object_mut() else {
        return Err(Error::UiConfLoad { id, reason: "response is not an object".into() });
    };

    if let Some(Value::String(raw)) = object.get("config") {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| Error::UiConfLoad {
            id,
            reason: format!("config is not valid JSON: {}", e),
        })?;
        object.insert("config".into(), parsed);
    }
    Ok(response)
}

/// The `config.player.plugins` section of a UI configuration document
pub fn plugins_section(document: &Value) -> Option<&Map<String, Value>> {
    document
        .get("config")
        .and_then(|c| c.get("player"))
        .and_then(|p| p.get("plugins"))
        .and_then(Value::as_object)
}
