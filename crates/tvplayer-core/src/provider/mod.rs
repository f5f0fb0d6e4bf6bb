//! Media providers for the OVP and OTT/Phoenix backends
//!
//! A provider turns backend identifiers (entry id, asset id, filters) into a
//! [`MediaEntry`]. Both backends speak JSON multirequests over an
//! [`ApiTransport`], so tests can swap the network for canned responses.

mod ovp;
mod phoenix;

pub use ovp::OvpMediaProvider;
pub use phoenix::PhoenixMediaProvider;

use crate::adapter::CLIENT_TAG;
use crate::error::{Error, Result};
use crate::types::MediaEntry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// JSON request/response exchange with a backend
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value>;
}

/// Transport over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (timeouts, proxies, ...)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    #[instrument(skip(self, body), fields(url = %url))]
    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url.clone())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        debug!("Backend response received");
        Ok(value)
    }
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn ApiTransport>;

/// Fetches a media entry from a backend
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn load(&self) -> Result<MediaEntry>;
}

/// Common multirequest envelope fields
pub(crate) fn multirequest_envelope(api_version: &str, ks: Option<&str>, partner_id: Option<i64>) -> serde_json::Map<String, Value> {
    let mut body = serde_json::Map::new();
    body.insert("apiVersion".into(), Value::from(api_version));
    body.insert("format".into(), Value::from(1));
    body.insert("clientTag".into(), Value::from(CLIENT_TAG));
    if let Some(ks) = ks {
        body.insert("ks".into(), Value::from(ks));
    }
    if let Some(partner_id) = partner_id {
        body.insert("partnerId".into(), Value::from(partner_id));
    }
    body
}

/// Map a `KalturaAPIException`-shaped element to an error
pub(crate) fn api_exception(value: &Value) -> Option<Error> {
    let is_exception = value.get("objectType").and_then(Value::as_str) == Some("KalturaAPIException");
    let error = if is_exception { Some(value) } else { value.get("error") };

    error.filter(|e| e.get("code").is_some() || e.get("message").is_some()).map(|e| {
        let code = match e.get("code") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let message = e.get("message").and_then(Value::as_str).unwrap_or_default();
        Error::api(code, message)
    })
}

/// Read a field that may be a string or a number, as a string
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ensure a base URL ends with `/` so joins append instead of replacing
pub(crate) fn base_url(server_url: &str) -> Result<Url> {
    let normalized = if server_url.ends_with('/') {
        server_url.to_string()
    } else {
        format!("{}/", server_url)
    };
    Ok(Url::parse(&normalized)?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_exception_shapes() {
        let direct = json!({"objectType": "KalturaAPIException", "code": "ENTRY_ID_NOT_FOUND", "message": "not found"});
        let nested = json!({"error": {"code": 500016, "message": "KS expired"}});
        let ok = json!({"objectType": "KalturaMediaEntry", "id": "1_abc"});

        match api_exception(&direct) {
            Some(Error::Api { code, .. }) => assert_eq!(code, "ENTRY_ID_NOT_FOUND"),
            other => panic!("unexpected: {:?}", other),
        }
        match api_exception(&nested) {
            Some(Error::Api { code, message }) => {
                assert_eq!(code, "500016");
                assert_eq!(message, "KS expired");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(api_exception(&ok).is_none());
    }

    #[test]
    fn test_base_url_normalized() {
        let url = base_url("https://cdnapisec.kaltura.com").unwrap();
        assert_eq!(url.join("api_v3/").unwrap().as_str(), "https://cdnapisec.kaltura.com/api_v3/");
    }
}
