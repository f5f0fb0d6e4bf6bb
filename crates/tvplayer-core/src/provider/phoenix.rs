//! OTT (Phoenix) asset provider

use super::{api_exception, base_url, multirequest_envelope, string_field, MediaProvider, SharedTransport};
use crate::error::{Error, Result};
use crate::options::{AssetReferenceType, AssetType, PlaybackContextType};
use crate::types::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

const API_VERSION: &str = "5.2.6";

/// Loads an OTT asset and its playback context
#[derive(Clone)]
pub struct PhoenixMediaProvider {
    transport: SharedTransport,
    server_url: String,
    partner_id: i64,
    ks: Option<String>,
    asset_id: Option<String>,
    asset_type: AssetType,
    context_type: PlaybackContextType,
    asset_reference_type: Option<AssetReferenceType>,
    protocol: String,
    file_ids: Vec<String>,
    formats: Vec<String>,
    referrer: Option<String>,
}

impl std::fmt::Debug for PhoenixMediaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixMediaProvider")
            .field("server_url", &self.server_url)
            .field("partner_id", &self.partner_id)
            .field("asset_id", &self.asset_id)
            .field("context_type", &self.context_type)
            .finish()
    }
}

impl PhoenixMediaProvider {
    pub fn new(transport: SharedTransport, server_url: impl Into<String>, partner_id: i64, ks: Option<String>) -> Self {
        Self {
            transport,
            server_url: server_url.into(),
            partner_id,
            ks: ks.filter(|ks| !ks.is_empty()),
            asset_id: None,
            asset_type: AssetType::Media,
            context_type: PlaybackContextType::Playback,
            asset_reference_type: None,
            protocol: "https".to_string(),
            file_ids: Vec::new(),
            formats: Vec::new(),
            referrer: None,
        }
    }

    pub fn set_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn set_asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = asset_type;
        self
    }

    pub fn set_context_type(mut self, context_type: PlaybackContextType) -> Self {
        self.context_type = context_type;
        self
    }

    pub fn set_asset_reference_type(mut self, reference_type: AssetReferenceType) -> Self {
        self.asset_reference_type = Some(reference_type);
        self
    }

    pub fn set_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn set_file_ids(mut self, file_ids: Vec<String>) -> Self {
        self.file_ids = file_ids;
        self
    }

    /// File types to keep, most preferred first
    pub fn set_formats(mut self, formats: Vec<String>) -> Self {
        self.formats = formats;
        self
    }

    pub fn set_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Reference type sent to `asset.get`, derived from the asset type when unset
    fn reference_type(&self) -> AssetReferenceType {
        self.asset_reference_type.unwrap_or(match self.asset_type {
            AssetType::Epg => AssetReferenceType::EpgInternal,
            _ => AssetReferenceType::Media,
        })
    }

    pub(crate) fn build_request(&self) -> Result<(Url, Value)> {
        let asset_id = self
            .asset_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidConfig("asset id is required".into()))?;
        let url = base_url(&self.server_url)?.join("service/multirequest")?;

        let mut body = multirequest_envelope(API_VERSION, self.ks.as_deref(), None);
        let mut index = 1;
        let ks = match self.ks {
            Some(ref ks) => ks.clone(),
            None => {
                body.insert(
                    index.to_string(),
                    json!({
                        "service": "ottUser",
                        "action": "anonymousLogin",
                        "partnerId": self.partner_id,
                    }),
                );
                index += 1;
                "{1:result:ks}".to_string()
            }
        };

        body.insert(
            index.to_string(),
            json!({
                "service": "asset",
                "action": "get",
                "ks": ks,
                "id": asset_id,
                "assetReferenceType": self.reference_type().as_str(),
            }),
        );

        let mut context = json!({
            "objectType": "KalturaPlaybackContextOptions",
            "context": self.context_type.as_str(),
            "mediaProtocol": self.protocol,
        });
        if !self.file_ids.is_empty() {
            context["assetFileIds"] = json!(self.file_ids.join(","));
        }
        if let Some(ref referrer) = self.referrer {
            context["referrer"] = json!(referrer);
        }
        body.insert(
            (index + 1).to_string(),
            json!({
                "service": "asset",
                "action": "getPlaybackContext",
                "ks": ks,
                "assetId": asset_id,
                "assetType": self.asset_type.as_str(),
                "contextDataParams": context,
            }),
        );

        Ok((url, Value::Object(body)))
    }

    pub(crate) fn parse_response(&self, response: &Value) -> Result<MediaEntry> {
        if let Some(err) = api_exception(response) {
            return Err(err);
        }
        let results = response
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_response("multirequest result is not an array"))?;
        for element in results {
            if let Some(err) = api_exception(element) {
                return Err(err);
            }
        }

        let offset = if self.ks.is_some() { 0 } else { 1 };
        let asset = results
            .get(offset)
            .ok_or_else(|| Error::EntryNotFound(self.asset_id.clone().unwrap_or_default()))?;
        let context = results
            .get(offset + 1)
            .ok_or_else(|| Error::invalid_response("missing playback context"))?;
        check_blocked(context)?;

        let id = string_field(asset, "id").ok_or_else(|| Error::invalid_response("asset without id"))?;
        let mut entry = MediaEntry::new(id);
        entry.name = asset.get("name").and_then(Value::as_str).map(str::to_string);
        entry.media_type = if asset.get("objectType").and_then(Value::as_str) == Some("KalturaLiveAsset") {
            if self.context_type == PlaybackContextType::StartOver {
                MediaEntryType::DvrLive
            } else {
                MediaEntryType::Live
            }
        } else {
            MediaEntryType::Vod
        };
        entry.metadata = parse_metadata(asset);

        let sources = self.select_sources(context);
        entry.duration_ms = sources
            .iter()
            .find_map(|s| s.get("duration").and_then(Value::as_u64))
            .map(|secs| secs * 1000)
            .unwrap_or(0);
        entry.sources = sources
            .into_iter()
            .filter_map(|s| {
                let url = s.get("url").and_then(Value::as_str)?;
                let format = s.get("format").and_then(Value::as_str).unwrap_or("url");
                let media_format = MediaFormat::from_delivery_format(format, Some(url));
                if media_format == MediaFormat::Unknown {
                    debug!(format, "Skipping unsupported delivery format");
                    return None;
                }
                Some(MediaSource::new(string_field(s, "id").unwrap_or_default(), url, media_format))
            })
            .collect();

        info!(asset_id = %entry.id, sources = entry.sources.len(), "Phoenix asset loaded");
        Ok(entry)
    }

    /// Sources of the requested file types, in preference order
    fn select_sources<'a>(&self, context: &'a Value) -> Vec<&'a Value> {
        let all: Vec<&Value> = context
            .get("sources")
            .and_then(Value::as_array)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        if self.formats.is_empty() {
            return all;
        }
        self.formats
            .iter()
            .flat_map(|format| {
                all.iter()
                    .copied()
                    .filter(move |s| s.get("type").and_then(Value::as_str) == Some(format.as_str()))
            })
            .collect()
    }
}

fn check_blocked(context: &Value) -> Result<()> {
    let blocked = context
        .get("actions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|a| a.get("type").and_then(Value::as_str) == Some("BLOCK"));
    if !blocked {
        return Ok(());
    }
    let message = context.get("messages").and_then(Value::as_array).and_then(|m| m.first());
    Err(Error::api(
        message.and_then(|m| string_field(m, "code")).unwrap_or_else(|| "BLOCK".into()),
        message
            .and_then(|m| m.get("message").and_then(Value::as_str))
            .unwrap_or("playback blocked"),
    ))
}

/// Flatten `metas` values and `tags` value lists into string metadata
fn parse_metadata(asset: &Value) -> std::collections::BTreeMap<String, String> {
    let mut metadata = std::collections::BTreeMap::new();
    for key in ["name", "description"] {
        if let Some(value) = asset.get(key).and_then(Value::as_str).filter(|v| !v.is_empty()) {
            metadata.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(metas) = asset.get("metas").and_then(Value::as_object) {
        for (key, meta) in metas {
            let value = match meta.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => continue,
                Some(other) => other.to_string(),
            };
            metadata.insert(key.clone(), value);
        }
    }

    if let Some(tags) = asset.get("tags").and_then(Value::as_object) {
        for (key, tag) in tags {
            let values: Vec<&str> = tag
                .get("objects")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|o| o.get("value").and_then(Value::as_str))
                .collect();
            if !values.is_empty() {
                metadata.insert(key.clone(), values.join(","));
            }
        }
    }
    metadata
}

#[async_trait]
impl MediaProvider for PhoenixMediaProvider {
    #[instrument(skip(self), fields(asset_id = ?self.asset_id))]
    async fn load(&self) -> Result<MediaEntry> {
        let (url, body) = self.build_request()?;
        let response = self.transport.post_json(&url, &body).await?;
        self.parse_response(&response)
    }
}
