//! OVP entry provider
//!
//! One multirequest fetches the entry (following entry redirects) and its
//! playback context; sources become play-manifest URLs.

use super::{api_exception, base_url, multirequest_envelope, string_field, MediaProvider, SharedTransport};
use crate::error::{Error, Result};
use crate::types::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

const API_VERSION: &str = "3.3.0";
const API_PREFIX: &str = "api_v3/";
const ENTRY_FIELDS: &str =
    "id,name,description,tags,referenceId,duration,msDuration,type,mediaType,dvrStatus,flavorParamsIds";

/// Entry type of live streams
const LIVE_STREAM_TYPE: &str = "7";
/// Media type of audio clips
const AUDIO_MEDIA_TYPE: &str = "5";

/// Loads an OVP entry by id
#[derive(Clone)]
pub struct OvpMediaProvider {
    transport: SharedTransport,
    server_url: String,
    partner_id: i64,
    ks: Option<String>,
    entry_id: Option<String>,
    referrer: Option<String>,
    use_api_captions: bool,
}

impl std::fmt::Debug for OvpMediaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvpMediaProvider")
            .field("server_url", &self.server_url)
            .field("partner_id", &self.partner_id)
            .field("entry_id", &self.entry_id)
            .finish()
    }
}

impl OvpMediaProvider {
    pub fn new(transport: SharedTransport, server_url: impl Into<String>, partner_id: i64, ks: Option<String>) -> Self {
        Self {
            transport,
            server_url: server_url.into(),
            partner_id,
            ks: ks.filter(|ks| !ks.is_empty()),
            entry_id: None,
            referrer: None,
            use_api_captions: false,
        }
    }

    pub fn set_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn set_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn set_use_api_captions(mut self, use_api_captions: bool) -> Self {
        self.use_api_captions = use_api_captions;
        self
    }

    fn entry_id(&self) -> Result<&str> {
        self.entry_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidConfig("entry id is required".into()))
    }

    /// Build the multirequest URL and body
    pub(crate) fn build_request(&self) -> Result<(Url, Value)> {
        let entry_id = self.entry_id()?;
        let url = base_url(&self.server_url)?.join(API_PREFIX)?.join("service/multirequest")?;

        let mut body = multirequest_envelope(API_VERSION, self.ks.as_deref(), Some(self.partner_id));
        if let Some(ref referrer) = self.referrer {
            body.insert("referrer".into(), json!(referrer));
        }

        let mut index = 1;
        let ks = match self.ks {
            Some(ref ks) => ks.clone(),
            None => {
                body.insert(
                    index.to_string(),
                    json!({
                        "service": "session",
                        "action": "startWidgetSession",
                        "widgetId": format!("_{}", self.partner_id),
                    }),
                );
                index += 1;
                "{1:result:ks}".to_string()
            }
        };

        let list_index = index;
        body.insert(
            list_index.to_string(),
            json!({
                "service": "baseEntry",
                "action": "list",
                "ks": ks,
                "filter": { "redirectFromEntryId": entry_id },
                "responseProfile": { "type": 1, "fields": ENTRY_FIELDS },
            }),
        );
        body.insert(
            (list_index + 1).to_string(),
            json!({
                "service": "baseEntry",
                "action": "getPlaybackContext",
                "ks": ks,
                "entryId": format!("{{{}:result:objects:0:id}}", list_index),
                "contextDataParams": { "objectType": "KalturaContextDataParams", "flavorTags": "all" },
            }),
        );

        Ok((url, Value::Object(body)))
    }

    /// Turn the multirequest response into an entry
    pub(crate) fn parse_response(&self, response: &Value) -> Result<MediaEntry> {
        if let Some(err) = api_exception(response) {
            return Err(err);
        }
        let results = response
            .as_array()
            .or_else(|| response.get("result").and_then(Value::as_array))
            .ok_or_else(|| Error::invalid_response("multirequest result is not an array"))?;

        let (offset, ks) = match self.ks {
            Some(ref ks) => (0, ks.clone()),
            None => {
                let session = results.first().ok_or_else(|| Error::invalid_response("missing session"))?;
                if let Some(err) = api_exception(session) {
                    return Err(err);
                }
                let ks = session
                    .get("ks")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_response("widget session without ks"))?;
                (1, ks.to_string())
            }
        };

        let list = results
            .get(offset)
            .ok_or_else(|| Error::invalid_response("missing entry list"))?;
        if let Some(err) = api_exception(list) {
            return Err(err);
        }
        let raw_entry = list
            .get("objects")
            .and_then(Value::as_array)
            .and_then(|objects| objects.first())
            .ok_or_else(|| Error::EntryNotFound(self.entry_id.clone().unwrap_or_default()))?;

        let context = results
            .get(offset + 1)
            .ok_or_else(|| Error::invalid_response("missing playback context"))?;
        if let Some(err) = api_exception(context) {
            return Err(err);
        }
        check_blocked(context)?;

        let mut entry = parse_entry(raw_entry)?;
        entry.sources = self.build_sources(&entry, raw_entry, context, &ks)?;
        if self.use_api_captions {
            entry.external_subtitles = parse_captions(context);
        }

        info!(entry_id = %entry.id, sources = entry.sources.len(), "OVP entry loaded");
        Ok(entry)
    }

    fn build_sources(&self, entry: &MediaEntry, raw_entry: &Value, context: &Value, ks: &str) -> Result<Vec<MediaSource>> {
        let server = base_url(&self.server_url)?;
        let scheme = server.scheme().to_string();
        let is_audio = string_field(raw_entry, "mediaType").as_deref() == Some(AUDIO_MEDIA_TYPE);

        let mut sources = Vec::new();
        for source in context.get("sources").and_then(Value::as_array).into_iter().flatten() {
            let format = source.get("format").and_then(Value::as_str).unwrap_or_default();
            let mut media_format = MediaFormat::from_delivery_format(format, None);
            if media_format == MediaFormat::Unknown {
                debug!(format, "Skipping unsupported delivery format");
                continue;
            }
            if media_format == MediaFormat::Mp4 && is_audio {
                media_format = MediaFormat::Mp3;
            }

            let protocols = source.get("protocols").and_then(Value::as_str).unwrap_or_default();
            let protocol = if protocols.is_empty() || protocols.split(',').any(|p| p == scheme) {
                scheme.clone()
            } else {
                protocols.split(',').next().unwrap_or("https").to_string()
            };

            let mut path = format!(
                "p/{pid}/sp/{pid}00/playManifest/entryId/{id}/protocol/{protocol}/format/{format}",
                pid = self.partner_id,
                id = entry.id,
            );
            if let Some(flavors) = source.get("flavorIds").and_then(Value::as_str).filter(|f| !f.is_empty()) {
                path.push_str(&format!("/flavorIds/{}", flavors));
            }
            if !ks.is_empty() {
                path.push_str(&format!("/ks/{}", ks));
            }
            path.push_str(&format!("/a.{}", media_format.extension()));

            let delivery_profile = string_field(source, "deliveryProfileId").unwrap_or_default();
            sources.push(MediaSource::new(
                format!("{}_{},{}", entry.id, delivery_profile, format),
                server.join(&path)?.to_string(),
                media_format,
            ));
        }
        Ok(sources)
    }
}

fn parse_entry(raw: &Value) -> Result<MediaEntry> {
    let id = string_field(raw, "id").ok_or_else(|| Error::invalid_response("entry without id"))?;
    let mut entry = MediaEntry::new(id);
    entry.name = raw.get("name").and_then(Value::as_str).map(str::to_string);

    entry.duration_ms = raw
        .get("msDuration")
        .and_then(Value::as_u64)
        .or_else(|| raw.get("duration").and_then(Value::as_u64).map(|s| s * 1000))
        .unwrap_or(0);

    entry.media_type = if string_field(raw, "type").as_deref() == Some(LIVE_STREAM_TYPE) {
        if string_field(raw, "dvrStatus").as_deref() == Some("1") {
            MediaEntryType::DvrLive
        } else {
            MediaEntryType::Live
        }
    } else {
        MediaEntryType::Vod
    };

    for key in ["name", "description", "tags", "referenceId"] {
        if let Some(value) = raw.get(key).and_then(Value::as_str).filter(|v| !v.is_empty()) {
            entry.metadata.insert(key.to_string(), value.to_string());
        }
    }
    Ok(entry)
}

fn check_blocked(context: &Value) -> Result<()> {
    let blocked = context
        .get("actions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|a| a.get("objectType").and_then(Value::as_str) == Some("KalturaAccessControlBlockAction"));
    if !blocked {
        return Ok(());
    }

    let message = context
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|m| m.first());
    Err(Error::api(
        message.and_then(|m| string_field(m, "code")).unwrap_or_else(|| "BLOCKED".into()),
        message
            .and_then(|m| m.get("message").and_then(Value::as_str))
            .unwrap_or("playback blocked by access control"),
    ))
}

fn parse_captions(context: &Value) -> Vec<ExternalSubtitle> {
    context
        .get("playbackCaptions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| {
            // WebVTT is preferred when the backend converted the caption
            let (url, format) = match c.get("webVttUrl").and_then(Value::as_str) {
                Some(url) if !url.is_empty() => (url, "vtt".to_string()),
                _ => (
                    c.get("url").and_then(Value::as_str)?,
                    c.get("format").and_then(Value::as_str).unwrap_or("srt").to_lowercase(),
                ),
            };
            Some(ExternalSubtitle {
                url: url.to_string(),
                label: c.get("label").and_then(Value::as_str).map(str::to_string),
                language: c.get("languageCode").and_then(Value::as_str).map(str::to_string),
                format,
                is_default: c.get("isDefault").and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect()
}

#[async_trait]
impl MediaProvider for OvpMediaProvider {
    #[instrument(skip(self), fields(entry_id = ?self.entry_id))]
    async fn load(&self) -> Result<MediaEntry> {
        let (url, body) = self.build_request()?;
        let response = self.transport.post_json(&url, &body).await?;
        self.parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::CannedTransport;

    fn context_response() -> Value {
        json!({
            "objectType": "KalturaPlaybackContext",
            "sources": [
                { "deliveryProfileId": 911, "format": "mpegdash", "protocols": "http,https", "flavorIds": "0_a,0_b" },
                { "deliveryProfileId": 1033, "format": "applehttp", "protocols": "http,https", "flavorIds": "0_a,0_b" },
                { "deliveryProfileId": 5, "format": "hdnetworkmanifest", "protocols": "http" }
            ],
            "playbackCaptions": [
                { "label": "English", "languageCode": "en", "format": "SRT", "url": "https://cdn/c.srt", "webVttUrl": "https://cdn/c.vtt", "isDefault": true }
            ],
            "actions": [],
            "messages": []
        })
    }

    fn list_response() -> Value {
        json!({
            "objectType": "KalturaBaseEntryListResponse",
            "totalCount": 1,
            "objects": [{
                "objectType": "KalturaMediaEntry",
                "id": "1_abc",
                "name": "Sintel",
                "description": "Open movie",
                "msDuration": 888000,
                "type": 1,
                "mediaType": 1
            }]
        })
    }

    #[tokio::test]
    async fn test_anonymous_load() {
        let transport = CannedTransport::new(vec![Ok(json!([
            { "objectType": "KalturaStartWidgetSessionResponse", "ks": "widgetks" },
            list_response(),
            context_response()
        ]))]);
        let provider = OvpMediaProvider::new(transport.clone(), "https://cdnapisec.kaltura.com", 100, None)
            .set_entry_id("1_abc")
            .set_use_api_captions(true);

        let entry = provider.load().await.unwrap();
        assert_eq!(entry.id, "1_abc");
        assert_eq!(entry.name.as_deref(), Some("Sintel"));
        assert_eq!(entry.duration_ms, 888_000);
        assert_eq!(entry.media_type, MediaEntryType::Vod);
        assert_eq!(entry.metadata.get("description").map(String::as_str), Some("Open movie"));
        assert_eq!(entry.sources.len(), 2);
        assert_eq!(entry.sources[0].media_format, MediaFormat::Dash);
        assert_eq!(
            entry.sources[1].url,
            "https://cdnapisec.kaltura.com/p/100/sp/10000/playManifest/entryId/1_abc/protocol/https/format/applehttp/flavorIds/0_a,0_b/ks/widgetks/a.m3u8"
        );
        assert_eq!(entry.sources[1].id, "1_abc_1033,applehttp");
        assert_eq!(entry.external_subtitles[0].format, "vtt");

        let requests = transport.requests();
        assert_eq!(requests[0].0, "https://cdnapisec.kaltura.com/api_v3/service/multirequest");
        let body = &requests[0].1;
        assert_eq!(body["1"]["action"], "startWidgetSession");
        assert_eq!(body["1"]["widgetId"], "_100");
        assert_eq!(body["2"]["filter"]["redirectFromEntryId"], "1_abc");
        assert_eq!(body["3"]["entryId"], "{2:result:objects:0:id}");
    }

    #[tokio::test]
    async fn test_load_with_ks() {
        let transport = CannedTransport::new(vec![Ok(json!([list_response(), context_response()]))]);
        let provider = OvpMediaProvider::new(transport.clone(), "https://cdnapisec.kaltura.com/", 100, Some("userks".into()))
            .set_entry_id("1_abc");

        let entry = provider.load().await.unwrap();
        assert!(entry.sources[0].url.contains("/ks/userks/"));
        assert!(entry.external_subtitles.is_empty());

        let body = &transport.requests()[0].1;
        assert_eq!(body["ks"], "userks");
        assert_eq!(body["1"]["action"], "list");
        assert_eq!(body["2"]["entryId"], "{1:result:objects:0:id}");
    }

    #[tokio::test]
    async fn test_live_entry_with_dvr() {
        let transport = CannedTransport::new(vec![Ok(json!([
            { "objects": [{ "id": "1_live", "type": "7", "dvrStatus": 1 }] },
            { "sources": [] }
        ]))]);
        let provider = OvpMediaProvider::new(transport, "https://cdnapisec.kaltura.com/", 100, Some("ks".into()))
            .set_entry_id("1_live");

        let entry = provider.load().await.unwrap();
        assert_eq!(entry.media_type, MediaEntryType::DvrLive);
        assert!(entry.sources.is_empty());
    }

    #[tokio::test]
    async fn test_entry_not_found() {
        let transport = CannedTransport::new(vec![Ok(json!([
            { "objects": [], "totalCount": 0 },
            { "objectType": "KalturaAPIException", "code": "ENTRY_ID_NOT_FOUND", "message": "Entry id \"1_x\" not found" }
        ]))]);
        let provider = OvpMediaProvider::new(transport, "https://cdnapisec.kaltura.com/", 100, Some("ks".into()))
            .set_entry_id("1_x");

        match provider.load().await {
            Err(Error::EntryNotFound(id)) => assert_eq!(id, "1_x"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocked_playback() {
        let transport = CannedTransport::new(vec![Ok(json!([
            list_response(),
            {
                "sources": [],
                "actions": [{ "objectType": "KalturaAccessControlBlockAction" }],
                "messages": [{ "code": "COUNTRY_RESTRICTED", "message": "Not available in your country" }]
            }
        ]))]);
        let provider = OvpMediaProvider::new(transport, "https://cdnapisec.kaltura.com/", 100, Some("ks".into()))
            .set_entry_id("1_abc");

        match provider.load().await {
            Err(Error::Api { code, .. }) => assert_eq!(code, "COUNTRY_RESTRICTED"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_entry_id() {
        let transport = CannedTransport::new(vec![]);
        let provider = OvpMediaProvider::new(transport, "https://cdnapisec.kaltura.com/", 100, None);
        assert!(matches!(provider.build_request(), Err(Error::InvalidConfig(_))));
    }
}
