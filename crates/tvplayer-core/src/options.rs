//! Player construction and media-load options

use crate::config::PluginConfigs;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable options a player is created from.
///
/// Build with [`InitOptions::builder`] or deserialize from a JSON document
/// (camelCase keys). A player never mutates its options; create a new value
/// to change settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitOptions {
    /// Backend API server
    pub server_url: Option<String>,
    /// Partner (account) id
    pub partner_id: Option<i64>,
    /// UI configuration id
    pub ui_conf_id: Option<i64>,
    /// Partner owning the UI configuration, when different from `partner_id`
    pub ui_conf_partner_id: Option<i64>,
    /// Server hosting the UI configuration service
    pub ui_conf_server_url: Option<String>,
    /// Session token
    pub ks: Option<String>,
    /// Referrer reported to analytics and play-manifest requests
    pub referrer: Option<String>,
    /// Application identifier used to build the default `app://` referrer
    pub application_id: Option<String>,
    pub autoplay: Option<bool>,
    pub preload: Option<bool>,
    pub preferred_media_format: Option<MediaFormat>,
    /// Application-supplied plugin configurations
    pub plugin_configs: PluginConfigs,
    /// Already-fetched UI configuration document
    pub ui_conf: Option<Value>,

    // Player settings overrides
    pub audio_language: Option<TrackConfig>,
    pub text_language: Option<TrackConfig>,
    pub allow_cross_protocol_redirect: Option<bool>,
    pub allow_clear_lead: Option<bool>,
    pub secure_surface: Option<bool>,
    pub ad_auto_play_on_resume: Option<bool>,
    pub hide_video_views: Option<bool>,
    pub aspect_ratio_resize_mode: Option<AspectRatioResizeMode>,
    pub abr_settings: Option<AbrSettings>,
    pub load_control_buffers: Option<LoadControlBuffers>,
    pub vr_player_enabled: Option<bool>,
}

impl InitOptions {
    pub fn builder() -> InitOptionsBuilder {
        InitOptionsBuilder::default()
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay.unwrap_or(false)
    }

    /// Autoplay implies preload
    pub fn is_preload(&self) -> bool {
        self.preload.unwrap_or(false) || self.is_autoplay()
    }

    /// Copy with the UI configuration document attached
    pub(crate) fn with_ui_conf(&self, ui_conf: Value) -> Self {
        let mut options = self.clone();
        options.ui_conf = Some(ui_conf);
        options
    }
}

/// Builder for [`InitOptions`]
#[derive(Debug, Default)]
pub struct InitOptionsBuilder {
    options: InitOptions,
}

impl InitOptionsBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.options.server_url = Some(url.into());
        self
    }

    pub fn partner_id(mut self, partner_id: i64) -> Self {
        self.options.partner_id = Some(partner_id);
        self
    }

    pub fn ui_conf_id(mut self, id: i64) -> Self {
        self.options.ui_conf_id = Some(id);
        self
    }

    pub fn ui_conf_partner_id(mut self, partner_id: i64) -> Self {
        self.options.ui_conf_partner_id = Some(partner_id);
        self
    }

    pub fn ui_conf_server_url(mut self, url: impl Into<String>) -> Self {
        self.options.ui_conf_server_url = Some(url.into());
        self
    }

    pub fn ks(mut self, ks: impl Into<String>) -> Self {
        self.options.ks = Some(ks.into());
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.options.referrer = Some(referrer.into());
        self
    }

    pub fn application_id(mut self, id: impl Into<String>) -> Self {
        self.options.application_id = Some(id.into());
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.options.autoplay = Some(autoplay);
        self
    }

    pub fn preload(mut self, preload: bool) -> Self {
        self.options.preload = Some(preload);
        self
    }

    pub fn preferred_media_format(mut self, format: MediaFormat) -> Self {
        self.options.preferred_media_format = Some(format);
        self
    }

    pub fn plugin_config(mut self, name: impl Into<String>, config: Value) -> Self {
        self.options.plugin_configs.set(name, config);
        self
    }

    pub fn plugin_configs(mut self, configs: PluginConfigs) -> Self {
        self.options.plugin_configs = configs;
        self
    }

    pub fn ui_conf(mut self, ui_conf: Value) -> Self {
        self.options.ui_conf = Some(ui_conf);
        self
    }

    pub fn audio_language(mut self, mode: TrackSelectionMode, language: impl Into<String>) -> Self {
        self.options.audio_language = Some(TrackConfig {
            mode,
            language: language.into(),
        });
        self
    }

    pub fn text_language(mut self, mode: TrackSelectionMode, language: impl Into<String>) -> Self {
        self.options.text_language = Some(TrackConfig {
            mode,
            language: language.into(),
        });
        self
    }

    pub fn allow_cross_protocol_redirect(mut self, allow: bool) -> Self {
        self.options.allow_cross_protocol_redirect = Some(allow);
        self
    }

    pub fn allow_clear_lead(mut self, allow: bool) -> Self {
        self.options.allow_clear_lead = Some(allow);
        self
    }

    pub fn secure_surface(mut self, secure: bool) -> Self {
        self.options.secure_surface = Some(secure);
        self
    }

    pub fn ad_auto_play_on_resume(mut self, enabled: bool) -> Self {
        self.options.ad_auto_play_on_resume = Some(enabled);
        self
    }

    pub fn hide_video_views(mut self, hidden: bool) -> Self {
        self.options.hide_video_views = Some(hidden);
        self
    }

    pub fn aspect_ratio_resize_mode(mut self, mode: AspectRatioResizeMode) -> Self {
        self.options.aspect_ratio_resize_mode = Some(mode);
        self
    }

    pub fn abr_settings(mut self, settings: AbrSettings) -> Self {
        self.options.abr_settings = Some(settings);
        self
    }

    pub fn load_control_buffers(mut self, buffers: LoadControlBuffers) -> Self {
        self.options.load_control_buffers = Some(buffers);
        self
    }

    pub fn vr_player_enabled(mut self, enabled: bool) -> Self {
        self.options.vr_player_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> InitOptions {
        self.options
    }
}

/// Asset type of an OTT asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Media,
    Epg,
    Recording,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Media => "media",
            AssetType::Epg => "epg",
            AssetType::Recording => "recording",
        }
    }
}

/// Playback context requested from the OTT backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackContextType {
    Trailer,
    Catchup,
    StartOver,
    Playback,
}

impl PlaybackContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackContextType::Trailer => "TRAILER",
            PlaybackContextType::Catchup => "CATCHUP",
            PlaybackContextType::StartOver => "START_OVER",
            PlaybackContextType::Playback => "PLAYBACK",
        }
    }
}

/// How an OTT asset id is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetReferenceType {
    Media,
    EpgInternal,
    EpgExternal,
}

impl AssetReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetReferenceType::Media => "media",
            AssetReferenceType::EpgInternal => "epg_internal",
            AssetReferenceType::EpgExternal => "epg_external",
        }
    }
}

/// Options for loading an OVP entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OvpMediaOptions {
    pub entry_id: String,
    pub ks: Option<String>,
    /// Start position in seconds
    pub start_position: Option<f64>,
    pub preferred_media_format: Option<MediaFormat>,
    pub use_api_captions: bool,
}

impl OvpMediaOptions {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            ..Default::default()
        }
    }
}

/// Options for loading an OTT/Phoenix asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OttMediaOptions {
    pub asset_id: String,
    pub ks: Option<String>,
    /// Start position in seconds
    pub start_position: Option<f64>,
    pub preferred_media_format: Option<MediaFormat>,
    pub asset_type: Option<AssetType>,
    pub context_type: Option<PlaybackContextType>,
    pub asset_reference_type: Option<AssetReferenceType>,
    /// Media protocol (`http` / `https`)
    pub protocol: Option<String>,
    pub file_ids: Vec<String>,
    /// File types to keep, in preference order
    pub formats: Vec<String>,
}

impl OttMediaOptions {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            ..Default::default()
        }
    }
}

/// Backend-specific media-load request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum MediaOptions {
    Ovp(OvpMediaOptions),
    Ott(OttMediaOptions),
}

impl MediaOptions {
    /// Short name of the options variant
    pub fn kind(&self) -> &'static str {
        match self {
            MediaOptions::Ovp(_) => "ovp",
            MediaOptions::Ott(_) => "ott",
        }
    }

    pub fn ks(&self) -> Option<&str> {
        match self {
            MediaOptions::Ovp(o) => o.ks.as_deref(),
            MediaOptions::Ott(o) => o.ks.as_deref(),
        }
    }

    pub fn start_position(&self) -> Option<f64> {
        match self {
            MediaOptions::Ovp(o) => o.start_position,
            MediaOptions::Ott(o) => o.start_position,
        }
    }

    pub fn preferred_media_format(&self) -> Option<MediaFormat> {
        match self {
            MediaOptions::Ovp(o) => o.preferred_media_format,
            MediaOptions::Ott(o) => o.preferred_media_format,
        }
    }
}

impl From<OvpMediaOptions> for MediaOptions {
    fn from(options: OvpMediaOptions) -> Self {
        MediaOptions::Ovp(options)
    }
}

impl From<OttMediaOptions> for MediaOptions {
    fn from(options: OttMediaOptions) -> Self {
        MediaOptions::Ott(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_autoplay_implies_preload() {
        let options = InitOptions::builder().autoplay(true).build();
        assert!(options.is_preload());

        let options = InitOptions::builder().preload(false).build();
        assert!(!options.is_preload());
    }

    #[test]
    fn test_options_from_json() {
        let options = InitOptions::from_json(
            r#"{
                "serverUrl": "https://cdnapisec.kaltura.com",
                "partnerId": 100,
                "uiConfId": 0,
                "ks": "abc",
                "preload": true,
                "preferredMediaFormat": "dash",
                "pluginConfigs": { "kava": { "foo": 1 } },
                "audioLanguage": { "mode": "selection", "language": "en" }
            }"#,
        )
        .unwrap();

        assert_eq!(options.partner_id, Some(100));
        assert_eq!(options.preferred_media_format, Some(MediaFormat::Dash));
        assert_eq!(options.plugin_configs.get("kava"), Some(&json!({"foo": 1})));
        assert_eq!(
            options.audio_language.as_ref().unwrap().mode,
            TrackSelectionMode::Selection
        );
        assert!(options.is_preload());
    }

    #[test]
    fn test_media_options_kind() {
        let ovp: MediaOptions = OvpMediaOptions::new("1_abc").into();
        let ott: MediaOptions = OttMediaOptions::new("480989").into();
        assert_eq!(ovp.kind(), "ovp");
        assert_eq!(ott.kind(), "ott");
        assert_eq!(PlaybackContextType::StartOver.as_str(), "START_OVER");
        assert_eq!(AssetReferenceType::EpgExternal.as_str(), "epg_external");
    }
}
