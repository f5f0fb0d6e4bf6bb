//! Backend capabilities
//!
//! A player is parameterized over one [`Backend`], which decides:
//! - which plugin factories get registered (once per process)
//! - how partner ids and the server URL are derived from the options
//! - which analytics defaults feed the configuration merger
//! - how media options turn into a [`MediaProvider`]

use crate::analytics::{kava_defaults, phoenix_defaults, KavaParams, KAVA_DEFAULT_PARTNER_ID};
use crate::config::PluginConfigs;
use crate::error::{Error, Result};
use crate::options::{InitOptions, MediaOptions};
use crate::plugins::{
    RegistrationLatch, COMMON_PLUGINS, KAVA, KAVA_PLUGIN, PHOENIX_ANALYTICS, PHOENIX_ANALYTICS_PLUGIN,
};
use crate::provider::{MediaProvider, OvpMediaProvider, PhoenixMediaProvider, SharedTransport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// OVP API server used when none is configured
pub const DEFAULT_OVP_SERVER_URL: &str = "https://cdnapisec.kaltura.com/";

static OVP_PLUGINS: RegistrationLatch = RegistrationLatch::new("ovp");
static OTT_PLUGINS: RegistrationLatch = RegistrationLatch::new("ott");
static TV_PLUGINS: RegistrationLatch = RegistrationLatch::new("tv");
static BASIC_PLUGINS: RegistrationLatch = RegistrationLatch::new("basic");

/// Backend flavour of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ovp,
    Ott,
    Tv,
    Basic,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ovp => "ovp",
            BackendKind::Ott => "ott",
            BackendKind::Tv => "tv",
            BackendKind::Basic => "basic",
        }
    }

    /// Backend implementation for this kind
    pub fn backend(&self) -> Box<dyn Backend> {
        match self {
            BackendKind::Ovp => Box::new(OvpBackend),
            BackendKind::Ott => Box::new(OttBackend),
            BackendKind::Tv => Box::new(TvBackend),
            BackendKind::Basic => Box::new(BasicBackend),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ovp" => Ok(BackendKind::Ovp),
            "ott" => Ok(BackendKind::Ott),
            "tv" => Ok(BackendKind::Tv),
            "basic" => Ok(BackendKind::Basic),
            other => Err(Error::InvalidConfig(format!("unknown backend: {}", other))),
        }
    }
}

/// Partner the player belongs to and partner analytics report to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartnerIds {
    pub partner_id: Option<i64>,
    pub analytics_partner_id: Option<i64>,
}

/// Current session state, as seen by a backend
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    pub partner_id: Option<i64>,
    pub analytics_partner_id: Option<i64>,
    pub ui_conf_id: Option<i64>,
    pub ks: Option<&'a str>,
    pub server_url: Option<&'a str>,
    pub referrer: &'a str,
    pub entry_id: Option<&'a str>,
}

impl Session<'_> {
    fn kava(&self) -> Value {
        kava_defaults(&KavaParams {
            partner_id: self.analytics_partner_id,
            ui_conf_id: self.ui_conf_id,
            entry_id: self.entry_id,
            ks: self.ks,
            referrer: Some(self.referrer),
        })
    }

}

/// Backend capability set a player is parameterized over
pub trait Backend: std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Register this backend's plugin factories. Returns false when they
    /// were already registered by an earlier player.
    fn register_plugins(&self) -> bool;

    fn partner_ids(&self, options: &InitOptions) -> Result<PartnerIds>;

    /// Normalized API server URL (always ending in `/`)
    fn server_url(&self, options: &InitOptions) -> Result<Option<String>>;

    /// Defaults inserted for plugins neither the application nor the UI
    /// configuration mentioned
    fn default_plugin_configs(&self, session: &Session<'_>) -> PluginConfigs;

    fn build_media_provider(
        &self,
        options: &MediaOptions,
        session: &Session<'_>,
        transport: SharedTransport,
    ) -> Result<Box<dyn MediaProvider>>;
}

/// Append a trailing `/` to a configured server URL
pub fn safe_server_url(url: Option<&str>, default: Option<&str>) -> Option<String> {
    match url.filter(|u| !u.is_empty()) {
        Some(url) if url.ends_with('/') => Some(url.to_string()),
        Some(url) => Some(format!("{}/", url)),
        None => default.map(str::to_string),
    }
}

fn positive(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id > 0)
}

fn unsupported(backend: BackendKind, options: &MediaOptions) -> Error {
    let err = Error::UnsupportedMediaOptions {
        backend: backend.to_string(),
        options: options.kind().to_string(),
    };
    error!(backend = %backend, options = options.kind(), "loadMedia with incompatible media options");
    err
}

fn required_server(kind: BackendKind, server_url: Option<&str>) -> Result<&str> {
    server_url.ok_or_else(|| Error::MissingServerUrl { backend: kind.to_string() })
}

fn phoenix_provider(
    options: &crate::options::OttMediaOptions,
    session: &Session<'_>,
    transport: SharedTransport,
    kind: BackendKind,
) -> Result<Box<dyn MediaProvider>> {
    let server_url = required_server(kind, session.server_url)?;
    let mut provider = PhoenixMediaProvider::new(
        transport,
        server_url,
        session.partner_id.unwrap_or_default(),
        session.ks.map(str::to_string),
    )
    .set_asset_id(options.asset_id.clone())
    .set_referrer(session.referrer);

    if let Some(ref protocol) = options.protocol {
        provider = provider.set_protocol(protocol.clone());
    }
    if !options.file_ids.is_empty() {
        provider = provider.set_file_ids(options.file_ids.clone());
    }
    if let Some(context_type) = options.context_type {
        provider = provider.set_context_type(context_type);
    }
    if let Some(asset_type) = options.asset_type {
        provider = provider.set_asset_type(asset_type);
    }
    if !options.formats.is_empty() {
        provider = provider.set_formats(options.formats.clone());
    }
    if let Some(reference_type) = options.asset_reference_type {
        provider = provider.set_asset_reference_type(reference_type);
    }
    Ok(Box::new(provider))
}

/// Kaltura OVP (entries)
#[derive(Debug, Clone, Copy, Default)]
pub struct OvpBackend;

impl Backend for OvpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ovp
    }

    fn register_plugins(&self) -> bool {
        OVP_PLUGINS.register_once(|registry| registry.register_all(COMMON_PLUGINS))
    }

    fn partner_ids(&self, options: &InitOptions) -> Result<PartnerIds> {
        let partner_id = positive(options.partner_id).ok_or_else(|| Error::MissingPartnerId {
            backend: self.kind().to_string(),
        })?;
        Ok(PartnerIds {
            partner_id: Some(partner_id),
            analytics_partner_id: positive(options.ui_conf_partner_id).or(Some(partner_id)),
        })
    }

    fn server_url(&self, options: &InitOptions) -> Result<Option<String>> {
        Ok(safe_server_url(options.server_url.as_deref(), Some(DEFAULT_OVP_SERVER_URL)))
    }

    fn default_plugin_configs(&self, session: &Session<'_>) -> PluginConfigs {
        let mut defaults = PluginConfigs::new();
        defaults.set(KAVA, session.kava());
        defaults
    }

    fn build_media_provider(
        &self,
        options: &MediaOptions,
        session: &Session<'_>,
        transport: SharedTransport,
    ) -> Result<Box<dyn MediaProvider>> {
        let MediaOptions::Ovp(options) = options else {
            return Err(unsupported(self.kind(), options));
        };
        let server_url = session.server_url.unwrap_or(DEFAULT_OVP_SERVER_URL);
        let provider = OvpMediaProvider::new(
            transport,
            server_url,
            session.partner_id.unwrap_or_default(),
            session.ks.map(str::to_string),
        )
        .set_entry_id(options.entry_id.clone())
        .set_use_api_captions(options.use_api_captions)
        .set_referrer(session.referrer);
        Ok(Box::new(provider))
    }
}

/// Kaltura OTT (Phoenix assets) with KAVA reporting to the shared partner
#[derive(Debug, Clone, Copy, Default)]
pub struct OttBackend;

impl Backend for OttBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ott
    }

    fn register_plugins(&self) -> bool {
        OTT_PLUGINS.register_once(|registry| {
            registry.register_all(COMMON_PLUGINS);
            registry.register(PHOENIX_ANALYTICS_PLUGIN);
        })
    }

    fn partner_ids(&self, options: &InitOptions) -> Result<PartnerIds> {
        let partner_id = positive(options.partner_id).ok_or_else(|| Error::MissingPartnerId {
            backend: self.kind().to_string(),
        })?;
        Ok(PartnerIds {
            partner_id: Some(partner_id),
            analytics_partner_id: Some(KAVA_DEFAULT_PARTNER_ID),
        })
    }

    fn server_url(&self, options: &InitOptions) -> Result<Option<String>> {
        safe_server_url(options.server_url.as_deref(), None)
            .map(Some)
            .ok_or_else(|| Error::MissingServerUrl { backend: self.kind().to_string() })
    }

    fn default_plugin_configs(&self, session: &Session<'_>) -> PluginConfigs {
        let mut defaults = PluginConfigs::new();
        defaults.set(KAVA, session.kava());
        if let Some(phoenix) = phoenix_defaults(session.partner_id, session.server_url, session.ks) {
            defaults.set(PHOENIX_ANALYTICS, phoenix);
        }
        defaults
    }

    fn build_media_provider(
        &self,
        options: &MediaOptions,
        session: &Session<'_>,
        transport: SharedTransport,
    ) -> Result<Box<dyn MediaProvider>> {
        match options {
            MediaOptions::Ott(options) => phoenix_provider(options, session, transport, self.kind()),
            other => Err(unsupported(self.kind(), other)),
        }
    }
}

/// Phoenix-only TV player
#[derive(Debug, Clone, Copy, Default)]
pub struct TvBackend;

impl Backend for TvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tv
    }

    fn register_plugins(&self) -> bool {
        TV_PLUGINS.register_once(|registry| {
            registry.register(PHOENIX_ANALYTICS_PLUGIN);
            registry.register(KAVA_PLUGIN);
        })
    }

    fn partner_ids(&self, options: &InitOptions) -> Result<PartnerIds> {
        let partner_id = positive(options.partner_id);
        Ok(PartnerIds {
            partner_id,
            analytics_partner_id: partner_id,
        })
    }

    fn server_url(&self, options: &InitOptions) -> Result<Option<String>> {
        safe_server_url(options.server_url.as_deref(), None)
            .map(Some)
            .ok_or_else(|| Error::MissingServerUrl { backend: self.kind().to_string() })
    }

    fn default_plugin_configs(&self, session: &Session<'_>) -> PluginConfigs {
        let mut defaults = PluginConfigs::new();
        if let Some(phoenix) = phoenix_defaults(session.partner_id, session.server_url, session.ks) {
            defaults.set(PHOENIX_ANALYTICS, phoenix);
        }
        defaults
    }

    fn build_media_provider(
        &self,
        options: &MediaOptions,
        session: &Session<'_>,
        transport: SharedTransport,
    ) -> Result<Box<dyn MediaProvider>> {
        match options {
            MediaOptions::Ott(options) => phoenix_provider(options, session, transport, self.kind()),
            other => Err(unsupported(self.kind(), other)),
        }
    }
}

/// Plain player without a media backend
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicBackend;

impl Backend for BasicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Basic
    }

    fn register_plugins(&self) -> bool {
        BASIC_PLUGINS.register_once(|registry| registry.register_all(COMMON_PLUGINS))
    }

    fn partner_ids(&self, _options: &InitOptions) -> Result<PartnerIds> {
        Ok(PartnerIds {
            partner_id: Some(KAVA_DEFAULT_PARTNER_ID),
            analytics_partner_id: Some(KAVA_DEFAULT_PARTNER_ID),
        })
    }

    fn server_url(&self, options: &InitOptions) -> Result<Option<String>> {
        Ok(safe_server_url(options.server_url.as_deref(), None))
    }

    fn default_plugin_configs(&self, session: &Session<'_>) -> PluginConfigs {
        let mut defaults = PluginConfigs::new();
        defaults.set(KAVA, session.kava());
        defaults
    }

    fn build_media_provider(
        &self,
        options: &MediaOptions,
        _session: &Session<'_>,
        _transport: SharedTransport,
    ) -> Result<Box<dyn MediaProvider>> {
        Err(unsupported(self.kind(), options))
    }
}
