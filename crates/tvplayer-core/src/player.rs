//! Player facade
//!
//! [`KalturaPlayer`] resolves partner, session and referrer settings, merges
//! plugin configurations, owns the wrapped engine and runs the prepare
//! life-cycle:
//!
//! ```text
//! not_prepared --prepare()--> preparing --CanPlay--> prepared
//!      ^                                                |
//!      +------------------- set_media() ----------------+
//! ```
//!
//! A player is bound to the context that created it (`!Send`). Media loads
//! complete on a tokio task and are applied when the owner calls
//! [`KalturaPlayer::dispatch_pending`] or awaits [`KalturaPlayer::dispatch_next`].

use crate::adapter::PlayManifestAdapter;
use crate::backend::{Backend, BackendKind, PartnerIds, Session};
use crate::config::{merge_plugin_configs, PluginConfigs};
use crate::engine::{
    EngineFactory, EventKind, Listener, ListenerControl, ListenerId, MediaConfig, PlayerEngine, PlayerSettings,
};
use crate::error::{Error, Result};
use crate::loader::{Finished, LoadCallback, LoadTicket, MediaLoader};
use crate::options::{InitOptions, MediaOptions};
use crate::plugins::PluginRegistry;
use crate::provider::{HttpTransport, SharedTransport};
use crate::token::TokenResolver;
use crate::types::*;
use crate::uiconf::{plugins_section, UiConfService};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Listener group used for the one-shot prepare listener
const PREPARE_LISTENER_GROUP: &str = "tvplayer.prepare";

/// Application id used for the default referrer when none is configured
const DEFAULT_APPLICATION_ID: &str = "tvplayer";

/// Player facade over one backend and one wrapped engine
pub struct KalturaPlayer {
    backend: Box<dyn Backend>,
    options: InitOptions,
    engine: Option<Box<dyn PlayerEngine>>,
    transport: SharedTransport,
    tokens: TokenResolver,
    plugin_configs: PluginConfigs,
    partner_ids: PartnerIds,
    server_url: Option<String>,
    ks: Option<String>,
    referrer: String,
    autoplay: bool,
    preload: bool,
    /// Start position in seconds
    start_position: f64,
    preferred_media_format: Option<MediaFormat>,
    media_entry: Option<MediaEntry>,
    prepare_state: Rc<Cell<PrepareState>>,
    loader: MediaLoader,
}

impl std::fmt::Debug for KalturaPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalturaPlayer")
            .field("backend", &self.backend.kind())
            .field("partner_id", &self.partner_ids.partner_id)
            .field("server_url", &self.server_url)
            .field("prepare_state", &self.prepare_state.get())
            .field("media_entry", &self.media_entry.as_ref().map(|e| &e.id))
            .finish()
    }
}

/// Referrer reported to analytics: the configured one when it is a URL with
/// scheme and host, otherwise `app://<application id>`
pub fn build_referrer(referrer: Option<&str>, application_id: Option<&str>) -> String {
    if let Some(referrer) = referrer {
        let valid = Url::parse(referrer)
            .map(|url| !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()))
            .unwrap_or(false);
        if valid {
            return referrer.to_string();
        }
        debug!(referrer, "Ignoring referrer that is not a URL");
    }
    let application_id = application_id
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_APPLICATION_ID);
    format!("app://{}", application_id)
}

impl KalturaPlayer {
    /// Create a player talking to its backend over HTTP
    pub fn new(kind: BackendKind, options: InitOptions, factory: &dyn EngineFactory) -> Result<Self> {
        Self::with_transport(kind, options, factory, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(
        kind: BackendKind,
        options: InitOptions,
        factory: &dyn EngineFactory,
        transport: SharedTransport,
    ) -> Result<Self> {
        Self::with_backend(kind.backend(), options, factory, transport)
    }

    /// Create a player over a custom backend implementation
    pub fn with_backend(
        backend: Box<dyn Backend>,
        options: InitOptions,
        factory: &dyn EngineFactory,
        transport: SharedTransport,
    ) -> Result<Self> {
        backend.register_plugins();
        let partner_ids = backend.partner_ids(&options)?;
        let server_url = backend.server_url(&options)?;
        let referrer = build_referrer(options.referrer.as_deref(), options.application_id.as_deref());

        let mut tokens = TokenResolver::new();
        tokens.refresh_options(&options);
        tokens.refresh_pair("referrer", referrer.clone());

        let mut player = Self {
            autoplay: options.is_autoplay(),
            preload: options.is_preload(),
            ks: options.ks.clone().filter(|ks| !ks.is_empty()),
            preferred_media_format: options.preferred_media_format,
            backend,
            options,
            engine: None,
            transport,
            tokens,
            plugin_configs: PluginConfigs::new(),
            partner_ids,
            server_url,
            referrer,
            start_position: 0.0,
            media_entry: None,
            prepare_state: Rc::new(Cell::new(PrepareState::NotPrepared)),
            loader: MediaLoader::new(),
        };

        let combined = player.setup_plugin_configs();
        let mut engine = factory.load_player(&combined)?;
        engine.apply_settings(&PlayerSettings::from_options(&player.options));
        engine.set_content_request_adapter(Box::new(PlayManifestAdapter::new(player.referrer.clone())));
        player.plugin_configs = combined;
        player.engine = Some(engine);

        info!(
            backend = %player.backend.kind(),
            partner_id = ?player.partner_ids.partner_id,
            plugins = player.plugin_configs.len(),
            "Player created"
        );
        Ok(player)
    }

    /// Create a player, fetching its UI configuration first when the options
    /// name one and do not already carry it
    #[instrument(skip_all, fields(backend = %kind, ui_conf_id = ?options.ui_conf_id))]
    pub async fn load(
        kind: BackendKind,
        options: InitOptions,
        factory: &dyn EngineFactory,
        transport: SharedTransport,
    ) -> Result<Self> {
        let options = match options.ui_conf_id.filter(|id| *id > 0) {
            Some(id) if options.ui_conf.is_none() => {
                let service = UiConfService::new(transport.clone(), options.ui_conf_server_url.as_deref());
                let partner_id = options.ui_conf_partner_id.or(options.partner_id);
                let document = service.load(id, partner_id, options.ks.as_deref()).await?;
                options.with_ui_conf(document)
            }
            _ => options,
        };
        Self::with_transport(kind, options, factory, transport)
    }

    fn session(&self) -> Session<'_> {
        self.session_with_ks(self.ks.as_deref())
    }

    fn session_with_ks<'a>(&'a self, ks: Option<&'a str>) -> Session<'a> {
        Session {
            partner_id: self.partner_ids.partner_id,
            analytics_partner_id: self.partner_ids.analytics_partner_id,
            ui_conf_id: self.options.ui_conf_id,
            ks,
            server_url: self.server_url.as_deref(),
            referrer: &self.referrer,
            entry_id: self.media_entry.as_ref().map(|e| e.id.as_str()),
        }
    }

    /// Merge application, UI configuration and backend default plugin configs,
    /// then resolve tokens and drop configs failing their plugin's schema
    fn setup_plugin_configs(&self) -> PluginConfigs {
        let defaults = self.backend.default_plugin_configs(&self.session());
        let remote = self.options.ui_conf.as_ref().and_then(plugins_section);
        let merged = merge_plugin_configs(&self.options.plugin_configs, remote, &defaults);
        let resolved = merged.resolve(&self.tokens);
        debug!(plugins = ?resolved.names().collect::<Vec<_>>(), "Plugin configs merged");
        PluginRegistry::global().validate_for_registration(&resolved)
    }

    fn refresh_tokens(&mut self) {
        self.tokens.clear();
        if let Some(ref entry) = self.media_entry {
            self.tokens.refresh_entry(entry);
        }
        self.tokens.refresh_options(&self.options);
        self.tokens.refresh_pair("ks", self.ks.clone().unwrap_or_default());
        self.tokens.refresh_pair("referrer", self.referrer.clone());
    }

    /// Push the configs of `combined` that differ from `previous` to the
    /// engine. Non-object configs are never pushed.
    fn push_plugin_configs(&mut self, combined: &PluginConfigs, previous: Option<&PluginConfigs>) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        for (name, config) in combined.iter() {
            if !config.is_object() {
                error!(plugin = %name, "Plugin config is not an object, not updating");
                continue;
            }
            if previous.is_some_and(|p| p.get(name) == Some(config)) {
                continue;
            }
            engine.update_plugin_config(name, config);
        }
    }

    // Lifecycle

    /// Hand the current entry to the engine. No-op while already preparing.
    pub fn prepare(&mut self) {
        if self.prepare_state.get() == PrepareState::Preparing {
            debug!("prepare ignored, already preparing");
            return;
        }
        let Some(entry) = self.media_entry.clone() else {
            warn!("prepare called without a media entry");
            return;
        };
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        engine.remove_listeners(PREPARE_LISTENER_GROUP);
        engine.prepare(MediaConfig {
            entry,
            start_position: self.start_position,
            preferred_format: self.preferred_media_format,
        });
        self.prepare_state.set(PrepareState::Preparing);

        let state = Rc::clone(&self.prepare_state);
        engine.add_listener(
            PREPARE_LISTENER_GROUP,
            EventKind::CanPlay,
            Box::new(move |_| {
                state.set(PrepareState::Prepared);
                ListenerControl::Remove
            }),
        );
        debug!("Preparing");

        // Optimistic start: the engine buffers before it actually plays
        if self.autoplay {
            engine.play();
        }
    }

    /// Play, preparing first when nothing was prepared yet
    pub fn play(&mut self) {
        if self.prepare_state.get() == PrepareState::NotPrepared {
            self.prepare();
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.play();
        }
    }

    /// Replace the media entry and re-run the plugin configuration merge.
    ///
    /// Any in-flight load is superseded.
    pub fn set_media(&mut self, entry: MediaEntry) {
        self.loader.supersede();
        self.apply_media(entry);
    }

    /// [`set_media`](Self::set_media) with a start position in seconds
    pub fn set_media_with_start(&mut self, entry: MediaEntry, start_position: Option<f64>) {
        if let Some(start_position) = start_position {
            self.start_position = start_position;
        }
        self.set_media(entry);
    }

    fn apply_media(&mut self, entry: MediaEntry) {
        info!(entry_id = %entry.id, media_type = %entry.media_type, "Media set");
        // Set before merging so per-entry analytics fields see the new entry
        self.media_entry = Some(entry);
        self.refresh_tokens();

        let combined = self.setup_plugin_configs();
        self.push_plugin_configs(&combined, None);
        self.plugin_configs = combined;

        if let Some(engine) = self.engine.as_mut() {
            engine.remove_listeners(PREPARE_LISTENER_GROUP);
        }
        self.prepare_state.set(PrepareState::NotPrepared);

        if self.preload {
            self.prepare();
        }
    }

    pub fn pause(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.pause();
        }
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
    }

    pub fn replay(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.replay();
        }
    }

    /// Seek to `position_ms` milliseconds
    pub fn seek_to(&mut self, position_ms: i64) {
        if let Some(engine) = self.engine.as_mut() {
            engine.seek_to(position_ms);
        }
    }

    pub fn change_track(&mut self, unique_id: &str) {
        if let Some(engine) = self.engine.as_mut() {
            engine.change_track(unique_id);
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(volume);
        }
    }

    /// Replace one plugin's config on the engine
    pub fn update_plugin_config(&mut self, name: &str, config: Value) {
        if let Some(engine) = self.engine.as_mut() {
            engine.update_plugin_config(name, &config);
        }
        self.plugin_configs.set(name, config);
    }

    pub fn on_application_paused(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.on_application_paused();
        }
    }

    pub fn on_application_resumed(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.on_application_resumed();
        }
    }

    /// Release the engine. Every later control call is a no-op.
    pub fn destroy(&mut self) {
        self.loader.supersede();
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            info!("Player destroyed");
        }
        self.prepare_state.set(PrepareState::NotPrepared);
    }

    pub fn is_destroyed(&self) -> bool {
        self.engine.is_none()
    }

    // Queries (milliseconds)

    pub fn current_position(&self) -> i64 {
        self.engine.as_ref().map_or(0, |e| e.current_position())
    }

    pub fn duration(&self) -> i64 {
        self.engine.as_ref().map_or(0, |e| e.duration())
    }

    pub fn buffered_position(&self) -> i64 {
        self.engine.as_ref().map_or(0, |e| e.buffered_position())
    }

    pub fn is_playing(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_playing())
    }

    pub fn session_id(&self) -> Option<String> {
        self.engine.as_ref().map(|e| e.session_id())
    }

    // Listeners

    pub fn add_listener(&mut self, group: &str, kind: EventKind, listener: Listener) -> Option<ListenerId> {
        self.engine
            .as_mut()
            .map(|engine| engine.add_listener(group, kind, listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) {
        if let Some(engine) = self.engine.as_mut() {
            engine.remove_listener(id);
        }
    }

    pub fn remove_listeners(&mut self, group: &str) {
        if let Some(engine) = self.engine.as_mut() {
            engine.remove_listeners(group);
        }
    }

    // Media loading

    /// Fetch media from the backend and set it.
    ///
    /// The callback runs from [`dispatch_pending`](Self::dispatch_pending) or
    /// [`dispatch_next`](Self::dispatch_next), after the entry was set. Options
    /// the backend cannot serve are reported to the callback as
    /// [`Error::UnsupportedMediaOptions`] and leave the player untouched.
    pub fn load_media<F>(&mut self, options: impl Into<MediaOptions>, callback: F) -> LoadTicket
    where
        F: FnOnce(std::result::Result<&MediaEntry, Error>) + 'static,
    {
        let options = options.into();
        let callback: LoadCallback = Box::new(callback);

        let ks = options.ks().or(self.ks.as_deref()).map(str::to_string);
        let provider = {
            let session = self.session_with_ks(ks.as_deref());
            self.backend
                .build_media_provider(&options, &session, self.transport.clone())
        };
        let provider = match provider {
            Ok(provider) => provider,
            Err(e) => {
                debug!(error = %e, "Media load rejected");
                return self.loader.reject(e, callback);
            }
        };

        if !MediaLoader::has_runtime() {
            error!("loadMedia called outside a tokio runtime");
            return self.loader.reject(Error::Runtime, callback);
        }

        self.loader.supersede();
        if let Some(ks) = options.ks() {
            self.store_ks(ks);
        }
        self.start_position = options.start_position().unwrap_or(0.0);
        if let Some(format) = options.preferred_media_format() {
            self.preferred_media_format = Some(format);
        }

        info!(backend = %self.backend.kind(), options = options.kind(), "Loading media");
        self.loader.start(provider, callback)
    }

    /// Load media and wait for the result on the current context
    pub async fn load_media_and_wait(&mut self, options: impl Into<MediaOptions>) -> Result<MediaEntry> {
        let outcome: Rc<RefCell<Option<Result<MediaEntry>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&outcome);
        self.load_media(options, move |result| {
            *slot.borrow_mut() = Some(result.cloned());
        });

        while outcome.borrow().is_none() {
            if !self.dispatch_next().await {
                break;
            }
        }
        let result = outcome.borrow_mut().take();
        result.unwrap_or(Err(Error::Superseded))
    }

    /// Apply every load result received so far. Returns how many were applied.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(finished) = self.loader.try_next() {
            self.complete(finished);
            applied += 1;
        }
        applied
    }

    /// Wait for the next load result and apply it. Returns false when no load
    /// is pending.
    pub async fn dispatch_next(&mut self) -> bool {
        match self.loader.next().await {
            Some(finished) => {
                self.complete(finished);
                true
            }
            None => false,
        }
    }

    fn complete(&mut self, finished: Finished) {
        let Finished { ticket, result, callback } = finished;
        match result {
            Ok(mut entry) => {
                if let Some(format) = self.preferred_media_format {
                    entry.retain_preferred_format(format);
                }
                debug!(ticket = ticket.id(), entry_id = %entry.id, "Media load completed");
                self.apply_media(entry);
                if let Some(ref entry) = self.media_entry {
                    callback(Ok(entry));
                }
            }
            Err(e) => {
                warn!(ticket = ticket.id(), error = %e, code = e.error_code(), "Media load failed");
                callback(Err(e));
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Load callbacks not yet delivered
    pub fn pending_loads(&self) -> usize {
        self.loader.pending()
    }

    // Accessors

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    pub fn media_entry(&self) -> Option<&MediaEntry> {
        self.media_entry.as_ref()
    }

    pub fn prepare_state(&self) -> PrepareState {
        self.prepare_state.get()
    }

    /// Combined plugin configuration currently in effect
    pub fn plugin_configs(&self) -> &PluginConfigs {
        &self.plugin_configs
    }

    pub fn token_resolver(&self) -> &TokenResolver {
        &self.tokens
    }

    pub fn partner_id(&self) -> Option<i64> {
        self.partner_ids.partner_id
    }

    /// Partner analytics report to
    pub fn analytics_partner_id(&self) -> Option<i64> {
        self.partner_ids.analytics_partner_id
    }

    pub fn ks(&self) -> Option<&str> {
        self.ks.as_deref()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    pub fn ui_conf_id(&self) -> Option<i64> {
        self.options.ui_conf_id
    }

    /// Start position in seconds
    pub fn start_position(&self) -> f64 {
        self.start_position
    }

    pub fn is_preload(&self) -> bool {
        self.preload
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn preferred_media_format(&self) -> Option<MediaFormat> {
        self.preferred_media_format
    }

    // Mutators

    fn store_ks(&mut self, ks: &str) {
        self.ks = Some(ks.to_string()).filter(|ks| !ks.is_empty());
        self.tokens.refresh_pair("ks", ks);
    }

    /// Replace the session token and re-merge the plugin configs, pushing the
    /// ones that changed (the analytics defaults carry the KS)
    pub fn set_ks(&mut self, ks: &str) {
        self.store_ks(ks);
        self.refresh_tokens();

        let combined = self.setup_plugin_configs();
        let previous = std::mem::take(&mut self.plugin_configs);
        self.push_plugin_configs(&combined, Some(&previous));
        debug!(plugins = combined.len(), "Plugin configs refreshed after KS change");
        self.plugin_configs = combined;
    }

    /// Start position in seconds, used by the next prepare
    pub fn set_start_position(&mut self, start_position: f64) {
        self.start_position = start_position;
    }

    pub fn set_preload(&mut self, preload: bool) {
        self.preload = preload;
    }

    /// Autoplay implies preload
    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
        if autoplay {
            self.preload = true;
        }
    }

    pub fn set_preferred_media_format(&mut self, format: Option<MediaFormat>) {
        self.preferred_media_format = format;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, HeadlessEngine, PlayerEvent};
    use crate::options::{OttMediaOptions, OvpMediaOptions};
    use crate::plugins::{KAVA, PHOENIX_ANALYTICS};
    use crate::provider::testing::CannedTransport;
    use serde_json::json;

    fn ovp_options() -> InitOptions {
        InitOptions::builder().partner_id(100).ui_conf_id(0).build()
    }

    fn player(kind: BackendKind, options: InitOptions) -> (KalturaPlayer, HeadlessEngine) {
        let engine = HeadlessEngine::new();
        let player = KalturaPlayer::with_transport(kind, options, &engine, CannedTransport::new(vec![])).unwrap();
        (player, engine)
    }

    fn entry(id: &str) -> MediaEntry {
        MediaEntry::new(id).with_source(MediaSource::new("s", "https://cdn/a.m3u8", MediaFormat::Hls))
    }

    #[test]
    fn test_referrer_normalization() {
        assert_eq!(build_referrer(Some("https://example.com/page"), None), "https://example.com/page");
        assert_eq!(build_referrer(Some("not a url"), Some("com.acme.tv")), "app://com.acme.tv");
        assert_eq!(build_referrer(None, None), "app://tvplayer");
    }

    #[test]
    fn test_construction_errors() {
        let engine = HeadlessEngine::new();
        let err = KalturaPlayer::new(BackendKind::Ovp, InitOptions::default(), &engine).unwrap_err();
        assert!(matches!(err, Error::MissingPartnerId { .. }));

        let err = KalturaPlayer::new(BackendKind::Ott, ovp_options(), &engine).unwrap_err();
        assert!(matches!(err, Error::MissingServerUrl { .. }));
    }

    #[test]
    fn test_preload_prepares_within_set_media() {
        let options = InitOptions::builder().partner_id(100).ui_conf_id(0).autoplay(false).preload(true).build();
        let (mut player, engine) = player(BackendKind::Ovp, options);

        player.set_media(entry("E1"));
        assert_eq!(player.prepare_state(), PrepareState::Preparing);
        assert_eq!(player.token_resolver().get("{{entryId}}"), Some("E1"));
        assert!(matches!(engine.commands().last(), Some(EngineCommand::Prepare { .. })));

        engine.flush_events();
        assert_eq!(player.prepare_state(), PrepareState::Prepared);
    }

    #[test]
    fn test_set_media_without_preload_stays_not_prepared() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        player.set_media(entry("E1"));
        assert_eq!(player.prepare_state(), PrepareState::NotPrepared);
        assert!(!engine.commands().iter().any(|c| matches!(c, EngineCommand::Prepare { .. })));
    }

    #[test]
    fn test_play_prepares_once_then_plays() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        player.set_media(entry("E1"));
        engine.clear_commands();

        player.play();
        let commands: Vec<_> = engine
            .commands()
            .into_iter()
            .filter(|c| matches!(c, EngineCommand::Prepare { .. } | EngineCommand::Play))
            .collect();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], EngineCommand::Prepare { .. }));
        assert_eq!(commands[1], EngineCommand::Play);
    }

    #[test]
    fn test_prepare_is_noop_while_preparing() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        player.set_media(entry("E1"));
        player.prepare();
        player.prepare();
        let prepares = engine
            .commands()
            .iter()
            .filter(|c| matches!(c, EngineCommand::Prepare { .. }))
            .count();
        assert_eq!(prepares, 1);
        assert_eq!(engine.listener_count(), 1);
    }

    #[test]
    fn test_autoplay_plays_without_waiting() {
        let options = InitOptions::builder().partner_id(100).autoplay(true).build();
        let (mut player, engine) = player(BackendKind::Ovp, options);
        assert!(player.is_preload());

        player.set_media(entry("E1"));
        assert_eq!(player.prepare_state(), PrepareState::Preparing);
        assert_eq!(engine.commands().last(), Some(&EngineCommand::Play));
    }

    #[test]
    fn test_set_media_reresolves_kava_entry() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        assert!(player.plugin_configs().get(KAVA).unwrap().get("entryId").is_none());

        player.set_media(entry("1_first"));
        assert_eq!(player.plugin_configs().get(KAVA).unwrap()["entryId"], json!("1_first"));
        assert_eq!(engine.plugin_configs().get(KAVA).unwrap()["entryId"], json!("1_first"));
    }

    #[test]
    fn test_app_config_tokens_resolved() {
        let options = InitOptions::builder()
            .partner_id(100)
            .plugin_config("youbora", json!({"media": {"title": "{{entryName}}"}, "accountCode": "acme-{{partnerId}}"}))
            .build();
        let (mut player, _engine) = player(BackendKind::Ovp, options);
        assert_eq!(player.plugin_configs().get("youbora").unwrap()["accountCode"], json!("acme-100"));

        player.set_media(entry("E1").with_name("Sintel \"Director's cut\""));
        let youbora = player.plugin_configs().get("youbora").unwrap();
        assert_eq!(youbora["media"]["title"], json!("Sintel \"Director's cut\""));
    }

    #[test]
    fn test_controls_after_destroy_are_noops() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        player.destroy();
        engine.clear_commands();

        player.play();
        player.pause();
        player.seek_to(1000);
        player.set_volume(0.5);
        assert!(engine.commands().is_empty());
        assert_eq!(player.current_position(), 0);
        assert!(!player.is_playing());
        assert!(player.session_id().is_none());
        assert!(player.is_destroyed());
    }

    #[test]
    fn test_set_ks_updates_phoenix() {
        let options = InitOptions::builder()
            .partner_id(3009)
            .server_url("https://api.example.com/api_v3")
            .ks("first")
            .build();
        let (mut player, engine) = player(BackendKind::Ott, options);
        assert_eq!(player.plugin_configs().get(PHOENIX_ANALYTICS).unwrap()["ks"], json!("first"));

        player.set_ks("second");
        assert_eq!(player.ks(), Some("second"));
        assert_eq!(engine.plugin_configs().get(PHOENIX_ANALYTICS).unwrap()["ks"], json!("second"));
        assert_eq!(player.token_resolver().get("{{ks}}"), Some("second"));
    }

    #[test]
    fn test_set_ks_refreshes_kava_only() {
        let options = InitOptions::builder()
            .partner_id(100)
            .ks("first")
            .plugin_config("youbora", json!({"accountCode": "acme"}))
            .build();
        let (mut player, engine) = player(BackendKind::Ovp, options);
        player.set_media(entry("E1"));
        assert_eq!(engine.plugin_configs().get(KAVA).unwrap()["ks"], json!("first"));
        engine.clear_commands();

        player.set_ks("second");
        assert_eq!(player.plugin_configs().get(KAVA).unwrap()["ks"], json!("second"));
        assert_eq!(engine.plugin_configs().get(KAVA), player.plugin_configs().get(KAVA));

        let updated: Vec<_> = engine
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                EngineCommand::UpdatePluginConfig(name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec![KAVA.to_string()]);
    }

    #[test]
    fn test_app_phoenix_config_reaches_engine_resolved() {
        let options = InitOptions::builder()
            .partner_id(3009)
            .server_url("https://api.example.com/api_v3")
            .ks("first")
            .plugin_config(PHOENIX_ANALYTICS, json!({"ks": "{{ks}}", "timerInterval": 10}))
            .ui_conf(json!({"config": {"player": {"plugins": {
                "phoenixAnalytics": {"baseUrl": "https://remote.example.com/"}
            }}}}))
            .build();
        let (mut player, engine) = player(BackendKind::Ott, options);

        player.set_media(entry("E1"));
        let pushed = engine.plugin_configs().get(PHOENIX_ANALYTICS).cloned().unwrap();
        assert_eq!(pushed["ks"], json!("first"));
        assert_eq!(pushed["timerInterval"], json!(10));
        assert_eq!(pushed["baseUrl"], json!("https://remote.example.com/"));
        assert_eq!(Some(&pushed), player.plugin_configs().get(PHOENIX_ANALYTICS));

        player.set_ks("second");
        assert_eq!(engine.plugin_configs().get(PHOENIX_ANALYTICS).unwrap()["ks"], json!("second"));
    }

    #[test]
    fn test_back_to_back_preloads_signal_latest_media_once() {
        let options = InitOptions::builder().partner_id(100).ui_conf_id(0).autoplay(false).preload(true).build();
        let (mut player, engine) = player(BackendKind::Ovp, options);

        player.set_media(entry("E1"));
        player.set_media(entry("E2"));
        assert_eq!(engine.pending_events(), 2);

        assert_eq!(engine.flush_events(), 2);
        assert_eq!(player.prepare_state(), PrepareState::Prepared);
        assert_eq!(engine.prepared_media().unwrap().entry.id, "E2");
    }

    #[test]
    fn test_load_outside_runtime_keeps_in_flight_load() {
        let transport = CannedTransport::new(vec![Ok(json!([
            { "objects": [{ "id": "1_abc", "name": "Sintel", "msDuration": 1000 }] },
            { "sources": [{ "deliveryProfileId": 2, "format": "applehttp", "protocols": "https" }] }
        ]))]);
        let engine = HeadlessEngine::new();
        let options = InitOptions::builder().partner_id(100).ks("initial").build();
        let mut player = KalturaPlayer::with_transport(BackendKind::Ovp, options, &engine, transport).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let first = seen.clone();
        runtime.block_on(async {
            player.load_media(OvpMediaOptions::new("1_abc"), move |r| {
                first.borrow_mut().push(r.map(|e| e.id.clone()).unwrap_or_else(|e| e.error_code().to_string()));
            });
        });
        assert!(player.is_loading());

        let mut late = OvpMediaOptions::new("1_late");
        late.ks = Some("late".into());
        late.start_position = Some(30.0);
        let second = seen.clone();
        player.load_media(late, move |r| {
            second.borrow_mut().push(r.map(|e| e.id.clone()).unwrap_or_else(|e| e.error_code().to_string()));
        });
        assert_eq!(player.ks(), Some("initial"));
        assert_eq!(player.start_position(), 0.0);
        assert!(player.is_loading());

        runtime.block_on(async { while player.dispatch_next().await {} });
        let mut seen = seen.borrow().clone();
        seen.sort();
        assert_eq!(seen, vec!["1_abc".to_string(), "RUNTIME".to_string()]);
        assert_eq!(player.media_entry().map(|e| e.id.as_str()), Some("1_abc"));
    }

    #[test]
    fn test_listeners_forwarded() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        player.add_listener(
            "app",
            EventKind::Playing,
            Box::new(move |_| {
                seen.set(seen.get() + 1);
                ListenerControl::Keep
            }),
        );
        engine.emit(PlayerEvent::Playing);
        player.remove_listeners("app");
        engine.emit(PlayerEvent::Playing);
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn test_incompatible_options_reported_to_callback() {
        let (mut player, engine) = player(BackendKind::Ovp, ovp_options());
        let result = Rc::new(RefCell::new(None));
        let slot = result.clone();

        player.load_media(OttMediaOptions::new("480989"), move |r| {
            *slot.borrow_mut() = Some(r.map(|e| e.id.clone()).map_err(|e| e.error_code()));
        });
        assert!(result.borrow().is_none());

        assert_eq!(player.dispatch_pending(), 1);
        assert_eq!(*result.borrow(), Some(Err("UNSUPPORTED_MEDIA_OPTIONS")));
        assert!(player.media_entry().is_none());
        assert!(engine.prepared_media().is_none());
    }

    #[tokio::test]
    async fn test_load_media_sets_entry_before_callback() {
        let transport = CannedTransport::new(vec![Ok(json!([
            { "objects": [{ "id": "1_abc", "name": "Sintel", "msDuration": 1000 }] },
            { "sources": [
                { "deliveryProfileId": 1, "format": "mpegdash", "protocols": "https" },
                { "deliveryProfileId": 2, "format": "applehttp", "protocols": "https" }
            ] }
        ]))]);
        let engine = HeadlessEngine::new();
        let options = InitOptions::builder().partner_id(100).preload(true).build();
        let mut player = KalturaPlayer::with_transport(BackendKind::Ovp, options, &engine, transport).unwrap();

        let mut media = OvpMediaOptions::new("1_abc");
        media.ks = Some("userks".into());
        media.start_position = Some(12.0);
        media.preferred_media_format = Some(MediaFormat::Hls);

        let entry = player.load_media_and_wait(media).await.unwrap();
        assert_eq!(entry.sources.len(), 1);
        assert_eq!(entry.sources[0].media_format, MediaFormat::Hls);
        assert_eq!(player.media_entry().map(|e| e.id.as_str()), Some("1_abc"));
        assert_eq!(player.ks(), Some("userks"));
        assert_eq!(player.prepare_state(), PrepareState::Preparing);
        assert_eq!(engine.prepared_media().unwrap().start_position, 12.0);
    }
}
