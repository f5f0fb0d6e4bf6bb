//! Wrapped playback engine seam
//!
//! The player facade never decodes or renders anything itself; it drives an
//! engine through [`PlayerEngine`]. Engines are created by an
//! [`EngineFactory`] from the combined plugin configuration.
//!
//! [`HeadlessEngine`] is a simulated engine: it records every command, tracks
//! position/volume/playing state and delivers events when asked to. It backs
//! the CLI and the test suite.

use crate::adapter::RequestAdapter;
use crate::config::PluginConfigs;
use crate::error::Result;
use crate::options::InitOptions;
use crate::types::*;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;
use uuid::Uuid;

/// Event categories listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CanPlay,
    Playing,
    Pause,
    Ended,
    Seeked,
    Stopped,
    DurationChanged,
    VolumeChanged,
    Error,
}

/// Events emitted by an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    CanPlay,
    Playing,
    Pause,
    Ended,
    Seeked { position_ms: i64 },
    Stopped,
    DurationChanged { duration_ms: i64 },
    VolumeChanged { volume: f32 },
    Error { code: String, message: String },
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::CanPlay => EventKind::CanPlay,
            PlayerEvent::Playing => EventKind::Playing,
            PlayerEvent::Pause => EventKind::Pause,
            PlayerEvent::Ended => EventKind::Ended,
            PlayerEvent::Seeked { .. } => EventKind::Seeked,
            PlayerEvent::Stopped => EventKind::Stopped,
            PlayerEvent::DurationChanged { .. } => EventKind::DurationChanged,
            PlayerEvent::VolumeChanged { .. } => EventKind::VolumeChanged,
            PlayerEvent::Error { .. } => EventKind::Error,
        }
    }
}

/// Returned by listeners to stay registered or remove themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerControl {
    Keep,
    Remove,
}

/// Event callback
pub type Listener = Box<dyn FnMut(&PlayerEvent) -> ListenerControl>;

/// Handle of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// What the engine should prepare
#[derive(Debug, Clone, PartialEq)]
pub struct MediaConfig {
    pub entry: MediaEntry,
    /// Start position in seconds
    pub start_position: f64,
    pub preferred_format: Option<MediaFormat>,
}

/// Engine settings derived from init options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSettings {
    pub preferred_audio_track: Option<TrackConfig>,
    pub preferred_text_track: Option<TrackConfig>,
    pub allow_cross_protocol_redirect: Option<bool>,
    pub preferred_media_format: Option<MediaFormat>,
    pub allow_clear_lead: Option<bool>,
    pub secure_surface: Option<bool>,
    pub ad_auto_play_on_resume: Option<bool>,
    pub hide_video_views: Option<bool>,
    pub aspect_ratio_resize_mode: Option<AspectRatioResizeMode>,
    pub abr_settings: Option<AbrSettings>,
    pub load_control_buffers: Option<LoadControlBuffers>,
    pub vr_player_enabled: Option<bool>,
}

impl PlayerSettings {
    pub fn from_options(options: &InitOptions) -> Self {
        Self {
            preferred_audio_track: options.audio_language.clone(),
            preferred_text_track: options.text_language.clone(),
            allow_cross_protocol_redirect: options.allow_cross_protocol_redirect,
            preferred_media_format: options.preferred_media_format,
            allow_clear_lead: options.allow_clear_lead,
            secure_surface: options.secure_surface,
            ad_auto_play_on_resume: options.ad_auto_play_on_resume,
            hide_video_views: options.hide_video_views,
            aspect_ratio_resize_mode: options.aspect_ratio_resize_mode,
            abr_settings: options.abr_settings.clone(),
            load_control_buffers: options.load_control_buffers.clone(),
            vr_player_enabled: options.vr_player_enabled,
        }
    }
}

/// Playback engine driven by the player facade.
///
/// Positions and durations are in milliseconds.
pub trait PlayerEngine {
    fn apply_settings(&mut self, settings: &PlayerSettings);
    fn set_content_request_adapter(&mut self, adapter: Box<dyn RequestAdapter>);

    fn prepare(&mut self, config: MediaConfig);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn replay(&mut self);
    fn seek_to(&mut self, position_ms: i64);
    fn destroy(&mut self);

    fn set_volume(&mut self, volume: f32);
    fn change_track(&mut self, unique_id: &str);
    fn update_plugin_config(&mut self, name: &str, config: &Value);
    fn on_application_paused(&mut self);
    fn on_application_resumed(&mut self);

    fn current_position(&self) -> i64;
    fn duration(&self) -> i64;
    fn buffered_position(&self) -> i64;
    fn is_playing(&self) -> bool;
    fn session_id(&self) -> String;

    fn add_listener(&mut self, group: &str, kind: EventKind, listener: Listener) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);
    fn remove_listeners(&mut self, group: &str);
}

/// Creates engines preloaded with plugin configs
pub trait EngineFactory {
    fn load_player(&self, plugin_configs: &PluginConfigs) -> Result<Box<dyn PlayerEngine>>;
}

/// Command recorded by [`HeadlessEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Prepare { entry_id: String, start_position: f64 },
    Play,
    Pause,
    Stop,
    Replay,
    SeekTo(i64),
    SetVolume(f32),
    ChangeTrack(String),
    UpdatePluginConfig(String),
    ApplicationPaused,
    ApplicationResumed,
    Destroy,
}

struct RegisteredListener {
    id: ListenerId,
    group: String,
    kind: EventKind,
    callback: Listener,
}

#[derive(Default)]
struct EngineState {
    commands: Vec<EngineCommand>,
    plugin_configs: PluginConfigs,
    settings: Option<PlayerSettings>,
    adapter: Option<Box<dyn RequestAdapter>>,
    media: Option<MediaConfig>,
    playback_url: Option<String>,
    session_id: String,
    position_ms: i64,
    duration_ms: i64,
    volume: f32,
    playing: bool,
    listeners: Vec<RegisteredListener>,
    next_listener_id: u64,
    pending: VecDeque<PlayerEvent>,
}

/// Simulated engine, cheap to clone (clones share state)
#[derive(Clone)]
pub struct HeadlessEngine {
    state: Rc<RefCell<EngineState>>,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HeadlessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessEngine")
            .field("session_id", &state.session_id)
            .field("playing", &state.playing)
            .field("position_ms", &state.position_ms)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl HeadlessEngine {
    pub fn new() -> Self {
        let state = EngineState {
            session_id: Uuid::new_v4().to_string(),
            volume: 1.0,
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.state.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Plugin configs the engine was loaded with, including later updates
    pub fn plugin_configs(&self) -> PluginConfigs {
        self.state.borrow().plugin_configs.clone()
    }

    pub fn settings(&self) -> Option<PlayerSettings> {
        self.state.borrow().settings.clone()
    }

    pub fn prepared_media(&self) -> Option<MediaConfig> {
        self.state.borrow().media.clone()
    }

    /// URL of the selected source after request adaptation
    pub fn playback_url(&self) -> Option<String> {
        self.state.borrow().playback_url.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Advance the playback clock while playing
    pub fn advance(&self, millis: i64) {
        let mut state = self.state.borrow_mut();
        if state.playing {
            state.position_ms += millis;
            if state.duration_ms > 0 && state.position_ms >= state.duration_ms {
                state.position_ms = state.duration_ms;
                state.playing = false;
                state.pending.push_back(PlayerEvent::Ended);
            }
        }
    }

    /// Deliver queued events. Returns how many were delivered.
    pub fn flush_events(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.state.borrow_mut().pending.pop_front();
            match next {
                Some(event) => {
                    self.emit(event);
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// Deliver one event to matching listeners now
    pub fn emit(&self, event: PlayerEvent) {
        let kind = event.kind();
        let mut listeners = std::mem::take(&mut self.state.borrow_mut().listeners);

        listeners.retain_mut(|l| {
            if l.kind != kind {
                return true;
            }
            (l.callback)(&event) == ListenerControl::Keep
        });

        // Listeners registered while dispatching were pushed to the state
        let mut state = self.state.borrow_mut();
        listeners.append(&mut state.listeners);
        state.listeners = listeners;
    }

    fn record(&self, command: EngineCommand) {
        debug!(command = ?command, "Engine command");
        self.state.borrow_mut().commands.push(command);
    }

    fn queue(&self, event: PlayerEvent) {
        self.state.borrow_mut().pending.push_back(event);
    }
}

impl EngineFactory for HeadlessEngine {
    fn load_player(&self, plugin_configs: &PluginConfigs) -> Result<Box<dyn PlayerEngine>> {
        self.state.borrow_mut().plugin_configs = plugin_configs.clone();
        Ok(Box::new(self.clone()))
    }
}

impl PlayerEngine for HeadlessEngine {
    fn apply_settings(&mut self, settings: &PlayerSettings) {
        self.state.borrow_mut().settings = Some(settings.clone());
    }

    fn set_content_request_adapter(&mut self, adapter: Box<dyn RequestAdapter>) {
        self.state.borrow_mut().adapter = Some(adapter);
    }

    fn prepare(&mut self, config: MediaConfig) {
        self.record(EngineCommand::Prepare {
            entry_id: config.entry.id.clone(),
            start_position: config.start_position,
        });

        let mut state = self.state.borrow_mut();
        // Readiness events of the previous media must not signal the new one
        state
            .pending
            .retain(|e| !matches!(e, PlayerEvent::CanPlay | PlayerEvent::DurationChanged { .. }));
        state.session_id = Uuid::new_v4().to_string();

        let source = config
            .preferred_format
            .and_then(|format| config.entry.sources.iter().find(|s| s.media_format == format))
            .or_else(|| config.entry.sources.first());
        state.playback_url = source.map(|s| match state.adapter {
            Some(ref adapter) => adapter.adapt(&s.url, &state.session_id),
            None => s.url.clone(),
        });

        state.position_ms = (config.start_position * 1000.0) as i64;
        state.duration_ms = config.entry.duration_ms as i64;
        state.playing = false;
        let duration_ms = state.duration_ms;
        state.media = Some(config);
        state.pending.push_back(PlayerEvent::DurationChanged { duration_ms });
        state.pending.push_back(PlayerEvent::CanPlay);
    }

    fn play(&mut self) {
        self.record(EngineCommand::Play);
        let started = {
            let mut state = self.state.borrow_mut();
            let started = state.media.is_some() && !state.playing;
            if started {
                state.playing = true;
            }
            started
        };
        if started {
            self.queue(PlayerEvent::Playing);
        }
    }

    fn pause(&mut self) {
        self.record(EngineCommand::Pause);
        let paused = std::mem::replace(&mut self.state.borrow_mut().playing, false);
        if paused {
            self.queue(PlayerEvent::Pause);
        }
    }

    fn stop(&mut self) {
        self.record(EngineCommand::Stop);
        {
            let mut state = self.state.borrow_mut();
            state.playing = false;
            state.position_ms = 0;
            state.media = None;
            state.playback_url = None;
        }
        self.queue(PlayerEvent::Stopped);
    }

    fn replay(&mut self) {
        self.record(EngineCommand::Replay);
        let has_media = {
            let mut state = self.state.borrow_mut();
            state.position_ms = 0;
            state.media.is_some()
        };
        if has_media {
            self.state.borrow_mut().playing = true;
            self.queue(PlayerEvent::Playing);
        }
    }

    fn seek_to(&mut self, position_ms: i64) {
        self.record(EngineCommand::SeekTo(position_ms));
        let position_ms = {
            let mut state = self.state.borrow_mut();
            let max = if state.duration_ms > 0 { state.duration_ms } else { i64::MAX };
            state.position_ms = position_ms.clamp(0, max);
            state.position_ms
        };
        self.queue(PlayerEvent::Seeked { position_ms });
    }

    fn destroy(&mut self) {
        self.record(EngineCommand::Destroy);
        let mut state = self.state.borrow_mut();
        state.playing = false;
        state.media = None;
        state.listeners.clear();
        state.pending.clear();
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(EngineCommand::SetVolume(volume));
        let volume = volume.clamp(0.0, 1.0);
        self.state.borrow_mut().volume = volume;
        self.queue(PlayerEvent::VolumeChanged { volume });
    }

    fn change_track(&mut self, unique_id: &str) {
        self.record(EngineCommand::ChangeTrack(unique_id.to_string()));
    }

    fn update_plugin_config(&mut self, name: &str, config: &Value) {
        self.record(EngineCommand::UpdatePluginConfig(name.to_string()));
        self.state.borrow_mut().plugin_configs.set(name, config.clone());
    }

    fn on_application_paused(&mut self) {
        self.record(EngineCommand::ApplicationPaused);
        self.state.borrow_mut().playing = false;
    }

    fn on_application_resumed(&mut self) {
        self.record(EngineCommand::ApplicationResumed);
    }

    fn current_position(&self) -> i64 {
        self.state.borrow().position_ms
    }

    fn duration(&self) -> i64 {
        self.state.borrow().duration_ms
    }

    fn buffered_position(&self) -> i64 {
        let state = self.state.borrow();
        if state.media.is_none() {
            return 0;
        }
        // The simulation buffers everything it knows about
        if state.duration_ms > 0 {
            state.duration_ms
        } else {
            state.position_ms
        }
    }

    fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    fn session_id(&self) -> String {
        self.state.borrow().session_id.clone()
    }

    fn add_listener(&mut self, group: &str, kind: EventKind, listener: Listener) -> ListenerId {
        let mut state = self.state.borrow_mut();
        state.next_listener_id += 1;
        let id = ListenerId(state.next_listener_id);
        state.listeners.push(RegisteredListener {
            id,
            group: group.to_string(),
            kind,
            callback: listener,
        });
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.state.borrow_mut().listeners.retain(|l| l.id != id);
    }

    fn remove_listeners(&mut self, group: &str) {
        self.state.borrow_mut().listeners.retain(|l| l.group != group);
    }
}
