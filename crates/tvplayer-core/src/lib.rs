//! TV Player Core - player facade for OVP and OTT/Phoenix backends
//!
//! This crate wraps a playback engine with everything a branded player needs
//! before the first frame:
//! - Partner, session (KS) and referrer resolution
//! - Plugin configuration merging (application, UI configuration, analytics defaults)
//! - `{{token}}` substitution in plugin configs
//! - Media loading from the OVP and Phoenix APIs
//! - Prepare/play life-cycle and control forwarding
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        TV Player Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Token     │  │    Config    │  │   UI Conf    │           │
//! │  │   Resolver   │  │    Merger    │  │   Service    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐        ┌──────────────┐      │
//! │                    │   Kaltura   │────────│   Backend    │      │
//! │                    │   Player    │        │ ovp/ott/tv/  │      │
//! │                    └──────┬──────┘        │    basic     │      │
//! │                           │               └──────┬───────┘      │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌────────────┴─┐            │
//! │  │   Plugin     │  │   Player    │  │    Media     │            │
//! │  │  Registry    │  │   Engine    │  │   Loader     │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod options;
pub mod token;
pub mod config;
pub mod plugins;
pub mod analytics;
pub mod adapter;
pub mod engine;
pub mod provider;
pub mod uiconf;
pub mod backend;
pub mod loader;
pub mod player;

pub use error::{Error, Result};
pub use types::*;
pub use options::{
    AssetReferenceType, AssetType, InitOptions, InitOptionsBuilder, MediaOptions, OttMediaOptions,
    OvpMediaOptions, PlaybackContextType,
};
pub use token::TokenResolver;
pub use config::{merge_plugin_configs, PluginConfigs};
pub use plugins::PluginRegistry;
pub use engine::{
    EngineFactory, EventKind, HeadlessEngine, Listener, ListenerControl, ListenerId, PlayerEngine, PlayerEvent,
};
pub use provider::{ApiTransport, HttpTransport, MediaProvider, OvpMediaProvider, PhoenixMediaProvider};
pub use uiconf::UiConfService;
pub use backend::{Backend, BackendKind};
pub use loader::{LoadCallback, LoadTicket};
pub use player::KalturaPlayer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "TV Player Core initialized");
}
