//! CLI command implementations

use crate::output::{format_output, OutputFormat};
use crate::PlayerArgs;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tvplayer_core::provider::SharedTransport;
use tvplayer_core::{
    AssetType, BackendKind, HeadlessEngine, HttpTransport, InitOptions, KalturaPlayer, MediaEntry,
    MediaFormat, MediaOptions, OttMediaOptions, OvpMediaOptions, UiConfService,
};

/// What `load` should fetch
pub struct LoadTarget {
    pub entry_id: Option<String>,
    pub asset_id: Option<String>,
    pub asset_type: Option<String>,
    pub media_format: Option<String>,
}

/// Print the combined plugin configuration of a freshly built player
pub async fn config(args: &PlayerArgs, entry_id: Option<&str>, format: &str) -> anyhow::Result<()> {
    let engine = HeadlessEngine::new();
    let mut player = build_player(args, &engine).await?;

    if let Some(id) = entry_id {
        player.set_media(MediaEntry::new(id));
    }

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = json!({
                "backend": player.backend_kind().as_str(),
                "partnerId": player.partner_id(),
                "analyticsPartnerId": player.analytics_partner_id(),
                "serverUrl": player.server_url(),
                "referrer": player.referrer(),
                "plugins": player.plugin_configs().to_json(),
            });
            println!("{}", format_output(&report, format));
        }
        OutputFormat::Text => {
            println!("Player configuration:");
            println!("  Backend: {}", player.backend_kind());
            println!("  Partner: {}", display_opt(player.partner_id()));
            println!("  Analytics partner: {}", display_opt(player.analytics_partner_id()));
            println!("  Server: {}", player.server_url().unwrap_or("-"));
            println!("  Referrer: {}", player.referrer());

            println!("\nPlugins ({}):", player.plugin_configs().len());
            for (name, config) in player.plugin_configs().iter() {
                println!("  {}:", name);
                println!("{}", indent(&serde_json::to_string_pretty(config)?, 4));
            }
        }
    }

    player.destroy();
    Ok(())
}

/// Load media through the backend and play it on the headless engine
pub async fn load(args: &PlayerArgs, target: LoadTarget, play_ms: i64, format: &str) -> anyhow::Result<()> {
    let engine = HeadlessEngine::new();
    let mut player = build_player(args, &engine).await?;

    let preferred = target.media_format.as_deref().map(parse_keyword::<MediaFormat>).transpose()?;
    let options: MediaOptions = match (target.entry_id, target.asset_id) {
        (Some(entry_id), _) => {
            let mut options = OvpMediaOptions::new(entry_id);
            options.preferred_media_format = preferred;
            options.into()
        }
        (None, Some(asset_id)) => {
            let mut options = OttMediaOptions::new(asset_id);
            options.preferred_media_format = preferred;
            options.asset_type = target.asset_type.as_deref().map(parse_keyword::<AssetType>).transpose()?;
            options.into()
        }
        (None, None) => anyhow::bail!("either --entry-id or --asset-id is required"),
    };

    if OutputFormat::from(format) == OutputFormat::Text {
        println!("Loading {} media via {} backend...", options.kind(), player.backend_kind());
    }

    let entry = player
        .load_media_and_wait(options)
        .await
        .context("media load failed")?;

    player.play();
    engine.flush_events();
    if play_ms > 0 {
        engine.advance(play_ms);
        engine.flush_events();
    }

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = json!({
                "entry": entry,
                "prepareState": player.prepare_state(),
                "playing": player.is_playing(),
                "positionMs": player.current_position(),
                "playbackUrl": engine.playback_url(),
                "plugins": player.plugin_configs().to_json(),
            });
            println!("{}", format_output(&report, format));
        }
        OutputFormat::Text => {
            println!("\nEntry:");
            println!("  Id: {}", entry.id);
            println!("  Name: {}", entry.name.as_deref().unwrap_or("-"));
            println!("  Type: {}", entry.media_type);
            println!("  Duration: {} ms", entry.duration_ms);

            println!("\nSources:");
            for (i, source) in entry.sources.iter().enumerate() {
                println!("  {}. [{}] {}", i + 1, source.media_format, source.url);
            }

            if !entry.metadata.is_empty() {
                println!("\nMetadata:");
                for (key, value) in &entry.metadata {
                    println!("  {}: {}", key, value);
                }
            }

            println!("\nPlayback:");
            println!("  State: {}", player.prepare_state());
            println!("  Playing: {}", player.is_playing());
            println!("  Position: {} ms", player.current_position());
            if let Some(url) = engine.playback_url() {
                println!("  URL: {}", url);
            }
        }
    }

    player.destroy();
    Ok(())
}

/// Fetch a UI configuration document
pub async fn uiconf(
    id: i64,
    partner_id: Option<i64>,
    server_url: Option<&str>,
    ks: Option<&str>,
    full: bool,
    format: &str,
) -> anyhow::Result<()> {
    let service = UiConfService::http(server_url);
    let document = service
        .load(id, partner_id, ks)
        .await
        .with_context(|| format!("could not fetch UI configuration {}", id))?;

    let shown = if full {
        document
    } else {
        tvplayer_core::uiconf::plugins_section(&document)
            .map(|plugins| Value::Object(plugins.clone()))
            .unwrap_or_else(|| json!({}))
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", format_output(&shown, format)),
        OutputFormat::Text => {
            println!("UI configuration {}:", id);
            match shown.as_object() {
                Some(map) if !full => {
                    if map.is_empty() {
                        println!("  (no plugins)");
                    }
                    for (name, config) in map {
                        println!("  {}:", name);
                        println!("{}", indent(&serde_json::to_string_pretty(config)?, 4));
                    }
                }
                _ => println!("{}", indent(&serde_json::to_string_pretty(&shown)?, 2)),
            }
        }
    }

    Ok(())
}

async fn build_player(args: &PlayerArgs, engine: &HeadlessEngine) -> anyhow::Result<KalturaPlayer> {
    let kind: BackendKind = args.backend.parse()?;
    let options = init_options(args)?;
    let transport: SharedTransport = Arc::new(HttpTransport::new());
    let player = KalturaPlayer::load(kind, options, engine, transport)
        .await
        .context("could not create player")?;
    Ok(player)
}

/// Options file first, flags override
fn init_options(args: &PlayerArgs) -> anyhow::Result<InitOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            InitOptions::from_json(&text).with_context(|| format!("invalid options in {}", path.display()))?
        }
        None => InitOptions::default(),
    };

    if args.partner_id.is_some() {
        options.partner_id = args.partner_id;
    }
    if args.server_url.is_some() {
        options.server_url = args.server_url.clone();
    }
    if args.ks.is_some() {
        options.ks = args.ks.clone();
    }
    if args.ui_conf_id.is_some() {
        options.ui_conf_id = args.ui_conf_id;
    }
    if args.referrer.is_some() {
        options.referrer = args.referrer.clone();
    }
    Ok(options)
}

/// Parse a lowercase keyword through the type's serde names
fn parse_keyword<T: DeserializeOwned>(keyword: &str) -> anyhow::Result<T> {
    serde_json::from_value(Value::String(keyword.to_lowercase()))
        .with_context(|| format!("unknown value '{}'", keyword))
}

fn display_opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines().map(|line| format!("{}{}", pad, line)).collect::<Vec<_>>().join("\n")
}
