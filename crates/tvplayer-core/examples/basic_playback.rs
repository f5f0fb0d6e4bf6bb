//! Basic playback example
//!
//! Builds an OVP player over the headless engine, sets an entry by hand and
//! walks it through the prepare/play life-cycle.
//!
//! Run with: cargo run -p tvplayer-core --example basic_playback

use serde_json::json;
use tvplayer_core::{
    BackendKind, EventKind, HeadlessEngine, InitOptions, KalturaPlayer, ListenerControl, MediaEntry, MediaFormat,
    MediaSource,
};

fn main() -> tvplayer_core::Result<()> {
    println!("TV Player Core - Basic Playback Example");
    println!("=======================================\n");

    let engine = HeadlessEngine::new();
    let options = InitOptions::builder()
        .partner_id(2215841)
        .ui_conf_id(43489771)
        .application_id("com.example.tv")
        .preload(true)
        .plugin_config("youbora", json!({"accountCode": "demo", "media": {"title": "{{entryName}}"}}))
        .build();

    let mut player = KalturaPlayer::new(BackendKind::Ovp, options, &engine)?;
    println!("Referrer:   {}", player.referrer());
    println!("Server URL: {}", player.server_url().unwrap_or("-"));

    player.add_listener(
        "example",
        EventKind::Playing,
        Box::new(|event| {
            println!("Event:      {:?}", event);
            ListenerControl::Keep
        }),
    );

    let entry = MediaEntry::new("1_w9zx2eti")
        .with_name("Sintel")
        .with_source(MediaSource::new(
            "1_w9zx2eti_1033,applehttp",
            "https://cdnapisec.kaltura.com/p/2215841/sp/221584100/playManifest/entryId/1_w9zx2eti/format/applehttp/a.m3u8",
            MediaFormat::Hls,
        ));
    entry_summary(&entry);

    player.set_media(entry);
    println!("State after set_media: {}", player.prepare_state());

    engine.flush_events();
    println!("State after CanPlay:   {}", player.prepare_state());

    player.play();
    engine.flush_events();
    engine.advance(3_000);
    println!("Position:   {} ms", player.current_position());

    println!("\nPlugin configs:");
    println!(
        "{}",
        serde_json::to_string_pretty(&player.plugin_configs().to_json()).unwrap_or_default()
    );

    if let Some(url) = engine.playback_url() {
        println!("\nPlayback URL: {}", url);
    }

    player.destroy();
    Ok(())
}

fn entry_summary(entry: &MediaEntry) {
    println!("Entry:      {} ({})", entry.id, entry.name.as_deref().unwrap_or("untitled"));
    for source in &entry.sources {
        println!("  source {} [{}]", source.id, source.media_format);
    }
    println!();
}
