//! TV Player CLI - headless front end for the player core
//!
//! Features:
//! - Combined plugin configuration inspection
//! - OVP entry / OTT asset loading on the headless engine
//! - UI configuration fetches

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// TV Player CLI - player facade toolkit
#[derive(Parser)]
#[command(name = "tvplayer-cli")]
#[command(version)]
#[command(about = "Inspect plugin configs and load media through the TV player core", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

/// Player construction flags shared by `config` and `load`
#[derive(Args, Debug, Clone)]
pub struct PlayerArgs {
    /// Backend variant (ovp, ott, tv, basic)
    #[arg(short, long, default_value = "ovp")]
    pub backend: String,

    /// JSON file with init options (camelCase keys)
    #[arg(short, long)]
    pub options: Option<PathBuf>,

    /// Partner id
    #[arg(long)]
    pub partner_id: Option<i64>,

    /// Backend server URL
    #[arg(long)]
    pub server_url: Option<String>,

    /// Session token
    #[arg(long)]
    pub ks: Option<String>,

    /// UI configuration id, fetched before the player is built
    #[arg(long)]
    pub ui_conf_id: Option<i64>,

    /// Referrer
    #[arg(long)]
    pub referrer: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a player and print its combined plugin configuration
    Config {
        #[command(flatten)]
        player: PlayerArgs,

        /// Entry id to resolve entry tokens against
        #[arg(long)]
        entry_id: Option<String>,
    },

    /// Load an OVP entry or OTT asset and play it on the headless engine
    Load {
        #[command(flatten)]
        player: PlayerArgs,

        /// OVP entry id
        #[arg(long, conflicts_with = "asset_id", required_unless_present = "asset_id")]
        entry_id: Option<String>,

        /// OTT asset id
        #[arg(long)]
        asset_id: Option<String>,

        /// OTT asset type (media, epg, recording)
        #[arg(long)]
        asset_type: Option<String>,

        /// Preferred media format (hls, dash, mp4, mp3)
        #[arg(long)]
        media_format: Option<String>,

        /// Milliseconds of simulated playback after play
        #[arg(long, default_value = "0")]
        play_ms: i64,
    },

    /// Fetch a UI configuration and print its plugin section
    Uiconf {
        /// UI configuration id
        id: i64,

        /// Partner owning the UI configuration
        #[arg(long)]
        partner_id: Option<i64>,

        /// UI configuration server
        #[arg(long)]
        server_url: Option<String>,

        /// Session token
        #[arg(long)]
        ks: Option<String>,

        /// Print the whole document instead of the plugin section
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    tvplayer_core::init();

    match cli.command {
        Commands::Config { player, entry_id } => {
            commands::config(&player, entry_id.as_deref(), &cli.format).await?;
        }
        Commands::Load {
            player,
            entry_id,
            asset_id,
            asset_type,
            media_format,
            play_ms,
        } => {
            let target = commands::LoadTarget {
                entry_id,
                asset_id,
                asset_type,
                media_format,
            };
            commands::load(&player, target, play_ms, &cli.format).await?;
        }
        Commands::Uiconf {
            id,
            partner_id,
            server_url,
            ks,
            full,
        } => {
            commands::uiconf(id, partner_id, server_url.as_deref(), ks.as_deref(), full, &cli.format).await?;
        }
    }

    Ok(())
}
