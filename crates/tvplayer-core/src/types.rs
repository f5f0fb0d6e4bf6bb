//! Core types for TV Player

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container/streaming format of a playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Hls,
    Dash,
    Mp4,
    Mp3,
    Unknown,
}

impl MediaFormat {
    /// Map a backend delivery format name (`applehttp`, `mpegdash`, `url`)
    pub fn from_delivery_format(format: &str, url: Option<&str>) -> Self {
        match format {
            "applehttp" => MediaFormat::Hls,
            "mpegdash" => MediaFormat::Dash,
            "url" => url.map(MediaFormat::from_url).unwrap_or(MediaFormat::Mp4),
            _ => MediaFormat::Unknown,
        }
    }

    /// Guess the format from a URL's path extension
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        if path.ends_with(".m3u8") {
            MediaFormat::Hls
        } else if path.ends_with(".mpd") {
            MediaFormat::Dash
        } else if path.ends_with(".mp4") {
            MediaFormat::Mp4
        } else if path.ends_with(".mp3") {
            MediaFormat::Mp3
        } else {
            MediaFormat::Unknown
        }
    }

    /// Play-manifest file extension
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Hls => "m3u8",
            MediaFormat::Dash => "mpd",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Unknown => "",
        }
    }
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaFormat::Hls => write!(f, "hls"),
            MediaFormat::Dash => write!(f, "dash"),
            MediaFormat::Mp4 => write!(f, "mp4"),
            MediaFormat::Mp3 => write!(f, "mp3"),
            MediaFormat::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for MediaFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hls" | "m3u8" => Ok(MediaFormat::Hls),
            "dash" | "mpd" => Ok(MediaFormat::Dash),
            "mp4" => Ok(MediaFormat::Mp4),
            "mp3" => Ok(MediaFormat::Mp3),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown media format: {}",
                other
            ))),
        }
    }
}

/// Kind of content described by a media entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaEntryType {
    Vod,
    Live,
    DvrLive,
    #[default]
    Unknown,
}

impl std::fmt::Display for MediaEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaEntryType::Vod => write!(f, "Vod"),
            MediaEntryType::Live => write!(f, "Live"),
            MediaEntryType::DvrLive => write!(f, "DvrLive"),
            MediaEntryType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One playable rendition of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    /// Source id (flavor ids or file id, depending on backend)
    pub id: String,
    /// Playback URL
    pub url: String,
    /// Format of the source
    pub media_format: MediaFormat,
}

impl MediaSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>, media_format: MediaFormat) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            media_format,
        }
    }
}

/// Subtitle track served next to the media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSubtitle {
    pub url: String,
    pub label: Option<String>,
    pub language: Option<String>,
    /// Subtitle format (`vtt`, `srt`)
    pub format: String,
    pub is_default: bool,
}

/// Description of playable content, as returned by a media provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaEntry {
    /// Entry or asset id
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// VOD / live classification
    pub media_type: MediaEntryType,
    /// Duration in milliseconds (0 for live or unknown)
    pub duration_ms: u64,
    /// Free-form metadata, exposed as `{{key}}` tokens
    pub metadata: BTreeMap<String, String>,
    /// Playback sources
    pub sources: Vec<MediaSource>,
    /// Side-loaded subtitles
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_subtitles: Vec<ExternalSubtitle>,
}

impl MediaEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_media_type(mut self, media_type: MediaEntryType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Keep only sources of `format`, unless none match
    pub fn retain_preferred_format(&mut self, format: MediaFormat) {
        if self.sources.iter().any(|s| s.media_format == format) {
            self.sources.retain(|s| s.media_format == format);
        }
    }
}

/// Prepare life-cycle of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareState {
    #[default]
    NotPrepared,
    Preparing,
    Prepared,
}

impl std::fmt::Display for PrepareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrepareState::NotPrepared => write!(f, "not_prepared"),
            PrepareState::Preparing => write!(f, "preparing"),
            PrepareState::Prepared => write!(f, "prepared"),
        }
    }
}

/// Track preference mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSelectionMode {
    Off,
    Selection,
    Auto,
}

/// Preferred audio or text track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfig {
    pub mode: TrackSelectionMode,
    pub language: String,
}

/// Surface aspect-ratio handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatioResizeMode {
    Fit,
    FixedWidth,
    FixedHeight,
    Fill,
    Zoom,
}

/// Adaptive bitrate bounds, in bits per second
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AbrSettings {
    pub min_video_bitrate: Option<u64>,
    pub max_video_bitrate: Option<u64>,
    pub initial_bitrate_estimate: Option<u64>,
}

/// Engine buffering thresholds, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadControlBuffers {
    pub min_player_buffer_ms: u32,
    pub max_player_buffer_ms: u32,
    pub min_buffer_after_interaction_ms: u32,
    pub min_buffer_after_rebuffer_ms: u32,
    pub back_buffer_duration_ms: u32,
}

impl Default for LoadControlBuffers {
    fn default() -> Self {
        Self {
            min_player_buffer_ms: 15_000,
            max_player_buffer_ms: 50_000,
            min_buffer_after_interaction_ms: 2_500,
            min_buffer_after_rebuffer_ms: 5_000,
            back_buffer_duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_format_mapping() {
        assert_eq!(MediaFormat::from_delivery_format("applehttp", None), MediaFormat::Hls);
        assert_eq!(MediaFormat::from_delivery_format("mpegdash", None), MediaFormat::Dash);
        assert_eq!(
            MediaFormat::from_delivery_format("url", Some("https://cdn.example.com/a.mp3?x=1")),
            MediaFormat::Mp3
        );
        assert_eq!(MediaFormat::from_delivery_format("hdnetworkmanifest", None), MediaFormat::Unknown);
    }

    #[test]
    fn test_retain_preferred_format() {
        let mut entry = MediaEntry::new("E1")
            .with_source(MediaSource::new("a", "https://x/a.m3u8", MediaFormat::Hls))
            .with_source(MediaSource::new("b", "https://x/b.mpd", MediaFormat::Dash));

        entry.retain_preferred_format(MediaFormat::Dash);
        assert_eq!(entry.sources.len(), 1);
        assert_eq!(entry.sources[0].id, "b");

        // No match leaves the list untouched
        entry.retain_preferred_format(MediaFormat::Mp4);
        assert_eq!(entry.sources.len(), 1);
    }

    #[test]
    fn test_entry_type_names() {
        assert_eq!(MediaEntryType::DvrLive.to_string(), "DvrLive");
        assert_eq!(PrepareState::NotPrepared.to_string(), "not_prepared");
    }
}
