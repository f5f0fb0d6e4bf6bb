//! Built-in analytics plugin defaults
//!
//! Backends insert these when neither the application nor the UI
//! configuration supplied a config for the plugin.

use serde_json::{json, Map, Value};

/// KAVA endpoint
pub const KAVA_DEFAULT_BASE_URL: &str = "https://analytics.kaltura.com/api_v3/index.php";
/// Partner KAVA reports to when the player has no partner of its own
pub const KAVA_DEFAULT_PARTNER_ID: i64 = 2504201;
/// Entry id reported together with [`KAVA_DEFAULT_PARTNER_ID`]
pub const KAVA_DEFAULT_ENTRY_ID: &str = "1_3bwzbc9o";
/// Distance from the live edge (ms) under which playback counts as live
pub const DISTANCE_FROM_LIVE_THRESHOLD_MS: i64 = 120_000;
/// Phoenix analytics report interval, in seconds
pub const PHOENIX_TIMER_INTERVAL_SEC: i64 = 30;

/// Inputs for the KAVA default config
#[derive(Debug, Clone, Default)]
pub struct KavaParams<'a> {
    pub partner_id: Option<i64>,
    pub ui_conf_id: Option<i64>,
    pub entry_id: Option<&'a str>,
    pub ks: Option<&'a str>,
    pub referrer: Option<&'a str>,
}

/// Build the default KAVA config
pub fn kava_defaults(params: &KavaParams<'_>) -> Value {
    let mut config = Map::new();
    config.insert("baseUrl".into(), json!(KAVA_DEFAULT_BASE_URL));
    config.insert("dvrThreshold".into(), json!(DISTANCE_FROM_LIVE_THRESHOLD_MS));
    if let Some(partner_id) = params.partner_id {
        config.insert("partnerId".into(), json!(partner_id));
    }
    if let Some(ui_conf_id) = params.ui_conf_id.filter(|id| *id > 0) {
        config.insert("uiconfId".into(), json!(ui_conf_id));
    }
    if params.partner_id == Some(KAVA_DEFAULT_PARTNER_ID) {
        config.insert("entryId".into(), json!(KAVA_DEFAULT_ENTRY_ID));
    } else if let Some(entry_id) = params.entry_id {
        config.insert("entryId".into(), json!(entry_id));
    }
    if let Some(ks) = params.ks.filter(|ks| !ks.is_empty()) {
        config.insert("ks".into(), json!(ks));
    }
    if let Some(referrer) = params.referrer.filter(|r| !r.is_empty()) {
        config.insert("referrer".into(), json!(referrer));
    }
    Value::Object(config)
}

/// Build the default Phoenix analytics config.
///
/// Returns `None` without a session token: the plugin cannot report anonymously.
pub fn phoenix_defaults(partner_id: Option<i64>, server_url: Option<&str>, ks: Option<&str>) -> Option<Value> {
    let ks = ks.filter(|ks| !ks.is_empty())?;
    Some(json!({
        "partnerId": partner_id.unwrap_or(0),
        "baseUrl": server_url.unwrap_or_default(),
        "ks": ks,
        "timerInterval": PHOENIX_TIMER_INTERVAL_SEC,
    }))
}
