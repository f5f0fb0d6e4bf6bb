//! Plugin configuration sets and the configuration merger
//!
//! Three sources feed the final set handed to the engine:
//! - application-supplied configs (`InitOptions::plugin_configs`)
//! - the `config.player.plugins` section of a remote UI configuration
//! - built-in defaults for the analytics plugins a backend manages
//!
//! Application values win over remote values key by key, remote-only keys are
//! filled in, and defaults only apply to plugins neither source mentioned.
//! The merge is shallow: nested objects are taken whole from whichever source
//! supplied the top-level key.

use crate::token::TokenResolver;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Ordered mapping of plugin name to configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfigs(Map<String, Value>);

impl PluginConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the config of one plugin
    pub fn set(&mut self, name: impl Into<String>, config: Value) {
        self.0.insert(name.into(), config);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn has_config(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve tokens in every config
    pub fn resolve(&self, resolver: &TokenResolver) -> PluginConfigs {
        self.0
            .iter()
            .map(|(name, config)| (name.clone(), resolver.resolve_value(config)))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl FromIterator<(String, Value)> for PluginConfigs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Map<String, Value>> for PluginConfigs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for PluginConfigs {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Fill the keys of `secondary` missing from `primary`.
///
/// Either side may be absent; when both are, the result is `None`.
pub fn merge_config_objects(
    primary: Option<&Map<String, Value>>,
    secondary: Option<&Map<String, Value>>,
) -> Option<Map<String, Value>> {
    match (primary, secondary) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(s)) => Some(s.clone()),
        (Some(p), Some(s)) => {
            let mut merged = p.clone();
            for (key, value) in s {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(merged)
        }
    }
}

/// Combine application, remote and default plugin configs.
///
/// Values that are not JSON objects are skipped with a warning.
pub fn merge_plugin_configs(
    app: &PluginConfigs,
    remote: Option<&Map<String, Value>>,
    defaults: &PluginConfigs,
) -> PluginConfigs {
    let mut combined = PluginConfigs::new();

    for (name, config) in app.iter() {
        let Some(app_config) = config.as_object() else {
            warn!(plugin = %name, "Ignoring non-object application plugin config");
            continue;
        };

        let remote_config = remote.and_then(|r| r.get(name)).and_then(|v| {
            if v.is_object() {
                v.as_object()
            } else {
                warn!(plugin = %name, "Ignoring invalid UI configuration format for plugin");
                None
            }
        });

        if let Some(merged) = merge_config_objects(Some(app_config), remote_config) {
            combined.set(name.clone(), Value::Object(merged));
        }
    }

    // Plugins only mentioned by the remote configuration
    if let Some(remote) = remote {
        for (name, config) in remote {
            if combined.has_config(name) || app.has_config(name) {
                continue;
            }
            match config {
                Value::Object(map) => combined.set(name.clone(), Value::Object(map.clone())),
                _ => warn!(plugin = %name, "Ignoring invalid UI configuration format for plugin"),
            }
        }
    }

    for (name, config) in defaults.iter() {
        let remote_has = remote.is_some_and(|r| r.contains_key(name.as_str()));
        if combined.has_config(name) || app.has_config(name) || remote_has {
            continue;
        }
        debug!(plugin = %name, "Adding default plugin config");
        combined.set(name.clone(), config.clone());
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configs(value: Value) -> PluginConfigs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_app_wins_and_remote_fills() {
        let app = configs(json!({"kava": {"foo": 1}}));
        let remote = json!({"kava": {"foo": 2, "bar": 3}});

        let merged = merge_plugin_configs(&app, remote.as_object(), &PluginConfigs::new());
        assert_eq!(merged.to_json(), json!({"kava": {"foo": 1, "bar": 3}}));
    }

    #[test]
    fn test_remote_only_plugin_copied() {
        let app = configs(json!({"ima": {"adTagUrl": "x"}}));
        let remote = json!({"youbora": {"accountCode": "acme"}});

        let merged = merge_plugin_configs(&app, remote.as_object(), &PluginConfigs::new());
        assert_eq!(merged.get("youbora"), Some(&json!({"accountCode": "acme"})));
        assert_eq!(merged.get("ima"), Some(&json!({"adTagUrl": "x"})));
    }

    #[test]
    fn test_merge_is_shallow() {
        let app = configs(json!({"ima": {"nested": {"a": 1}}}));
        let remote = json!({"ima": {"nested": {"a": 2, "b": 2}, "top": true}});

        let merged = merge_plugin_configs(&app, remote.as_object(), &PluginConfigs::new());
        assert_eq!(merged.get("ima"), Some(&json!({"nested": {"a": 1}, "top": true})));
    }

    #[test]
    fn test_defaults_only_for_unconfigured_plugins() {
        let defaults = configs(json!({
            "kava": {"partnerId": 2504201},
            "phoenixAnalytics": {"timerInterval": 30}
        }));
        let app = configs(json!({"kava": {"partnerId": 100}}));
        let remote = json!({"phoenixAnalytics": {"timerInterval": 10}});

        let merged = merge_plugin_configs(&app, remote.as_object(), &defaults);
        assert_eq!(merged.get("kava"), Some(&json!({"partnerId": 100})));
        assert_eq!(merged.get("phoenixAnalytics"), Some(&json!({"timerInterval": 10})));

        let merged = merge_plugin_configs(&PluginConfigs::new(), None, &defaults);
        assert_eq!(merged, defaults);
    }

    #[test]
    fn test_non_object_configs_skipped() {
        let app = configs(json!({"kava": "not an object", "ima": {"a": 1}}));
        let remote = json!({"youbora": [1, 2], "ima": 5});
        let defaults = configs(json!({"kava": {"partnerId": 1}}));

        let merged = merge_plugin_configs(&app, remote.as_object(), &defaults);
        assert!(!merged.has_config("youbora"));
        assert_eq!(merged.get("ima"), Some(&json!({"a": 1})));
        // An explicit (if malformed) app config still suppresses the default
        assert!(!merged.has_config("kava"));
    }

    #[test]
    fn test_merge_config_objects_sides() {
        let a = json!({"x": 1});
        assert_eq!(merge_config_objects(None, None), None);
        assert_eq!(
            merge_config_objects(a.as_object(), None).map(Value::Object),
            Some(json!({"x": 1}))
        );
        assert_eq!(
            merge_config_objects(None, a.as_object()).map(Value::Object),
            Some(json!({"x": 1}))
        );
    }

    #[test]
    fn test_resolve_configs() {
        let mut resolver = TokenResolver::new();
        resolver.refresh_pair("entryId", "E1");
        let app = configs(json!({"youbora": {"extraParams": {"param1": "{{entryId}}"}}}));

        let resolved = app.resolve(&resolver);
        assert_eq!(resolved.get("youbora"), Some(&json!({"extraParams": {"param1": "E1"}})));
    }
}
