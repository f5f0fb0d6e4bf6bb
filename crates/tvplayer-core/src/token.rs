//! Placeholder token resolution for plugin configurations
//!
//! Plugin configs may carry `{{key}}` placeholders (`{{entryId}}`, `{{ks}}`,
//! `{{partnerId}}`, ...). The resolver keeps the current value of each token
//! and substitutes them into strings or into string leaves of a JSON document.

use crate::options::InitOptions;
use crate::types::MediaEntry;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Wrap a key as a `{{key}}` token
pub fn token(key: &str) -> String {
    format!("{}{}{}", OPEN, key, CLOSE)
}

/// Token map with substitution support
#[derive(Debug, Clone, Default)]
pub struct TokenResolver {
    map: HashMap<String, String>,
    /// (token, value) pairs derived from `map`, regenerated as a whole
    pairs: Vec<(String, String)>,
}

impl TokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every token
    pub fn clear(&mut self) {
        self.map.clear();
        self.rebuild();
    }

    /// Ingest the tokens derived from a media entry
    pub fn refresh_entry(&mut self, entry: &MediaEntry) {
        for (key, value) in &entry.metadata {
            self.map.insert(token(key), value.clone());
        }
        self.map.insert(token("entryId"), entry.id.clone());
        if let Some(ref name) = entry.name {
            self.map.insert(token("entryName"), name.clone());
        }
        self.map.insert(token("entryType"), entry.media_type.to_string());
        self.rebuild();
    }

    /// Ingest the tokens derived from init options
    pub fn refresh_options(&mut self, options: &InitOptions) {
        if let Some(ui_conf_id) = options.ui_conf_id {
            self.map.insert(token("uiConfId"), ui_conf_id.to_string());
        }
        if let Some(partner_id) = options.partner_id {
            self.map.insert(token("partnerId"), partner_id.to_string());
        }
        self.map.insert(token("ks"), options.ks.clone().unwrap_or_default());
        self.map
            .insert(token("referrer"), options.referrer.clone().unwrap_or_default());
        self.rebuild();
    }

    /// Set a single `{{key}}` token. Empty keys are ignored.
    pub fn refresh_pair(&mut self, key: &str, value: impl Into<String>) {
        if !key.is_empty() {
            self.map.insert(token(key), value.into());
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.pairs = self
            .map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        debug!(tokens = self.pairs.len(), "Token map refreshed");
    }

    /// Current value for a `{{key}}` token
    pub fn get(&self, token: &str) -> Option<&str> {
        self.map.get(token).map(String::as_str)
    }

    /// (token, value) pairs, index aligned
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Replace every known token in `text`.
    ///
    /// Substitution is literal and single-pass: values are never rescanned,
    /// and tokens without a value are left as they are.
    pub fn resolve_str(&self, text: &str) -> String {
        if self.pairs.is_empty() || !text.contains(OPEN) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];

            let matched = candidate[OPEN.len()..].find(CLOSE).and_then(|end| {
                let tok = &candidate[..OPEN.len() + end + CLOSE.len()];
                self.map.get(tok).map(|value| (tok.len(), value))
            });

            match matched {
                Some((len, value)) => {
                    out.push_str(value);
                    rest = &candidate[len..];
                }
                None => {
                    // Step over one '{' so "{{{key}}" still finds "{{key}}"
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Resolve tokens inside every string leaf of a JSON value.
    ///
    /// Keys and non-string scalars are left untouched, so the result is
    /// always a well-formed document.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
