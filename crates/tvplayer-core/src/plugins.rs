//! Process-wide plugin registry
//!
//! Plugin factories are registered once per process. Each backend owns a
//! latch so constructing many players never registers twice.

use crate::config::PluginConfigs;
use crate::error::{Error, Result};
use once_cell::sync::{Lazy, OnceCell};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Name of the KAVA analytics plugin
pub const KAVA: &str = "kava";
/// Name of the Phoenix (OTT) analytics plugin
pub const PHOENIX_ANALYTICS: &str = "phoenixAnalytics";
/// Name of the IMA advertising plugin
pub const IMA: &str = "ima";
/// Name of the Youbora analytics plugin
pub const YOUBORA: &str = "youbora";

/// Schema check applied to a plugin's config before it reaches the engine
pub type ConfigValidator = fn(&Value) -> std::result::Result<(), String>;

/// A plugin the engine can load
#[derive(Debug, Clone, Copy)]
pub struct PluginFactory {
    pub name: &'static str,
    pub validate: ConfigValidator,
}

fn require_object(config: &Value) -> std::result::Result<(), String> {
    if config.is_object() {
        Ok(())
    } else {
        Err("config must be an object".to_string())
    }
}

fn require_numbers(config: &Value, keys: &[&str]) -> std::result::Result<(), String> {
    require_object(config)?;
    for key in keys {
        if let Some(value) = config.get(key) {
            if !value.is_number() {
                return Err(format!("{} must be a number", key));
            }
        }
    }
    Ok(())
}

fn validate_kava(config: &Value) -> std::result::Result<(), String> {
    require_numbers(config, &["partnerId", "uiconfId", "dvrThreshold"])
}

fn validate_phoenix(config: &Value) -> std::result::Result<(), String> {
    require_numbers(config, &["partnerId", "timerInterval"])
}

/// Plugins registered by every backend
pub const COMMON_PLUGINS: &[PluginFactory] = &[
    PluginFactory { name: KAVA, validate: validate_kava },
    PluginFactory { name: IMA, validate: require_object },
    PluginFactory { name: YOUBORA, validate: require_object },
];

pub const PHOENIX_ANALYTICS_PLUGIN: PluginFactory = PluginFactory {
    name: PHOENIX_ANALYTICS,
    validate: validate_phoenix,
};

pub const KAVA_PLUGIN: PluginFactory = PluginFactory {
    name: KAVA,
    validate: validate_kava,
};

/// Registered plugin factories, keyed by name
#[derive(Debug, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<&'static str, PluginFactory>,
}

static REGISTRY: Lazy<Mutex<PluginRegistry>> = Lazy::new(|| Mutex::new(PluginRegistry::default()));

impl PluginRegistry {
    /// Lock the process-wide registry
    pub fn global() -> MutexGuard<'static, PluginRegistry> {
        // Registration never panics while holding the lock, so a poisoned
        // registry still holds consistent data.
        REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&mut self, factory: PluginFactory) {
        if self.factories.insert(factory.name, factory).is_none() {
            debug!(plugin = factory.name, "Plugin registered");
        }
    }

    pub fn register_all(&mut self, factories: &[PluginFactory]) {
        for factory in factories {
            self.register(*factory);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Validate one config against its factory's schema
    pub fn validate(&self, name: &str, config: &Value) -> Result<()> {
        match self.factories.get(name) {
            Some(factory) => (factory.validate)(config).map_err(|reason| Error::InvalidPluginConfig {
                plugin: name.to_string(),
                reason,
            }),
            None => require_object(config).map_err(|reason| Error::InvalidPluginConfig {
                plugin: name.to_string(),
                reason,
            }),
        }
    }

    /// Keep the configs that pass validation; others are dropped with a warning
    pub fn validate_for_registration(&self, configs: &PluginConfigs) -> PluginConfigs {
        configs
            .iter()
            .filter(|(name, config)| {
                if !self.is_registered(name) {
                    debug!(plugin = %name, "Config for unregistered plugin will be ignored by the engine");
                }
                match self.validate(name, config) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(plugin = %name, error = %e, "Dropping invalid plugin config");
                        false
                    }
                }
            })
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }
}

/// One-time registration latch.
///
/// Callers racing the first registration block until it has finished.
#[derive(Debug)]
pub struct RegistrationLatch {
    name: &'static str,
    done: OnceCell<()>,
}

impl RegistrationLatch {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            done: OnceCell::new(),
        }
    }

    /// Run `register` the first time only. Returns whether it ran.
    pub fn register_once(&self, register: impl FnOnce(&mut PluginRegistry)) -> bool {
        let mut ran = false;
        self.done.get_or_init(|| {
            register(&mut PluginRegistry::global());
            info!(latch = self.name, "Plugins registered");
            ran = true;
        });
        ran
    }

    pub fn is_done(&self) -> bool {
        self.done.get().is_some()
    }
}
