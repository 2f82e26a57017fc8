use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{NotifyError, Result};
use crate::platform::ChannelStore;

pub const DEFAULT_CHANNEL_ID: &str = "lm_default_channel";
pub const DEFAULT_CHANNEL_NAME: &str = "Default";

pub const IMPORTANCE_HIGH: i32 = 4;
pub const VISIBILITY_PUBLIC: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Light {
    pub enabled: bool,
    /// ARGB colour, `None` leaves the system colour.
    pub color: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "uri", rename_all = "lowercase")]
pub enum Sound {
    Default,
    Ringtone,
    Custom(String),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Vibration {
    Enabled(bool),
    Pattern(Vec<u64>),
}

impl Vibration {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Pattern(_) => true,
        }
    }
}

/// Fully resolved presentation policy for a notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub importance: i32,
    pub light: Light,
    pub visibility: i32,
    pub badge: bool,
    pub sound: Sound,
    pub vibration: Vibration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
}

impl Channel {
    /// Resolve a host channel config, applying the documented defaults.
    /// `package` is used to build resource URIs for custom sounds.
    pub fn resolve(config: &Map<String, Value>, package: &str) -> Result<Self> {
        let id = match config.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(NotifyError::validation("channel config requires an `id`")),
        };
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let importance = opt_i32(config, "importance").unwrap_or(IMPORTANCE_HIGH);
        let light = Light {
            enabled: config.get("light").and_then(Value::as_bool).unwrap_or(true),
            color: opt_i32(config, "lightColor").filter(|color| *color != -1),
        };
        let visibility = opt_i32(config, "visibility").unwrap_or(VISIBILITY_PUBLIC);
        let badge = config.get("badge").and_then(Value::as_bool).unwrap_or(true);

        Ok(Self {
            id,
            name,
            importance,
            light,
            visibility,
            badge,
            sound: resolve_sound(config.get("sound"), package),
            vibration: resolve_vibration(config.get("vibration")),
        })
    }

    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

fn opt_i32(config: &Map<String, Value>, key: &str) -> Option<i32> {
    config
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|value| i32::try_from(value).ok())
}

fn resolve_sound(value: Option<&Value>, package: &str) -> Sound {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(true)) => Sound::Default,
        Some(Value::Bool(false)) => Sound::None,
        Some(Value::String(sound)) => match sound.as_str() {
            "default" => Sound::Default,
            "ringtone" => Sound::Ringtone,
            "" | "false" => Sound::None,
            custom => Sound::Custom(format!("android.resource://{package}/raw/{custom}")),
        },
        Some(other) => {
            warn!(sound = %other, "unsupported sound option, using default");
            Sound::Default
        }
    }
}

fn resolve_vibration(value: Option<&Value>) -> Vibration {
    match value {
        Some(Value::Array(steps)) => {
            Vibration::Pattern(steps.iter().map(|step| step.as_u64().unwrap_or(0)).collect())
        }
        Some(Value::Bool(enabled)) => Vibration::Enabled(*enabled),
        _ => Vibration::Enabled(true),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DefaultChannel {
    id: String,
    name: String,
}

/// Owns channel definitions on the platform channel store and tracks which
/// one is the default.
pub struct ChannelRegistry {
    store: Arc<dyn ChannelStore>,
    package: String,
    default: Mutex<DefaultChannel>,
}

impl ChannelRegistry {
    pub fn new(store: Arc<dyn ChannelStore>, package: impl Into<String>) -> Self {
        Self::with_default(store, package, DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_NAME)
    }

    pub fn with_default(
        store: Arc<dyn ChannelStore>,
        package: impl Into<String>,
        default_id: impl Into<String>,
        default_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            package: package.into(),
            default: Mutex::new(DefaultChannel {
                id: default_id.into(),
                name: default_name.into(),
            }),
        }
    }

    pub fn default_channel_id(&self) -> String {
        self.default.lock().id.clone()
    }

    pub fn default_channel_name(&self) -> String {
        self.default.lock().name.clone()
    }

    /// Register the default channel with the store, replacing any previous
    /// definition under the same id.
    pub fn ensure_default_channel(&self) -> Result<Option<Channel>> {
        let default = self.default.lock().clone();
        let mut config = Map::new();
        config.insert("id".to_owned(), Value::String(default.id));
        config.insert("name".to_owned(), Value::String(default.name));
        self.create_channel(&config)
    }

    /// Create or replace a channel. Returns `None` when the platform has no
    /// channel support.
    #[instrument(skip(self, config))]
    pub fn create_channel(&self, config: &Map<String, Value>) -> Result<Option<Channel>> {
        let channel = Channel::resolve(config, &self.package)?;
        if !self.store.supports_channels() {
            debug!(id = %channel.id, "channels unsupported, skipping create");
            return Ok(None);
        }
        self.install(&channel)?;
        Ok(Some(channel))
    }

    fn install(&self, channel: &Channel) -> Result<()> {
        info!(id = %channel.id, name = %channel.name, "creating channel");
        if self.store.get(&channel.id).is_some() {
            self.store.delete(&channel.id)?;
        }
        debug!(?channel, "resolved channel");
        self.store.create(channel)
    }

    #[instrument(skip(self))]
    pub fn delete_channel(&self, id: &str) -> Result<()> {
        if !self.store.supports_channels() {
            return Ok(());
        }
        if self.store.get(id).is_none() {
            return Ok(());
        }
        info!(id, "deleting channel");
        self.store.delete(id)
    }

    /// Replace the default channel. The new definition is resolved before the
    /// old one is removed; if installing it fails the previous default, and any
    /// channel that already held the new id, are put back and the failure is
    /// returned.
    #[instrument(skip(self, config))]
    pub fn set_default_channel(&self, config: &Map<String, Value>) -> Result<Option<Channel>> {
        let mut default = self.default.lock();

        let mut resolved = config.clone();
        let id = match config.get("id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => default.id.clone(),
        };
        let name = match config.get("name").and_then(Value::as_str) {
            Some(name) => name.to_owned(),
            None => default.name.clone(),
        };
        resolved.insert("id".to_owned(), Value::String(id.clone()));
        resolved.insert("name".to_owned(), Value::String(name.clone()));
        let channel = Channel::resolve(&resolved, &self.package)?;

        if !self.store.supports_channels() {
            *default = DefaultChannel { id, name };
            return Ok(None);
        }

        let previous = self.store.get(&default.id);
        let displaced = if channel.id == default.id {
            None
        } else {
            self.store.get(&channel.id)
        };
        if previous.is_some() {
            self.store.delete(&default.id)?;
        }

        if let Err(err) = self.install(&channel) {
            warn!(%err, previous = %default.id, "default channel replacement failed, restoring");
            for old in previous.into_iter().chain(displaced) {
                if self.store.get(&old.id).is_some() {
                    continue;
                }
                if let Err(restore_err) = self.store.create(&old) {
                    return Err(NotifyError::internal(format!(
                        "failed to install default channel `{}` ({err}); restoring `{}` also failed: {restore_err}",
                        channel.id, old.id
                    )));
                }
            }
            return Err(NotifyError::internal(format!(
                "failed to install default channel `{}`: {err}",
                channel.id
            )));
        }

        *default = DefaultChannel { id, name };
        Ok(Some(channel))
    }

    pub fn list_channels(&self) -> Vec<ChannelSummary> {
        if !self.store.supports_channels() {
            return Vec::new();
        }
        self.store.list().iter().map(Channel::summary).collect()
    }

    pub fn channel_exists(&self, id: &str) -> bool {
        self.store.supports_channels() && self.store.get(id).is_some()
    }

    pub fn channel(&self, id: &str) -> Option<Channel> {
        if !self.store.supports_channels() {
            return None;
        }
        self.store.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;
    use serde_json::json;

    const PACKAGE: &str = "com.example.app";

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn registry() -> (Arc<MemoryPlatform>, ChannelRegistry) {
        let platform = Arc::new(MemoryPlatform::new());
        let registry = ChannelRegistry::new(platform.clone(), PACKAGE);
        (platform, registry)
    }

    #[test]
    fn resolve_applies_defaults() {
        let channel = Channel::resolve(&config(json!({"id": "c1"})), PACKAGE).unwrap();
        assert_eq!(channel.importance, IMPORTANCE_HIGH);
        assert_eq!(channel.visibility, VISIBILITY_PUBLIC);
        assert_eq!(channel.light, Light { enabled: true, color: None });
        assert!(channel.badge);
        assert_eq!(channel.sound, Sound::Default);
        assert_eq!(channel.vibration, Vibration::Enabled(true));
    }

    #[test]
    fn resolve_requires_id() {
        let err = Channel::resolve(&config(json!({"name": "nameless"})), PACKAGE).unwrap_err();
        assert!(matches!(err, NotifyError::Validation(_)));
    }

    #[test]
    fn sound_modes() {
        let sound = |value: Value| {
            Channel::resolve(&config(json!({"id": "c", "sound": value})), PACKAGE)
                .unwrap()
                .sound
        };
        assert_eq!(sound(json!("ringtone")), Sound::Ringtone);
        assert_eq!(sound(json!("default")), Sound::Default);
        assert_eq!(sound(json!("false")), Sound::None);
        assert_eq!(sound(json!(false)), Sound::None);
        assert_eq!(
            sound(json!("chime")),
            Sound::Custom("android.resource://com.example.app/raw/chime".into())
        );
    }

    #[test]
    fn vibration_pattern_forces_enabled() {
        let channel = Channel::resolve(
            &config(json!({"id": "c", "vibration": [0, 250, 100, 250]})),
            PACKAGE,
        )
        .unwrap();
        assert_eq!(channel.vibration, Vibration::Pattern(vec![0, 250, 100, 250]));
        assert!(channel.vibration.is_enabled());

        let quiet = Channel::resolve(&config(json!({"id": "c", "vibration": false})), PACKAGE)
            .unwrap();
        assert!(!quiet.vibration.is_enabled());
    }

    #[test]
    fn create_with_same_id_replaces() {
        let (_platform, registry) = registry();
        registry
            .create_channel(&config(json!({"id": "c1", "name": "first"})))
            .unwrap();
        registry
            .create_channel(&config(json!({"id": "c1", "name": "second", "badge": false})))
            .unwrap();

        let channels = registry.list_channels();
        let matching: Vec<_> = channels.iter().filter(|c| c.id == "c1").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].name, "second");
        assert!(!registry.channel("c1").unwrap().badge);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_platform, registry) = registry();
        registry.create_channel(&config(json!({"id": "gone"}))).unwrap();
        registry.delete_channel("gone").unwrap();
        registry.delete_channel("gone").unwrap();
        assert!(!registry.channel_exists("gone"));
    }

    #[test]
    fn set_default_replaces_previous_default() {
        let (_platform, registry) = registry();
        registry.ensure_default_channel().unwrap();
        assert!(registry.channel_exists(DEFAULT_CHANNEL_ID));

        registry
            .set_default_channel(&config(json!({"id": "custom"})))
            .unwrap();

        assert!(!registry.channel_exists(DEFAULT_CHANNEL_ID));
        assert!(registry.channel_exists("custom"));
        assert_eq!(registry.default_channel_id(), "custom");
        assert_eq!(registry.default_channel_name(), DEFAULT_CHANNEL_NAME);
    }

    #[test]
    fn unsupported_platform_is_a_silent_noop() {
        let platform = Arc::new(MemoryPlatform::new().without_channel_support());
        let registry = ChannelRegistry::new(platform, PACKAGE);
        assert!(registry
            .create_channel(&config(json!({"id": "c1"})))
            .unwrap()
            .is_none());
        assert!(registry.list_channels().is_empty());
        assert!(!registry.channel_exists("c1"));
        registry.delete_channel("c1").unwrap();
    }

    struct RejectingStore {
        inner: MemoryPlatform,
        reject: String,
    }

    impl ChannelStore for RejectingStore {
        fn create(&self, channel: &Channel) -> Result<()> {
            if channel.name == self.reject {
                return Err(NotifyError::internal("store refused channel"));
            }
            self.inner.create(channel)
        }

        fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id)
        }

        fn get(&self, id: &str) -> Option<Channel> {
            self.inner.get(id)
        }

        fn list(&self) -> Vec<Channel> {
            self.inner.list()
        }
    }

    #[test]
    fn failed_default_replacement_restores_previous() {
        let store = Arc::new(RejectingStore {
            inner: MemoryPlatform::new(),
            reject: "Broken".into(),
        });
        let registry = ChannelRegistry::new(store, PACKAGE);
        registry.ensure_default_channel().unwrap();

        let err = registry
            .set_default_channel(&config(json!({"id": "broken", "name": "Broken"})))
            .unwrap_err();

        assert!(matches!(err, NotifyError::Internal(_)));
        assert!(registry.channel_exists(DEFAULT_CHANNEL_ID));
        assert_eq!(registry.default_channel_id(), DEFAULT_CHANNEL_ID);
    }

    #[test]
    fn failed_default_replacement_restores_channel_holding_new_id() {
        let store = Arc::new(RejectingStore {
            inner: MemoryPlatform::new(),
            reject: "Broken".into(),
        });
        let registry = ChannelRegistry::new(store, PACKAGE);
        registry.ensure_default_channel().unwrap();
        registry
            .create_channel(&config(json!({"id": "alerts", "name": "Alerts"})))
            .unwrap();

        registry
            .set_default_channel(&config(json!({"id": "alerts", "name": "Broken"})))
            .unwrap_err();

        assert_eq!(registry.channel("alerts").unwrap().name, "Alerts");
        assert!(registry.channel_exists(DEFAULT_CHANNEL_ID));
        assert_eq!(registry.default_channel_id(), DEFAULT_CHANNEL_ID);
    }
}
