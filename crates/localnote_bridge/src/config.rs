use localnote_core::channel::{DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_NAME};
use localnote_core::Result;
use tracing::{info, warn};

pub const DEFAULT_EVENT_TARGET: &str = "cordova.plugins.notification.local.fireEvent";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub default_channel_id: String,
    pub default_channel_name: String,
    /// Application package used to resolve custom sound resources.
    pub package_name: String,
    /// Host function that receives delivered events.
    pub event_target: String,
    pub worker_threads: usize,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(id) = std::env::var("LOCAL_NOTIFY_DEFAULT_CHANNEL_ID") {
            if !id.trim().is_empty() {
                config.default_channel_id = id.trim().to_owned();
            }
        }
        if let Ok(name) = std::env::var("LOCAL_NOTIFY_DEFAULT_CHANNEL_NAME") {
            if !name.trim().is_empty() {
                config.default_channel_name = name.trim().to_owned();
            }
        }
        if let Ok(package) = std::env::var("LOCAL_NOTIFY_PACKAGE") {
            if !package.trim().is_empty() {
                config.package_name = package.trim().to_owned();
            }
        }
        if let Ok(target) = std::env::var("LOCAL_NOTIFY_EVENT_TARGET") {
            if !target.trim().is_empty() {
                config.event_target = target.trim().to_owned();
            }
        }
        if let Ok(threads) = std::env::var("LOCAL_NOTIFY_WORKER_THREADS") {
            match threads.trim().parse::<usize>() {
                Ok(value) if value > 0 => config.worker_threads = value,
                _ => warn!(value = %threads, "ignoring invalid worker thread count"),
            }
        }
        info!(
            default_channel = %config.default_channel_id,
            workers = config.worker_threads,
            "bridge configuration loaded"
        );
        Ok(config)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_channel_id: DEFAULT_CHANNEL_ID.to_owned(),
            default_channel_name: DEFAULT_CHANNEL_NAME.to_owned(),
            package_name: "localnote".to_owned(),
            event_target: DEFAULT_EVENT_TARGET.to_owned(),
            worker_threads: 2,
        }
    }
}
