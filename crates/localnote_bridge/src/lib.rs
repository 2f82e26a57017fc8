pub mod config;
pub mod dispatcher;
pub mod events;
pub mod host;
pub mod worker;

use std::sync::Arc;

use chrono::Utc;
use localnote_core::action::ActionGroupRegistry;
use localnote_core::platform::{ChannelStore, MemoryPlatform, NotificationSurface, TriggerScheduler};
use localnote_core::{ChannelRegistry, NotificationManager, NotificationRecord, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub use crate::config::BridgeConfig;
pub use crate::dispatcher::{Command, Dispatcher, Lane, Services};
pub use crate::events::{EventBridge, LaunchDetails};
pub use crate::host::{HostContext, Outcome, Reply};
pub use crate::worker::WorkerLane;

/// The OS services the bridge drives.
#[derive(Clone)]
pub struct Platform {
    pub scheduler: Arc<dyn TriggerScheduler>,
    pub surface: Arc<dyn NotificationSurface>,
    pub channels: Arc<dyn ChannelStore>,
}

impl Platform {
    pub fn in_memory(platform: Arc<MemoryPlatform>) -> Self {
        Self {
            scheduler: platform.clone(),
            surface: platform.clone(),
            channels: platform,
        }
    }
}

/// Entry point for the host: commands come in through [`execute`], OS and
/// lifecycle callbacks through the `on_*` methods.
///
/// [`execute`]: LocalNotification::execute
#[derive(Clone)]
pub struct LocalNotification {
    services: Arc<Services>,
    dispatcher: Dispatcher,
    worker: WorkerLane,
}

impl LocalNotification {
    pub fn new(config: BridgeConfig, platform: Platform) -> Result<Self> {
        let services = Arc::new(Services {
            manager: NotificationManager::new(platform.scheduler, platform.surface),
            channels: ChannelRegistry::with_default(
                platform.channels,
                config.package_name.clone(),
                config.default_channel_id.clone(),
                config.default_channel_name.clone(),
            ),
            actions: ActionGroupRegistry::new(),
            events: EventBridge::new(config.event_target.clone()),
        });
        let worker = WorkerLane::new(config.worker_threads)?;
        let dispatcher = Dispatcher::new(Arc::clone(&services), worker.clone());
        Ok(Self {
            services,
            dispatcher,
            worker,
        })
    }

    /// Install the default channel in the background.
    pub fn initialize(&self) {
        let services = Arc::clone(&self.services);
        self.worker.spawn_detached("default-channel", move || {
            services.channels.ensure_default_channel().map(|_| ())
        });
    }

    pub fn attach_host(&self, host: Arc<dyn HostContext>) {
        self.services.events.attach_host(host);
    }

    pub fn execute(&self, command: &str, args: Vec<Value>, reply: Reply) {
        self.dispatcher.execute(command, args, reply);
    }

    /// Host resumed: it can receive events from now on.
    pub fn on_resume(&self) {
        self.services.events.mark_ready();
    }

    pub fn on_destroy(&self) {
        self.services.events.teardown();
    }

    /// The OS scheduler fired `id`.
    pub fn on_trigger(&self, id: i32) -> Option<NotificationRecord> {
        let record = self.services.manager.fire(id, Utc::now())?;
        self.services.events.emit("trigger", Some(&record), Map::new());
        Some(record)
    }

    /// The user tapped the notification, or one of its actions when `action`
    /// is set. Inline replies arrive as `input`.
    pub fn on_click(&self, id: i32, action: Option<&str>, input: Option<&str>) -> Option<NotificationRecord> {
        let record = self.services.manager.get(id)?;
        let event = action.unwrap_or("click");

        let mut data = Map::new();
        if let Some(text) = input {
            data.insert("text".to_owned(), Value::String(text.to_owned()));
        }
        self.services.events.emit(event, Some(&record), data);

        let auto_clear = record
            .options
            .as_dict()
            .get("autoClear")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if auto_clear {
            debug!(id, "auto-clearing clicked notification");
            self.services.manager.clear(id);
        }
        Some(record)
    }

    /// The user swiped the notification away.
    pub fn on_dismiss(&self, id: i32) -> Option<NotificationRecord> {
        let record = self.services.manager.clear(id)?;
        self.services.events.emit("clear", Some(&record), Map::new());
        Some(record)
    }

    /// Drop all bridge gate state; records and channels are untouched.
    pub fn reset(&self) {
        info!("resetting bridge state");
        self.services.events.reset();
    }

    pub fn manager(&self) -> &NotificationManager {
        &self.services.manager
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.services.channels
    }

    pub fn events(&self) -> &EventBridge {
        &self.services.events
    }
}
