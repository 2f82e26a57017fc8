use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

use crate::channel::Channel;
use crate::error::Result;
use crate::record::NotificationRecord;

/// OS alarm service. Implementations call back into the bridge's trigger
/// entry point when a registration comes due.
pub trait TriggerScheduler: Send + Sync {
    fn register(&self, id: i32, fire_at: DateTime<Utc>);
    fn unregister(&self, id: i32);
}

/// OS notification tray.
pub trait NotificationSurface: Send + Sync {
    fn present(&self, record: &NotificationRecord);
    fn dismiss(&self, id: i32);
    fn dismiss_all(&self);
    fn has_permission(&self) -> bool;
}

/// OS-level channel storage.
pub trait ChannelStore: Send + Sync {
    /// Older platforms have no notion of channels at all.
    fn supports_channels(&self) -> bool {
        true
    }
    fn create(&self, channel: &Channel) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn get(&self, id: &str) -> Option<Channel>;
    fn list(&self) -> Vec<Channel>;
}

/// In-process stand-in for the OS services, used by tests and the host
/// simulator.
#[derive(Debug)]
pub struct MemoryPlatform {
    alarms: Mutex<BTreeMap<i32, DateTime<Utc>>>,
    presented: Mutex<BTreeSet<i32>>,
    channels: Mutex<Vec<Channel>>,
    permission: bool,
    channel_support: bool,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            alarms: Mutex::new(BTreeMap::new()),
            presented: Mutex::new(BTreeSet::new()),
            channels: Mutex::new(Vec::new()),
            permission: true,
            channel_support: true,
        }
    }

    pub fn without_permission(mut self) -> Self {
        self.permission = false;
        self
    }

    pub fn without_channel_support(mut self) -> Self {
        self.channel_support = false;
        self
    }

    pub fn pending(&self) -> Vec<(i32, DateTime<Utc>)> {
        self.alarms.lock().iter().map(|(id, at)| (*id, *at)).collect()
    }

    /// Remove and return every registration due at or before `now`, ordered
    /// by fire time.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<i32> {
        let mut alarms = self.alarms.lock();
        let mut due: Vec<(DateTime<Utc>, i32)> = alarms
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            alarms.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn presented(&self) -> Vec<i32> {
        self.presented.lock().iter().copied().collect()
    }
}

impl TriggerScheduler for MemoryPlatform {
    fn register(&self, id: i32, fire_at: DateTime<Utc>) {
        trace!(id, %fire_at, "alarm registered");
        self.alarms.lock().insert(id, fire_at);
    }

    fn unregister(&self, id: i32) {
        trace!(id, "alarm unregistered");
        self.alarms.lock().remove(&id);
    }
}

impl NotificationSurface for MemoryPlatform {
    fn present(&self, record: &NotificationRecord) {
        self.presented.lock().insert(record.id);
    }

    fn dismiss(&self, id: i32) {
        self.presented.lock().remove(&id);
    }

    fn dismiss_all(&self) {
        self.presented.lock().clear();
    }

    fn has_permission(&self) -> bool {
        self.permission
    }
}

impl ChannelStore for MemoryPlatform {
    fn supports_channels(&self) -> bool {
        self.channel_support
    }

    fn create(&self, channel: &Channel) -> Result<()> {
        let mut channels = self.channels.lock();
        channels.retain(|existing| existing.id != channel.id);
        channels.push(channel.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.channels.lock().retain(|existing| existing.id != id);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Channel> {
        self.channels
            .lock()
            .iter()
            .find(|existing| existing.id == id)
            .cloned()
    }

    fn list(&self) -> Vec<Channel> {
        self.channels.lock().clone()
    }
}
