use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::options::NotificationOptions;
use crate::platform::{NotificationSurface, TriggerScheduler};
use crate::record::{NotificationRecord, NotificationType, Transition};

/// A notification ready to hand to the scheduler, with its trigger resolved
/// against the time the request was made.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    options: NotificationOptions,
    first_fire: Option<DateTime<Utc>>,
}

impl Request {
    pub fn new(options: NotificationOptions, now: DateTime<Utc>) -> Self {
        let first_fire = options.trigger().first_fire(now);
        Self {
            options,
            first_fire,
        }
    }

    pub fn id(&self) -> i32 {
        self.options.id()
    }
}

/// Holds every known notification record and keeps the OS scheduler and
/// notification tray in step with it.
pub struct NotificationManager {
    records: RwLock<BTreeMap<i32, NotificationRecord>>,
    scheduler: Arc<dyn TriggerScheduler>,
    surface: Arc<dyn NotificationSurface>,
}

impl NotificationManager {
    pub fn new(scheduler: Arc<dyn TriggerScheduler>, surface: Arc<dyn NotificationSurface>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            scheduler,
            surface,
        }
    }

    /// Store and register a notification. An existing record with the same id
    /// is cancelled first.
    #[instrument(skip(self, request), fields(id = request.id()))]
    pub fn schedule(&self, request: Request) -> NotificationRecord {
        let Request {
            options,
            first_fire,
        } = request;
        let record = NotificationRecord::new(options, first_fire);
        let id = record.id;

        let replaced = self.records.write().insert(id, record.clone());
        if replaced.is_some() {
            debug!(id, "replacing existing notification");
            self.scheduler.unregister(id);
            self.surface.dismiss(id);
        }

        match record.next_fire {
            Some(at) => {
                info!(id, fire_at = %at, "notification scheduled");
                self.scheduler.register(id, at);
            }
            None => debug!(id, "notification has no upcoming occurrence"),
        }
        record
    }

    /// Merge `partial` into the stored options. Unknown ids yield `Ok(None)`.
    #[instrument(skip(self, partial))]
    pub fn update(
        &self,
        id: i32,
        partial: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<NotificationRecord>> {
        let (snapshot, trigger_changed) = {
            let mut records = self.records.write();
            let Some(record) = records.get_mut(&id) else {
                return Ok(None);
            };
            let trigger_changed = record.options.merge(partial)?;
            if trigger_changed {
                record.next_fire = record.trigger().first_fire(now);
                record.occurrences = 0;
                record.transition(Transition::Reschedule);
            }
            (record.clone(), trigger_changed)
        };

        if trigger_changed {
            debug!(id, "trigger changed, re-registering");
            self.scheduler.unregister(id);
            self.surface.dismiss(id);
            if let Some(at) = snapshot.next_fire {
                self.scheduler.register(id, at);
            }
        }
        Ok(Some(snapshot))
    }

    /// Remove a record and prevent it from firing.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: i32) -> Option<NotificationRecord> {
        let record = self.records.write().remove(&id)?;
        self.scheduler.unregister(id);
        self.surface.dismiss(id);
        info!(id, "notification cancelled");
        Some(record)
    }

    pub fn cancel_all(&self) -> Vec<NotificationRecord> {
        let records = std::mem::take(&mut *self.records.write());
        for id in records.keys() {
            self.scheduler.unregister(*id);
        }
        self.surface.dismiss_all();
        info!(count = records.len(), "all notifications cancelled");
        records.into_values().collect()
    }

    /// Dismiss the presented notification. Triggered records without a future
    /// occurrence are dropped, anything still schedulable is kept.
    #[instrument(skip(self))]
    pub fn clear(&self, id: i32) -> Option<NotificationRecord> {
        let (snapshot, removed) = {
            let mut records = self.records.write();
            if Self::is_spent(records.get(&id)?) {
                (records.remove(&id)?, true)
            } else {
                let record = records.get_mut(&id)?;
                record.transition(Transition::Dismiss);
                (record.clone(), false)
            }
        };

        self.surface.dismiss(id);
        if removed {
            self.scheduler.unregister(id);
        }
        debug!(id, removed, "notification cleared");
        Some(snapshot)
    }

    /// Dismiss everything in the tray. Returns the records that had been
    /// triggered.
    pub fn clear_all(&self) -> Vec<NotificationRecord> {
        let cleared = {
            let mut records = self.records.write();
            let triggered: Vec<i32> = records
                .values()
                .filter(|record| record.kind == NotificationType::Triggered)
                .map(|record| record.id)
                .collect();

            let mut cleared = Vec::with_capacity(triggered.len());
            for id in triggered {
                let spent = records.get(&id).is_some_and(Self::is_spent);
                if spent {
                    if let Some(record) = records.remove(&id) {
                        cleared.push(record);
                    }
                } else if let Some(record) = records.get_mut(&id) {
                    record.transition(Transition::Dismiss);
                    cleared.push(record.clone());
                }
            }
            cleared
        };

        self.surface.dismiss_all();
        info!(count = cleared.len(), "all notifications cleared");
        cleared
    }

    /// OS trigger entry point. Records cancelled in the meantime are ignored.
    #[instrument(skip(self))]
    pub fn fire(&self, id: i32, now: DateTime<Utc>) -> Option<NotificationRecord> {
        let snapshot = {
            let mut records = self.records.write();
            let Some(record) = records.get_mut(&id) else {
                debug!(id, "trigger for unknown notification dropped");
                return None;
            };
            if !record.transition(Transition::Fire) {
                return None;
            }
            record.occurrences += 1;
            let last = record.next_fire.unwrap_or(now);
            record.next_fire = record.trigger().next_fire(last, record.occurrences);
            record.clone()
        };

        self.surface.present(&snapshot);
        if let Some(at) = snapshot.next_fire {
            self.scheduler.register(id, at);
        }
        info!(id, occurrence = snapshot.occurrences, "notification triggered");
        Some(snapshot)
    }

    fn is_spent(record: &NotificationRecord) -> bool {
        record.kind == NotificationType::Triggered && !record.is_schedulable()
    }

    pub fn get(&self, id: i32) -> Option<NotificationRecord> {
        self.records.read().get(&id).cloned()
    }

    pub fn type_of(&self, id: i32) -> NotificationType {
        self.records
            .read()
            .get(&id)
            .map(|record| record.kind)
            .unwrap_or(NotificationType::Unknown)
    }

    pub fn ids(&self) -> Vec<i32> {
        self.records.read().keys().copied().collect()
    }

    pub fn ids_by_type(&self, kind: NotificationType) -> Vec<i32> {
        self.records
            .read()
            .values()
            .filter(|record| record.kind == kind)
            .map(|record| record.id)
            .collect()
    }

    pub fn options_of(&self, id: i32) -> Option<Value> {
        self.records.read().get(&id).map(NotificationRecord::to_json)
    }

    pub fn options(&self) -> Vec<Value> {
        self.records
            .read()
            .values()
            .map(NotificationRecord::to_json)
            .collect()
    }

    pub fn options_by_type(&self, kind: NotificationType) -> Vec<Value> {
        self.records
            .read()
            .values()
            .filter(|record| record.kind == kind)
            .map(NotificationRecord::to_json)
            .collect()
    }

    /// Options for the requested ids, in request order. Unknown ids are skipped.
    pub fn options_by_ids(&self, ids: &[i32]) -> Vec<Value> {
        let records = self.records.read();
        ids.iter()
            .filter_map(|id| records.get(id))
            .map(NotificationRecord::to_json)
            .collect()
    }

    pub fn has_permission(&self) -> bool {
        self.surface.has_permission()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryPlatform;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn manager() -> (Arc<MemoryPlatform>, NotificationManager) {
        let platform = Arc::new(MemoryPlatform::new());
        let manager = NotificationManager::new(platform.clone(), platform.clone());
        (platform, manager)
    }

    fn request(value: Value) -> Request {
        Request::new(NotificationOptions::from_value(value).unwrap(), now())
    }

    #[test]
    fn schedule_stores_scheduled_record_and_registers_alarm() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 1, "trigger": {"in": 10, "unit": "second"}})));

        let record = manager.get(1).unwrap();
        assert_eq!(record.kind, NotificationType::Scheduled);
        assert_eq!(platform.pending(), vec![(1, now() + Duration::seconds(10))]);
    }

    #[test]
    fn schedule_with_existing_id_replaces() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 1, "title": "old"})));
        manager.fire(1, now());
        manager.schedule(request(json!({"id": 1, "title": "new", "trigger": {"in": 1, "unit": "hour"}})));

        let record = manager.get(1).unwrap();
        assert_eq!(record.options.title(), Some("new"));
        assert_eq!(record.kind, NotificationType::Scheduled);
        assert!(platform.presented().is_empty());
        assert_eq!(manager.ids(), vec![1]);
    }

    #[test]
    fn cancel_removes_record_and_alarm() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 3, "trigger": {"in": 1, "unit": "day"}})));
        assert!(manager.cancel(3).is_some());
        assert!(manager.get(3).is_none());
        assert!(platform.pending().is_empty());
        assert!(manager.cancel(3).is_none());
    }

    #[test]
    fn update_and_cancel_unknown_ids_are_noops() {
        let (_platform, manager) = manager();
        let partial = json!({"title": "x"});
        assert!(manager
            .update(42, partial.as_object().unwrap(), now())
            .unwrap()
            .is_none());
        assert!(manager.cancel(42).is_none());
        assert!(manager.clear(42).is_none());
        assert_eq!(manager.type_of(42), NotificationType::Unknown);
    }

    #[test]
    fn update_with_new_trigger_reschedules() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 5})));
        manager.fire(5, now());
        assert_eq!(manager.type_of(5), NotificationType::Triggered);

        let partial = json!({"trigger": {"in": 2, "unit": "hour"}});
        let updated = manager
            .update(5, partial.as_object().unwrap(), now())
            .unwrap()
            .unwrap();

        assert_eq!(updated.kind, NotificationType::Scheduled);
        assert_eq!(platform.pending(), vec![(5, now() + Duration::hours(2))]);
    }

    #[test]
    fn update_without_trigger_change_keeps_state() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 5, "title": "a"})));
        manager.fire(5, now());

        let partial = json!({"title": "b"});
        let updated = manager
            .update(5, partial.as_object().unwrap(), now())
            .unwrap()
            .unwrap();
        assert_eq!(updated.kind, NotificationType::Triggered);
        assert_eq!(updated.options.title(), Some("b"));
        assert_eq!(platform.presented(), vec![5]);
    }

    #[test]
    fn cancel_all_empties_ids() {
        let (platform, manager) = manager();
        for id in 1..=3 {
            manager.schedule(request(json!({"id": id, "trigger": {"in": id, "unit": "minute"}})));
        }
        assert_eq!(manager.cancel_all().len(), 3);
        assert!(manager.ids().is_empty());
        assert!(platform.pending().is_empty());
    }

    #[test]
    fn clear_removes_triggered_one_shot() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 1, "trigger": {"in": 0, "unit": "second"}})));
        manager.fire(1, now());
        assert_eq!(manager.type_of(1).as_str(), "triggered");

        assert!(manager.clear(1).is_some());
        assert!(manager.get(1).is_none());
        assert!(platform.presented().is_empty());
    }

    #[test]
    fn clear_keeps_schedulable_records() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 2, "trigger": {"every": "day"}})));
        manager.schedule(request(json!({"id": 3, "trigger": {"in": 1, "unit": "hour"}})));
        manager.fire(2, now() + Duration::days(1));

        manager.clear(2).unwrap();
        manager.clear(3).unwrap();

        assert_eq!(manager.type_of(2), NotificationType::Scheduled);
        assert_eq!(manager.type_of(3), NotificationType::Scheduled);
        assert_eq!(platform.pending().len(), 2);
    }

    #[test]
    fn clear_all_drops_spent_records_only() {
        let (_platform, manager) = manager();
        manager.schedule(request(json!({"id": 1})));
        manager.schedule(request(json!({"id": 2, "trigger": {"every": "hour"}})));
        manager.schedule(request(json!({"id": 3, "trigger": {"in": 1, "unit": "day"}})));
        manager.fire(1, now());
        manager.fire(2, now());

        let cleared = manager.clear_all();
        let mut cleared_ids: Vec<i32> = cleared.iter().map(|record| record.id).collect();
        cleared_ids.sort();
        assert_eq!(cleared_ids, vec![1, 2]);
        assert_eq!(manager.ids(), vec![2, 3]);
    }

    #[test]
    fn repeating_trigger_reregisters_until_count_exhausted() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 9, "trigger": {"every": "minute", "count": 2}})));
        let first = now() + Duration::minutes(1);
        assert_eq!(platform.take_due(first), vec![9]);

        manager.fire(9, first).unwrap();
        assert_eq!(platform.pending(), vec![(9, first + Duration::minutes(1))]);

        let second = platform.take_due(first + Duration::minutes(1));
        assert_eq!(second, vec![9]);
        let record = manager.fire(9, first + Duration::minutes(1)).unwrap();
        assert!(record.next_fire.is_none());
        assert!(platform.pending().is_empty());
    }

    #[test]
    fn fire_after_cancel_is_dropped() {
        let (platform, manager) = manager();
        manager.schedule(request(json!({"id": 4})));
        manager.cancel(4);
        assert!(manager.fire(4, now()).is_none());
        assert!(platform.presented().is_empty());
    }

    #[test]
    fn typed_queries() {
        let (_platform, manager) = manager();
        manager.schedule(request(json!({"id": 1, "title": "one"})));
        manager.schedule(request(json!({"id": 2, "title": "two", "trigger": {"in": 1, "unit": "hour"}})));
        manager.fire(1, now());

        assert_eq!(manager.ids_by_type(NotificationType::Triggered), vec![1]);
        assert_eq!(manager.ids_by_type(NotificationType::Scheduled), vec![2]);
        assert_eq!(manager.options().len(), 2);
        assert_eq!(manager.options_by_type(NotificationType::Scheduled)[0]["title"], "two");
        let by_ids = manager.options_by_ids(&[2, 7, 1]);
        assert_eq!(by_ids.len(), 2);
        assert_eq!(by_ids[0]["id"], 2);
        assert_eq!(manager.options_of(1).unwrap()["title"], "one");
        assert!(manager.has_permission());
    }
}
