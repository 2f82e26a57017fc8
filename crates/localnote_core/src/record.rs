use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::NotificationOptions;
use crate::trigger::Trigger;

/// Lifecycle state of a notification as seen by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Unknown,
    Scheduled,
    Triggered,
}

/// Events that move a record through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Schedule,
    Fire,
    Reschedule,
    Dismiss,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Scheduled => "scheduled",
            Self::Triggered => "triggered",
        }
    }

    /// Transition table. `None` marks a transition that is not allowed from
    /// the current state.
    pub fn apply(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (_, Transition::Schedule) => Some(Self::Scheduled),
            (Self::Unknown, Transition::Fire) => None,
            (Self::Scheduled | Self::Triggered, Transition::Fire) => Some(Self::Triggered),
            (Self::Unknown, Transition::Reschedule) => None,
            (Self::Scheduled | Self::Triggered, Transition::Reschedule) => Some(Self::Scheduled),
            (Self::Unknown, Transition::Dismiss) => None,
            (Self::Scheduled | Self::Triggered, Transition::Dismiss) => Some(Self::Scheduled),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: i32,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub options: NotificationOptions,
    pub next_fire: Option<DateTime<Utc>>,
    pub occurrences: u32,
}

impl NotificationRecord {
    pub fn new(options: NotificationOptions, next_fire: Option<DateTime<Utc>>) -> Self {
        let mut record = Self {
            id: options.id(),
            kind: NotificationType::Unknown,
            options,
            next_fire,
            occurrences: 0,
        };
        record.transition(Transition::Schedule);
        record
    }

    pub fn trigger(&self) -> Trigger {
        self.options.trigger()
    }

    /// A record that can still fire in the future.
    pub fn is_schedulable(&self) -> bool {
        self.next_fire.is_some()
    }

    /// Apply `transition`, returning whether it was allowed.
    pub fn transition(&mut self, transition: Transition) -> bool {
        match self.kind.apply(transition) {
            Some(next) => {
                self.kind = next;
                true
            }
            None => false,
        }
    }

    /// The host-facing representation: the configured options dictionary.
    pub fn to_json(&self) -> Value {
        self.options.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transition_table_is_exhaustive() {
        use NotificationType::*;
        use Transition::*;

        let expected = [
            (Unknown, Schedule, Some(Scheduled)),
            (Unknown, Fire, None),
            (Unknown, Reschedule, None),
            (Unknown, Dismiss, None),
            (Scheduled, Schedule, Some(Scheduled)),
            (Scheduled, Fire, Some(Triggered)),
            (Scheduled, Reschedule, Some(Scheduled)),
            (Scheduled, Dismiss, Some(Scheduled)),
            (Triggered, Schedule, Some(Scheduled)),
            (Triggered, Fire, Some(Triggered)),
            (Triggered, Reschedule, Some(Scheduled)),
            (Triggered, Dismiss, Some(Scheduled)),
        ];
        for (from, transition, to) in expected {
            assert_eq!(from.apply(transition), to, "{from:?} --{transition:?}-->");
        }
    }

    #[test]
    fn new_record_is_scheduled_with_id_from_options() {
        let options = NotificationOptions::from_value(json!({"id": 12, "title": "x"})).unwrap();
        let record = NotificationRecord::new(options, None);
        assert_eq!(record.id, 12);
        assert_eq!(record.kind, NotificationType::Scheduled);
        assert_eq!(record.to_json()["title"], "x");
    }
}
