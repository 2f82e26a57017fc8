use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NotifyError, Result};
use crate::trigger::Trigger;

/// Caller-supplied notification configuration, kept as the JSON dictionary it
/// arrived as so queries hand back exactly what the host configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct NotificationOptions {
    dict: Map<String, Value>,
}

impl NotificationOptions {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(dict) => Self::from_dict(dict),
            other => Err(NotifyError::validation(format!(
                "notification options must be an object, got {other}"
            ))),
        }
    }

    pub fn from_dict(dict: Map<String, Value>) -> Result<Self> {
        let options = Self { dict };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        match self.dict.get("id") {
            None | Some(Value::Null) => {}
            Some(id) if id.as_i64().and_then(|id| i32::try_from(id).ok()).is_some() => {}
            Some(other) => {
                return Err(NotifyError::validation(format!(
                    "notification id must be a 32-bit integer, got {other}"
                )))
            }
        }
        Trigger::from_option(self.dict.get("trigger"))?;
        Ok(())
    }

    /// Notification id, `0` when the host omitted it.
    pub fn id(&self) -> i32 {
        self.dict
            .get("id")
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
            .unwrap_or(0)
    }

    pub fn title(&self) -> Option<&str> {
        self.dict.get("title").and_then(Value::as_str)
    }

    pub fn channel(&self) -> Option<&str> {
        self.dict.get("channel").and_then(Value::as_str)
    }

    pub fn trigger(&self) -> Trigger {
        // Validated on construction and on every merge.
        Trigger::from_option(self.dict.get("trigger")).unwrap_or(Trigger::Now)
    }

    pub fn set_channel(&mut self, channel: &str) {
        self.dict
            .insert("channel".to_owned(), Value::String(channel.to_owned()));
    }

    /// Apply a partial update. The id never changes. Returns whether the
    /// trigger spec differs afterwards.
    pub fn merge(&mut self, partial: &Map<String, Value>) -> Result<bool> {
        let mut merged = self.dict.clone();
        for (key, value) in partial {
            if key == "id" {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
        let candidate = Self { dict: merged };
        candidate.validate()?;

        let trigger_changed = self.dict.get("trigger") != candidate.dict.get("trigger");
        *self = candidate;
        Ok(trigger_changed)
    }

    pub fn as_dict(&self) -> &Map<String, Value> {
        &self.dict
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.dict.clone())
    }
}
