use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{NotifyError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Button,
    Input,
}

/// A button or inline reply attached to a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: ActionKind,
    /// Bring the app to the foreground when tapped.
    #[serde(default)]
    pub launch: bool,
    #[serde(default)]
    pub ui: Option<String>,
    #[serde(default)]
    pub empty_text: Option<String>,
    #[serde(default)]
    pub submit_title: Option<String>,
    #[serde(default)]
    pub editable: Option<bool>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionGroup {
    pub id: String,
    pub actions: Vec<Action>,
}

impl ActionGroup {
    pub fn parse(id: &str, list: &Value) -> Result<Self> {
        if id.is_empty() {
            return Err(NotifyError::validation("action group requires an id"));
        }
        let actions = match list {
            Value::Null => Vec::new(),
            Value::Array(_) => Vec::<Action>::deserialize(list).map_err(|err| {
                NotifyError::validation(format!("invalid actions for group `{id}`: {err}"))
            })?,
            other => {
                return Err(NotifyError::validation(format!(
                    "actions for group `{id}` must be a list, got {other}"
                )))
            }
        };
        Ok(Self {
            id: id.to_owned(),
            actions,
        })
    }
}

#[derive(Debug, Default)]
pub struct ActionGroupRegistry {
    groups: RwLock<HashMap<String, ActionGroup>>,
}

impl ActionGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, group), fields(id = %group.id))]
    pub fn register(&self, group: ActionGroup) {
        debug!(actions = group.actions.len(), "registering action group");
        self.groups.write().insert(group.id.clone(), group);
    }

    pub fn unregister(&self, id: &str) -> Option<ActionGroup> {
        self.groups.write().remove(id)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.groups.read().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_buttons_and_inputs() {
        let group = ActionGroup::parse(
            "reply",
            &json!([
                {"id": "yes", "title": "Yes", "launch": true},
                {"id": "msg", "type": "input", "title": "Reply", "emptyText": "Type"}
            ]),
        )
        .unwrap();
        assert_eq!(group.actions.len(), 2);
        assert!(group.actions[0].launch);
        assert_eq!(group.actions[1].kind, ActionKind::Input);
        assert_eq!(group.actions[1].empty_text.as_deref(), Some("Type"));
    }

    #[test]
    fn rejects_actions_without_id() {
        assert!(ActionGroup::parse("g", &json!([{"title": "no id"}])).is_err());
        assert!(ActionGroup::parse("", &json!([])).is_err());
    }

    #[test]
    fn register_and_unregister() {
        let registry = ActionGroupRegistry::new();
        registry.register(ActionGroup::parse("g", &json!([{"id": "a"}])).unwrap());
        assert!(registry.is_registered("g"));
        assert!(registry.unregister("g").is_some());
        assert!(!registry.is_registered("g"));
    }
}
