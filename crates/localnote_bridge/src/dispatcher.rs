use std::sync::Arc;

use chrono::Utc;
use localnote_core::action::{ActionGroup, ActionGroupRegistry};
use localnote_core::{
    ChannelRegistry, NotificationManager, NotificationOptions, NotificationType, NotifyError,
    Request, Result,
};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::events::EventBridge;
use crate::host::Reply;
use crate::worker::WorkerLane;

/// Where a command executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Answered on the calling thread; reads already-resolved state only.
    Immediate,
    /// Handed to the worker pool.
    Worker,
}

/// Selection used by the `ids` and `notifications` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Scheduled,
    Triggered,
    ById,
    Nothing,
}

impl Scope {
    fn from_code(code: i64) -> Self {
        match code {
            0 => Self::All,
            1 => Self::Scheduled,
            2 => Self::Triggered,
            3 => Self::ById,
            _ => Self::Nothing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTask {
    Register,
    Unregister,
    Query,
}

impl ActionTask {
    fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Register),
            1 => Ok(Self::Unregister),
            2 => Ok(Self::Query),
            other => Err(NotifyError::validation(format!("unknown actions task {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Launch,
    Ready,
    Check,
    Request,
    Actions {
        task: ActionTask,
        group: String,
        list: Value,
    },
    Schedule(Vec<NotificationOptions>),
    Update(Vec<Map<String, Value>>),
    Cancel(Vec<i32>),
    CancelAll,
    Clear(Vec<i32>),
    ClearAll,
    Type(i32),
    Ids(Scope),
    Notification(i32),
    Notifications { scope: Scope, ids: Vec<i32> },
    CreateChannel(Map<String, Value>),
    DeleteChannel(String),
    ListChannels,
    SetDefaultChannel(Map<String, Value>),
}

impl Command {
    /// Decode a host command. Unknown names are rejected.
    pub fn parse(name: &str, args: &[Value]) -> Result<Self> {
        let command = match name {
            "launch" => Self::Launch,
            "ready" => Self::Ready,
            "check" => Self::Check,
            "request" => Self::Request,
            "actions" => Self::Actions {
                task: ActionTask::from_code(int_arg(args, 0)?)?,
                group: args
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                list: args.get(2).cloned().unwrap_or(Value::Null),
            },
            "schedule" => Self::Schedule(
                args.iter()
                    .cloned()
                    .map(NotificationOptions::from_value)
                    .collect::<Result<_>>()?,
            ),
            "update" => Self::Update(
                args.iter()
                    .map(|arg| {
                        let partial = object_arg(arg, "update")?;
                        // Validates the id the same way a full options object would.
                        NotificationOptions::from_dict(id_only(&partial))?;
                        Ok(partial)
                    })
                    .collect::<Result<_>>()?,
            ),
            "cancel" => Self::Cancel(id_list(args)?),
            "cancelAll" => Self::CancelAll,
            "clear" => Self::Clear(id_list(args)?),
            "clearAll" => Self::ClearAll,
            "type" => Self::Type(id_arg(args, 0)?),
            "ids" => Self::Ids(Scope::from_code(int_arg(args, 0)?)),
            "notification" => Self::Notification(id_arg(args, 0)?),
            "notifications" => Self::Notifications {
                scope: Scope::from_code(int_arg(args, 0)?),
                ids: match args.get(1) {
                    Some(Value::Array(ids)) => id_list(ids)?,
                    _ => Vec::new(),
                },
            },
            "createChannel" => Self::CreateChannel(object_arg(first(args)?, name)?),
            "deleteChannel" => Self::DeleteChannel(
                first(args)?
                    .as_str()
                    .ok_or_else(|| NotifyError::validation("deleteChannel expects a channel id"))?
                    .to_owned(),
            ),
            "listChannels" => Self::ListChannels,
            "setDefaultChannel" => Self::SetDefaultChannel(object_arg(first(args)?, name)?),
            other => return Err(NotifyError::UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Ready => "ready",
            Self::Check => "check",
            Self::Request => "request",
            Self::Actions { .. } => "actions",
            Self::Schedule(_) => "schedule",
            Self::Update(_) => "update",
            Self::Cancel(_) => "cancel",
            Self::CancelAll => "cancelAll",
            Self::Clear(_) => "clear",
            Self::ClearAll => "clearAll",
            Self::Type(_) => "type",
            Self::Ids(_) => "ids",
            Self::Notification(_) => "notification",
            Self::Notifications { .. } => "notifications",
            Self::CreateChannel(_) => "createChannel",
            Self::DeleteChannel(_) => "deleteChannel",
            Self::ListChannels => "listChannels",
            Self::SetDefaultChannel(_) => "setDefaultChannel",
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            Self::Launch => Lane::Immediate,
            Self::Ready
            | Self::Check
            | Self::Request
            | Self::Actions { .. }
            | Self::Schedule(_)
            | Self::Update(_)
            | Self::Cancel(_)
            | Self::CancelAll
            | Self::Clear(_)
            | Self::ClearAll
            | Self::Type(_)
            | Self::Ids(_)
            | Self::Notification(_)
            | Self::Notifications { .. }
            | Self::CreateChannel(_)
            | Self::DeleteChannel(_)
            | Self::ListChannels
            | Self::SetDefaultChannel(_) => Lane::Worker,
        }
    }
}

fn first(args: &[Value]) -> Result<&Value> {
    args.first()
        .ok_or_else(|| NotifyError::validation("missing command argument"))
}

fn int_arg(args: &[Value], index: usize) -> Result<i64> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_i64().ok_or_else(|| {
            NotifyError::validation(format!("argument {index} must be an integer, got {value}"))
        }),
    }
}

fn id_arg(args: &[Value], index: usize) -> Result<i32> {
    let raw = int_arg(args, index)?;
    i32::try_from(raw).map_err(|_| NotifyError::validation(format!("id {raw} out of range")))
}

fn id_list(values: &[Value]) -> Result<Vec<i32>> {
    (0..values.len()).map(|index| id_arg(values, index)).collect()
}

fn object_arg(value: &Value, command: &str) -> Result<Map<String, Value>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| NotifyError::validation(format!("{command} expects an object, got {value}")))
}

fn id_only(partial: &Map<String, Value>) -> Map<String, Value> {
    partial
        .get("id")
        .map(|id| Map::from_iter([("id".to_owned(), id.clone())]))
        .unwrap_or_default()
}

/// The components a command can reach.
pub struct Services {
    pub manager: NotificationManager,
    pub channels: ChannelRegistry,
    pub actions: ActionGroupRegistry,
    pub events: EventBridge,
}

/// Decodes host commands and runs them on their lane.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<Services>,
    worker: WorkerLane,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>, worker: WorkerLane) -> Self {
        Self { services, worker }
    }

    #[instrument(skip(self, args, reply))]
    pub fn execute(&self, name: &str, args: Vec<Value>, reply: Reply) {
        let command = match Command::parse(name, &args) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "rejected command");
                reply.error(err.to_string());
                return;
            }
        };

        match command.lane() {
            Lane::Immediate => match run(&self.services, command) {
                Ok(value) => reply.respond(value),
                Err(err) => reply.error(err.to_string()),
            },
            Lane::Worker => {
                let services = Arc::clone(&self.services);
                let label = command.name();
                self.worker.run(label, move || run(&services, command), reply);
            }
        }
    }
}

fn run(services: &Services, command: Command) -> Result<Option<Value>> {
    debug!(command = command.name(), "running command");
    let Services {
        manager,
        channels,
        actions,
        events,
    } = services;

    match command {
        Command::Launch => Ok(events
            .take_launch_details()
            .map(|details| json!({ "id": details.id, "action": details.action }))),
        Command::Ready => {
            events.mark_ready();
            Ok(Some(Value::Bool(true)))
        }
        Command::Check | Command::Request => Ok(Some(Value::Bool(manager.has_permission()))),
        Command::Actions { task, group, list } => match task {
            ActionTask::Register => {
                actions.register(ActionGroup::parse(&group, &list)?);
                Ok(None)
            }
            ActionTask::Unregister => {
                actions.unregister(&group);
                Ok(None)
            }
            ActionTask::Query => Ok(Some(Value::Bool(actions.is_registered(&group)))),
        },
        Command::Schedule(list) => {
            let now = Utc::now();
            for mut options in list {
                if options.channel().is_none() {
                    options.set_channel(&channels.default_channel_id());
                }
                let record = manager.schedule(Request::new(options, now));
                events.emit("add", Some(&record), Map::new());
            }
            Ok(None)
        }
        Command::Update(list) => {
            let now = Utc::now();
            for partial in list {
                let id = NotificationOptions::from_dict(id_only(&partial))?.id();
                if let Some(record) = manager.update(id, &partial, now)? {
                    events.emit("update", Some(&record), Map::new());
                }
            }
            Ok(None)
        }
        Command::Cancel(ids) => {
            for id in ids {
                if let Some(record) = manager.cancel(id) {
                    events.emit("cancel", Some(&record), Map::new());
                }
            }
            Ok(None)
        }
        Command::CancelAll => {
            manager.cancel_all();
            events.emit_simple("cancelall");
            Ok(None)
        }
        Command::Clear(ids) => {
            for id in ids {
                if let Some(record) = manager.clear(id) {
                    events.emit("clear", Some(&record), Map::new());
                }
            }
            Ok(None)
        }
        Command::ClearAll => {
            manager.clear_all();
            events.emit_simple("clearall");
            Ok(None)
        }
        Command::Type(id) => Ok(Some(Value::from(manager.type_of(id).as_str()))),
        Command::Ids(scope) => {
            let ids = match scope {
                Scope::All => manager.ids(),
                Scope::Scheduled => manager.ids_by_type(NotificationType::Scheduled),
                Scope::Triggered => manager.ids_by_type(NotificationType::Triggered),
                Scope::ById | Scope::Nothing => Vec::new(),
            };
            Ok(Some(Value::from(ids)))
        }
        Command::Notification(id) => Ok(manager.options_of(id)),
        Command::Notifications { scope, ids } => {
            let options = match scope {
                Scope::All => manager.options(),
                Scope::Scheduled => manager.options_by_type(NotificationType::Scheduled),
                Scope::Triggered => manager.options_by_type(NotificationType::Triggered),
                Scope::ById => manager.options_by_ids(&ids),
                Scope::Nothing => Vec::new(),
            };
            Ok(Some(Value::Array(options)))
        }
        Command::CreateChannel(config) => {
            channels.create_channel(&config)?;
            Ok(None)
        }
        Command::DeleteChannel(id) => {
            channels.delete_channel(&id)?;
            Ok(None)
        }
        Command::ListChannels => Ok(Some(serde_json::to_value(channels.list_channels())?)),
        Command::SetDefaultChannel(config) => {
            channels.set_default_channel(&config)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_runs_immediately() {
        assert_eq!(Command::parse("launch", &[]).unwrap().lane(), Lane::Immediate);
        for name in ["ready", "check", "cancelAll", "listChannels"] {
            assert_eq!(Command::parse(name, &[]).unwrap().lane(), Lane::Worker, "{name}");
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = Command::parse("snooze", &[]).unwrap_err();
        assert!(matches!(err, NotifyError::UnknownCommand(name) if name == "snooze"));
    }

    #[test]
    fn parses_id_lists_and_scopes() {
        assert_eq!(
            Command::parse("cancel", &[json!(1), json!(2)]).unwrap(),
            Command::Cancel(vec![1, 2])
        );
        assert_eq!(
            Command::parse("ids", &[json!(2)]).unwrap(),
            Command::Ids(Scope::Triggered)
        );
        assert_eq!(
            Command::parse("ids", &[json!(9)]).unwrap(),
            Command::Ids(Scope::Nothing)
        );
        assert_eq!(
            Command::parse("notifications", &[json!(3), json!([4, 5])]).unwrap(),
            Command::Notifications {
                scope: Scope::ById,
                ids: vec![4, 5]
            }
        );
        assert!(Command::parse("cancel", &[json!("one")]).is_err());
    }

    #[test]
    fn schedule_rejects_malformed_options() {
        assert!(Command::parse("schedule", &[json!({"id": 1}), json!("nope")]).is_err());
        assert!(Command::parse("update", &[json!({"id": "x"})]).is_err());
        assert!(Command::parse("createChannel", &[]).is_err());
        assert!(Command::parse("deleteChannel", &[json!(5)]).is_err());
    }

    #[test]
    fn actions_task_codes() {
        let command = Command::parse("actions", &[json!(2), json!("grp")]).unwrap();
        assert_eq!(
            command,
            Command::Actions {
                task: ActionTask::Query,
                group: "grp".into(),
                list: Value::Null
            }
        );
        assert!(Command::parse("actions", &[json!(7), json!("grp")]).is_err());
    }
}
