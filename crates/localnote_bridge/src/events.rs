use std::sync::Arc;

use localnote_core::NotificationRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use crate::host::HostContext;

/// The notification event that brought the app up before the host was ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDetails {
    pub id: i32,
    pub action: String,
}

struct BridgeState {
    ready: bool,
    queue: Vec<String>,
    launch: Option<LaunchDetails>,
    host: Option<Arc<dyn HostContext>>,
}

impl BridgeState {
    fn new() -> Self {
        Self {
            ready: false,
            queue: Vec::new(),
            launch: None,
            host: None,
        }
    }

    fn foreground(&self) -> bool {
        if !self.ready {
            return false;
        }
        let Some(host) = &self.host else {
            return false;
        };
        if host.is_locked().unwrap_or(false) {
            return false;
        }
        host.is_visible().unwrap_or(false)
    }

    /// Deliver everything queued so far, oldest first. Leaves the queue alone
    /// when there is nobody to deliver to.
    fn flush(&mut self) -> usize {
        let Some(host) = self.host.clone() else {
            return 0;
        };
        let pending = std::mem::take(&mut self.queue);
        let count = pending.len();
        for script in pending {
            host.dispatch(script);
        }
        count
    }
}

/// Routes domain events to the host, holding them back until the host has
/// signalled that it can receive them.
pub struct EventBridge {
    state: Mutex<BridgeState>,
    target: String,
}

impl EventBridge {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(BridgeState::new()),
            target: target.into(),
        }
    }

    pub fn attach_host(&self, host: Arc<dyn HostContext>) {
        let mut state = self.state.lock();
        state.host = Some(host);
        if state.ready {
            state.flush();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Open the gate and deliver queued events in insertion order. Returns the
    /// number of events flushed.
    pub fn mark_ready(&self) -> usize {
        let mut state = self.state.lock();
        state.ready = true;
        let flushed = state.flush();
        info!(flushed, "host ready");
        flushed
    }

    /// Host teardown: close the gate again.
    pub fn teardown(&self) {
        debug!("host torn down");
        self.state.lock().ready = false;
    }

    /// Forget all gate state. The attached host is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.ready = false;
        state.queue.clear();
        state.launch = None;
    }

    /// Read-once launch details.
    pub fn take_launch_details(&self) -> Option<LaunchDetails> {
        self.state.lock().launch.take()
    }

    pub fn queued(&self) -> Vec<String> {
        self.state.lock().queue.clone()
    }

    pub fn emit_simple(&self, event: &str) {
        self.emit(event, None, Map::new());
    }

    pub fn emit(&self, event: &str, record: Option<&NotificationRecord>, mut data: Map<String, Value>) {
        let mut state = self.state.lock();

        data.insert("event".to_owned(), Value::String(event.to_owned()));
        data.insert("foreground".to_owned(), Value::Bool(state.foreground()));
        data.insert("queued".to_owned(), Value::Bool(!state.ready));
        if let Some(record) = record {
            data.insert("notification".to_owned(), Value::from(record.id));
        }

        let script = self.render(event, record, data);

        if let Some(record) = record {
            if !state.ready && state.launch.is_none() {
                debug!(id = record.id, event, "captured launch event");
                state.launch = Some(LaunchDetails {
                    id: record.id,
                    action: event.to_owned(),
                });
            }
        }

        if state.ready {
            if let Some(host) = state.host.clone() {
                trace!(event, "delivering event");
                host.dispatch(script);
                return;
            }
        }
        trace!(event, queued = state.queue.len() + 1, "queueing event");
        state.queue.push(script);
    }

    fn render(&self, event: &str, record: Option<&NotificationRecord>, data: Map<String, Value>) -> String {
        let name = Value::String(event.to_owned());
        let data = Value::Object(data);
        match record {
            Some(record) => format!("{}({},{},{})", self.target, name, record.to_json(), data),
            None => format!("{}({},{})", self.target, name, data),
        }
    }
}
