use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use localnote_bridge::{BridgeConfig, HostContext, LocalNotification, Outcome, Platform, Reply};
use localnote_core::platform::MemoryPlatform;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Prints delivered events as they would be evaluated by a web host.
struct StdoutHost;

impl HostContext for StdoutHost {
    fn dispatch(&self, script: String) {
        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(out, "event {script}") {
            warn!(%err, "failed to write event");
        }
    }

    fn is_visible(&self) -> Option<bool> {
        Some(true)
    }
}

/// Drive the bridge from line-delimited JSON requests on stdin.
///
/// Each line is `{"command": "...", "args": [...]}`. Besides the bridge's own
/// commands the simulator understands the host callbacks `resume`, `destroy`,
/// `tick` (fire every due trigger), `click [id, action?, text?]` and
/// `dismiss [id]`.
pub fn run(config: BridgeConfig) -> Result<()> {
    let platform = Arc::new(MemoryPlatform::new());
    let bridge = LocalNotification::new(config, Platform::in_memory(platform.clone()))
        .context("failed to start notification bridge")?;
    bridge.attach_host(Arc::new(StdoutHost));
    bridge.initialize();
    info!("host simulator ready, reading requests from stdin");

    let stdin = io::stdin();
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line.context("failed to read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(line = line_no + 1, %err, "skipping malformed request");
                continue;
            }
        };
        let Some(command) = request.get("command").and_then(Value::as_str) else {
            warn!(line = line_no + 1, "request has no `command`");
            continue;
        };
        let args = request
            .get("args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        handle(&bridge, &platform, command, args)?;
    }
    Ok(())
}

fn handle(
    bridge: &LocalNotification,
    platform: &MemoryPlatform,
    command: &str,
    args: Vec<Value>,
) -> Result<()> {
    let id_arg = || {
        args.first()
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
    };

    match command {
        "resume" => bridge.on_resume(),
        "destroy" => bridge.on_destroy(),
        "tick" => {
            let due = platform.take_due(Utc::now());
            debug!(count = due.len(), "firing due triggers");
            for id in due {
                bridge.on_trigger(id);
            }
        }
        "click" => match id_arg() {
            Some(id) => {
                let action = args.get(1).and_then(Value::as_str);
                let text = args.get(2).and_then(Value::as_str);
                bridge.on_click(id, action, text);
            }
            None => warn!("click needs a notification id"),
        },
        "dismiss" => match id_arg() {
            Some(id) => {
                bridge.on_dismiss(id);
            }
            None => warn!("dismiss needs a notification id"),
        },
        _ => {
            let (reply, rx) = Reply::channel();
            bridge.execute(command, args, reply);
            let outcome = rx
                .blocking_recv()
                .with_context(|| format!("`{command}` was never answered"))?;
            let mut out = io::stdout().lock();
            match outcome {
                Outcome::Success(Some(value)) => writeln!(out, "ok {command} {value}")?,
                Outcome::Success(None) => writeln!(out, "ok {command}")?,
                Outcome::Failure(message) => writeln!(out, "error {command} {message}")?,
            }
        }
    }
    Ok(())
}
