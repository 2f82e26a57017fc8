use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

/// The host application's execution context (UI thread / message loop).
pub trait HostContext: Send + Sync {
    /// Queue `script` to run on the host context. Must return without waiting
    /// for the host to process it, and must not call back into the bridge
    /// before returning.
    fn dispatch(&self, script: String);

    /// Whether the host view is currently visible, if known.
    fn is_visible(&self) -> Option<bool> {
        None
    }

    /// Whether the device lock screen is showing, if known.
    fn is_locked(&self) -> Option<bool> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Option<Value>),
    Failure(String),
}

/// One-shot answer channel for a host command. Consumed by the first
/// `success`/`error` call, so a command is answered at most once. A reply that
/// is dropped unanswered reports a failure instead.
pub struct Reply {
    sink: Option<Box<dyn FnOnce(Outcome) + Send>>,
    label: Option<&'static str>,
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Reply {
    pub fn new(sink: impl FnOnce(Outcome) + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            label: None,
        }
    }

    /// A reply whose outcome is delivered on a oneshot receiver.
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let reply = Self::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (reply, rx)
    }

    /// Name the command this reply answers, used in the drop failure.
    pub(crate) fn labelled(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn success(self) {
        self.finish(Outcome::Success(None));
    }

    pub fn respond(self, value: Option<Value>) {
        self.finish(Outcome::Success(value));
    }

    pub fn error(self, message: impl Into<String>) {
        self.finish(Outcome::Failure(message.into()));
    }

    fn finish(mut self, outcome: Outcome) {
        if let Some(sink) = self.sink.take() {
            sink(outcome);
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            let message = match self.label {
                Some(label) => format!("{label}: worker unavailable"),
                None => "command dropped without an answer".to_owned(),
            };
            warn!(%message, "reply dropped unanswered");
            sink(Outcome::Failure(message));
        }
    }
}
