pub mod action;
pub mod channel;
pub mod error;
pub mod manager;
pub mod options;
pub mod platform;
pub mod record;
pub mod trigger;

pub use crate::channel::{Channel, ChannelRegistry, ChannelSummary};
pub use crate::error::{NotifyError, Result};
pub use crate::manager::{NotificationManager, Request};
pub use crate::options::NotificationOptions;
pub use crate::record::{NotificationRecord, NotificationType, Transition};
