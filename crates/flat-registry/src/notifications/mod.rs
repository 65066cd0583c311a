//! Subscriber notifications triggered by flat creation.

pub mod dispatcher;
pub mod drain;
pub mod sender;

pub use dispatcher::{fan_out, FanOutReport, NotificationDispatcher};
pub use drain::{DrainGuard, DrainOutcome, DrainTracker};
pub use sender::{FlatNotice, LogNotifier, Notifier, NotifyError};
