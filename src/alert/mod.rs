pub mod dedup;
pub mod notifier;

pub use dedup::{AlertDecision, AlertDeduplicator};
pub use notifier::{FanoutNotifier, LogNotifier, Notifier, NotifyError, WebhookNotifier};
