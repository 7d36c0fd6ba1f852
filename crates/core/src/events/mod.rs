//! Job events: lossy progress broadcast and terminal outcome delivery.

mod bus;
mod webhook;

pub use bus::{EventBus, JobEvent};
pub use webhook::{NotifierConfig, NotifyError, OutcomeNotifier, WebhookNotifier};
