//! Event dispatch.
//!
//! Push delivery is the notification collaborator's concern; this
//! service just records each lifecycle event where operators can see it.

use tracing::info;

use questboard_engine::{Notifier, QuestEvent};

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: QuestEvent) {
        info!(kind = event.kind(), event = ?event, "quest event");
    }
}
