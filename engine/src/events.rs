//! Lifecycle events emitted on successful transitions.
//!
//! Delivery (push notifications, in-app feed) is a collaborator's
//! concern — the engine fires and forgets through [`Notifier`].

use crate::money::Money;
use crate::types::{QuestId, UserId};
use serde::{Deserialize, Serialize};

/// One event per successful transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestEvent {
    Claimed {
        quest_id: QuestId,
        assignee_id: UserId,
    },
    Submitted {
        quest_id: QuestId,
    },
    Approved {
        quest_id: QuestId,
        assignee_id: UserId,
        payout: Money,
    },
    Rejected {
        quest_id: QuestId,
    },
    Cancelled {
        quest_id: QuestId,
    },
}

impl QuestEvent {
    /// Short identifier for logs and dispatch routing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Claimed { .. } => "claimed",
            Self::Submitted { .. } => "submitted",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Fire-and-forget event sink. Implementations must not fail the
/// transition; anything that can go wrong stays on their side.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: QuestEvent);
}

/// Swallows every event. Used by tests and embedders that do their own
/// dispatch.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: QuestEvent) {}
}
