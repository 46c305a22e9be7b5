//! Engine-wide error taxonomy.
//!
//! Every variant maps to one of a small set of user-facing messages; the
//! service layer is responsible for the HTTP mapping. All transitions are
//! all-or-nothing: any error here means no observable change was made to
//! the quest, the profile, or the intent.

use crate::types::{IntentId, IntentStatus, QuestId, QuestStatus, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The attempted transition does not match the guard for the quest's
    /// current status.
    #[error("cannot {action} a quest in status '{status}'")]
    InvalidTransition {
        action: &'static str,
        status: QuestStatus,
    },

    /// Lost a claim race; the caller should refresh and show the quest
    /// as taken.
    #[error("quest is already assigned")]
    AlreadyAssigned,

    /// The caller presented no identity.
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// The caller's identity does not hold the role the guard requires.
    #[error("caller is not authorized to perform this action")]
    NotAuthorized,

    /// The payment processor call failed or timed out; the quest and
    /// intent remain in their pre-call state and the whole operation may
    /// be retried.
    #[error("payment processor error: {0}")]
    Processor(String),

    /// Confirm/release attempted on a terminal intent — a programming
    /// error, logged, not user-recoverable.
    #[error("intent {intent_id} is '{status}', cannot {action}")]
    InvalidIntentState {
        intent_id: IntentId,
        status: IntentStatus,
        action: &'static str,
    },

    #[error("quest {0} not found")]
    QuestNotFound(QuestId),

    #[error("profile '{0}' not found")]
    ProfileNotFound(UserId),

    #[error("a review for this quest from this reviewer already exists")]
    DuplicateReview,

    /// Malformed input (non-positive price, negative tip, out-of-range
    /// rating, exhausted rework budget).
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
