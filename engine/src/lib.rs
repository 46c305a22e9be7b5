//! # Questboard Engine
//!
//! The quest lifecycle and escrow settlement engine behind the
//! Questboard marketplace: requesters post paid micro-tasks ("quests"),
//! adventurers complete them for a reward plus optional tip, and an
//! escrow-style hold is settled only when the requester signs off.
//!
//! | Phase        | Entry point(s)                                   |
//! |--------------|--------------------------------------------------|
//! | Posting      | [`QuestEngine::create_quest`]                    |
//! | Claiming     | [`QuestEngine::claim`] (places the escrow hold)  |
//! | Verification | [`QuestEngine::submit`], [`QuestEngine::approve`], [`QuestEngine::reject`] |
//! | Cancellation | [`QuestEngine::cancel`], [`QuestEngine::cancel_by_system`] |
//! | Reviews      | [`QuestEngine::submit_review`]                   |
//! | Queries      | `get_quest`, `get_profile`, `intents_for_quest`  |
//!
//! ## Architecture
//!
//! Persistence is fully delegated to [`store::QuestStore`]; processor
//! calls are fully delegated to [`processor::PaymentProcessor`] through
//! the [`payment::PaymentWorkflow`]. [`lifecycle::QuestEngine`] contains
//! only guards, transition ordering, and event emission — the arithmetic
//! lives in the pure [`ledger`] and [`progression`] modules.

pub mod error;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod payment;
pub mod processor;
pub mod progression;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_lifecycle;

pub use error::{EngineError, Result};
pub use events::{Notifier, NullNotifier, QuestEvent};
pub use ledger::{settle, Settlement};
pub use lifecycle::{EngineConfig, FeedbackInput, QuestEngine};
pub use money::{tip_for_percent, Money};
pub use processor::{HoldAuthorization, PaymentProcessor};
pub use progression::{default_catalog, level_for_xp, next_badge, unlocked_badges, Badge};
pub use store::{MemoryStore, ProfileDelta, QuestStore, TransitionEffects};
pub use types::{
    Feedback, IntentStatus, NewQuest, PaymentIntent, Quest, QuestId, QuestStatus, Rarity, Review,
    UserId, UserProfile,
};
