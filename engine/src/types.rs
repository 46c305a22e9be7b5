//! Shared data structures for the quest lifecycle engine.
//!
//! ## Status as a finite-state machine
//!
//! [`QuestStatus`] enforces a strict lifecycle:
//!
//! ```text
//! Open ──► Assigned ──► PendingVerification ──► Completed
//!   │          │                 │
//!   │          │                 └──► Assigned   (reject, rework)
//!   └──► Cancelled ◄──┘
//! ```
//!
//! `Completed` and `Cancelled` are terminal. Transitions out of a state
//! that does not match a guard are rejected by the lifecycle engine with
//! no side effect.

use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type QuestId = u64;
pub type UserId = String;
pub type IntentId = String;
/// Unix seconds, UTC.
pub type Timestamp = i64;

/// Lifecycle status of a quest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Posted, claimable by any adventurer.
    Open,
    /// Claimed; work in progress, escrow hold taken.
    Assigned,
    /// Work submitted, awaiting requester sign-off.
    PendingVerification,
    /// Approved; funds settled. Terminal.
    Completed,
    /// Withdrawn before settlement; any hold released. Terminal.
    Cancelled,
}

impl QuestStatus {
    /// Short identifier suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::PendingVerification => "pending_verification",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "assigned" => Some(Self::Assigned),
            "pending_verification" => Some(Self::PendingVerification),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rarity tier; ordinal, common < legendary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "common" => Some(Self::Common),
            "uncommon" => Some(Self::Uncommon),
            "rare" => Some(Self::Rare),
            "epic" => Some(Self::Epic),
            "legendary" => Some(Self::Legendary),
            _ => None,
        }
    }
}

/// Requester feedback attached on approval or rejection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub comment: String,
    /// 1–5 stars.
    pub rating: u8,
    pub timestamp: Timestamp,
}

/// A paid task posted by a requester.
///
/// Invariants, enforced by the lifecycle engine in the same operation
/// that sets `status`:
/// - `assignee_id` is `Some` iff status ∈ {Assigned, PendingVerification,
///   Completed}.
/// - `completed_at` is `Some` iff status is `Completed`.
/// - `price` and `requester_id` never change after creation.
/// - Quests are never deleted, only moved to a terminal status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub price: Money,
    pub urgent: bool,
    pub points_reward: u64,
    pub rarity: Rarity,
    pub created_at: Timestamp,
    pub due_at: Option<Timestamp>,
    /// Owner and payer; immutable after creation.
    pub requester_id: UserId,
    /// Set when claimed; cleared only if a failed hold reverts the claim.
    pub assignee_id: Option<UserId>,
    pub status: QuestStatus,
    pub feedback: Option<Feedback>,
    pub completed_at: Option<Timestamp>,
    /// How many times the quest has bounced pending_verification → assigned.
    pub rework_cycles: u32,
}

/// Creation parameters for a new quest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewQuest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub price: Money,
    pub urgent: bool,
    pub points_reward: u64,
    pub rarity: Rarity,
    pub due_at: Option<Timestamp>,
}

/// Status of one payment-hold attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Hold created, awaiting client-side authorization / settlement.
    RequiresPaymentMethod,
    /// Settled. Terminal.
    Succeeded,
    /// Released or abandoned; never charged. Terminal.
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requires_payment_method" => Some(Self::RequiresPaymentMethod),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RequiresPaymentMethod)
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to collect and hold funds for a quest.
///
/// Many-to-one with [`Quest`] (retries create new intents); at most one
/// may reach `Succeeded`. The three amounts are fixed at creation and
/// never recomputed — this is what protects against price tampering
/// mid-flow. Terminal intents are retained for audit, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Opaque id supplied by the payment processor.
    pub id: IntentId,
    pub quest_id: QuestId,
    /// Quest price at hold time.
    pub amount: Money,
    pub tip_amount: Money,
    /// Flat platform fee at hold time.
    pub platform_fee: Money,
    pub status: IntentStatus,
    pub created_at: Timestamp,
    /// Opaque token the payer's client uses to authorize the hold.
    pub client_secret: String,
}

impl PaymentIntent {
    /// Total charged to the requester: `amount + tip + fee`.
    pub fn total_charge(&self) -> Money {
        self.amount + self.tip_amount + self.platform_fee
    }
}

/// A marketplace participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    /// Mean of received review scores.
    pub rating: f64,
    pub review_count: u32,
    /// Derived from points via `progression::level_for_xp`.
    pub level: u32,
    /// Cumulative XP/points; never decreases.
    pub points: u64,
    /// Always exactly `unlocked_badges(points, completed_tasks)`.
    pub badges: Vec<String>,
    pub completed_tasks: u64,
    pub verified: bool,
    pub available_earnings: Money,
    /// Settled but not yet withdrawn; credited on approve.
    pub pending_earnings: Money,
}

impl UserProfile {
    pub fn new(id: UserId, display_name: String) -> Self {
        UserProfile {
            id,
            display_name,
            rating: 0.0,
            review_count: 0,
            level: 1,
            points: 0,
            badges: Vec::new(),
            completed_tasks: 0,
            verified: false,
            available_earnings: Money::ZERO,
            pending_earnings: Money::ZERO,
        }
    }
}

/// One post-quest rating from one party to the other. Keyed by
/// (quest_id, reviewer_id, reviewee_id); at most one per directed pair
/// per quest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub quest_id: QuestId,
    pub reviewer_id: UserId,
    pub reviewee_id: UserId,
    /// 1–5 stars.
    pub rating: u8,
    pub comment: String,
    pub created_at: Timestamp,
}
