//! Persistence boundary and the in-memory reference store.
//!
//! The engine funnels every mutation through [`QuestStore`]. Two
//! operations carry the concurrency contract:
//!
//! - [`QuestStore::claim_quest`] is an atomic conditional update on
//!   `status = open` — two racing claims must not both succeed.
//! - [`QuestStore::apply`] commits a transition's full effect set (quest
//!   update, intent write, additive profile delta) as one unit, so no
//!   failure can leave post-conditions partially applied.
//!
//! Profile mutation is expressed as an additive [`ProfileDelta`], never
//! as a caller-side read-modify-write, so two "simultaneous" completions
//! by the same user cannot lose an update. The store recomputes the
//! derived level and badge set from the post-increment counters, keeping
//! the profile invariant (`badges == unlocked_badges(points, tasks)`)
//! inside the same serialization scope as the increment.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::money::Money;
use crate::progression::{level_for_xp, unlocked_badges, Badge};
use crate::types::{
    IntentId, PaymentIntent, Quest, QuestId, QuestStatus, Review, UserId, UserProfile,
};

/// Additive increments applied to one user's standing.
#[derive(Clone, Debug, Default)]
pub struct ProfileDelta {
    pub user_id: UserId,
    pub points: u64,
    pub completed_tasks: u64,
    pub pending_earnings: Money,
}

/// Everything one successful transition writes. Committed atomically.
#[derive(Clone, Debug, Default)]
pub struct TransitionEffects {
    /// Updated quest row, if the transition changed it.
    pub quest: Option<Quest>,
    /// Intent to insert or update (keyed by intent id).
    pub intent: Option<PaymentIntent>,
    /// Additive profile increments, if the transition changed standing.
    pub profile_delta: Option<ProfileDelta>,
}

#[async_trait]
pub trait QuestStore: Send + Sync {
    /// Persist a new quest and return its assigned id.
    async fn insert_quest(&self, quest: &Quest) -> Result<QuestId>;

    async fn load_quest(&self, id: QuestId) -> Result<Quest>;

    async fn insert_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn load_profile(&self, id: &str) -> Result<UserProfile>;

    async fn load_intent(&self, id: &str) -> Result<PaymentIntent>;

    /// All intents for a quest, oldest first.
    async fn intents_for_quest(&self, quest_id: QuestId) -> Result<Vec<PaymentIntent>>;

    /// Compare-and-set claim: atomically moves the quest from `Open` to
    /// `Assigned` with the given assignee. The loser of a race observes
    /// [`EngineError::AlreadyAssigned`] and must not create an intent.
    async fn claim_quest(&self, id: QuestId, assignee: &str) -> Result<Quest>;

    /// Undo a claim whose hold creation failed: back to `Open`, assignee
    /// cleared. The quest's observable lifecycle status is unchanged by
    /// the failed attempt.
    async fn revert_claim(&self, id: QuestId) -> Result<()>;

    /// Commit a transition's effects as one unit.
    async fn apply(&self, effects: TransitionEffects) -> Result<()>;

    /// Insert a review and fold its rating into the reviewee's running
    /// mean, atomically. At most one review per (quest, reviewer,
    /// reviewee); duplicates get [`EngineError::DuplicateReview`].
    async fn insert_review(&self, review: &Review) -> Result<()>;
}

// ─────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    quests: HashMap<QuestId, Quest>,
    profiles: HashMap<UserId, UserProfile>,
    intents: HashMap<IntentId, PaymentIntent>,
    reviews: HashMap<(QuestId, UserId, UserId), Review>,
    next_quest_id: QuestId,
}

/// In-process store backed by mutexed maps. The explicit service that
/// replaces ad-hoc shared client state: callers never write fields
/// directly, every mutation goes through the transition API.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    catalog: Vec<Badge>,
}

impl MemoryStore {
    pub fn new(catalog: Vec<Badge>) -> Self {
        MemoryStore {
            inner: RwLock::new(Inner::default()),
            catalog,
        }
    }
}

fn apply_delta(profile: &mut UserProfile, delta: &ProfileDelta, catalog: &[Badge]) {
    profile.points += delta.points;
    profile.completed_tasks += delta.completed_tasks;
    profile.pending_earnings += delta.pending_earnings;
    profile.level = level_for_xp(profile.points);
    profile.badges = unlocked_badges(catalog, profile.points, profile.completed_tasks);
}

fn fold_review(profile: &mut UserProfile, rating: u8) {
    let total = profile.rating * f64::from(profile.review_count) + f64::from(rating);
    profile.review_count += 1;
    profile.rating = total / f64::from(profile.review_count);
}

#[async_trait]
impl QuestStore for MemoryStore {
    async fn insert_quest(&self, quest: &Quest) -> Result<QuestId> {
        let mut inner = self.inner.write().await;
        let id = inner.next_quest_id;
        inner.next_quest_id += 1;
        let mut quest = quest.clone();
        quest.id = id;
        inner.quests.insert(id, quest);
        Ok(id)
    }

    async fn load_quest(&self, id: QuestId) -> Result<Quest> {
        self.inner
            .read()
            .await
            .quests
            .get(&id)
            .cloned()
            .ok_or(EngineError::QuestNotFound(id))
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .profiles
            .entry(profile.id.clone())
            .or_insert_with(|| profile.clone());
        Ok(())
    }

    async fn load_profile(&self, id: &str) -> Result<UserProfile> {
        self.inner
            .read()
            .await
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ProfileNotFound(id.to_string()))
    }

    async fn load_intent(&self, id: &str) -> Result<PaymentIntent> {
        self.inner
            .read()
            .await
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("intent '{id}' not found")))
    }

    async fn intents_for_quest(&self, quest_id: QuestId) -> Result<Vec<PaymentIntent>> {
        let inner = self.inner.read().await;
        let mut intents: Vec<_> = inner
            .intents
            .values()
            .filter(|i| i.quest_id == quest_id)
            .cloned()
            .collect();
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    async fn claim_quest(&self, id: QuestId, assignee: &str) -> Result<Quest> {
        let mut inner = self.inner.write().await;
        let quest = inner
            .quests
            .get_mut(&id)
            .ok_or(EngineError::QuestNotFound(id))?;
        match quest.status {
            QuestStatus::Open => {
                quest.status = QuestStatus::Assigned;
                quest.assignee_id = Some(assignee.to_string());
                Ok(quest.clone())
            }
            QuestStatus::Cancelled | QuestStatus::Completed => {
                Err(EngineError::InvalidTransition {
                    action: "claim",
                    status: quest.status,
                })
            }
            _ => Err(EngineError::AlreadyAssigned),
        }
    }

    async fn revert_claim(&self, id: QuestId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let quest = inner
            .quests
            .get_mut(&id)
            .ok_or(EngineError::QuestNotFound(id))?;
        quest.status = QuestStatus::Open;
        quest.assignee_id = None;
        Ok(())
    }

    async fn apply(&self, effects: TransitionEffects) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate the delta target first so a missing profile aborts
        // the whole commit, not half of it.
        if let Some(delta) = &effects.profile_delta {
            if !inner.profiles.contains_key(&delta.user_id) {
                return Err(EngineError::ProfileNotFound(delta.user_id.clone()));
            }
        }

        if let Some(quest) = effects.quest {
            inner.quests.insert(quest.id, quest);
        }
        if let Some(intent) = effects.intent {
            inner.intents.insert(intent.id.clone(), intent);
        }
        if let Some(delta) = effects.profile_delta {
            let profile = inner
                .profiles
                .get_mut(&delta.user_id)
                .expect("checked above");
            apply_delta(profile, &delta, &self.catalog);
        }
        Ok(())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = (
            review.quest_id,
            review.reviewer_id.clone(),
            review.reviewee_id.clone(),
        );
        if inner.reviews.contains_key(&key) {
            return Err(EngineError::DuplicateReview);
        }
        if !inner.profiles.contains_key(&review.reviewee_id) {
            return Err(EngineError::ProfileNotFound(review.reviewee_id.clone()));
        }
        inner.reviews.insert(key, review.clone());
        let profile = inner
            .profiles
            .get_mut(&review.reviewee_id)
            .expect("checked above");
        fold_review(profile, review.rating);
        Ok(())
    }
}
