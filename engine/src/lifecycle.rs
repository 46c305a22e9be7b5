//! The quest lifecycle state machine.
//!
//! Owns the authoritative status of every quest and validates and
//! executes each transition:
//!
//! | Transition                          | Guard                         |
//! |-------------------------------------|-------------------------------|
//! | `open → assigned` (claim)           | actor ≠ requester             |
//! | `assigned → pending_verification`   | actor = assignee              |
//! | `pending_verification → completed`  | actor = requester (approve)   |
//! | `pending_verification → assigned`   | actor = requester (reject)    |
//! | `open/assigned → cancelled`         | actor = requester, or system  |
//!
//! Verification is requester-gated so an adventurer cannot self-approve;
//! rejection is non-terminal so disputes resolve by rework. A guard
//! mismatch fails with [`EngineError::InvalidTransition`] and performs no
//! side effect — every transition is all-or-nothing: the status change,
//! monetary settlement, and progression update either all persist or
//! none do.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{EngineError, Result};
use crate::events::{Notifier, QuestEvent};
use crate::ledger::settle;
use crate::money::Money;
use crate::payment::PaymentWorkflow;
use crate::processor::PaymentProcessor;
use crate::store::{ProfileDelta, QuestStore, TransitionEffects};
use crate::types::{
    Feedback, IntentStatus, NewQuest, PaymentIntent, Quest, QuestId, QuestStatus, UserProfile,
};

/// Engine-wide settlement policy.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// ISO currency code passed through to the processor.
    pub currency: String,
    /// Flat fee per settled quest; charged to the payer and deducted
    /// from the payee, never a percentage of price.
    pub platform_fee: Money,
    /// Maximum reject/rework cycles per quest; `None` = unlimited.
    pub max_rework_cycles: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            currency: "usd".to_string(),
            platform_fee: Money::from_minor_units(250),
            max_rework_cycles: None,
        }
    }
}

/// Feedback supplied by the requester on approve or reject.
#[derive(Clone, Debug)]
pub struct FeedbackInput {
    pub comment: String,
    /// 1–5 stars.
    pub rating: u8,
}

/// The lifecycle engine. All quest, profile, and intent mutation in the
/// system funnels through here.
pub struct QuestEngine {
    store: Arc<dyn QuestStore>,
    payments: PaymentWorkflow,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl QuestEngine {
    pub fn new(
        store: Arc<dyn QuestStore>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let payments = PaymentWorkflow::new(processor, config.currency.clone());
        QuestEngine {
            store,
            payments,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────
    // Registration and queries
    // ─────────────────────────────────────────────────────────

    /// Create a participant profile if it does not exist yet.
    pub async fn register_user(&self, id: &str, display_name: &str) -> Result<UserProfile> {
        require_identity(id)?;
        let profile = UserProfile::new(id.to_string(), display_name.to_string());
        self.store.insert_profile(&profile).await?;
        self.store.load_profile(id).await
    }

    pub async fn get_quest(&self, id: QuestId) -> Result<Quest> {
        self.store.load_quest(id).await
    }

    pub async fn get_profile(&self, id: &str) -> Result<UserProfile> {
        self.store.load_profile(id).await
    }

    pub async fn intents_for_quest(&self, id: QuestId) -> Result<Vec<PaymentIntent>> {
        self.store.intents_for_quest(id).await
    }

    // ─────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────

    /// Post a new quest. Status starts at `Open`.
    pub async fn create_quest(&self, requester: &str, params: NewQuest) -> Result<Quest> {
        require_identity(requester)?;
        if !params.price.is_positive() {
            return Err(EngineError::Validation(
                "quest price must be positive".to_string(),
            ));
        }
        if params.title.trim().is_empty() {
            return Err(EngineError::Validation("quest title is required".to_string()));
        }

        let mut quest = Quest {
            id: 0, // assigned by the store
            title: params.title,
            description: params.description,
            category: params.category,
            location: params.location,
            price: params.price,
            urgent: params.urgent,
            points_reward: params.points_reward,
            rarity: params.rarity,
            created_at: Utc::now().timestamp(),
            due_at: params.due_at,
            requester_id: requester.to_string(),
            assignee_id: None,
            status: QuestStatus::Open,
            feedback: None,
            completed_at: None,
            rework_cycles: 0,
        };
        quest.id = self.store.insert_quest(&quest).await?;
        info!(quest_id = quest.id, requester, "quest created");
        Ok(quest)
    }

    /// Claim an open quest and place the escrow hold.
    ///
    /// The compare-and-set on `Open` happens first, so the loser of a
    /// race observes [`EngineError::AlreadyAssigned`] and never reaches
    /// the processor — exactly one intent is created per successful
    /// claim. If the processor call fails, or the intent cannot be
    /// persisted afterwards, the hold is released and the claim is
    /// reverted: the quest's observable status is unchanged.
    pub async fn claim(&self, quest_id: QuestId, actor: &str, tip: Money) -> Result<(Quest, PaymentIntent)> {
        require_identity(actor)?;
        if tip.is_negative() {
            return Err(EngineError::Validation("tip must be non-negative".to_string()));
        }

        let quest = self.store.load_quest(quest_id).await?;
        match quest.status {
            QuestStatus::Open => {}
            QuestStatus::Cancelled | QuestStatus::Completed => {
                return Err(EngineError::InvalidTransition {
                    action: "claim",
                    status: quest.status,
                })
            }
            _ => return Err(EngineError::AlreadyAssigned),
        }
        if actor == quest.requester_id {
            // A requester cannot work their own quest.
            return Err(EngineError::NotAuthorized);
        }

        // Reserve the assignment before touching the processor.
        let claimed = self.store.claim_quest(quest_id, actor).await?;

        let intent = match self
            .payments
            .create_hold(
                quest_id,
                claimed.price,
                tip,
                self.config.platform_fee,
                &claimed.requester_id,
            )
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                // Hold creation failure must not advance the quest.
                self.store.revert_claim(quest_id).await?;
                warn!(quest_id, error = %e, "hold creation failed, claim reverted");
                return Err(e);
            }
        };
        if let Err(e) = self
            .store
            .apply(TransitionEffects {
                quest: None, // claim_quest already persisted the CAS
                intent: Some(intent.clone()),
                profile_delta: None,
            })
            .await
        {
            // The hold exists remotely but has no record; undo both
            // sides so the claim leaves nothing behind.
            let mut held = intent;
            if let Err(release_err) = self.payments.release(&mut held).await {
                error!(
                    quest_id,
                    intent_id = %held.id,
                    error = %release_err,
                    "hold release failed during claim rollback"
                );
            }
            self.store.revert_claim(quest_id).await?;
            warn!(quest_id, error = %e, "intent persistence failed, claim reverted");
            return Err(e);
        }

        info!(quest_id, assignee = actor, intent_id = %intent.id, "quest claimed");
        self.notifier.notify(QuestEvent::Claimed {
            quest_id,
            assignee_id: actor.to_string(),
        });
        Ok((claimed, intent))
    }

    /// Submit completed work for verification. No monetary effect.
    pub async fn submit(&self, quest_id: QuestId, actor: &str) -> Result<Quest> {
        require_identity(actor)?;
        let mut quest = self.store.load_quest(quest_id).await?;
        if quest.status != QuestStatus::Assigned {
            return Err(EngineError::InvalidTransition {
                action: "submit",
                status: quest.status,
            });
        }
        if quest.assignee_id.as_deref() != Some(actor) {
            return Err(EngineError::NotAuthorized);
        }

        quest.status = QuestStatus::PendingVerification;
        self.store
            .apply(TransitionEffects {
                quest: Some(quest.clone()),
                ..Default::default()
            })
            .await?;

        info!(quest_id, "work submitted for verification");
        self.notifier.notify(QuestEvent::Submitted { quest_id });
        Ok(quest)
    }

    /// Approve submitted work: settle the hold, credit the adventurer,
    /// advance their progression. One atomic unit.
    pub async fn approve(
        &self,
        quest_id: QuestId,
        actor: &str,
        feedback: Option<FeedbackInput>,
    ) -> Result<Quest> {
        require_identity(actor)?;
        let mut quest = self.store.load_quest(quest_id).await?;
        if quest.status != QuestStatus::PendingVerification {
            return Err(EngineError::InvalidTransition {
                action: "approve",
                status: quest.status,
            });
        }
        if actor != quest.requester_id {
            // Self-approval by the adventurer is exactly what the
            // requester gate exists to prevent.
            return Err(EngineError::NotAuthorized);
        }
        let assignee = quest
            .assignee_id
            .clone()
            .ok_or_else(|| EngineError::Storage("pending quest has no assignee".to_string()))?;

        // The assignee must have a profile before funds can be credited.
        let _ = self.store.load_profile(&assignee).await?;

        let mut intent = self.active_intent(quest_id).await?;

        // Idempotent on an already-succeeded intent, so a retried
        // approve call cannot double-charge.
        self.payments.confirm(&mut intent).await?;

        let settlement = settle(intent.amount, intent.tip_amount, intent.platform_fee);
        let now = Utc::now().timestamp();

        quest.status = QuestStatus::Completed;
        quest.completed_at = Some(now);
        if let Some(fb) = feedback {
            validate_rating(fb.rating)?;
            quest.feedback = Some(Feedback {
                comment: fb.comment,
                rating: fb.rating,
                timestamp: now,
            });
        }

        self.store
            .apply(TransitionEffects {
                quest: Some(quest.clone()),
                intent: Some(intent.clone()),
                profile_delta: Some(ProfileDelta {
                    user_id: assignee.clone(),
                    points: quest.points_reward,
                    completed_tasks: 1,
                    pending_earnings: settlement.adventurer_payout,
                }),
            })
            .await?;

        info!(
            quest_id,
            assignee,
            payout = %settlement.adventurer_payout,
            charge = %settlement.requester_charge,
            "quest approved and settled"
        );
        self.notifier.notify(QuestEvent::Approved {
            quest_id,
            assignee_id: assignee,
            payout: settlement.adventurer_payout,
        });
        Ok(quest)
    }

    /// Reject submitted work back to `Assigned` for rework. Feedback is
    /// required; the hold stays in place, untouched.
    pub async fn reject(
        &self,
        quest_id: QuestId,
        actor: &str,
        feedback: FeedbackInput,
    ) -> Result<Quest> {
        require_identity(actor)?;
        validate_rating(feedback.rating)?;
        let mut quest = self.store.load_quest(quest_id).await?;
        if quest.status != QuestStatus::PendingVerification {
            return Err(EngineError::InvalidTransition {
                action: "reject",
                status: quest.status,
            });
        }
        if actor != quest.requester_id {
            return Err(EngineError::NotAuthorized);
        }
        if let Some(max) = self.config.max_rework_cycles {
            if quest.rework_cycles >= max {
                return Err(EngineError::Validation(format!(
                    "rework limit of {max} cycles reached"
                )));
            }
        }

        quest.status = QuestStatus::Assigned;
        quest.rework_cycles += 1;
        quest.feedback = Some(Feedback {
            comment: feedback.comment,
            rating: feedback.rating,
            timestamp: Utc::now().timestamp(),
        });
        self.store
            .apply(TransitionEffects {
                quest: Some(quest.clone()),
                ..Default::default()
            })
            .await?;

        info!(quest_id, cycle = quest.rework_cycles, "work rejected for rework");
        self.notifier.notify(QuestEvent::Rejected { quest_id });
        Ok(quest)
    }

    /// Cancel an open or assigned quest, releasing any unsettled hold
    /// before the quest is marked cancelled. Only the requester may
    /// cancel; see [`QuestEngine::cancel_by_system`] for timeouts.
    pub async fn cancel(&self, quest_id: QuestId, actor: &str) -> Result<Quest> {
        require_identity(actor)?;
        let quest = self.store.load_quest(quest_id).await?;
        if actor != quest.requester_id {
            return Err(EngineError::NotAuthorized);
        }
        self.cancel_inner(quest).await
    }

    /// System-initiated cancellation (e.g. expiry past the due date).
    /// Skips the requester gate but honours every other guard.
    pub async fn cancel_by_system(&self, quest_id: QuestId) -> Result<Quest> {
        let quest = self.store.load_quest(quest_id).await?;
        self.cancel_inner(quest).await
    }

    async fn cancel_inner(&self, mut quest: Quest) -> Result<Quest> {
        // Cancellation is only valid pre-settlement: from Open or
        // Assigned. A quest with submitted work must be approved or
        // rejected first.
        if !matches!(quest.status, QuestStatus::Open | QuestStatus::Assigned) {
            return Err(EngineError::InvalidTransition {
                action: "cancel",
                status: quest.status,
            });
        }

        // Release the hold before (atomically with) flipping the status.
        let mut released = None;
        if let Some(mut intent) = self.pending_intent(quest.id).await? {
            self.payments.release(&mut intent).await?;
            released = Some(intent);
        }

        quest.status = QuestStatus::Cancelled;
        quest.assignee_id = None;
        self.store
            .apply(TransitionEffects {
                quest: Some(quest.clone()),
                intent: released,
                profile_delta: None,
            })
            .await?;

        info!(quest_id = quest.id, "quest cancelled");
        self.notifier.notify(QuestEvent::Cancelled { quest_id: quest.id });
        Ok(quest)
    }

    /// Record a post-quest review. One per directed (reviewer, reviewee)
    /// pair per quest; the reviewee's running mean rating is updated in
    /// the same unit as the insert.
    pub async fn submit_review(
        &self,
        quest_id: QuestId,
        reviewer: &str,
        reviewee: &str,
        rating: u8,
        comment: String,
    ) -> Result<()> {
        require_identity(reviewer)?;
        validate_rating(rating)?;
        let quest = self.store.load_quest(quest_id).await?;
        if quest.status != QuestStatus::Completed {
            return Err(EngineError::InvalidTransition {
                action: "review",
                status: quest.status,
            });
        }
        let assignee = quest.assignee_id.as_deref().unwrap_or_default();
        let parties = [quest.requester_id.as_str(), assignee];
        if !parties.contains(&reviewer) || !parties.contains(&reviewee) || reviewer == reviewee {
            return Err(EngineError::NotAuthorized);
        }

        self.store
            .insert_review(&crate::types::Review {
                quest_id,
                reviewer_id: reviewer.to_string(),
                reviewee_id: reviewee.to_string(),
                rating,
                comment,
                created_at: Utc::now().timestamp(),
            })
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Intent helpers
    // ─────────────────────────────────────────────────────────

    /// The intent approve should settle: the latest non-failed one.
    async fn active_intent(&self, quest_id: QuestId) -> Result<PaymentIntent> {
        let intents = self.store.intents_for_quest(quest_id).await?;
        intents
            .into_iter()
            .rev()
            .find(|i| i.status != IntentStatus::Failed)
            .ok_or_else(|| {
                error!(quest_id, "no live payment intent for quest under approval");
                EngineError::Storage(format!("no live payment intent for quest {quest_id}"))
            })
    }

    /// The unsettled hold cancel should release, if any.
    async fn pending_intent(&self, quest_id: QuestId) -> Result<Option<PaymentIntent>> {
        let intents = self.store.intents_for_quest(quest_id).await?;
        Ok(intents
            .into_iter()
            .rev()
            .find(|i| i.status == IntentStatus::RequiresPaymentMethod))
    }
}

fn require_identity(actor: &str) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(EngineError::Unauthenticated);
    }
    Ok(())
}

fn validate_rating(rating: u8) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(EngineError::Validation(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}
