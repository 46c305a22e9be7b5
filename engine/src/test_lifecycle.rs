use std::sync::atomic::Ordering;

use crate::error::EngineError;
use crate::invariants::{
    assert_all_quest_invariants, assert_badges_derived, assert_immutable_fields,
};
use crate::lifecycle::{EngineConfig, FeedbackInput};
use crate::money::Money;
use crate::progression::default_catalog;
use crate::test_support::{engine, engine_with_config, flaky_engine, sample_quest};
use crate::types::{IntentStatus, QuestStatus};

const REQUESTER: &str = "user_req";
const ADVENTURER: &str = "user_adv";

async fn registered_engine() -> (
    std::sync::Arc<crate::QuestEngine>,
    std::sync::Arc<crate::MemoryStore>,
    std::sync::Arc<crate::test_support::MockProcessor>,
) {
    let (eng, store, proc) = engine();
    eng.register_user(REQUESTER, "Requester").await.unwrap();
    eng.register_user(ADVENTURER, "Adventurer").await.unwrap();
    (eng, store, proc)
}

#[tokio::test]
async fn happy_path_settles_and_progresses() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    assert_eq!(quest.status, QuestStatus::Open);
    assert_all_quest_invariants(&quest);

    // Claim: hold for price + tip + fee against the requester.
    let (claimed, intent) = eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    assert_eq!(claimed.status, QuestStatus::Assigned);
    assert_eq!(claimed.assignee_id.as_deref(), Some(ADVENTURER));
    assert_eq!(intent.amount, Money::from_minor_units(2_000));
    assert_eq!(intent.tip_amount, Money::ZERO);
    assert_eq!(intent.platform_fee, Money::from_minor_units(250));
    assert_eq!(intent.total_charge(), Money::from_minor_units(2_250));
    assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
    assert!(!intent.client_secret.is_empty());
    assert_all_quest_invariants(&claimed);
    assert_immutable_fields(&quest, &claimed);

    let submitted = eng.submit(quest.id, ADVENTURER).await.unwrap();
    assert_eq!(submitted.status, QuestStatus::PendingVerification);

    let completed = eng.approve(quest.id, REQUESTER, None).await.unwrap();
    assert_eq!(completed.status, QuestStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_all_quest_invariants(&completed);
    assert_eq!(proc.confirms.load(Ordering::SeqCst), 1);

    let settled = eng.intents_for_quest(quest.id).await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].status, IntentStatus::Succeeded);

    // 20.00 + 0 tip − 2.50 fee = 17.50 pending.
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.pending_earnings, Money::from_minor_units(1_750));
    assert_eq!(profile.points, 50);
    assert_eq!(profile.completed_tasks, 1);
    assert_eq!(profile.badges, vec!["first_task".to_string()]);
    assert_badges_derived(&profile, &default_catalog());
}

#[tokio::test]
async fn tip_reaches_the_adventurer_in_full() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    // 20% tip preset on 20.00 = 4.00.
    let tip = crate::tip_for_percent(quest.price, 20);
    let (_, intent) = eng.claim(quest.id, ADVENTURER, tip).await.unwrap();
    assert_eq!(intent.total_charge(), Money::from_minor_units(2_650));

    eng.submit(quest.id, ADVENTURER).await.unwrap();
    eng.approve(quest.id, REQUESTER, None).await.unwrap();

    // 20.00 + 4.00 − 2.50 = 21.50; no fee on the tip.
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.pending_earnings, Money::from_minor_units(2_150));
}

// ─────────────────────────────────────────────────────────
// Guards
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn requester_cannot_claim_own_quest() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    let err = eng.claim(quest.id, REQUESTER, Money::ZERO).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
    assert_eq!(proc.holds_created.load(Ordering::SeqCst), 0);
    assert_eq!(
        eng.get_quest(quest.id).await.unwrap().status,
        QuestStatus::Open
    );
}

#[tokio::test]
async fn empty_actor_is_unauthenticated() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    let err = eng.claim(quest.id, "", Money::ZERO).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthenticated));
}

#[tokio::test]
async fn second_claim_observes_already_assigned() {
    let (eng, _store, proc) = registered_engine().await;
    eng.register_user("user_other", "Other").await.unwrap();
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();

    let err = eng
        .claim(quest.id, "user_other", Money::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyAssigned));
    // The loser must not have created a second intent.
    assert_eq!(proc.holds_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_assignee_can_submit() {
    let (eng, _store, _proc) = registered_engine().await;
    eng.register_user("user_other", "Other").await.unwrap();
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();

    let err = eng.submit(quest.id, "user_other").await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
    let err = eng.submit(quest.id, REQUESTER).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
}

#[tokio::test]
async fn adventurer_cannot_self_approve() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();

    let err = eng.approve(quest.id, ADVENTURER, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
}

#[tokio::test]
async fn invalid_transitions_leave_no_trace() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    // submit / approve / reject from Open all fail and change nothing.
    for result in [
        eng.submit(quest.id, ADVENTURER).await,
        eng.approve(quest.id, REQUESTER, None).await,
        eng.reject(
            quest.id,
            REQUESTER,
            FeedbackInput {
                comment: "no".to_string(),
                rating: 1,
            },
        )
        .await,
    ] {
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
    }

    let after = eng.get_quest(quest.id).await.unwrap();
    assert_eq!(after, quest);
    assert_eq!(proc.confirms.load(Ordering::SeqCst), 0);
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.points, 0);
    assert_eq!(profile.pending_earnings, Money::ZERO);
}

#[tokio::test]
async fn terminal_states_have_no_outgoing_transitions() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();
    eng.approve(quest.id, REQUESTER, None).await.unwrap();

    // Completed is terminal: no cancel, no re-approve, no claim.
    assert!(matches!(
        eng.cancel(quest.id, REQUESTER).await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
    assert!(matches!(
        eng.approve(quest.id, REQUESTER, None).await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
    assert!(matches!(
        eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap_err(),
        EngineError::InvalidTransition { .. }
    ));
}

// ─────────────────────────────────────────────────────────
// Rejection loop
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn rejection_returns_to_assigned_with_hold_intact() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();

    let reworked = eng
        .reject(
            quest.id,
            REQUESTER,
            FeedbackInput {
                comment: "please redo the edges".to_string(),
                rating: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(reworked.status, QuestStatus::Assigned);
    assert_eq!(reworked.rework_cycles, 1);
    let fb = reworked.feedback.as_ref().unwrap();
    assert_eq!(fb.comment, "please redo the edges");

    // Hold is untouched — still held, not settled.
    let intents = eng.intents_for_quest(quest.id).await.unwrap();
    assert_eq!(intents[0].status, IntentStatus::RequiresPaymentMethod);

    // The adventurer can resubmit and get approved.
    eng.submit(quest.id, ADVENTURER).await.unwrap();
    let done = eng.approve(quest.id, REQUESTER, None).await.unwrap();
    assert_eq!(done.status, QuestStatus::Completed);
}

#[tokio::test]
async fn rework_cycle_cap_is_enforced_when_configured() {
    let config = EngineConfig {
        max_rework_cycles: Some(1),
        ..EngineConfig::default()
    };
    let (eng, _store, _proc) = engine_with_config(config);
    eng.register_user(REQUESTER, "Requester").await.unwrap();
    eng.register_user(ADVENTURER, "Adventurer").await.unwrap();

    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();
    let fb = || FeedbackInput {
        comment: "again".to_string(),
        rating: 2,
    };
    eng.reject(quest.id, REQUESTER, fb()).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();

    let err = eng.reject(quest.id, REQUESTER, fb()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    // Still awaiting verification; approve remains possible.
    assert_eq!(
        eng.get_quest(quest.id).await.unwrap().status,
        QuestStatus::PendingVerification
    );
}

// ─────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_open_quest_without_hold() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    let cancelled = eng.cancel(quest.id, REQUESTER).await.unwrap();
    assert_eq!(cancelled.status, QuestStatus::Cancelled);
    assert_all_quest_invariants(&cancelled);
    assert_eq!(proc.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_assigned_quest_releases_the_hold() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();

    let cancelled = eng.cancel(quest.id, REQUESTER).await.unwrap();
    assert_eq!(cancelled.status, QuestStatus::Cancelled);
    assert_eq!(cancelled.assignee_id, None);
    assert_eq!(proc.releases.load(Ordering::SeqCst), 1);

    // The hold never settles; the intent is failed, retained for audit.
    let intents = eng.intents_for_quest(quest.id).await.unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, IntentStatus::Failed);
    assert_eq!(proc.confirms.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_is_requester_gated_but_system_may_expire() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    let err = eng.cancel(quest.id, ADVENTURER).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));

    let cancelled = eng.cancel_by_system(quest.id).await.unwrap();
    assert_eq!(cancelled.status, QuestStatus::Cancelled);
}

#[tokio::test]
async fn submitted_work_is_not_cancellable() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();

    let err = eng.cancel(quest.id, REQUESTER).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

// ─────────────────────────────────────────────────────────
// Processor failures
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_hold_creation_reverts_the_claim() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    proc.fail_create.store(true, Ordering::SeqCst);
    let err = eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap_err();
    assert!(matches!(err, EngineError::Processor(_)));

    // Quest is back to Open with no assignee and no intent.
    let after = eng.get_quest(quest.id).await.unwrap();
    assert_eq!(after.status, QuestStatus::Open);
    assert_eq!(after.assignee_id, None);
    assert!(eng.intents_for_quest(quest.id).await.unwrap().is_empty());

    // Retrying the whole operation succeeds.
    proc.fail_create.store(false, Ordering::SeqCst);
    let (claimed, _) = eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    assert_eq!(claimed.status, QuestStatus::Assigned);
}

#[tokio::test]
async fn failed_intent_persistence_reverts_the_claim_and_releases_the_hold() {
    let (eng, store, proc) = flaky_engine();
    eng.register_user(REQUESTER, "Requester").await.unwrap();
    eng.register_user(ADVENTURER, "Adventurer").await.unwrap();
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    store.fail_next_apply.store(true, Ordering::SeqCst);
    let err = eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));

    // The remote hold was taken but must have been released again.
    assert_eq!(proc.holds_created.load(Ordering::SeqCst), 1);
    assert_eq!(proc.releases.load(Ordering::SeqCst), 1);

    // Quest is back to Open with no assignee and no intent on record.
    let after = eng.get_quest(quest.id).await.unwrap();
    assert_eq!(after.status, QuestStatus::Open);
    assert_eq!(after.assignee_id, None);
    assert!(eng.intents_for_quest(quest.id).await.unwrap().is_empty());

    // Retrying the whole operation succeeds.
    let (claimed, _) = eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    assert_eq!(claimed.status, QuestStatus::Assigned);
}

#[tokio::test]
async fn failed_confirm_aborts_approve_atomically() {
    let (eng, _store, proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();

    proc.fail_confirm.store(true, Ordering::SeqCst);
    let err = eng.approve(quest.id, REQUESTER, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Processor(_)));

    // Nothing advanced: quest still pending, intent still held, no
    // earnings credited.
    assert_eq!(
        eng.get_quest(quest.id).await.unwrap().status,
        QuestStatus::PendingVerification
    );
    let intents = eng.intents_for_quest(quest.id).await.unwrap();
    assert_eq!(intents[0].status, IntentStatus::RequiresPaymentMethod);
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.pending_earnings, Money::ZERO);
    assert_eq!(profile.completed_tasks, 0);

    // The retried approve settles exactly once.
    proc.fail_confirm.store(false, Ordering::SeqCst);
    eng.approve(quest.id, REQUESTER, None).await.unwrap();
    assert_eq!(proc.confirms.load(Ordering::SeqCst), 1);
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.pending_earnings, Money::from_minor_units(1_750));
}

// ─────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_claims_produce_exactly_one_winner() {
    let (eng, _store, proc) = registered_engine().await;
    eng.register_user("user_b", "B").await.unwrap();
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();

    let e1 = eng.clone();
    let e2 = eng.clone();
    let id = quest.id;
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.claim(id, ADVENTURER, Money::ZERO).await }),
        tokio::spawn(async move { e2.claim(id, "user_b", Money::ZERO).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one claim must win");
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::AlreadyAssigned)))
        .count();
    assert_eq!(losers, 1, "the loser must observe AlreadyAssigned");

    // Exactly one PaymentIntent exists.
    assert_eq!(proc.holds_created.load(Ordering::SeqCst), 1);
    assert_eq!(eng.intents_for_quest(quest.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn simultaneous_completions_are_additive() {
    let (eng, _store, _proc) = registered_engine().await;
    let q1 = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    let q2 = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    for q in [q1.id, q2.id] {
        eng.claim(q, ADVENTURER, Money::ZERO).await.unwrap();
        eng.submit(q, ADVENTURER).await.unwrap();
    }

    let e1 = eng.clone();
    let e2 = eng.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { e1.approve(q1.id, REQUESTER, None).await }),
        tokio::spawn(async move { e2.approve(q2.id, REQUESTER, None).await }),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    // No lost update: both payouts and both rewards landed.
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.completed_tasks, 2);
    assert_eq!(profile.points, 100);
    assert_eq!(profile.pending_earnings, Money::from_minor_units(3_500));
    assert_badges_derived(&profile, &default_catalog());
}

// ─────────────────────────────────────────────────────────
// Reviews
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reviews_update_the_running_mean_once_per_pair() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();
    eng.submit(quest.id, ADVENTURER).await.unwrap();
    eng.approve(quest.id, REQUESTER, None).await.unwrap();

    eng.submit_review(quest.id, REQUESTER, ADVENTURER, 5, "great".to_string())
        .await
        .unwrap();
    let profile = eng.get_profile(ADVENTURER).await.unwrap();
    assert_eq!(profile.review_count, 1);
    assert!((profile.rating - 5.0).abs() < f64::EPSILON);

    // One review per directed pair per quest.
    let err = eng
        .submit_review(quest.id, REQUESTER, ADVENTURER, 1, "changed my mind".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateReview));

    // The reverse direction is a different pair and is allowed.
    eng.submit_review(quest.id, ADVENTURER, REQUESTER, 4, "fair".to_string())
        .await
        .unwrap();
    let requester = eng.get_profile(REQUESTER).await.unwrap();
    assert_eq!(requester.review_count, 1);
}

#[tokio::test]
async fn reviews_are_party_gated_and_post_completion_only() {
    let (eng, _store, _proc) = registered_engine().await;
    eng.register_user("user_other", "Other").await.unwrap();
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    eng.claim(quest.id, ADVENTURER, Money::ZERO).await.unwrap();

    let err = eng
        .submit_review(quest.id, REQUESTER, ADVENTURER, 5, "early".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    eng.submit(quest.id, ADVENTURER).await.unwrap();
    eng.approve(quest.id, REQUESTER, None).await.unwrap();

    let err = eng
        .submit_review(quest.id, "user_other", ADVENTURER, 5, "drive-by".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAuthorized));
}

// ─────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn quest_creation_validates_inputs() {
    let (eng, _store, _proc) = registered_engine().await;

    let mut free = sample_quest();
    free.price = Money::ZERO;
    assert!(matches!(
        eng.create_quest(REQUESTER, free).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    let mut untitled = sample_quest();
    untitled.title = "  ".to_string();
    assert!(matches!(
        eng.create_quest(REQUESTER, untitled).await.unwrap_err(),
        EngineError::Validation(_)
    ));

    assert!(matches!(
        eng.create_quest("", sample_quest()).await.unwrap_err(),
        EngineError::Unauthenticated
    ));
}

#[tokio::test]
async fn negative_tip_is_rejected() {
    let (eng, _store, _proc) = registered_engine().await;
    let quest = eng.create_quest(REQUESTER, sample_quest()).await.unwrap();
    let err = eng
        .claim(quest.id, ADVENTURER, Money::from_minor_units(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
