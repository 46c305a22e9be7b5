//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use questboard_engine::{
    tip_for_percent, EngineError, FeedbackInput, Money, NewQuest, PaymentIntent, Quest, QuestEngine,
    QuestId, Rarity, UserProfile,
};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<QuestEngine>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub id: String,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct CreateQuestRequest {
    pub requester_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    /// Major units (e.g. dollars); converted once at this boundary.
    pub price: f64,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub points_reward: u64,
    #[serde(default = "default_rarity")]
    pub rarity: Rarity,
    pub due_at: Option<i64>,
}

fn default_rarity() -> Rarity {
    Rarity::Common
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub actor_id: String,
    /// Percentage-of-price tip preset (0/5/10/15/20, or any value).
    pub tip_percent: Option<u32>,
    /// Absolute tip in major units; wins over `tip_percent` if both set.
    pub tip: Option<f64>,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor_id: String,
}

#[derive(Deserialize)]
pub struct VerdictRequest {
    pub actor_id: String,
    pub comment: Option<String>,
    pub rating: Option<u8>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize)]
pub struct ClaimResponse {
    pub quest: Quest,
    pub intent_id: String,
    /// Token the payer's client uses to authorize the hold.
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct IntentsResponse {
    pub quest_id: QuestId,
    pub count: usize,
    pub intents: Vec<PaymentIntent>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────

fn error_response(e: EngineError) -> axum::response::Response {
    let status = match &e {
        EngineError::InvalidTransition { .. }
        | EngineError::AlreadyAssigned
        | EngineError::DuplicateReview => StatusCode::CONFLICT,
        EngineError::Unauthenticated => StatusCode::UNAUTHORIZED,
        EngineError::NotAuthorized => StatusCode::FORBIDDEN,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::QuestNotFound(_) | EngineError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Processor(_) => StatusCode::BAD_GATEWAY,
        EngineError::InvalidIntentState { .. } | EngineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn ok_json<T: Serialize>(value: T) -> axum::response::Response {
    (StatusCode::OK, Json(value)).into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /users`
pub async fn register_user(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterUserRequest>,
) -> impl IntoResponse {
    match state.engine.register_user(&req.id, &req.display_name).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /profiles/:id`
pub async fn get_profile(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.get_profile(&id).await {
        Ok(profile) => ok_json::<UserProfile>(profile),
        Err(e) => error_response(e),
    }
}

/// `POST /quests`
pub async fn create_quest(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateQuestRequest>,
) -> impl IntoResponse {
    let params = NewQuest {
        title: req.title,
        description: req.description,
        category: req.category,
        location: req.location,
        price: Money::from_major(req.price),
        urgent: req.urgent,
        points_reward: req.points_reward,
        rarity: req.rarity,
        due_at: req.due_at,
    };
    match state.engine.create_quest(&req.requester_id, params).await {
        Ok(quest) => (StatusCode::CREATED, Json(quest)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /quests/:id`
pub async fn get_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
) -> impl IntoResponse {
    match state.engine.get_quest(id).await {
        Ok(quest) => ok_json(quest),
        Err(e) => error_response(e),
    }
}

/// `GET /quests/:id/intents`
pub async fn get_quest_intents(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
) -> impl IntoResponse {
    match state.engine.intents_for_quest(id).await {
        Ok(intents) => ok_json(IntentsResponse {
            quest_id: id,
            count: intents.len(),
            intents,
        }),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/claim`
pub async fn claim_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<ClaimRequest>,
) -> impl IntoResponse {
    // Resolve the tip before touching the lifecycle: absolute beats
    // percentage, default is none.
    let tip = match (req.tip, req.tip_percent) {
        (Some(major), _) => Money::from_major(major),
        (None, Some(pct)) => match state.engine.get_quest(id).await {
            Ok(quest) => tip_for_percent(quest.price, pct),
            Err(e) => return error_response(e),
        },
        (None, None) => Money::ZERO,
    };

    match state.engine.claim(id, &req.actor_id, tip).await {
        Ok((quest, intent)) => ok_json(ClaimResponse {
            quest,
            intent_id: intent.id,
            client_secret: intent.client_secret,
        }),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/submit`
pub async fn submit_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<ActorRequest>,
) -> impl IntoResponse {
    match state.engine.submit(id, &req.actor_id).await {
        Ok(quest) => ok_json(quest),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/approve`
pub async fn approve_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<VerdictRequest>,
) -> impl IntoResponse {
    let feedback = match (req.comment, req.rating) {
        (Some(comment), Some(rating)) => Some(FeedbackInput { comment, rating }),
        _ => None,
    };
    match state.engine.approve(id, &req.actor_id, feedback).await {
        Ok(quest) => ok_json(quest),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/reject`
pub async fn reject_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<VerdictRequest>,
) -> impl IntoResponse {
    // Rejection must carry feedback so the adventurer knows what to fix.
    let Some(rating) = req.rating else {
        return error_response(EngineError::Validation(
            "a rating is required to reject".to_string(),
        ));
    };
    let feedback = FeedbackInput {
        comment: req.comment.unwrap_or_default(),
        rating,
    };
    match state.engine.reject(id, &req.actor_id, feedback).await {
        Ok(quest) => ok_json(quest),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/cancel`
pub async fn cancel_quest(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<ActorRequest>,
) -> impl IntoResponse {
    match state.engine.cancel(id, &req.actor_id).await {
        Ok(quest) => ok_json(quest),
        Err(e) => error_response(e),
    }
}

/// `POST /quests/:id/reviews`
pub async fn submit_review(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<QuestId>,
    Json(req): Json<ReviewRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .submit_review(id, &req.reviewer_id, &req.reviewee_id, req.rating, req.comment)
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({"ok": true}))).into_response(),
        Err(e) => error_response(e),
    }
}
