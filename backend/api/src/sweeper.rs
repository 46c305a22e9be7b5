//! Long-running background task that expires overdue quests.
//!
//! Open quests past their due date are cancelled on the system's
//! behalf through the same lifecycle transition a requester would use,
//! so every guard and hold-release rule still applies. Assigned quests
//! are left alone — work in progress is a dispute for the verification
//! flow, not the sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, info};

use questboard_engine::QuestEngine;

use crate::db;

pub struct SweeperState {
    pub pool: SqlitePool,
    pub engine: Arc<QuestEngine>,
    pub interval_secs: u64,
}

/// Spawn the sweep loop as a background [`tokio`] task.
pub async fn run(state: Arc<SweeperState>) {
    info!(
        interval_secs = state.interval_secs,
        "Expiry sweeper starting"
    );

    loop {
        match sweep_once(&state).await {
            Ok(0) => {}
            Ok(n) => info!("Expired {n} overdue quests"),
            Err(e) => error!("Sweep error: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(state.interval_secs)).await;
    }
}

/// Perform a single sweep iteration. Returns how many quests were
/// cancelled.
async fn sweep_once(state: &SweeperState) -> crate::errors::Result<usize> {
    let now = Utc::now().timestamp();
    let expired = db::expired_open_quests(&state.pool, now).await?;

    let mut cancelled = 0usize;
    for quest_id in expired {
        // A claim may race the sweep; losing that race is fine, the
        // quest just stays live.
        match state.engine.cancel_by_system(quest_id).await {
            Ok(_) => cancelled += 1,
            Err(e) => info!(quest_id, "skipping expiry: {e}"),
        }
    }
    Ok(cancelled)
}
