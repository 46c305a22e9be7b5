//! Database layer — migrations, row mapping, and the SQLite-backed
//! [`QuestStore`].
//!
//! The two concurrency-sensitive operations rely on SQLite's own
//! serialization: `claim_quest` is a conditional `UPDATE … WHERE status
//! = 'open'` (rows_affected tells the racing loser apart), and `apply`
//! runs every effect of a transition inside one transaction. Profile
//! increments are expressed in SQL (`points = points + ?`) so
//! simultaneous completions never lose an update.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use questboard_engine::progression::{level_for_xp, unlocked_badges, Badge};
use questboard_engine::{
    EngineError, Feedback, IntentStatus, Money, PaymentIntent, Quest, QuestId, QuestStatus,
    QuestStore, Rarity, Review, TransitionEffects, UserProfile,
};

type Result<T> = std::result::Result<T, EngineError>;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn storage_err(e: sqlx::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

// ─────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct QuestRow {
    id: i64,
    title: String,
    description: String,
    category: String,
    location: String,
    price_minor: i64,
    urgent: i64,
    points_reward: i64,
    rarity: String,
    created_at: i64,
    due_at: Option<i64>,
    requester_id: String,
    assignee_id: Option<String>,
    status: String,
    feedback_comment: Option<String>,
    feedback_rating: Option<i64>,
    feedback_at: Option<i64>,
    completed_at: Option<i64>,
    rework_cycles: i64,
}

impl QuestRow {
    fn into_quest(self) -> Result<Quest> {
        let status = QuestStatus::from_str(&self.status)
            .ok_or_else(|| EngineError::Storage(format!("bad quest status '{}'", self.status)))?;
        let rarity = Rarity::from_str(&self.rarity)
            .ok_or_else(|| EngineError::Storage(format!("bad rarity '{}'", self.rarity)))?;
        let feedback = match (self.feedback_comment, self.feedback_rating, self.feedback_at) {
            (Some(comment), Some(rating), Some(timestamp)) => Some(Feedback {
                comment,
                rating: rating as u8,
                timestamp,
            }),
            _ => None,
        };
        Ok(Quest {
            id: self.id as QuestId,
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            price: Money::from_minor_units(self.price_minor),
            urgent: self.urgent != 0,
            points_reward: self.points_reward as u64,
            rarity,
            created_at: self.created_at,
            due_at: self.due_at,
            requester_id: self.requester_id,
            assignee_id: self.assignee_id,
            status,
            feedback,
            completed_at: self.completed_at,
            rework_cycles: self.rework_cycles as u32,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: String,
    quest_id: i64,
    amount_minor: i64,
    tip_minor: i64,
    fee_minor: i64,
    status: String,
    created_at: i64,
    client_secret: String,
}

impl IntentRow {
    fn into_intent(self) -> Result<PaymentIntent> {
        let status = IntentStatus::from_str(&self.status)
            .ok_or_else(|| EngineError::Storage(format!("bad intent status '{}'", self.status)))?;
        Ok(PaymentIntent {
            id: self.id,
            quest_id: self.quest_id as QuestId,
            amount: Money::from_minor_units(self.amount_minor),
            tip_amount: Money::from_minor_units(self.tip_minor),
            platform_fee: Money::from_minor_units(self.fee_minor),
            status,
            created_at: self.created_at,
            client_secret: self.client_secret,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    display_name: String,
    rating: f64,
    review_count: i64,
    level: i64,
    points: i64,
    badges: String,
    completed_tasks: i64,
    verified: i64,
    available_minor: i64,
    pending_minor: i64,
}

impl ProfileRow {
    fn into_profile(self) -> Result<UserProfile> {
        let badges: Vec<String> = serde_json::from_str(&self.badges)
            .map_err(|e| EngineError::Storage(format!("bad badge set: {e}")))?;
        Ok(UserProfile {
            id: self.id,
            display_name: self.display_name,
            rating: self.rating,
            review_count: self.review_count as u32,
            level: self.level as u32,
            points: self.points as u64,
            badges,
            completed_tasks: self.completed_tasks as u64,
            verified: self.verified != 0,
            available_earnings: Money::from_minor_units(self.available_minor),
            pending_earnings: Money::from_minor_units(self.pending_minor),
        })
    }
}

// ─────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────

pub struct SqliteStore {
    pool: SqlitePool,
    catalog: Vec<Badge>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, catalog: Vec<Badge>) -> Self {
        SqliteStore { pool, catalog }
    }
}

/// Write one quest row (update by id) inside an open transaction.
async fn write_quest(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, quest: &Quest) -> Result<()> {
    let (fb_comment, fb_rating, fb_at) = match &quest.feedback {
        Some(fb) => (
            Some(fb.comment.clone()),
            Some(i64::from(fb.rating)),
            Some(fb.timestamp),
        ),
        None => (None, None, None),
    };
    sqlx::query(
        r#"
        UPDATE quests
        SET    status = ?1, assignee_id = ?2, feedback_comment = ?3,
               feedback_rating = ?4, feedback_at = ?5, completed_at = ?6,
               rework_cycles = ?7
        WHERE  id = ?8
        "#,
    )
    .bind(quest.status.as_str())
    .bind(&quest.assignee_id)
    .bind(fb_comment)
    .bind(fb_rating)
    .bind(fb_at)
    .bind(quest.completed_at)
    .bind(i64::from(quest.rework_cycles))
    .bind(quest.id as i64)
    .execute(&mut **tx)
    .await
    .map_err(storage_err)?;
    Ok(())
}

#[async_trait]
impl QuestStore for SqliteStore {
    async fn insert_quest(&self, quest: &Quest) -> Result<QuestId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quests
                (title, description, category, location, price_minor, urgent,
                 points_reward, rarity, created_at, due_at, requester_id, status,
                 rework_cycles)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
            RETURNING id
            "#,
        )
        .bind(&quest.title)
        .bind(&quest.description)
        .bind(&quest.category)
        .bind(&quest.location)
        .bind(quest.price.as_minor_units())
        .bind(quest.urgent as i64)
        .bind(quest.points_reward as i64)
        .bind(quest.rarity.as_str())
        .bind(quest.created_at)
        .bind(quest.due_at)
        .bind(&quest.requester_id)
        .bind(quest.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(id as QuestId)
    }

    async fn load_quest(&self, id: QuestId) -> Result<Quest> {
        let row = sqlx::query_as::<_, QuestRow>("SELECT * FROM quests WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(EngineError::QuestNotFound(id))?;
        row.into_quest()
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO profiles
                (id, display_name, rating, review_count, level, points, badges,
                 completed_tasks, verified, available_minor, pending_minor)
            VALUES (?1, ?2, 0, 0, 1, 0, '[]', 0, 0, 0, 0)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn load_profile(&self, id: &str) -> Result<UserProfile> {
        let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| EngineError::ProfileNotFound(id.to_string()))?;
        row.into_profile()
    }

    async fn load_intent(&self, id: &str) -> Result<PaymentIntent> {
        let row = sqlx::query_as::<_, IntentRow>("SELECT * FROM payment_intents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| EngineError::Storage(format!("intent '{id}' not found")))?;
        row.into_intent()
    }

    async fn intents_for_quest(&self, quest_id: QuestId) -> Result<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, IntentRow>(
            "SELECT * FROM payment_intents WHERE quest_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(quest_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.into_iter().map(IntentRow::into_intent).collect()
    }

    async fn claim_quest(&self, id: QuestId, assignee: &str) -> Result<Quest> {
        // The compare-and-set: only an 'open' row can flip to 'assigned'.
        let updated = sqlx::query(
            "UPDATE quests SET status = 'assigned', assignee_id = ?1 \
             WHERE id = ?2 AND status = 'open'",
        )
        .bind(assignee)
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?
        .rows_affected();

        if updated == 0 {
            // Lost the race, or the quest is gone/terminal. Look once to
            // tell the caller which.
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM quests WHERE id = ?1")
                    .bind(id as i64)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage_err)?;
            return Err(match status.as_deref().and_then(QuestStatus::from_str) {
                None => EngineError::QuestNotFound(id),
                Some(s @ QuestStatus::Cancelled) | Some(s @ QuestStatus::Completed) => {
                    EngineError::InvalidTransition {
                        action: "claim",
                        status: s,
                    }
                }
                Some(_) => EngineError::AlreadyAssigned,
            });
        }
        self.load_quest(id).await
    }

    async fn revert_claim(&self, id: QuestId) -> Result<()> {
        sqlx::query("UPDATE quests SET status = 'open', assignee_id = NULL WHERE id = ?1")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn apply(&self, effects: TransitionEffects) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        if let Some(quest) = &effects.quest {
            write_quest(&mut tx, quest).await?;
        }

        if let Some(intent) = &effects.intent {
            sqlx::query(
                r#"
                INSERT INTO payment_intents
                    (id, quest_id, amount_minor, tip_minor, fee_minor, status,
                     created_at, client_secret)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (id) DO UPDATE SET status = excluded.status
                "#,
            )
            .bind(&intent.id)
            .bind(intent.quest_id as i64)
            .bind(intent.amount.as_minor_units())
            .bind(intent.tip_amount.as_minor_units())
            .bind(intent.platform_fee.as_minor_units())
            .bind(intent.status.as_str())
            .bind(intent.created_at)
            .bind(&intent.client_secret)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        if let Some(delta) = &effects.profile_delta {
            // Additive increment in SQL, then recompute the derived
            // level and badge set from the post-increment counters —
            // all inside the same transaction.
            let updated = sqlx::query(
                "UPDATE profiles SET points = points + ?1, \
                 completed_tasks = completed_tasks + ?2, \
                 pending_minor = pending_minor + ?3 WHERE id = ?4",
            )
            .bind(delta.points as i64)
            .bind(delta.completed_tasks as i64)
            .bind(delta.pending_earnings.as_minor_units())
            .bind(&delta.user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?
            .rows_affected();
            if updated == 0 {
                return Err(EngineError::ProfileNotFound(delta.user_id.clone()));
            }

            let row = sqlx::query("SELECT points, completed_tasks FROM profiles WHERE id = ?1")
                .bind(&delta.user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_err)?;
            let points: i64 = row.get("points");
            let tasks: i64 = row.get("completed_tasks");
            let badges = unlocked_badges(&self.catalog, points as u64, tasks as u64);
            let badges_json =
                serde_json::to_string(&badges).map_err(|e| EngineError::Storage(e.to_string()))?;
            sqlx::query("UPDATE profiles SET level = ?1, badges = ?2 WHERE id = ?3")
                .bind(i64::from(level_for_xp(points as u64)))
                .bind(badges_json)
                .bind(&delta.user_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO reviews
                (quest_id, reviewer_id, reviewee_id, rating, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(review.quest_id as i64)
        .bind(&review.reviewer_id)
        .bind(&review.reviewee_id)
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?
        .rows_affected();
        if inserted == 0 {
            return Err(EngineError::DuplicateReview);
        }

        // Fold the score into the running mean additively.
        let updated = sqlx::query(
            "UPDATE profiles SET \
             rating = (rating * review_count + ?1) / (review_count + 1.0), \
             review_count = review_count + 1 WHERE id = ?2",
        )
        .bind(f64::from(review.rating))
        .bind(&review.reviewee_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?
        .rows_affected();
        if updated == 0 {
            return Err(EngineError::ProfileNotFound(review.reviewee_id.clone()));
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Expiry sweep support
// ─────────────────────────────────────────────────────────

/// Open quests whose due date has passed, oldest first.
pub async fn expired_open_quests(pool: &SqlitePool, now: i64) -> Result<Vec<QuestId>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM quests WHERE status = 'open' AND due_at IS NOT NULL AND due_at < ?1 \
         ORDER BY due_at ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(storage_err)?;
    Ok(ids.into_iter().map(|i| i as QuestId).collect())
}
