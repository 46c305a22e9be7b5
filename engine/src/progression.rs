//! XP, level, and badge progression.
//!
//! Progression is derived deterministically from two cumulative counters
//! — points and completed tasks — against a static badge catalog sorted
//! ascending by `points_required`. The engine never reduces either
//! counter, so everything here is monotonic.

use serde::{Deserialize, Serialize};

/// One badge in the static catalog. Pure reference data; presentation
/// concerns (icons, artwork) live in the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    /// Minimum cumulative points.
    pub points_required: u64,
    /// Minimum completed tasks, if the badge also gates on task count.
    pub tasks_required: Option<u64>,
}

impl Badge {
    fn new(id: &str, name: &str, points_required: u64, tasks_required: Option<u64>) -> Self {
        Badge {
            id: id.to_string(),
            name: name.to_string(),
            points_required,
            tasks_required,
        }
    }

    /// A badge is earned iff the points threshold is met and the task
    /// threshold, when present, is met too.
    pub fn earned_by(&self, points: u64, completed_tasks: u64) -> bool {
        points >= self.points_required
            && self.tasks_required.is_none_or(|t| completed_tasks >= t)
    }
}

/// The default catalog, ordered ascending by `points_required`.
pub fn default_catalog() -> Vec<Badge> {
    vec![
        Badge::new("first_task", "First Task", 10, Some(1)),
        Badge::new("helping_hand", "Helping Hand", 50, Some(5)),
        Badge::new("go_getter", "Go-Getter", 250, Some(15)),
        Badge::new("local_hero", "Local Hero", 600, Some(40)),
        Badge::new("legend", "Legend", 1_500, Some(100)),
    ]
}

/// All badges earned at the given standing. Order-independent; the
/// result is what gets persisted as the profile's badge-id set.
pub fn unlocked_badges(catalog: &[Badge], points: u64, completed_tasks: u64) -> Vec<String> {
    catalog
        .iter()
        .filter(|b| b.earned_by(points, completed_tasks))
        .map(|b| b.id.clone())
        .collect()
}

/// The first badge in catalog order that is not yet earned, or `None`
/// when every badge is earned. Stops at the first gap: later badges with
/// smaller combined requirements are irrelevant to the "next" notion.
pub fn next_badge<'a>(catalog: &'a [Badge], points: u64, completed_tasks: u64) -> Option<&'a Badge> {
    catalog.iter().find(|b| !b.earned_by(points, completed_tasks))
}

/// Level as a function of cumulative XP: one level per 100 XP, starting
/// at level 1. Non-decreasing because XP only ever increases.
pub fn level_for_xp(xp: u64) -> u32 {
    (xp / 100) as u32 + 1
}
