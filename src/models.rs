use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sm2_scheduler::INITIAL_EASE_FACTOR;

/// Explicit card lifecycle phase. Leech status is tracked separately on the
/// card because it is orthogonal to scheduling progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardPhase {
    New,
    Learning,
    Review,
}

impl CardPhase {
    /// Single transition function for the phase component of a review event.
    /// Called with the card's post-review counters.
    pub fn after_review(reps: i64, total_reviews: i64) -> Self {
        if total_reviews == 0 {
            CardPhase::New
        } else if reps >= 3 {
            CardPhase::Review
        } else {
            CardPhase::Learning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardPhase::New => "New",
            CardPhase::Learning => "Learning",
            CardPhase::Review => "Review",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "Learning" => CardPhase::Learning,
            "Review" => CardPhase::Review,
            _ => CardPhase::New,
        }
    }
}

/// One learner's memory state for one vocabulary item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub user_id: String,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    pub ease_factor: f64,
    pub interval_days: i64,
    pub reps: i64,
    pub total_reviews: i64,
    pub total_fails: i64,
    pub created_at: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: DateTime<Utc>,
    pub is_leech: bool,
    pub phase: CardPhase,
    /// Optimistic-concurrency counter, bumped on every mutation.
    pub version: i64,
}

impl Card {
    /// Initial state: ease 2.5, interval 0, due immediately.
    pub fn new(new_card: NewCard, now: DateTime<Utc>) -> Self {
        Card {
            id: Uuid::new_v4(),
            user_id: new_card.user_id,
            front: new_card.front,
            back: new_card.back,
            tags: new_card.tags,
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: 0,
            reps: 0,
            total_reviews: 0,
            total_fails: 0,
            created_at: now,
            last_reviewed: None,
            next_review: now,
            is_leech: false,
            phase: CardPhase::New,
            version: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    pub fn is_new(&self) -> bool {
        self.total_reviews == 0
    }
}

/// Immutable record of one review event. Append-only; the pre-review
/// interval and ease are snapshotted for audit and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub card_id: Uuid,
    pub quality: i32,
    pub reviewed_at: DateTime<Utc>,
    pub interval_before: i64,
    pub ease_before: f64,
}

/// Validated card-creation input. Produced by the API layer from
/// [`CreateCardRequest`] after field validation.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub user_id: String,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
}

/// Wire shape for `POST /cards`. Fields are optional so the handler can
/// report missing ones as a 400 rather than a generic body rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    #[serde(default)]
    pub front: Option<String>,
    #[serde(default)]
    pub back: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Wire shape for `POST /cards/:id/review`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(default)]
    pub quality: Option<i32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Wire shape for `POST /cards/:id/reset-leech`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetLeechRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Result of a review submission: the rescheduled card plus the appended
/// review record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub card: Card,
    pub review: Review,
}
