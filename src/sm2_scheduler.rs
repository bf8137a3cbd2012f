use chrono::{DateTime, Duration, Utc};

use crate::models::{Card, CardPhase};

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Self-reported recall quality for one review, on the classic SM-2 scale.
/// Anything below `Hard` counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Blackout = 0,
    Incorrect = 1,
    Almost = 2,
    Hard = 3,
    Good = 4,
    Perfect = 5,
}

impl Quality {
    pub fn from_int(value: i32) -> Option<Quality> {
        match value {
            0 => Some(Quality::Blackout),
            1 => Some(Quality::Incorrect),
            2 => Some(Quality::Almost),
            3 => Some(Quality::Hard),
            4 => Some(Quality::Good),
            5 => Some(Quality::Perfect),
            _ => None,
        }
    }

    pub fn as_int(self) -> i32 {
        self as i32
    }

    pub fn is_failure(self) -> bool {
        self.as_int() < 3
    }
}

/// Tunable SM-2 parameters. Defaults follow the original algorithm.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub initial_ease: f64,
    pub minimum_ease: f64,
    pub first_interval_days: i64,
    pub second_interval_days: i64,
    pub relearn_interval_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_ease: INITIAL_EASE_FACTOR,
            minimum_ease: MIN_EASE_FACTOR,
            first_interval_days: 1,
            second_interval_days: 6,
            relearn_interval_days: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sm2Scheduler {
    config: SchedulerConfig,
}

impl Sm2Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Computes the card's next state for a review at `now`. Pure: no I/O,
    /// no clock reads. Appending the Review record is the caller's job.
    pub fn schedule_card(&self, card: &Card, quality: Quality, now: DateTime<Utc>) -> Card {
        let new_ease = self.next_ease_factor(card.ease_factor, quality);

        let (new_reps, new_interval, new_fails) = if quality.is_failure() {
            (0, self.config.relearn_interval_days, card.total_fails + 1)
        } else {
            let reps = card.reps + 1;
            let interval = match reps {
                1 => self.config.first_interval_days,
                2 => self.config.second_interval_days,
                _ => (card.interval_days as f64 * new_ease).round() as i64,
            };
            (reps, interval, card.total_fails)
        };

        let total_reviews = card.total_reviews + 1;

        Card {
            ease_factor: new_ease,
            interval_days: new_interval,
            reps: new_reps,
            total_reviews,
            total_fails: new_fails,
            last_reviewed: Some(now),
            next_review: now + Duration::days(new_interval),
            phase: CardPhase::after_review(new_reps, total_reviews),
            ..card.clone()
        }
    }

    /// Classic SM-2 ease update, applied for every quality and clamped to
    /// the configured floor:
    /// `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`
    fn next_ease_factor(&self, ease: f64, quality: Quality) -> f64 {
        let q = quality.as_int() as f64;
        let delta = 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02);
        (ease + delta).max(self.config.minimum_ease)
    }
}
