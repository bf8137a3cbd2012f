use serde::Deserialize;

use crate::models::Card;

/// Thresholds for flagging a card as a leech. All knobs live here so the
/// policy is configuration rather than logic scattered across call sites.
#[derive(Debug, Clone, Deserialize)]
pub struct LeechConfig {
    /// Lifetime failures after which a card still stuck at the minimal
    /// interval band is flagged.
    pub fail_threshold: i64,
    /// Lifetime failures after which a card is flagged regardless of how
    /// far it has graduated.
    pub hard_fail_threshold: i64,
    /// Interval at or below which a card counts as "not graduated".
    pub relapse_interval_days: i64,
}

impl Default for LeechConfig {
    fn default() -> Self {
        Self {
            fail_threshold: 8,
            hard_fail_threshold: 12,
            relapse_interval_days: 1,
        }
    }
}

/// Evaluates whether a card currently qualifies as a leech. Pure.
///
/// The flag on the card itself is only ever raised by the review flow and
/// cleared by the explicit reset operation; this function never clears
/// anything.
pub fn is_leech(card: &Card, config: &LeechConfig) -> bool {
    if card.total_fails >= config.hard_fail_threshold {
        return true;
    }
    card.total_fails >= config.fail_threshold
        && card.interval_days <= config.relapse_interval_days
}
