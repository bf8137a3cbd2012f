use chrono::{DateTime, Utc};

use crate::models::Card;

/// Selects the cards eligible for review at `now` from a user's cards.
///
/// A card is eligible when `next_review <= now`. Cards never reviewed
/// before are capped at `max_new_cards` per call; in-progress cards are
/// not capped. Results come back oldest-due-first, ties broken by card id
/// so repeated calls are deterministic. An optional tag narrows the
/// selection without changing the ordering. Read-only.
pub fn select_due(
    cards: Vec<Card>,
    now: DateTime<Utc>,
    max_new_cards: usize,
    tag_filter: Option<&str>,
) -> Vec<Card> {
    let mut due: Vec<Card> = cards
        .into_iter()
        .filter(|card| card.is_due(now))
        .filter(|card| match tag_filter {
            Some(tag) => card.tags.iter().any(|t| t == tag),
            None => true,
        })
        .collect();

    due.sort_by(|a, b| {
        a.next_review
            .cmp(&b.next_review)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut new_cards_taken = 0;
    due.retain(|card| {
        if card.is_new() {
            if new_cards_taken >= max_new_cards {
                return false;
            }
            new_cards_taken += 1;
        }
        true
    });

    due
}
