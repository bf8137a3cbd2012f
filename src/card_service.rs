use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SrsConfig;
use crate::database::Database;
use crate::due_queue;
use crate::forecast::{self, Forecast};
use crate::leech::{self, LeechConfig};
use crate::models::{Card, NewCard, Review, ReviewOutcome};
use crate::sm2_scheduler::{Quality, Sm2Scheduler};

/// Review submissions retry this many times when another writer bumps the
/// card's version between our read and our commit.
const MAX_COMMIT_ATTEMPTS: u32 = 4;

#[derive(Clone)]
pub struct CardService {
    db: Database,
    scheduler: Sm2Scheduler,
    leech_config: LeechConfig,
    max_new_cards_per_day: usize,
}

impl CardService {
    pub fn new(db: Database, config: SrsConfig) -> Self {
        Self {
            db,
            scheduler: Sm2Scheduler::new(config.scheduler),
            leech_config: config.leech,
            max_new_cards_per_day: config.max_new_cards_per_day,
        }
    }

    // Card CRUD

    pub async fn create_card(&self, new_card: NewCard) -> Result<Card> {
        self.db.create_card(new_card).await
    }

    pub async fn get_card(&self, id: Uuid, user_id: Option<&str>) -> Result<Option<Card>> {
        let card = self.db.get_card(id).await?;
        Ok(card.filter(|c| user_id.is_none_or(|uid| c.user_id == uid)))
    }

    pub async fn list_cards(&self, user_id: &str) -> Result<Vec<Card>> {
        self.db.get_cards_for_user(user_id).await
    }

    // Read-side queries

    pub async fn due_cards(
        &self,
        user_id: &str,
        as_of: DateTime<Utc>,
        tag_filter: Option<&str>,
    ) -> Result<Vec<Card>> {
        let cards = self.db.get_cards_for_user(user_id).await?;
        Ok(due_queue::select_due(
            cards,
            as_of,
            self.max_new_cards_per_day,
            tag_filter,
        ))
    }

    pub async fn forecast(&self, user_id: &str, now: DateTime<Utc>) -> Result<Forecast> {
        let cards = self.db.get_cards_for_user(user_id).await?;
        Ok(forecast::build_forecast(&cards, now))
    }

    pub async fn review_history(&self, card_id: Uuid) -> Result<Option<Vec<Review>>> {
        if self.db.get_card(card_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.db.get_reviews_for_card(card_id).await?))
    }

    // Review lifecycle

    /// Submits one review: recomputes the card through the scheduler and
    /// leech policy, then commits card update and review record atomically.
    /// Lost version races are retried with a fresh read; the card and its
    /// review never diverge.
    pub async fn submit_review(
        &self,
        card_id: Uuid,
        quality: Quality,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewOutcome>> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let card = match self.get_card(card_id, user_id).await? {
                Some(card) => card,
                None => return Ok(None),
            };

            let mut updated = self.scheduler.schedule_card(&card, quality, now);
            if leech::is_leech(&updated, &self.leech_config) {
                updated.is_leech = true;
            }

            let review = Review {
                id: Uuid::new_v4(),
                card_id,
                quality: quality.as_int(),
                reviewed_at: now,
                interval_before: card.interval_days,
                ease_before: card.ease_factor,
            };

            if self.db.commit_review(&updated, card.version, &review).await? {
                updated.version = card.version + 1;
                debug!(
                    card_id = %card_id,
                    quality = quality.as_int(),
                    interval_days = updated.interval_days,
                    next_review = %updated.next_review,
                    is_leech = updated.is_leech,
                    "review applied"
                );
                return Ok(Some(ReviewOutcome {
                    card: updated,
                    review,
                }));
            }

            warn!(card_id = %card_id, attempt, "review commit lost a version race, retrying");
        }

        Err(anyhow!(
            "review commit conflict for card {} after {} attempts",
            card_id,
            MAX_COMMIT_ATTEMPTS
        ))
    }

    /// Clears the leech flag. Explicit reset is the only way a flag comes
    /// off; a run of later successes never clears it silently.
    pub async fn reset_leech(&self, card_id: Uuid, user_id: Option<&str>) -> Result<Option<Card>> {
        match self.get_card(card_id, user_id).await? {
            Some(_) => self.db.clear_leech(card_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn create_test_service() -> CardService {
        let db = Database::new("sqlite::memory:").await.unwrap();
        CardService::new(db, SrsConfig::default())
    }

    fn new_card(user_id: &str, front: &str) -> NewCard {
        NewCard {
            user_id: user_id.to_string(),
            front: front.to_string(),
            back: "back".to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_and_list_scoped_by_user() {
        let service = create_test_service().await;

        service.create_card(new_card("alice", "eins")).await.unwrap();
        service.create_card(new_card("alice", "zwei")).await.unwrap();
        service.create_card(new_card("bob", "drei")).await.unwrap();

        assert_eq!(service.list_cards("alice").await.unwrap().len(), 2);
        assert_eq!(service.list_cards("bob").await.unwrap().len(), 1);
        assert_eq!(service.list_cards("nobody").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_card_checks_ownership() {
        let service = create_test_service().await;
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();

        assert!(service.get_card(card.id, None).await.unwrap().is_some());
        assert!(service.get_card(card.id, Some("alice")).await.unwrap().is_some());
        assert!(service.get_card(card.id, Some("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_review_updates_card_and_appends_record() {
        let service = create_test_service().await;
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();

        let outcome = service
            .submit_review(card.id, Quality::Perfect, None, Utc::now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.card.reps, 1);
        assert_eq!(outcome.card.interval_days, 1);
        assert_eq!(outcome.card.total_reviews, 1);
        assert_eq!(outcome.card.version, card.version + 1);
        assert_eq!(outcome.review.interval_before, 0);
        assert_eq!(outcome.review.ease_before, 2.5);

        let history = service.review_history(card.id).await.unwrap().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].quality, 5);
    }

    #[tokio::test]
    async fn test_total_reviews_matches_review_count() {
        let service = create_test_service().await;
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();

        for quality in [Quality::Good, Quality::Blackout, Quality::Perfect] {
            service
                .submit_review(card.id, quality, None, Utc::now())
                .await
                .unwrap()
                .unwrap();
        }

        let stored = service.get_card(card.id, None).await.unwrap().unwrap();
        let history = service.review_history(card.id).await.unwrap().unwrap();
        assert_eq!(stored.total_reviews, 3);
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_due_queue_excludes_scheduled_cards() {
        let service = create_test_service().await;
        let first = service.create_card(new_card("alice", "eins")).await.unwrap();
        service.create_card(new_card("alice", "zwei")).await.unwrap();

        let due = service.due_cards("alice", Utc::now(), None).await.unwrap();
        assert_eq!(due.len(), 2);

        // Review pushes the card a day out; it must drop off the queue.
        service
            .submit_review(first.id, Quality::Good, None, Utc::now())
            .await
            .unwrap()
            .unwrap();

        let due = service.due_cards("alice", Utc::now(), None).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_ne!(due[0].id, first.id);
    }

    #[tokio::test]
    async fn test_repeated_failures_flag_leech_and_explicit_reset_clears() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let config = SrsConfig {
            leech: LeechConfig {
                fail_threshold: 3,
                hard_fail_threshold: 5,
                relapse_interval_days: 1,
            },
            ..SrsConfig::default()
        };
        let service = CardService::new(db, config);
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();

        for _ in 0..3 {
            service
                .submit_review(card.id, Quality::Blackout, None, Utc::now())
                .await
                .unwrap()
                .unwrap();
        }

        let flagged = service.get_card(card.id, None).await.unwrap().unwrap();
        assert!(flagged.is_leech);

        // A success does not clear the flag.
        service
            .submit_review(card.id, Quality::Perfect, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        let still_flagged = service.get_card(card.id, None).await.unwrap().unwrap();
        assert!(still_flagged.is_leech);

        let reset = service.reset_leech(card.id, None).await.unwrap().unwrap();
        assert!(!reset.is_leech);
        assert_eq!(reset.reps, still_flagged.reps);
        assert_eq!(reset.interval_days, still_flagged.interval_days);
        assert_eq!(reset.ease_factor, still_flagged.ease_factor);
    }

    #[tokio::test]
    async fn test_reset_leech_on_clean_card_is_noop() {
        let service = create_test_service().await;
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();

        let reset = service.reset_leech(card.id, None).await.unwrap().unwrap();
        assert!(!reset.is_leech);
    }

    #[tokio::test]
    async fn test_operations_on_missing_card() {
        let service = create_test_service().await;
        let missing = Uuid::new_v4();

        assert!(service.get_card(missing, None).await.unwrap().is_none());
        assert!(
            service
                .submit_review(missing, Quality::Good, None, Utc::now())
                .await
                .unwrap()
                .is_none()
        );
        assert!(service.reset_leech(missing, None).await.unwrap().is_none());
        assert!(service.review_history(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_reviews_of_one_card_both_commit() {
        let service = create_test_service().await;
        let card = service.create_card(new_card("alice", "eins")).await.unwrap();
        let now = Utc::now();

        let (a, b) = tokio::join!(
            service.submit_review(card.id, Quality::Good, None, now),
            service.submit_review(card.id, Quality::Good, None, now),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let stored = service.get_card(card.id, None).await.unwrap().unwrap();
        let history = service.review_history(card.id).await.unwrap().unwrap();
        assert_eq!(stored.total_reviews, 2);
        assert_eq!(stored.version, 2);
        assert_eq!(history.len(), 2);
    }
}
