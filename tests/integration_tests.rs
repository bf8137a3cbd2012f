use chrono::{Duration, Utc};
use uuid::Uuid;
use vocab_srs::{
    CardPhase, CardService, Database, LeechConfig, NewCard, Quality, SrsConfig,
};

async fn create_test_service() -> CardService {
    let db = Database::new("sqlite::memory:").await.unwrap();
    CardService::new(db, SrsConfig::default())
}

fn new_card(user_id: &str, front: &str, back: &str) -> NewCard {
    NewCard {
        user_id: user_id.to_string(),
        front: front.to_string(),
        back: back.to_string(),
        tags: vec![],
    }
}

#[tokio::test]
async fn test_card_creation_and_retrieval() {
    let service = create_test_service().await;

    let created = service
        .create_card(new_card("learner-1", "Das Haus", "The house"))
        .await
        .unwrap();

    assert_eq!(created.front, "Das Haus");
    assert_eq!(created.back, "The house");
    assert_eq!(created.ease_factor, 2.5);
    assert_eq!(created.interval_days, 0);
    assert_eq!(created.reps, 0);
    assert_eq!(created.phase, CardPhase::New);

    let retrieved = service.get_card(created.id, None).await.unwrap();
    assert!(retrieved.is_some());
    assert_eq!(retrieved.unwrap().front, created.front);
}

#[tokio::test]
async fn test_das_haus_review_sequence() {
    let service = create_test_service().await;
    let card = service
        .create_card(new_card("learner-1", "Das Haus", "The house"))
        .await
        .unwrap();

    // First perfect recall: one-day interval.
    let first = service
        .submit_review(card.id, Quality::Perfect, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.card.reps, 1);
    assert_eq!(first.card.interval_days, 1);

    // Second perfect recall: six-day interval.
    let second = service
        .submit_review(card.id, Quality::Perfect, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.card.reps, 2);
    assert_eq!(second.card.interval_days, 6);

    // Third review fails: reps and interval collapse, counters keep climbing.
    let third = service
        .submit_review(card.id, Quality::Almost, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.card.reps, 0);
    assert_eq!(third.card.interval_days, 1);
    assert_eq!(third.card.total_fails, 1);
    assert_eq!(third.card.total_reviews, 3);
    assert!(third.card.ease_factor >= 1.3);
}

#[tokio::test]
async fn test_review_history_is_chronological_with_snapshots() {
    let service = create_test_service().await;
    let card = service
        .create_card(new_card("learner-1", "Das Haus", "The house"))
        .await
        .unwrap();

    let start = Utc::now();
    for (offset, quality) in [Quality::Perfect, Quality::Perfect, Quality::Almost]
        .into_iter()
        .enumerate()
    {
        service
            .submit_review(card.id, quality, None, start + Duration::seconds(offset as i64))
            .await
            .unwrap()
            .unwrap();
    }

    let history = service.review_history(card.id).await.unwrap().unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].reviewed_at <= w[1].reviewed_at));

    // Pre-review snapshots follow the interval sequence 0 -> 1 -> 6.
    assert_eq!(history[0].interval_before, 0);
    assert_eq!(history[1].interval_before, 1);
    assert_eq!(history[2].interval_before, 6);
    assert_eq!(history[0].ease_before, 2.5);
}

#[tokio::test]
async fn test_due_queue_and_forecast_agree_on_due_predicate() {
    let service = create_test_service().await;
    for i in 0..3 {
        service
            .create_card(new_card("learner-1", &format!("word-{}", i), "translation"))
            .await
            .unwrap();
    }

    let now = Utc::now();
    let due = service.due_cards("learner-1", now, None).await.unwrap();
    let forecast = service.forecast("learner-1", now).await.unwrap();

    assert_eq!(due.len(), 3);
    assert_eq!(forecast.cards_due_now, 3);
    assert_eq!(forecast.week[0].count, 3);
}

#[tokio::test]
async fn test_reviewed_card_moves_into_forecast_window() {
    let service = create_test_service().await;
    let card = service
        .create_card(new_card("learner-1", "Das Haus", "The house"))
        .await
        .unwrap();

    // Two successes push the card six days out.
    for _ in 0..2 {
        service
            .submit_review(card.id, Quality::Perfect, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
    }

    let now = Utc::now();
    let due = service.due_cards("learner-1", now, None).await.unwrap();
    assert!(due.is_empty());

    let forecast = service.forecast("learner-1", now).await.unwrap();
    assert_eq!(forecast.cards_due_now, 0);
    // The card sits six days ahead, inside the weekly window.
    let total_in_window: u64 = forecast.week.iter().map(|day| day.count).sum();
    assert_eq!(total_in_window, 1);
    assert_eq!(forecast.week[6].cumulative, 1);

    // The due-date override sees it once the clock passes next_review.
    let later = now + Duration::days(7);
    let due_later = service.due_cards("learner-1", later, None).await.unwrap();
    assert_eq!(due_later.len(), 1);
}

#[tokio::test]
async fn test_leech_lifecycle_flag_and_explicit_reset() {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let config = SrsConfig {
        leech: LeechConfig {
            fail_threshold: 2,
            hard_fail_threshold: 4,
            relapse_interval_days: 1,
        },
        ..SrsConfig::default()
    };
    let service = CardService::new(db, config);

    let card = service
        .create_card(new_card("learner-1", "schwierig", "difficult"))
        .await
        .unwrap();

    let first_fail = service
        .submit_review(card.id, Quality::Blackout, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(!first_fail.card.is_leech);

    let second_fail = service
        .submit_review(card.id, Quality::Blackout, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(second_fail.card.is_leech);

    // Successes never clear the flag on their own.
    let success = service
        .submit_review(card.id, Quality::Perfect, None, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(success.card.is_leech);

    let reset = service.reset_leech(card.id, None).await.unwrap().unwrap();
    assert!(!reset.is_leech);
    assert_eq!(reset.reps, success.card.reps);
    assert_eq!(reset.interval_days, success.card.interval_days);
}

#[tokio::test]
async fn test_user_scoping_of_reviews() {
    let service = create_test_service().await;
    let card = service
        .create_card(new_card("alice", "eins", "one"))
        .await
        .unwrap();

    // Another user cannot review or reset the card.
    let denied = service
        .submit_review(card.id, Quality::Good, Some("bob"), Utc::now())
        .await
        .unwrap();
    assert!(denied.is_none());

    let denied_reset = service.reset_leech(card.id, Some("bob")).await.unwrap();
    assert!(denied_reset.is_none());

    let allowed = service
        .submit_review(card.id, Quality::Good, Some("alice"), Utc::now())
        .await
        .unwrap();
    assert!(allowed.is_some());
}

#[tokio::test]
async fn test_unknown_card_operations_return_none() {
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
async fn test_concurrent_reviews_serialize_per_card() {
    let service = create_test_service().await;
    let card = service
        .create_card(new_card("learner-1", "Das Haus", "The house"))
        .await
        .unwrap();
    let now = Utc::now();

    let (a, b, c) = tokio::join!(
        service.submit_review(card.id, Quality::Good, None, now),
        service.submit_review(card.id, Quality::Good, None, now),
        service.submit_review(card.id, Quality::Blackout, None, now),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();
    c.unwrap().unwrap();

    let stored = service.get_card(card.id, None).await.unwrap().unwrap();
    let history = service.review_history(card.id).await.unwrap().unwrap();

    // All three submissions serialized: no lost updates, one record each.
    assert_eq!(stored.total_reviews, 3);
    assert_eq!(stored.version, 3);
    assert_eq!(history.len(), 3);
}
