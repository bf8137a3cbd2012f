use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::{Card, CardPhase, NewCard, Review};

/// Card store over SQLite. Owns persistence and lookup only; scheduling
/// and leech policy live above it.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        // A pooled ":memory:" database hands every connection its own empty
        // database, so those stay on a single shared connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                reps INTEGER NOT NULL DEFAULT 0,
                total_reviews INTEGER NOT NULL DEFAULT 0,
                total_fails INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_reviewed TEXT,
                next_review TEXT NOT NULL,
                is_leech INTEGER NOT NULL DEFAULT 0,
                phase TEXT NOT NULL DEFAULT 'New',
                version INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                card_id TEXT NOT NULL,
                quality INTEGER NOT NULL,
                reviewed_at TEXT NOT NULL,
                interval_before INTEGER NOT NULL,
                ease_before REAL NOT NULL,
                FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cards_user_next_review ON cards(user_id, next_review)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reviews_card_reviewed_at ON reviews(card_id, reviewed_at)",
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migrate", "database schema ensured");
        Ok(())
    }

    // Card operations

    pub async fn create_card(&self, new_card: NewCard) -> Result<Card> {
        let card = Card::new(new_card, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO cards (id, user_id, front, back, tags, ease_factor, interval_days,
                               reps, total_reviews, total_fails, created_at, last_reviewed,
                               next_review, is_leech, phase, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(card.id.to_string())
        .bind(&card.user_id)
        .bind(&card.front)
        .bind(&card.back)
        .bind(serde_json::to_string(&card.tags)?)
        .bind(card.ease_factor)
        .bind(card.interval_days)
        .bind(card.reps)
        .bind(card.total_reviews)
        .bind(card.total_fails)
        .bind(card.created_at.to_rfc3339())
        .bind(card.last_reviewed.map(|d| d.to_rfc3339()))
        .bind(card.next_review.to_rfc3339())
        .bind(card.is_leech)
        .bind(card.phase.as_str())
        .bind(card.version)
        .execute(&self.pool)
        .await?;

        Ok(card)
    }

    pub async fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        let row = sqlx::query("SELECT * FROM cards WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_card(&r)).transpose()
    }

    pub async fn get_cards_for_user(&self, user_id: &str) -> Result<Vec<Card>> {
        let rows = sqlx::query("SELECT * FROM cards WHERE user_id = ?1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_card).collect()
    }

    /// Applies a computed review atomically: the card row is updated only
    /// if its version still matches, and the review record is inserted in
    /// the same transaction. Returns false when another writer got there
    /// first, in which case nothing was written.
    pub async fn commit_review(
        &self,
        card: &Card,
        expected_version: i64,
        review: &Review,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE cards
            SET ease_factor = ?1, interval_days = ?2, reps = ?3, total_reviews = ?4,
                total_fails = ?5, last_reviewed = ?6, next_review = ?7, is_leech = ?8,
                phase = ?9, version = version + 1
            WHERE id = ?10 AND version = ?11
            "#,
        )
        .bind(card.ease_factor)
        .bind(card.interval_days)
        .bind(card.reps)
        .bind(card.total_reviews)
        .bind(card.total_fails)
        .bind(card.last_reviewed.map(|d| d.to_rfc3339()))
        .bind(card.next_review.to_rfc3339())
        .bind(card.is_leech)
        .bind(card.phase.as_str())
        .bind(card.id.to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(card_id = %card.id, expected_version, "stale card version, review not applied");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO reviews (id, card_id, quality, reviewed_at, interval_before, ease_before)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(review.id.to_string())
        .bind(review.card_id.to_string())
        .bind(review.quality)
        .bind(review.reviewed_at.to_rfc3339())
        .bind(review.interval_before)
        .bind(review.ease_before)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Clears the leech flag without touching scheduling state. Returns the
    /// refreshed card, or None when the card does not exist.
    pub async fn clear_leech(&self, card_id: Uuid) -> Result<Option<Card>> {
        let updated = sqlx::query(
            "UPDATE cards SET is_leech = 0, version = version + 1 WHERE id = ?1",
        )
        .bind(card_id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_card(card_id).await
    }

    // Review operations

    pub async fn get_reviews_for_card(&self, card_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT * FROM reviews WHERE card_id = ?1 ORDER BY reviewed_at ASC, id ASC",
        )
        .bind(card_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_review).collect()
    }

    fn row_to_card(row: &SqliteRow) -> Result<Card> {
        Ok(Card {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            user_id: row.get("user_id"),
            front: row.get("front"),
            back: row.get("back"),
            tags: serde_json::from_str(&row.get::<String, _>("tags")).unwrap_or_default(),
            ease_factor: row.get("ease_factor"),
            interval_days: row.get("interval_days"),
            reps: row.get("reps"),
            total_reviews: row.get("total_reviews"),
            total_fails: row.get("total_fails"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            last_reviewed: row
                .get::<Option<String>, _>("last_reviewed")
                .and_then(|s| parse_timestamp(&s).ok()),
            next_review: parse_timestamp(&row.get::<String, _>("next_review"))?,
            is_leech: row.get("is_leech"),
            phase: CardPhase::from_db(&row.get::<String, _>("phase")),
            version: row.get("version"),
        })
    }

    fn row_to_review(row: &SqliteRow) -> Result<Review> {
        Ok(Review {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            card_id: Uuid::parse_str(&row.get::<String, _>("card_id"))?,
            quality: row.get("quality"),
            reviewed_at: parse_timestamp(&row.get::<String, _>("reviewed_at"))?,
            interval_before: row.get("interval_before"),
            ease_before: row.get("ease_before"),
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
