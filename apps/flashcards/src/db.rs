//! Database operations for flashcards.

use crate::models::{Card, CardId, Review, Schedule, Stats};
use crate::scheduler::PASSING_QUALITY;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Card not found: {0}")]
    NotFound(CardId),
}

pub type DbResult<T> = Result<T, DbError>;

const CARD_COLUMNS: &str = "id, question, answer, card_type, created_at, \
     easiness_factor, interval, review_count, last_reviewed, next_review";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> DbResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                card_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                easiness_factor REAL NOT NULL DEFAULT 2.5,
                interval INTEGER NOT NULL DEFAULT 1,
                review_count INTEGER NOT NULL DEFAULT 0,
                last_reviewed TEXT,
                next_review TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS card_tags (
                card_id TEXT NOT NULL REFERENCES cards(id),
                tag TEXT NOT NULL,
                PRIMARY KEY (card_id, tag)
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                card_id TEXT NOT NULL REFERENCES cards(id),
                quality INTEGER NOT NULL,
                reviewed_at TEXT NOT NULL,
                time_taken_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_cards_next_review ON cards(next_review);
            CREATE INDEX IF NOT EXISTS idx_reviews_card ON reviews(card_id);
            "#,
        )?;
        Ok(())
    }

    // Card operations

    pub fn insert_card(&self, card: &Card) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO cards ({CARD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                card.id.to_string(),
                card.question,
                card.answer,
                card.card_type,
                format_ts(&card.created_at),
                card.schedule.easiness_factor,
                card.schedule.interval,
                card.schedule.review_count,
                card.schedule.last_reviewed.as_ref().map(format_ts),
                format_ts(&card.schedule.next_review),
            ],
        )?;
        insert_tags(&tx, card)?;
        tx.commit()?;
        Ok(())
    }

    /// Update content fields. Scheduling state is left alone.
    pub fn update_card(&self, card: &Card) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE cards SET question = ?2, answer = ?3, card_type = ?4 WHERE id = ?1",
            params![card.id.to_string(), card.question, card.answer, card.card_type],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(card.id));
        }
        tx.execute("DELETE FROM card_tags WHERE card_id = ?1", params![card.id.to_string()])?;
        insert_tags(&tx, card)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_card(&self, id: CardId) -> DbResult<Option<Card>> {
        let mut stmt = self.conn.prepare(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"))?;
        let card = stmt.query_row(params![id.to_string()], parse_card_row);

        match card {
            Ok(mut c) => {
                c.tags = self.tags_for(id)?;
                Ok(Some(c))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All cards, oldest first.
    pub fn list_cards(&self) -> DbResult<Vec<Card>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at, rowid"))?;
        let mut cards = stmt
            .query_map([], parse_card_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        self.attach_tags(&mut cards)?;
        Ok(cards)
    }

    /// Cards with `next_review <= now`, earliest due first.
    pub fn due_cards(&self, now: DateTime<Utc>) -> DbResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards
             WHERE next_review <= ?1
             ORDER BY next_review, created_at, rowid"
        ))?;
        let mut cards = stmt
            .query_map(params![format_ts(&now)], parse_card_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        self.attach_tags(&mut cards)?;
        Ok(cards)
    }

    // Schedule operations

    /// Persist a reviewed card's schedule together with its review log entry.
    pub fn record_review(&self, card: &Card, review: &Review) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        save_schedule(&tx, card.id, &card.schedule)?;
        tx.execute(
            "INSERT INTO reviews (id, card_id, quality, reviewed_at, time_taken_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                review.id.to_string(),
                review.card_id.to_string(),
                review.quality,
                format_ts(&review.reviewed_at),
                review.time_taken_ms,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn reviews_for(&self, card_id: CardId) -> DbResult<Vec<Review>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, quality, reviewed_at, time_taken_ms FROM reviews
             WHERE card_id = ?1 ORDER BY reviewed_at",
        )?;
        let reviews = stmt
            .query_map(params![card_id.to_string()], |row| {
                Ok(Review {
                    id: get_uuid(row, 0)?,
                    card_id: get_uuid(row, 1)?,
                    quality: row.get(2)?,
                    reviewed_at: get_ts(row, 3)?,
                    time_taken_ms: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(reviews)
    }

    // Statistics

    pub fn stats(&self, now: DateTime<Utc>) -> DbResult<Stats> {
        let (total_cards, due_now, new_cards, average_ease) = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN next_review <= ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN last_reviewed IS NULL THEN 1 ELSE 0 END), 0),
                AVG(easiness_factor)
             FROM cards",
            params![format_ts(&now)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            },
        )?;

        let (total_reviews, successes) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN quality >= ?1 THEN 1 ELSE 0 END), 0)
             FROM reviews",
            params![PASSING_QUALITY],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(Stats {
            total_cards: total_cards as usize,
            due_now: due_now as usize,
            new_cards: new_cards as usize,
            average_ease,
            total_reviews: total_reviews as usize,
            success_rate: if total_reviews == 0 {
                0.0
            } else {
                successes as f64 / total_reviews as f64
            },
        })
    }

    // Tags

    fn tags_for(&self, card_id: CardId) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM card_tags WHERE card_id = ?1 ORDER BY rowid")?;
        let tags = stmt
            .query_map(params![card_id.to_string()], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(tags)
    }

    fn attach_tags(&self, cards: &mut [Card]) -> DbResult<()> {
        if cards.is_empty() {
            return Ok(());
        }

        let mut stmt = self.conn.prepare("SELECT card_id, tag FROM card_tags ORDER BY rowid")?;
        let mut by_card: HashMap<String, Vec<String>> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (card_id, tag) = row?;
            by_card.entry(card_id).or_default().push(tag);
        }

        for card in cards {
            card.tags = by_card.remove(&card.id.to_string()).unwrap_or_default();
        }
        Ok(())
    }
}

fn save_schedule(conn: &Connection, card_id: CardId, schedule: &Schedule) -> DbResult<()> {
    let changed = conn.execute(
        "UPDATE cards SET easiness_factor = ?2, interval = ?3, review_count = ?4,
            last_reviewed = ?5, next_review = ?6
         WHERE id = ?1",
        params![
            card_id.to_string(),
            schedule.easiness_factor,
            schedule.interval,
            schedule.review_count,
            schedule.last_reviewed.as_ref().map(format_ts),
            format_ts(&schedule.next_review),
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(card_id));
    }
    Ok(())
}

fn insert_tags(conn: &Connection, card: &Card) -> DbResult<()> {
    for tag in &card.tags {
        conn.execute(
            "INSERT OR IGNORE INTO card_tags (card_id, tag) VALUES (?1, ?2)",
            params![card.id.to_string(), tag],
        )?;
    }
    Ok(())
}

/// Fixed-width UTC timestamps, so text order in SQL matches time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row, idx: usize) -> SqlResult<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_ts(idx: usize, s: &str) -> SqlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_ts(row: &Row, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(idx, &s)
}

fn get_opt_ts(row: &Row, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_ts(idx, &s)).transpose()
}

fn parse_card_row(row: &Row) -> SqlResult<Card> {
    Ok(Card {
        id: get_uuid(row, 0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        card_type: row.get(3)?,
        tags: Vec::new(),
        created_at: get_ts(row, 4)?,
        schedule: Schedule {
            easiness_factor: row.get(5)?,
            interval: row.get(6)?,
            review_count: row.get(7)?,
            last_reviewed: get_opt_ts(row, 8)?,
            next_review: get_ts(row, 9)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::review_card;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_card_crud() {
        let db = Database::in_memory().unwrap();
        let card = Card::new("What is 2+2?", "4", t0())
            .with_type("math")
            .with_tag("arithmetic")
            .with_tag("easy");
        db.insert_card(&card).unwrap();

        let loaded = db.get_card(card.id).unwrap().unwrap();
        assert_eq!(loaded, card);

        let mut edited = loaded.clone();
        edited.answer = "four".to_string();
        edited.tags = vec!["easy".to_string()];
        db.update_card(&edited).unwrap();

        let loaded = db.get_card(card.id).unwrap().unwrap();
        assert_eq!(loaded.answer, "four");
        assert_eq!(loaded.tags, vec!["easy"]);
        assert_eq!(loaded.schedule, card.schedule);

        assert_eq!(db.list_cards().unwrap().len(), 1);
        assert!(db.get_card(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_card() {
        let db = Database::in_memory().unwrap();
        let card = Card::new("Q", "A", t0());
        assert!(matches!(db.update_card(&card), Err(DbError::NotFound(id)) if id == card.id));
        assert!(matches!(
            save_schedule(&db.conn, card.id, &card.schedule),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_record_review_persists_schedule() {
        let db = Database::in_memory().unwrap();
        let card = Card::new("Q", "A", t0());
        db.insert_card(&card).unwrap();

        let now = t0() + Duration::hours(2);
        let reviewed = review_card(&card, 5, now).unwrap();
        let review = Review::new(card.id, 5, now, 4200);
        db.record_review(&reviewed, &review).unwrap();

        let loaded = db.get_card(card.id).unwrap().unwrap();
        assert_eq!(loaded.schedule, reviewed.schedule);
        assert_eq!(db.reviews_for(card.id).unwrap(), vec![review]);
    }

    #[test]
    fn test_due_cards_ordered() {
        let db = Database::in_memory().unwrap();
        let now = t0();

        let mut overdue = Card::new("overdue", "A", now - Duration::days(10));
        overdue.schedule.next_review = now - Duration::days(2);
        let fresh = Card::new("fresh", "A", now - Duration::hours(1));
        let mut future = Card::new("future", "A", now - Duration::days(10));
        future.schedule.next_review = now + Duration::days(3);
        let exact = Card::new("exact", "A", now);

        for card in [&fresh, &future, &exact, &overdue] {
            db.insert_card(card).unwrap();
        }

        let due: Vec<String> = db.due_cards(now).unwrap().into_iter().map(|c| c.question).collect();
        assert_eq!(due, vec!["overdue", "fresh", "exact"]);
    }

    #[test]
    fn test_timestamps_round_trip_at_microseconds() {
        let db = Database::in_memory().unwrap();
        let created = t0() + Duration::microseconds(123_456);
        let card = Card::new("Q", "A", created);
        db.insert_card(&card).unwrap();

        let loaded = db.get_card(card.id).unwrap().unwrap();
        assert_eq!(loaded.created_at, created);
        assert_eq!(format_ts(&created), "2024-03-01T09:00:00.123456Z");
    }

    #[test]
    fn test_stats() {
        let db = Database::in_memory().unwrap();
        let now = t0();
        assert_eq!(db.stats(now).unwrap(), Stats::default());

        let a = Card::new("a", "A", now);
        let b = Card::new("b", "B", now);
        db.insert_card(&a).unwrap();
        db.insert_card(&b).unwrap();

        let reviewed = review_card(&a, 5, now).unwrap();
        db.record_review(&reviewed, &Review::new(a.id, 5, now, 1000)).unwrap();
        let lapsed = review_card(&b, 1, now).unwrap();
        db.record_review(&lapsed, &Review::new(b.id, 1, now, 1000)).unwrap();

        let stats = db.stats(now).unwrap();
        assert_eq!(stats.total_cards, 2);
        assert_eq!(stats.due_now, 0);
        assert_eq!(stats.new_cards, 0);
        assert_eq!(stats.total_reviews, 2);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.average_ease.unwrap() - 2.55).abs() < 1e-9);

        assert_eq!(db.stats(now + Duration::days(1)).unwrap().due_now, 2);
    }

    #[test]
    fn test_corrupt_row_is_an_error() {
        let db = Database::in_memory().unwrap();
        let card = Card::new("Q", "A", t0());
        db.insert_card(&card).unwrap();
        db.conn
            .execute("UPDATE cards SET next_review = 'soon' WHERE id = ?1", params![card.id.to_string()])
            .unwrap();

        assert!(matches!(db.get_card(card.id), Err(DbError::Sqlite(_))));
    }
}
