//! Data models for flashcards.

use crate::scheduler::{INITIAL_EASE, PASSING_QUALITY};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifiers.
pub type CardId = Uuid;
pub type ReviewId = Uuid;

/// Card type label used when none is given.
pub const DEFAULT_CARD_TYPE: &str = "basic";

/// Scheduling state of a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Multiplier for interval growth, never below 1.3.
    pub easiness_factor: f64,
    /// Days until the next review after a successful one.
    pub interval: i64,
    /// Consecutive successful reviews since the last lapse.
    pub review_count: u32,
    /// Most recent review.
    pub last_reviewed: Option<DateTime<Utc>>,
    /// When the card becomes due.
    pub next_review: DateTime<Utc>,
}

impl Schedule {
    /// Initial state for a card created at `created_at`. The card is due immediately.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            easiness_factor: INITIAL_EASE,
            interval: 1,
            review_count: 0,
            last_reviewed: None,
            next_review: created_at,
        }
    }

    /// Check if due for review at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// Never reviewed.
    pub fn is_new(&self) -> bool {
        self.last_reviewed.is_none()
    }

    /// Time left until the card is due. Negative when overdue.
    pub fn due_in(&self, now: DateTime<Utc>) -> Duration {
        self.next_review.signed_duration_since(now)
    }
}

/// A flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Unique identifier.
    pub id: CardId,
    /// Question text. May contain markup; rendered as-is.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Free-form card type label.
    pub card_type: String,
    /// Tags.
    pub tags: Vec<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Scheduling state.
    pub schedule: Schedule,
}

impl Card {
    /// Create a new card, due immediately.
    pub fn new(question: impl Into<String>, answer: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            card_type: DEFAULT_CARD_TYPE.to_string(),
            tags: Vec::new(),
            created_at: now,
            schedule: Schedule::new(now),
        }
    }

    /// Set card type.
    pub fn with_type(mut self, card_type: impl Into<String>) -> Self {
        self.card_type = card_type.into();
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(now)
    }
}

/// Split comma-separated tag input into distinct, trimmed tags.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// "1 day", "6 days".
pub fn format_days(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}

/// A review log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Unique identifier.
    pub id: ReviewId,
    /// Card that was reviewed.
    pub card_id: CardId,
    /// Quality rating, 0 to 5.
    pub quality: i32,
    /// When the review occurred.
    pub reviewed_at: DateTime<Utc>,
    /// Time between showing the question and rating, in milliseconds.
    pub time_taken_ms: i64,
}

impl Review {
    pub fn new(card_id: CardId, quality: i32, reviewed_at: DateTime<Utc>, time_taken_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            quality,
            reviewed_at,
            time_taken_ms,
        }
    }
}

/// Review session.
#[derive(Debug, Clone)]
pub struct Session {
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Maximum reviews before the session ends.
    pub limit: Option<usize>,
    /// Cards reviewed this session.
    pub reviewed: usize,
    /// Reviews rated 3 or higher.
    pub successes: usize,
    /// Whether the answer is showing.
    pub flipped: bool,
    /// When the current question was shown.
    pub card_shown_at: DateTime<Utc>,
}

impl Session {
    pub fn new(now: DateTime<Utc>, limit: Option<usize>) -> Self {
        Self {
            started_at: now,
            limit,
            reviewed: 0,
            successes: 0,
            flipped: false,
            card_shown_at: now,
        }
    }

    /// Check if the session limit is reached.
    pub fn is_complete(&self) -> bool {
        self.limit.is_some_and(|limit| self.reviewed >= limit)
    }

    /// Time spent on the current card.
    pub fn card_time(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.card_shown_at)
    }

    /// Reset per-card state for a newly shown card.
    pub fn show_card(&mut self, now: DateTime<Utc>) {
        self.flipped = false;
        self.card_shown_at = now;
    }

    /// Record a rating.
    pub fn record(&mut self, quality: i32) {
        self.reviewed += 1;
        if quality >= PASSING_QUALITY {
            self.successes += 1;
        }
    }

    /// Fraction of successful reviews.
    pub fn accuracy(&self) -> f64 {
        if self.reviewed == 0 {
            0.0
        } else {
            self.successes as f64 / self.reviewed as f64
        }
    }
}

/// Collection statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    /// Total cards.
    pub total_cards: usize,
    /// Cards due now.
    pub due_now: usize,
    /// Cards never reviewed.
    pub new_cards: usize,
    /// Average easiness factor, if any cards exist.
    pub average_ease: Option<f64>,
    /// Logged reviews.
    pub total_reviews: usize,
    /// Fraction of logged reviews rated 3 or higher.
    pub success_rate: f64,
}
