//! SM-2 review scheduling.
//!
//! A review takes the card's current scheduling state, a quality rating
//! from 0 (blackout) to 5 (perfect recall) and the current time, and
//! produces the next state:
//!
//! - ratings below 3 are lapses: the interval drops back to one day and the
//!   success streak resets, easiness is kept;
//! - ratings of 3 and above adjust easiness, then grow the interval
//!   1 day, 6 days, then `interval * easiness` truncated to whole days.

use crate::models::{Card, Schedule};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Easiness factor of a new card.
pub const INITIAL_EASE: f64 = 2.5;
/// Lower bound for the easiness factor.
pub const MIN_EASE: f64 = 1.3;
/// Lowest rating that counts as a successful recall.
pub const PASSING_QUALITY: i32 = 3;
/// Highest rating.
pub const MAX_QUALITY: i32 = 5;
/// Longest interval handed out, in days.
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("Invalid rating {0}: quality must be between 0 and 5")]
    InvalidRating(i32),
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Review `card` with `quality` at `now` and return the updated card.
///
/// The rating is validated before anything else; on error `card` is left
/// as it was.
pub fn review_card(card: &Card, quality: i32, now: DateTime<Utc>) -> Result<Card, ReviewError> {
    if !(0..=MAX_QUALITY).contains(&quality) {
        return Err(ReviewError::InvalidRating(quality));
    }

    let mut updated = card.clone();
    updated.schedule = next_schedule(&card.schedule, quality, now);
    Ok(updated)
}

fn next_schedule(current: &Schedule, quality: i32, now: DateTime<Utc>) -> Schedule {
    let mut ease = current.easiness_factor;

    let (interval, review_count) = if quality < PASSING_QUALITY {
        (1, 0)
    } else {
        ease = adjusted_ease(ease, quality);
        let interval = match current.review_count {
            0 => 1,
            1 => 6,
            _ => (current.interval as f64 * ease) as i64,
        };
        (interval.min(MAX_INTERVAL_DAYS), current.review_count + 1)
    };

    Schedule {
        easiness_factor: ease,
        interval,
        review_count,
        last_reviewed: Some(now),
        next_review: now + Duration::days(interval),
    }
}

/// Easiness after a successful review with `quality`, floored at [`MIN_EASE`].
pub fn adjusted_ease(ease: f64, quality: i32) -> f64 {
    let miss = f64::from(MAX_QUALITY - quality);
    let ease = ease + (0.1 - miss * (0.08 + miss * 0.02));
    if ease < MIN_EASE {
        MIN_EASE
    } else {
        ease
    }
}
