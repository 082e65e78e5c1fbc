//! Due card selection.

use crate::models::Card;
use chrono::{DateTime, Utc};

/// Cards due at `now`, most overdue first.
///
/// Cards with the same due time keep their input order. An empty result
/// means nothing is due.
pub fn select_due<'a, I>(cards: I, now: DateTime<Utc>) -> Vec<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut due: Vec<&Card> = cards.into_iter().filter(|card| card.is_due(now)).collect();
    due.sort_by_key(|card| card.schedule.next_review);
    due
}

/// The card to show next in a single-card review flow, if any is due.
pub fn next_due<'a, I>(cards: I, now: DateTime<Utc>) -> Option<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    select_due(cards, now).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::review_card;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn card_due_at(question: &str, due: DateTime<Utc>) -> Card {
        let mut card = Card::new(question, "A", t0() - Duration::days(30));
        card.schedule.next_review = due;
        card
    }

    #[test]
    fn test_select_due_filters_and_orders() {
        let now = t0();
        let cards = vec![
            card_due_at("later", now + Duration::hours(1)),
            card_due_at("recent", now - Duration::hours(1)),
            card_due_at("exact", now),
            card_due_at("oldest", now - Duration::days(3)),
        ];

        let due: Vec<&str> = select_due(&cards, now).iter().map(|c| c.question.as_str()).collect();
        assert_eq!(due, vec!["oldest", "recent", "exact"]);
    }

    #[test]
    fn test_select_due_empty() {
        let now = t0();
        let cards = vec![card_due_at("tomorrow", now + Duration::days(1))];
        assert!(select_due(&cards, now).is_empty());
        assert!(next_due(&cards, now).is_none());
        assert!(select_due(&Vec::<Card>::new(), now).is_empty());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let now = t0();
        let due_at = now - Duration::minutes(5);
        let cards = vec![card_due_at("first", due_at), card_due_at("second", due_at)];

        let due: Vec<&str> = select_due(&cards, now).iter().map(|c| c.question.as_str()).collect();
        assert_eq!(due, vec!["first", "second"]);
    }

    #[test]
    fn test_next_due_is_most_overdue() {
        let now = t0();
        let cards = vec![
            card_due_at("b", now - Duration::hours(2)),
            card_due_at("a", now - Duration::hours(8)),
        ];
        assert_eq!(next_due(&cards, now).map(|c| c.question.as_str()), Some("a"));
    }

    #[test]
    fn test_reviewed_card_leaves_due_set() {
        let now = t0();
        let mut cards = vec![
            card_due_at("a", now - Duration::hours(8)),
            card_due_at("b", now - Duration::hours(2)),
        ];

        // Even a lapse pushes the card a day out.
        cards[0] = review_card(&cards[0], 0, now).unwrap();
        assert_eq!(next_due(&cards, now).map(|c| c.question.as_str()), Some("b"));

        cards[1] = review_card(&cards[1], 5, now).unwrap();
        assert!(next_due(&cards, now).is_none());
        assert_eq!(select_due(&cards, now + Duration::days(1)).len(), 2);
    }
}
