//! Application state and logic.

use crate::config::Config;
use crate::db::{Database, DbError, DbResult};
use crate::due::next_due;
use crate::models::{format_days, parse_tags, Card, CardId, Review, Session, Stats, DEFAULT_CARD_TYPE};
use crate::scheduler::{review_card, Clock, SystemClock};
use crossterm::event::{KeyCode, KeyEvent};
use std::fmt::Display;
use tracing::{debug, error, info, warn};

pub struct App {
    pub db: Database,
    pub config: Config,
    pub clock: Box<dyn Clock>,
    pub view: View,
    pub cards: Vec<Card>,
    pub selected: usize,
    pub detail_reviews: Vec<Review>,
    pub stats: Stats,
    pub session: Option<Session>,
    pub current_card: Option<Card>,
    pub form: Option<CardForm>,
    pub message: Option<String>,
    pub show_help: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    CardList,
    CardDetail,
    Review,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormField {
    #[default]
    Question,
    Answer,
    CardType,
    Tags,
}

impl FormField {
    pub const ALL: [FormField; 4] = [Self::Question, Self::Answer, Self::CardType, Self::Tags];

    pub fn label(self) -> &'static str {
        match self {
            Self::Question => "Question",
            Self::Answer => "Answer",
            Self::CardType => "Type",
            Self::Tags => "Tags (comma separated)",
        }
    }

    fn next(self) -> Self {
        match self {
            Self::Question => Self::Answer,
            Self::Answer => Self::CardType,
            Self::CardType => Self::Tags,
            Self::Tags => Self::Question,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Question => Self::Tags,
            Self::Answer => Self::Question,
            Self::CardType => Self::Answer,
            Self::Tags => Self::CardType,
        }
    }
}

/// Add/edit card form.
#[derive(Debug, Clone, Default)]
pub struct CardForm {
    /// Card being edited, `None` when adding.
    pub editing: Option<CardId>,
    pub question: String,
    pub answer: String,
    pub card_type: String,
    pub tags: String,
    pub focus: FormField,
}

impl CardForm {
    pub fn edit(card: &Card) -> Self {
        Self {
            editing: Some(card.id),
            question: card.question.clone(),
            answer: card.answer.clone(),
            card_type: card.card_type.clone(),
            tags: card.tags.join(", "),
            focus: FormField::Question,
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Question => &self.question,
            FormField::Answer => &self.answer,
            FormField::CardType => &self.card_type,
            FormField::Tags => &self.tags,
        }
    }

    fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Question => &mut self.question,
            FormField::Answer => &mut self.answer,
            FormField::CardType => &mut self.card_type,
            FormField::Tags => &mut self.tags,
        }
    }
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path)?;
        info!(path = %db_path.display(), "opened card database");

        Ok(Self::with_parts(db, config, Box::new(SystemClock))?)
    }

    pub fn with_parts(db: Database, config: Config, clock: Box<dyn Clock>) -> DbResult<Self> {
        let mut app = Self {
            db,
            config,
            clock,
            view: View::CardList,
            cards: Vec::new(),
            selected: 0,
            detail_reviews: Vec::new(),
            stats: Stats::default(),
            session: None,
            current_card: None,
            form: None,
            message: None,
            show_help: false,
        };

        app.refresh()?;
        Ok(app)
    }

    pub fn refresh(&mut self) -> DbResult<()> {
        self.cards = self.db.list_cards()?;
        self.stats = self.db.stats(self.clock.now())?;
        if self.selected >= self.cards.len() {
            self.selected = self.cards.len().saturating_sub(1);
        }
        Ok(())
    }

    pub fn can_quit(&self) -> bool {
        self.form.is_none() && !self.show_help && self.view == View::CardList
    }

    pub fn selected_card(&self) -> Option<&Card> {
        self.cards.get(self.selected)
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.message = None;

        if self.show_help {
            self.show_help = false;
            return;
        }

        if self.form.is_some() {
            self.handle_form_key(key);
            return;
        }

        match self.view {
            View::CardList => self.handle_list_key(key),
            View::CardDetail => self.handle_detail_key(key),
            View::Review => self.handle_review_key(key),
            View::Stats => self.handle_stats_key(key),
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.cards.is_empty() {
                    self.selected = (self.selected + 1).min(self.cards.len() - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Enter => self.open_detail(),
            KeyCode::Char('a') => self.form = Some(CardForm::default()),
            KeyCode::Char('r') => self.start_review(),
            KeyCode::Char('s') => self.open_stats(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => self.view = View::CardList,
            KeyCode::Char('e') => {
                if let Some(card) = self.selected_card() {
                    self.form = Some(CardForm::edit(card));
                }
            }
            KeyCode::Char('r') => self.start_review(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn handle_review_key(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) || self.current_card.is_none() {
            self.end_session();
            return;
        }

        let Some(session) = &mut self.session else {
            self.view = View::CardList;
            return;
        };

        if !session.flipped {
            if matches!(key.code, KeyCode::Char(' ') | KeyCode::Enter) {
                session.flipped = true;
            }
            return;
        }

        if let KeyCode::Char(c) = key.code {
            if let Some(digit) = c.to_digit(10) {
                self.rate(digit as i32);
            }
        }
    }

    fn handle_stats_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.view = View::CardList,
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(form) = self.form.as_mut() else { return };
        let focus = form.focus;

        match key.code {
            KeyCode::Esc => self.form = None,
            KeyCode::Tab | KeyCode::Down => form.focus = focus.next(),
            KeyCode::BackTab | KeyCode::Up => form.focus = focus.prev(),
            KeyCode::Enter if focus == FormField::Tags => self.submit_form(),
            KeyCode::Enter => form.focus = focus.next(),
            KeyCode::Backspace => {
                form.value_mut(focus).pop();
            }
            KeyCode::Char(c) => form.value_mut(focus).push(c),
            _ => {}
        }
    }

    fn submit_form(&mut self) {
        let Some(form) = self.form.take() else { return };

        let question = form.question.trim().to_string();
        let answer = form.answer.trim().to_string();
        if question.is_empty() || answer.is_empty() {
            self.message = Some("Question and answer are required".to_string());
            self.form = Some(form);
            return;
        }

        let card_type = match form.card_type.trim() {
            "" => DEFAULT_CARD_TYPE.to_string(),
            t => t.to_string(),
        };
        let tags = parse_tags(&form.tags);

        let result = match form.editing {
            Some(id) => self.save_edit(id, question, answer, card_type, tags),
            None => self.create_card(question, answer, card_type, tags),
        };

        if let Err(err) = result {
            self.report("Failed to save card", err);
        }
    }

    fn create_card(&mut self, question: String, answer: String, card_type: String, tags: Vec<String>) -> DbResult<()> {
        let card = tags
            .into_iter()
            .fold(Card::new(question, answer, self.clock.now()).with_type(card_type), Card::with_tag);
        self.db.insert_card(&card)?;
        info!(card_id = %card.id, card_type = %card.card_type, "card created");

        self.message = Some("Card created".to_string());
        self.refresh()?;
        if let Some(idx) = self.cards.iter().position(|c| c.id == card.id) {
            self.selected = idx;
        }
        Ok(())
    }

    fn save_edit(&mut self, id: CardId, question: String, answer: String, card_type: String, tags: Vec<String>) -> DbResult<()> {
        let Some(mut card) = self.db.get_card(id)? else {
            return Err(DbError::NotFound(id));
        };
        card.question = question;
        card.answer = answer;
        card.card_type = card_type;
        card.tags = tags;
        self.db.update_card(&card)?;
        info!(card_id = %id, "card updated");

        self.message = Some("Card updated".to_string());
        self.refresh()
    }

    fn open_detail(&mut self) {
        let Some(id) = self.selected_card().map(|c| c.id) else { return };
        self.detail_reviews = match self.db.reviews_for(id) {
            Ok(reviews) => reviews,
            Err(err) => {
                self.report("Failed to load review history", err);
                Vec::new()
            }
        };
        self.view = View::CardDetail;
    }

    fn open_stats(&mut self) {
        if let Err(err) = self.refresh() {
            self.report("Failed to load statistics", err);
        }
        self.view = View::Stats;
    }

    fn start_review(&mut self) {
        let now = self.clock.now();
        self.session = Some(Session::new(now, self.config.study.limit()));
        self.view = View::Review;
        self.advance();
        if self.current_card.is_none() {
            info!("no cards due for review");
        }
    }

    /// Show the most overdue card, or nothing when none is due or the session is full.
    fn advance(&mut self) {
        let now = self.clock.now();

        if self.session.as_ref().is_some_and(Session::is_complete) {
            self.current_card = None;
            return;
        }

        self.current_card = match self.db.due_cards(now) {
            Ok(due) => next_due(&due, now).cloned(),
            Err(err) => {
                self.report("Failed to load due cards", err);
                None
            }
        };
        debug!(card_id = ?self.current_card.as_ref().map(|c| c.id), "next card");

        if let Some(session) = &mut self.session {
            session.show_card(now);
        }
    }

    /// Apply a quality rating to the card under review.
    pub fn rate(&mut self, quality: i32) {
        let Some(card) = &self.current_card else { return };
        let now = self.clock.now();

        let updated = match review_card(card, quality, now) {
            Ok(updated) => updated,
            Err(err) => {
                warn!(card_id = %card.id, quality, "rejected rating");
                self.message = Some(err.to_string());
                return;
            }
        };

        let time_taken_ms = self
            .session
            .as_ref()
            .map(|s| s.card_time(now).num_milliseconds())
            .unwrap_or_default();
        let review = Review::new(updated.id, quality, now, time_taken_ms);
        if let Err(err) = self.db.record_review(&updated, &review) {
            self.report("Failed to save review", err);
            return;
        }
        info!(
            card_id = %updated.id,
            quality,
            interval = updated.schedule.interval,
            easiness = updated.schedule.easiness_factor,
            "review recorded"
        );

        if let Some(session) = &mut self.session {
            session.record(quality);
        }
        if self.config.display.show_next_review {
            self.message = Some(format!("Next review in {}", format_days(updated.schedule.interval)));
        }

        self.advance();
    }

    fn end_session(&mut self) {
        if let Some(session) = &self.session {
            info!(reviewed = session.reviewed, successes = session.successes, "review session ended");
        }
        self.session = None;
        self.current_card = None;
        self.view = View::CardList;
        if let Err(err) = self.refresh() {
            self.report("Failed to reload cards", err);
        }
    }

    fn report(&mut self, context: &str, err: impl Display) {
        error!(error = %err, "{context}");
        self.message = Some(format!("{context}: {err}"));
    }
}
