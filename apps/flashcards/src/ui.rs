//! UI rendering for flashcards.

use crate::app::{App, CardForm, FormField, View};
use crate::models::{format_days, Card};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    match app.view {
        View::CardList => draw_card_list(f, app),
        View::CardDetail => draw_detail(f, app),
        View::Review => draw_review(f, app),
        View::Stats => draw_stats(f, app),
    }

    if app.show_help {
        draw_help(f);
    }

    if let Some(form) = &app.form {
        draw_form(f, form);
    }

    if let Some(msg) = &app.message {
        draw_message(f, msg);
    }
}

fn screen(f: &Frame) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
        .split(f.area())
}

fn footer(text: &str) -> Paragraph<'_> {
    Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL))
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Relative due label for lists.
fn due_label(card: &Card, now: DateTime<Utc>) -> String {
    if card.is_due(now) {
        if card.schedule.is_new() { "new" } else { "due" }.to_string()
    } else {
        let days = card.schedule.due_in(now).num_days();
        if days == 0 {
            "today".to_string()
        } else {
            format!("in {}", format_days(days))
        }
    }
}

fn draw_card_list(f: &mut Frame, app: &App) {
    let chunks = screen(f);
    let now = app.clock.now();

    let header = Paragraph::new(Line::from(vec![
        Span::styled("Flashcards", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(format!("{} due", app.stats.due_now), Style::default().fg(Color::Yellow)),
        Span::raw(", "),
        Span::styled(format!("{} new", app.stats.new_cards), Style::default().fg(Color::Blue)),
        Span::raw(format!(" ({} total)", app.stats.total_cards)),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    if app.cards.is_empty() {
        let msg = Paragraph::new("No cards yet. Press 'a' to add one.")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Cards "));
        f.render_widget(msg, chunks[1]);
    } else {
        let rows: Vec<Row> = app
            .cards
            .iter()
            .enumerate()
            .map(|(i, card)| {
                let due_style = if card.is_due(now) {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                let row = Row::new(vec![
                    Span::raw(card.question.lines().next().unwrap_or_default().to_string()),
                    Span::raw(card.card_type.clone()),
                    Span::raw(card.tags.join(", ")),
                    Span::styled(due_label(card, now), due_style),
                ]);
                if i == app.selected {
                    row.style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
                } else {
                    row
                }
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Percentage(50),
                Constraint::Percentage(12),
                Constraint::Percentage(23),
                Constraint::Percentage(15),
            ],
        )
        .header(
            Row::new(vec!["Question", "Type", "Tags", "Next"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(" Cards "));
        f.render_widget(table, chunks[1]);
    }

    f.render_widget(
        footer("j/k:Navigate  Enter:Open  a:Add card  r:Review  s:Stats  ?:Help  q:Quit"),
        chunks[2],
    );
}

fn draw_detail(f: &mut Frame, app: &App) {
    let chunks = screen(f);

    let header = Paragraph::new("Card")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    let Some(card) = app.selected_card() else {
        f.render_widget(footer("q:Back"), chunks[2]);
        return;
    };

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(25), Constraint::Min(0)])
        .split(chunks[1]);

    let question = Paragraph::new(card.question.as_str())
        .block(Block::default().borders(Borders::ALL).title(" Question "))
        .wrap(Wrap { trim: true });
    f.render_widget(question, body[0]);

    let answer = Paragraph::new(card.answer.as_str())
        .style(Style::default().fg(Color::Green))
        .block(Block::default().borders(Borders::ALL).title(" Answer "))
        .wrap(Wrap { trim: true });
    f.render_widget(answer, body[1]);

    let schedule = &card.schedule;
    let history: Vec<String> = app.detail_reviews.iter().map(|r| r.quality.to_string()).collect();
    let lines = vec![
        field_line("Type", card.card_type.clone()),
        field_line("Tags", card.tags.join(", ")),
        field_line("Created", format_time(card.created_at)),
        field_line("Easiness", format!("{:.2}", schedule.easiness_factor)),
        field_line("Interval", format_days(schedule.interval)),
        field_line("Streak", schedule.review_count.to_string()),
        field_line(
            "Last review",
            schedule.last_reviewed.map(format_time).unwrap_or_else(|| "never".to_string()),
        ),
        field_line("Next review", format_time(schedule.next_review)),
        field_line("Ratings", history.join(" ")),
    ];
    let info = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Schedule "));
    f.render_widget(info, body[2]);

    f.render_widget(footer("e:Edit  r:Review  q:Back  ?:Help"), chunks[2]);
}

fn field_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:>12}: "), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

fn draw_review(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Progress
            Constraint::Min(0),    // Card
            Constraint::Length(3), // Buttons
        ])
        .split(f.area());
    let now = app.clock.now();

    if let Some(session) = &app.session {
        let limit = session.limit.map(|l| format!(" of {l}")).unwrap_or_default();
        let progress_text = format!(
            "Reviewed {}{} | Accuracy: {:.0}% | {} min",
            session.reviewed,
            limit,
            session.accuracy() * 100.0,
            now.signed_duration_since(session.started_at).num_minutes()
        );
        let progress = Paragraph::new(progress_text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(progress, chunks[0]);
    }

    let card_area = chunks[1];
    let flipped = app.session.as_ref().is_some_and(|s| s.flipped);

    match (&app.current_card, &app.session) {
        (Some(card), Some(session)) => {
            let mut title = " Question ".to_string();
            if app.config.display.show_answer_timer && !flipped {
                title = format!(" Question ({}s) ", session.card_time(now).num_seconds());
            }
            let question = Paragraph::new(card.question.as_str())
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title(title))
                .wrap(Wrap { trim: true });

            if flipped {
                let inner = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .split(card_area);
                f.render_widget(question, inner[0]);

                let answer = Paragraph::new(card.answer.as_str())
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::Green))
                    .block(Block::default().borders(Borders::ALL).title(" Answer "))
                    .wrap(Wrap { trim: true });
                f.render_widget(answer, inner[1]);
            } else {
                f.render_widget(question, card_area);
            }
        }
        (None, Some(session)) if session.reviewed > 0 => {
            let text = format!(
                "Session complete! {} reviewed, {:.0}% recalled. Press any key to continue.",
                session.reviewed,
                session.accuracy() * 100.0
            );
            let complete = Paragraph::new(text)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
                .block(Block::default().borders(Borders::ALL))
                .wrap(Wrap { trim: true });
            f.render_widget(complete, card_area);
        }
        _ => {
            let empty = Paragraph::new("No cards due for review today! Press any key to continue.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL));
            f.render_widget(empty, card_area);
        }
    }

    let buttons: Vec<(&str, &str, Color)> = if app.current_card.is_none() {
        vec![("any key", "Back", Color::White)]
    } else if flipped {
        vec![
            ("0", "Blackout", Color::Red),
            ("1", "Wrong", Color::Red),
            ("2", "Hard wrong", Color::Yellow),
            ("3", "Hard", Color::Yellow),
            ("4", "Good", Color::Green),
            ("5", "Perfect", Color::Blue),
        ]
    } else {
        vec![("Space", "Show Answer", Color::White)]
    };

    let button_spans: Vec<Span> = buttons
        .iter()
        .flat_map(|(key, label, color)| {
            vec![
                Span::styled(format!("[{}]", key), Style::default().fg(*color).add_modifier(Modifier::BOLD)),
                Span::raw(format!(" {} ", label)),
            ]
        })
        .collect();

    let button_line = Paragraph::new(Line::from(button_spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(button_line, chunks[2]);
}

fn draw_stats(f: &mut Frame, app: &App) {
    let chunks = screen(f);

    let header = Paragraph::new("Statistics")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    let stats = &app.stats;
    let rows = vec![
        Row::new(vec!["Total cards".to_string(), stats.total_cards.to_string()]),
        Row::new(vec!["Due now".to_string(), stats.due_now.to_string()]),
        Row::new(vec!["Never reviewed".to_string(), stats.new_cards.to_string()]),
        Row::new(vec![
            "Average easiness".to_string(),
            stats.average_ease.map(|e| format!("{e:.2}")).unwrap_or_else(|| "-".to_string()),
        ]),
        Row::new(vec!["Reviews logged".to_string(), stats.total_reviews.to_string()]),
        Row::new(vec!["Success rate".to_string(), format!("{:.0}%", stats.success_rate * 100.0)]),
    ];

    let table = Table::new(rows, [Constraint::Percentage(40), Constraint::Percentage(60)])
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(table, chunks[1]);

    f.render_widget(footer("q:Back  ?:Help"), chunks[2]);
}

fn draw_help(f: &mut Frame) {
    let area = centered_rect(60, 80, f.area());
    f.render_widget(Clear, area);

    let help = r#"
Flashcards Keybindings

Card List:
  j/k, Up/Down    Navigate cards
  Enter           Open card
  a               Add card
  r               Review due cards
  s               Statistics
  q               Quit

Card:
  e               Edit card
  q, Esc          Back

Review:
  Space, Enter    Show answer
  0-2             Forgot (card comes back tomorrow)
  3-5             Recalled (hard to perfect)
  q, Esc          End review

Form:
  Tab, Shift-Tab  Next/previous field
  Enter           Next field, save on last
  Esc             Cancel

Press any key to close
"#;

    let popup = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL).title(" Help "))
        .wrap(Wrap { trim: false });
    f.render_widget(popup, area);
}

fn draw_form(f: &mut Frame, form: &CardForm) {
    let area = centered_rect(60, 60, f.area());
    f.render_widget(Clear, area);

    let title = if form.editing.is_some() { " Edit card " } else { " Add card " };
    let outer = Block::default().borders(Borders::ALL).title(title);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(inner);

    for (field, rect) in FormField::ALL.iter().zip(fields.iter()) {
        let style = if *field == form.focus {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let value = form.value(*field);
        let input = Paragraph::new(value)
            .style(style)
            .block(Block::default().borders(Borders::ALL).title(format!(" {} ", field.label())));
        f.render_widget(input, *rect);

        if *field == form.focus {
            let x = rect.x + 1 + value.chars().count() as u16;
            f.set_cursor_position((x.min(rect.right().saturating_sub(2)), rect.y + 1));
        }
    }
}

fn draw_message(f: &mut Frame, msg: &str) {
    let area = Rect::new(
        f.area().x + 2,
        f.area().height.saturating_sub(5),
        f.area().width.saturating_sub(4),
        3,
    );
    f.render_widget(Clear, area);

    let message = Paragraph::new(msg)
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(message, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::scheduler::FixedClock;
    use chrono::{Duration, TimeZone};
    use ratatui::{backend::TestBackend, Terminal};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn test_app(cards: &[Card]) -> App {
        let db = Database::in_memory().unwrap();
        for card in cards {
            db.insert_card(card).unwrap();
        }
        App::with_parts(db, Config::default(), Box::new(FixedClock(t0()))).unwrap()
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_card_list() {
        let app = test_app(&[]);
        let screen = render(&app);
        assert!(screen.contains("No cards yet"));
        assert!(screen.contains("0 due"));
    }

    #[test]
    fn test_card_list_rows() {
        let mut later = Card::new("Later question", "A", t0()).with_tag("geo");
        later.schedule.next_review = t0() + Duration::days(3);
        let app = test_app(&[Card::new("Due question", "A", t0()), later]);

        let screen = render(&app);
        assert!(screen.contains("Due question"));
        assert!(screen.contains("Later question"));
        assert!(screen.contains("in 3 days"));
        assert!(screen.contains("1 due"));
    }

    #[test]
    fn test_review_screens() {
        let mut app = test_app(&[Card::new("What is 7*6?", "42", t0())]);
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('r')));

        let screen = render(&app);
        assert!(screen.contains("What is 7*6?"));
        assert!(screen.contains("Show Answer"));
        assert!(!screen.contains("42"));

        app.session.as_mut().unwrap().flipped = true;
        let screen = render(&app);
        assert!(screen.contains("42"));
        assert!(screen.contains("Perfect"));

        app.rate(5);
        let screen = render(&app);
        assert!(screen.contains("Session complete!"));
        assert!(screen.contains("Next review in 1 day"));
    }

    #[test]
    fn test_nothing_due_screen() {
        let mut app = test_app(&[]);
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('r')));
        assert!(render(&app).contains("No cards due for review today!"));
    }

    #[test]
    fn test_form_and_detail() {
        let mut app = test_app(&[Card::new("Q1", "A1", t0()).with_type("vocab")]);
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Enter));
        let screen = render(&app);
        assert!(screen.contains("vocab"));
        assert!(screen.contains("never"));

        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('e')));
        let screen = render(&app);
        assert!(screen.contains("Edit card"));
        assert!(screen.contains("Tags (comma separated)"));
    }

    #[test]
    fn test_stats_screen() {
        let mut app = test_app(&[Card::new("Q", "A", t0())]);
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('s')));
        let screen = render(&app);
        assert!(screen.contains("Total cards"));
        assert!(screen.contains("2.50"));
    }
}
