//! TUI list view for nagme.
//!
//! Full-screen nag list coloured by urgency, with a status bar. Key bindings:
//! j/k navigate, b bucket, s sort, w recurring rows, h horizon, r reload,
//! c complete, p push a day, q quit.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use tracing::debug;

use nagme_core::NagError;
use nagme_core::classify::{DisplayState, push_summary_label, recurring_indicator};
use nagme_core::model::{DAY_MS, Nag, NagId};
use nagme_core::source::{CurrentState, Generation, RequestGenerations, StateSource};
use nagme_core::timefmt::format_local;
use nagme_core::view::{BucketFilter, ListEntry, ViewOptions, bucket_options, build_entries};
use nagme_core::visual::{ColorTheme, Rgb, line_visual};

/// How long a status message stays up.
const STATUS_TTL: Duration = Duration::from_secs(4);

/// What the runner should do after a key press or tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Reload,
    Complete {
        id: NagId,
        occurrence_ms: Option<i64>,
    },
    Push {
        id: NagId,
        by_ms: i64,
    },
}

pub struct NagListView {
    state: CurrentState,
    entries: Vec<ListEntry>,
    pub options: ViewOptions,
    /// `None` shows every bucket.
    bucket: Option<String>,
    table_state: TableState,
    generations: RequestGenerations,
    /// Generation of the fetch in flight, if any.
    pending: Option<Generation>,
    loaded_once: bool,
    should_quit: bool,
    status_msg: Option<(String, Instant)>,
    last_refresh: Instant,
    /// Zero disables auto reload.
    refresh_interval: Duration,
    theme: ColorTheme,
    utc_offset_minutes: i32,
    writable: bool,
    writes_in_flight: usize,
    now_ms: i64,
}

impl NagListView {
    pub fn new(options: ViewOptions, utc_offset_minutes: i32, writable: bool, auto_reload_minutes: u64) -> Self {
        Self {
            state: CurrentState::empty(),
            entries: Vec::new(),
            options,
            bucket: None,
            table_state: TableState::default(),
            generations: RequestGenerations::new(),
            pending: None,
            loaded_once: false,
            should_quit: false,
            status_msg: None,
            last_refresh: Instant::now(),
            refresh_interval: Duration::from_secs(auto_reload_minutes.saturating_mul(60)),
            theme: ColorTheme::default(),
            utc_offset_minutes,
            writable,
            writes_in_flight: 0,
            now_ms: 0,
        }
    }

    /// Start a fetch; results from earlier fetches will be dropped.
    pub fn begin_fetch(&mut self) -> Generation {
        let generation = self.generations.begin();
        self.pending = Some(generation);
        self.last_refresh = Instant::now();
        debug!(generation = generation.get(), "fetch started");
        generation
    }

    /// Take a finished fetch. Stale results are ignored.
    pub fn receive(&mut self, generation: Generation, result: Result<CurrentState, NagError>, now_ms: i64) {
        let result = match self.generations.accept(generation, result) {
            Ok(result) => result,
            Err(_) => return,
        };
        self.pending = None;
        match result {
            Ok(state) => {
                let failed = state.failures.len();
                self.state = state;
                self.loaded_once = true;
                self.refresh(now_ms);
                if failed > 0 {
                    self.set_status(format!("{failed} nag(s) could not be rebuilt"));
                }
            }
            Err(err) => self.set_status(format!("reload failed: {err}")),
        }
    }

    /// Recompute rows at `now_ms`, keeping the selection on the same row
    /// when it still exists.
    pub fn refresh(&mut self, now_ms: i64) {
        self.now_ms = now_ms;
        let selected_key = self.selected_entry().map(|e| e.key.clone());
        self.options.bucket = self
            .bucket
            .as_ref()
            .map_or(BucketFilter::All, |b| BucketFilter::from_names([b]));
        self.entries = build_entries(self.state.nags.values(), now_ms, &self.options);

        let index = selected_key
            .and_then(|key| self.entries.iter().position(|e| e.key == key))
            .or_else(|| (!self.entries.is_empty()).then_some(0))
            .map(|i| i.min(self.entries.len().saturating_sub(1)));
        self.table_state.select(index);
    }

    pub fn selected_entry(&self) -> Option<&ListEntry> {
        self.table_state.selected().and_then(|i| self.entries.get(i))
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn set_status(&mut self, msg: String) {
        self.status_msg = Some((msg, Instant::now()));
    }

    pub const fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Called every loop turn.
    pub fn tick(&mut self, now_ms: i64) -> Action {
        if self.loaded_once && now_ms / 60_000 != self.now_ms / 60_000 {
            self.refresh(now_ms);
        }
        let due = !self.refresh_interval.is_zero() && self.last_refresh.elapsed() >= self.refresh_interval;
        if due && self.pending.is_none() && self.writes_in_flight == 0 {
            Action::Reload
        } else {
            Action::None
        }
    }

    fn select_next(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = self.table_state.selected().map_or(0, |i| (i + 1).min(self.entries.len() - 1));
        self.table_state.select(Some(i));
    }

    fn select_prev(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = self.table_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.table_state.select(Some(i));
    }

    /// Step through the known buckets, then back to all.
    fn cycle_bucket(&mut self) {
        let options = bucket_options(self.state.nags.values());
        self.bucket = match &self.bucket {
            None => options.first().cloned(),
            Some(current) => options
                .iter()
                .position(|b| b == current)
                .and_then(|i| options.get(i + 1))
                .cloned(),
        };
    }

    fn write_action(&mut self, build: impl FnOnce(&ListEntry) -> Action) -> Action {
        if !self.writable {
            self.set_status("read-only mode: set gateway.mode = \"read-write\" to edit".to_string());
            return Action::None;
        }
        if self.pending.is_some() {
            self.set_status("still loading".to_string());
            return Action::None;
        }
        self.selected_entry().map_or(Action::None, build)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let now_ms = self.now_ms;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_prev(),
            KeyCode::Char('g') | KeyCode::Home => {
                if !self.entries.is_empty() {
                    self.table_state.select(Some(0));
                }
            }
            KeyCode::Char('G') | KeyCode::End => {
                if !self.entries.is_empty() {
                    self.table_state.select(Some(self.entries.len() - 1));
                }
            }
            KeyCode::Char('r') => return Action::Reload,
            KeyCode::Char('b') => {
                self.cycle_bucket();
                self.refresh(now_ms);
            }
            KeyCode::Char('s') => {
                self.options.sort = self.options.sort.next();
                self.refresh(now_ms);
            }
            KeyCode::Char('w') => {
                self.options.recurring = self.options.recurring.toggle();
                self.refresh(now_ms);
            }
            KeyCode::Char('h') => {
                self.options.horizon = self.options.horizon.toggle();
                self.refresh(now_ms);
            }
            KeyCode::Char('c') => {
                return self.write_action(|entry| Action::Complete {
                    id: entry.nag.id.clone(),
                    occurrence_ms: entry
                        .nag
                        .is_recurring()
                        .then(|| entry.classification.window.map(|w| w.source_due_ms))
                        .flatten(),
                });
            }
            KeyCode::Char('p') => {
                return self.write_action(|entry| Action::Push {
                    id: entry.nag.id.clone(),
                    by_ms: DAY_MS,
                });
            }
            _ => {}
        }
        Action::None
    }

    /// Where the loaded state came from; writes keep that collection current.
    pub const fn state_source(&self) -> StateSource {
        self.state.source
    }

    pub fn write_started(&mut self, id: &NagId, verb: &str) {
        self.writes_in_flight += 1;
        self.set_status(format!("writing {id}..."));
    }

    /// Take the outcome of a background write. Success asks for a reload so
    /// the list shows what the backend now holds.
    pub fn write_finished(&mut self, id: &NagId, verb: &str, result: Result<(), String>) -> Action {
        self.writes_in_flight = self.writes_in_flight.saturating_sub(1);
        match result {
            Ok(()) => {
                self.set_status(format!("{verb} {id}"));
                Action::Reload
            }
            Err(err) => {
                self.set_status(format!("{verb} failed: {err}"));
                Action::None
            }
        }
    }

    /// The nag as rebuilt, for writes; rows hold expanded copies.
    pub fn current_nag(&self, id: &NagId) -> Option<&Nag> {
        self.state.nags.get(id)
    }

    pub fn render(&mut self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        render_into(frame, self, area);
    }
}

const fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn state_icon(state: DisplayState) -> &'static str {
    match state {
        DisplayState::Overdue => "!",
        DisplayState::DueSoon => "◐",
        DisplayState::OnTrack => "○",
        DisplayState::Completed => "●",
        DisplayState::RecurringPending => "↻",
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn build_row(entry: &ListEntry, app: &NagListView, title_width: usize) -> Row<'static> {
    let c = &entry.classification;
    let visual = line_visual(&entry.nag, c.state, c.window.as_ref(), app.now_ms, &app.theme);
    let text_color = if visual.light_text { Color::White } else { Color::Black };
    let base = Style::default().bg(to_color(visual.base)).fg(text_color);

    // Bar cells take the progress color for the filled share of the row.
    let bar_width = 10usize;
    let filled = (visual.fraction.clamp(0.0, 1.0) * bar_width as f64).round() as usize;
    let bar = Line::from(vec![
        Span::styled(" ".repeat(filled), Style::default().bg(to_color(visual.progress))),
        Span::styled(" ".repeat(bar_width - filled), base),
    ]);

    let due = c
        .window
        .map(|w| format_local(w.due_ms, app.utc_offset_minutes))
        .unwrap_or_default();
    let mut title = entry.nag.title.clone();
    let pushed = push_summary_label(&entry.nag);
    if !pushed.is_empty() {
        title = format!("{title} ({pushed})");
    }
    let icon = format!("{} {}", state_icon(c.state), recurring_indicator(&entry.nag));

    Row::new(vec![
        Cell::from(icon),
        Cell::from(truncate(&title, title_width)),
        Cell::from(entry.nag.bucket.clone()),
        Cell::from(due),
        Cell::from(c.time_label.clone()),
        Cell::from(bar),
        Cell::from(c.percent_label.clone()),
    ])
    .style(base)
}

fn render_into(frame: &mut ratatui::Frame<'_>, app: &mut NagListView, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    let table_area = chunks[0];
    let status_area = chunks[1];

    let widths = [
        Constraint::Length(5),
        Constraint::Min(16),
        Constraint::Length(10),
        Constraint::Length(16),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(5),
    ];
    let title_width = usize::from(table_area.width.saturating_sub(60).max(16));
    let rows: Vec<Row<'static>> = app
        .entries
        .iter()
        .map(|entry| build_row(entry, app, title_width))
        .collect();

    let bucket = app.bucket.as_deref().unwrap_or("all");
    let block_title = format!(
        " nagme: {} nags  [bucket: {bucket}] [sort: {}] [{}] [{}] ",
        app.entries.len(),
        app.options.sort.label(),
        app.options.recurring.as_str(),
        app.options.horizon.as_str(),
    );

    let header = Row::new(["", "title", "bucket", "due", "left", "progress", "%"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_set(border::ROUNDED)
                .border_style(Style::default().fg(Color::Green))
                .title(block_title)
                .title_style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        )
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD))
        .highlight_symbol(" ");
    frame.render_stateful_widget(table, table_area, &mut app.table_state);

    let status = Paragraph::new(build_status_bar(app)).alignment(Alignment::Left);
    frame.render_widget(status, status_area);
}

fn build_status_bar(app: &NagListView) -> Line<'static> {
    if let Some((msg, at)) = &app.status_msg
        && at.elapsed() < STATUS_TTL
    {
        return Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Yellow)));
    }

    let dim = Style::default().fg(Color::DarkGray);
    let key = Style::default().fg(Color::Cyan);
    let mut spans = Vec::new();
    if app.pending.is_some() {
        spans.push(Span::styled("loading… ".to_string(), Style::default().fg(Color::Yellow)));
    } else {
        spans.push(Span::styled(format!("{} ", app.state.source), dim));
    }
    let mut hints = vec![("j/k", "move"), ("b", "bucket"), ("s", "sort"), ("w", "recurring"), ("h", "horizon"), ("r", "reload")];
    if app.writable {
        hints.extend([("c", "complete"), ("p", "push 1d")]);
    }
    hints.push(("q", "quit"));
    for (k, label) in hints {
        spans.push(Span::styled(k.to_string(), key));
        spans.push(Span::styled(format!(" {label}  "), dim));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagme_core::model::Recurrence;
    use nagme_core::source::StateSource;
    use std::collections::BTreeMap;

    fn nag(id: &str, bucket: &str, due_ms: Option<i64>) -> Nag {
        let mut nag = Nag::new(NagId::new(id).expect("id"), id.to_uppercase(), 0);
        nag.bucket = bucket.to_string();
        nag.due_ms = due_ms;
        nag
    }

    fn state(nags: Vec<Nag>) -> CurrentState {
        let count = nags.len();
        CurrentState {
            nags: nags.into_iter().map(|n| (n.id.clone(), n)).collect::<BTreeMap<_, _>>(),
            failures: BTreeMap::new(),
            source: StateSource::Direct { rows: count },
        }
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::from(KeyCode::Char(c))
    }

    fn loaded(nags: Vec<Nag>, writable: bool) -> NagListView {
        let mut view = NagListView::new(ViewOptions::default(), 0, writable, 0);
        let generation = view.begin_fetch();
        view.receive(generation, Ok(state(nags)), 0);
        view
    }

    #[test]
    fn stale_fetch_is_ignored() {
        let mut view = NagListView::new(ViewOptions::default(), 0, false, 0);
        let old = view.begin_fetch();
        let new = view.begin_fetch();
        view.receive(old, Ok(state(vec![nag("old", "home", Some(DAY_MS))])), 0);
        assert!(view.entries().is_empty());
        assert!(view.pending.is_some());

        view.receive(new, Ok(state(vec![nag("new", "home", Some(DAY_MS))])), 0);
        assert_eq!(view.entries().len(), 1);
        assert_eq!(view.entries()[0].nag.id.as_str(), "new");
        assert!(view.pending.is_none());
    }

    #[test]
    fn failed_fetch_keeps_previous_rows() {
        let mut view = loaded(vec![nag("a", "home", Some(DAY_MS))], false);
        let generation = view.begin_fetch();
        view.receive(generation, Err(NagError::NotSignedIn), 0);
        assert_eq!(view.entries().len(), 1);
        assert!(view.status_msg.is_some());
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut view = loaded(
            vec![nag("a", "home", Some(DAY_MS)), nag("b", "home", Some(2 * DAY_MS))],
            false,
        );
        assert_eq!(view.table_state.selected(), Some(0));
        view.handle_key(key('k'));
        assert_eq!(view.table_state.selected(), Some(0));
        view.handle_key(key('j'));
        view.handle_key(key('j'));
        assert_eq!(view.table_state.selected(), Some(1));
    }

    #[test]
    fn bucket_key_cycles_through_buckets_then_all() {
        let mut view = loaded(
            vec![nag("a", "Work", Some(DAY_MS)), nag("b", "Personal", Some(DAY_MS))],
            false,
        );
        assert_eq!(view.entries().len(), 2);
        view.handle_key(key('b'));
        assert_eq!(view.bucket.as_deref(), Some("Work"));
        assert_eq!(view.entries().len(), 1);
        view.handle_key(key('b'));
        assert_eq!(view.bucket.as_deref(), Some("Personal"));
        assert_eq!(view.entries().len(), 1);
        // Weekend, Holiday, Project, then back to every bucket.
        for _ in 0..4 {
            view.handle_key(key('b'));
        }
        assert_eq!(view.bucket, None);
        assert_eq!(view.entries().len(), 2);
    }

    #[test]
    fn selection_follows_row_across_resort() {
        let mut view = loaded(
            vec![nag("a", "home", Some(DAY_MS)), nag("b", "home", Some(2 * DAY_MS))],
            false,
        );
        view.handle_key(key('j'));
        let before = view.selected_entry().map(|e| e.key.clone());
        view.handle_key(key('s'));
        assert_eq!(view.selected_entry().map(|e| e.key.clone()), before);
    }

    #[test]
    fn writes_need_read_write_mode() {
        let mut view = loaded(vec![nag("a", "home", Some(DAY_MS))], false);
        assert_eq!(view.handle_key(key('c')), Action::None);
        assert!(view.status_msg.is_some());

        let mut view = loaded(vec![nag("a", "home", Some(DAY_MS))], true);
        assert_eq!(
            view.handle_key(key('p')),
            Action::Push {
                id: NagId::new("a").expect("id"),
                by_ms: DAY_MS
            }
        );
        assert_eq!(
            view.handle_key(key('c')),
            Action::Complete {
                id: NagId::new("a").expect("id"),
                occurrence_ms: None
            }
        );
    }

    #[test]
    fn completing_a_recurring_row_names_its_occurrence() {
        let mut daily = nag("water", "home", Some(DAY_MS));
        daily.recurrence = Some(Recurrence::every(DAY_MS, 0, DAY_MS));
        let mut view = loaded(vec![daily.clone()], true);
        let Action::Complete { occurrence_ms, .. } = view.handle_key(key('c')) else {
            panic!("expected complete");
        };
        let window = view.entries()[0].classification.window.expect("window");
        assert_eq!(occurrence_ms, Some(window.source_due_ms));
        assert!(view.current_nag(&daily.id).is_some());
    }

    #[test]
    fn reload_key_and_auto_reload() {
        let mut view = loaded(vec![], false);
        assert_eq!(view.handle_key(key('r')), Action::Reload);
        assert_eq!(view.tick(0), Action::None);

        let mut view = NagListView::new(ViewOptions::default(), 0, false, 1);
        view.last_refresh = Instant::now().checked_sub(Duration::from_secs(61)).expect("instant");
        assert_eq!(view.tick(0), Action::Reload);
        view.begin_fetch();
        view.last_refresh = Instant::now().checked_sub(Duration::from_secs(61)).expect("instant");
        assert_eq!(view.tick(0), Action::None);
    }

    #[test]
    fn finished_writes_report_and_reload() {
        let rent = nag("rent", "home", Some(DAY_MS));
        let mut view = loaded(vec![rent.clone()], true);
        assert_eq!(view.state_source(), StateSource::Direct { rows: 1 });

        view.write_started(&rent.id, "pushed");
        view.last_refresh = Instant::now().checked_sub(Duration::from_secs(3600)).expect("instant");
        view.refresh_interval = Duration::from_secs(60);
        assert_eq!(view.tick(0), Action::None, "no auto reload while a write is out");

        assert_eq!(view.write_finished(&rent.id, "pushed", Ok(())), Action::Reload);
        assert_eq!(view.status_msg.as_ref().map(|(m, _)| m.as_str()), Some("pushed rent"));
        assert_eq!(view.writes_in_flight, 0);

        view.write_started(&rent.id, "completed");
        let failed = view.write_finished(&rent.id, "completed", Err("HTTP 403: nope".into()));
        assert_eq!(failed, Action::None);
        assert_eq!(
            view.status_msg.as_ref().map(|(m, _)| m.as_str()),
            Some("completed failed: HTTP 403: nope")
        );
    }

    #[test]
    fn quit_keys() {
        let mut view = loaded(vec![], false);
        view.handle_key(key('q'));
        assert!(view.should_quit());
    }
}
