use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::time::Duration;

use crate::api::JobApi;
use crate::models::JobSummary;
use crate::route::{InitialQuery, Navigation};
use crate::search::{JobSearchController, SearchMode, SearchState};
use crate::session::SessionStore;
use crate::text;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ViewState {
    selected: usize,
    scroll_offset: u16,
    editing_keyword: bool,
}

impl ViewState {
    fn new() -> Self {
        Self {
            selected: 0,
            scroll_offset: 0,
            editing_keyword: false,
        }
    }

    fn clamp(&mut self, visible: usize) {
        if visible == 0 {
            self.selected = 0;
        } else if self.selected >= visible {
            self.selected = visible - 1;
        }
    }

    fn next(&mut self, visible: usize) {
        if visible > 0 && self.selected < visible - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn reset(&mut self) {
        self.selected = 0;
        self.scroll_offset = 0;
    }
}

enum Outcome {
    Continue,
    Quit,
}

/// Runs the interactive search screen until the user quits or the
/// controller asks to navigate somewhere else.
pub fn run_browse<A: JobApi, S: SessionStore>(
    controller: &mut JobSearchController<A, S>,
    query: &InitialQuery,
) -> Result<Option<Navigation>> {
    controller.initialize(query);
    // Missing session: don't bother taking over the terminal.
    if let Some(nav) = controller.take_navigation() {
        controller.teardown();
        return Ok(Some(nav));
    }

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, controller);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    controller.teardown();
    result
}

fn run_loop<A: JobApi, S: SessionStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    controller: &mut JobSearchController<A, S>,
) -> Result<Option<Navigation>> {
    let mut view = ViewState::new();
    let mut list_state = ListState::default();

    loop {
        controller.drain();
        if let Some(nav) = controller.take_navigation() {
            return Ok(Some(nav));
        }

        let visible = controller.state().visible_jobs().len();
        view.clamp(visible);
        list_state.select(if visible == 0 { None } else { Some(view.selected) });

        terminal.draw(|frame| draw(frame, controller.state(), &view, &mut list_state))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let outcome = if view.editing_keyword {
                handle_keyword_key(key, controller, &mut view)
            } else {
                handle_key(key, controller, &mut view)
            };
            if let Outcome::Quit = outcome {
                return Ok(None);
            }
        }
    }
}

fn handle_keyword_key<A: JobApi, S: SessionStore>(
    key: KeyEvent,
    controller: &mut JobSearchController<A, S>,
    view: &mut ViewState,
) -> Outcome {
    match key.code {
        KeyCode::Enter | KeyCode::Esc => view.editing_keyword = false,
        KeyCode::Backspace => {
            let mut keyword = controller.state().keyword.clone();
            keyword.pop();
            controller.set_keyword(keyword);
            view.reset();
        }
        KeyCode::Char(c) => {
            let mut keyword = controller.state().keyword.clone();
            keyword.push(c);
            controller.set_keyword(keyword);
            view.reset();
        }
        _ => {}
    }
    Outcome::Continue
}

fn handle_key<A: JobApi, S: SessionStore>(
    key: KeyEvent,
    controller: &mut JobSearchController<A, S>,
    view: &mut ViewState,
) -> Outcome {
    let state = controller.state();
    let visible = state.visible_jobs().len();
    let selected_id = state.visible_jobs().get(view.selected).map(|job| job.id.clone());
    let page = state.page;
    let total_pages = state.total_pages() as u32;
    let mode = state.mode;
    let match_page_size = state.match_page_size;

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Outcome::Quit,
        KeyCode::Down | KeyCode::Char('j') => view.next(visible),
        KeyCode::Up | KeyCode::Char('k') => view.prev(),
        KeyCode::Char('J') | KeyCode::PageDown => {
            view.scroll_offset = view.scroll_offset.saturating_add(3)
        }
        KeyCode::Char('K') | KeyCode::PageUp => {
            view.scroll_offset = view.scroll_offset.saturating_sub(3)
        }
        KeyCode::Char('/') if mode.keyword_enabled() => view.editing_keyword = true,
        KeyCode::Right | KeyCode::Char('n') if page < total_pages => {
            controller.set_page(page + 1);
            view.reset();
        }
        KeyCode::Left | KeyCode::Char('p') if page > 1 => {
            controller.set_page(page - 1);
            view.reset();
        }
        KeyCode::Tab => {
            controller.toggle_mode();
            view.reset();
        }
        KeyCode::Char('m') if mode == SearchMode::ResumeMatch => {
            controller.search_matches();
            view.reset();
        }
        KeyCode::Char('+') if mode == SearchMode::ResumeMatch => {
            controller.set_match_page_size(match_page_size + 1)
        }
        KeyCode::Char('-') if mode == SearchMode::ResumeMatch => {
            controller.set_match_page_size(match_page_size.saturating_sub(1))
        }
        KeyCode::Char('a') => {
            if let Some(id) = selected_id {
                controller.analyze_match(&id);
            }
        }
        KeyCode::Enter => {
            if let Some(id) = selected_id {
                controller.view_details(&id);
            }
        }
        _ => {}
    }
    Outcome::Continue
}

fn draw(frame: &mut Frame, state: &SearchState, view: &ViewState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_search_bar(frame, rows[0], state, view);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let jobs = state.visible_jobs();

    // Left panel: job list
    let items: Vec<ListItem> = jobs
        .iter()
        .map(|job| {
            let marker = if state.analyzing.contains(&job.id) {
                "~"
            } else if job.analysis_error.is_some() {
                "!"
            } else if job.match_details.is_some() {
                "*"
            } else {
                " "
            };
            let score = job
                .match_score
                .map(|s| format!(" {:.0}%", s))
                .unwrap_or_default();
            ListItem::new(format!(
                "{} {} | {}{}",
                marker,
                text::truncate(&job.title, 32),
                text::truncate(&job.company, 18),
                score
            ))
        })
        .collect();

    let list_title = if state.loading {
        " Jobs (loading...) ".to_string()
    } else {
        format!(
            " Jobs - page {}/{} ({} total) ",
            state.page,
            state.total_pages().max(1),
            state.total
        )
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, columns[0], list_state);

    // Right panel: card detail
    let detail_width = columns[1].width.saturating_sub(4) as usize;
    let detail = match (&state.error, jobs.get(view.selected)) {
        (Some(error), _) => Text::from(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        ))),
        (None, Some(job)) => build_detail(job, state, detail_width),
        (None, None) if state.loading => Text::raw("Loading..."),
        (None, None) if state.mode == SearchMode::ResumeMatch => {
            Text::raw("Press 'm' to find jobs matching your resume.")
        }
        (None, None) => Text::raw("No jobs available at the moment."),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((view.scroll_offset, 0));
    frame.render_widget(detail_widget, columns[1]);

    // Footer help
    let help = match state.mode {
        SearchMode::Keyword => {
            " j/k:navigate  J/K:scroll  /:search  n/p:page  a:analyze  enter:details  tab:resume match  q:quit"
        }
        SearchMode::ResumeMatch => {
            " j/k:navigate  J/K:scroll  m:match  +/-:results  n/p:page  a:analyze  enter:details  tab:keyword  q:quit"
        }
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );
}

fn draw_search_bar(frame: &mut Frame, area: Rect, state: &SearchState, view: &ViewState) {
    let (content, style) = match state.mode {
        SearchMode::Keyword => {
            let cursor = if view.editing_keyword { "_" } else { "" };
            let shown = if state.keyword.is_empty() && !view.editing_keyword {
                "Search jobs by title, description, or requirements...".to_string()
            } else {
                format!("{}{}", state.keyword, cursor)
            };
            let style = if view.editing_keyword {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            (shown, style)
        }
        SearchMode::ResumeMatch => (
            format!(
                "Matching against your resume ({} results per search)",
                state.match_page_size
            ),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let bar = Paragraph::new(content).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} search ", state.mode.label())),
    );
    frame.render_widget(bar, area);
}

fn build_detail<'a>(job: &'a JobSummary, state: &SearchState, width: usize) -> Text<'a> {
    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        &job.title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));
    if !job.location.is_empty() {
        lines.push(Line::from(format!("Location: {}", job.location)));
    }
    if !job.salary.is_empty() {
        lines.push(Line::from(format!("Salary: {}", job.salary)));
    }
    lines.push(Line::from(Span::styled(
        format!("Posted {}", text::format_date(job.posted_date.as_deref())),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    for line in text::wrap(&text::description_preview(&job.description), width) {
        lines.push(Line::from(line));
    }
    lines.push(Line::from(""));

    let chips = text::requirement_chips(&job.requirements);
    if !chips.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("[{}]", chips.join("] [")),
            Style::default().fg(Color::Cyan),
        )));
        lines.push(Line::from(""));
    }

    // Match analysis
    if state.analyzing.contains(&job.id) {
        lines.push(Line::from(Span::styled(
            "Analyzing match...",
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(error) = &job.analysis_error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    } else if let Some(details) = &job.match_details {
        lines.push(Line::from(Span::styled(
            format!("MATCH {:.1}%", details.overall_match),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        if !details.seniority_match.is_empty() || !details.role_alignment.is_empty() {
            lines.push(Line::from(format!(
                "  Seniority: {}  Role alignment: {}",
                details.seniority_match, details.role_alignment
            )));
        }
        if !details.matching_skills.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("  Matching: {}", details.matching_skills.join(", ")),
                Style::default().fg(Color::Green),
            )));
        }
        if !details.key_skills.is_empty() {
            lines.push(Line::from(format!("  Key skills: {}", details.key_skills.join(", "))));
        }
        if !details.match_explanation.is_empty() {
            lines.push(Line::from(""));
            for line in text::wrap(&details.match_explanation, width) {
                lines.push(Line::from(format!("  {}", line)));
            }
        }
    } else {
        lines.push(Line::from(Span::styled(
            "(Press 'a' to analyze how this job matches your resume)",
            Style::default().fg(Color::DarkGray),
        )));
    }

    Text::from(lines)
}
