use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use haydon_xref::{CatalogEntry, CatalogSnapshot, LookupOutcome, MatchOptions, Matcher, PreviewSource};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Results,
}

pub struct App {
    snapshot: CatalogSnapshot,
    options: MatchOptions,
    preview: Option<Box<dyn PreviewSource>>,
    pub query: String,
    pub outcome: Option<LookupOutcome>,
    pub state: TableState,
    pub focus: Focus,
    pub show_detail: bool,
}

impl App {
    pub fn new(
        snapshot: CatalogSnapshot,
        options: MatchOptions,
        preview: Option<Box<dyn PreviewSource>>,
    ) -> Self {
        Self {
            snapshot,
            options,
            preview,
            query: String::new(),
            outcome: None,
            state: TableState::default(),
            focus: Focus::Input,
            show_detail: false,
        }
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
    }

    pub fn backspace(&mut self) {
        self.query.pop();
    }

    /// Run the current query; blank input clears the results
    pub fn submit(&mut self) {
        if self.query.trim().is_empty() {
            self.outcome = None;
            self.state.select(None);
            return;
        }

        let mut matcher = Matcher::new(&self.snapshot, self.options);
        if let Some(source) = self.preview.as_deref() {
            matcher = matcher.with_preview(source);
        }
        let outcome = matcher.lookup(&self.query);

        if outcome.entries().is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
            self.focus = Focus::Results;
        }
        self.show_detail = false;
        self.outcome = Some(outcome);
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        self.outcome.as_ref().map(|o| o.entries()).unwrap_or(&[])
    }

    pub fn selected_entry(&self) -> Option<&CatalogEntry> {
        self.state.selected().and_then(|i| self.entries().get(i))
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next(&mut self) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.entries().is_empty() {
            return;
        }
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }

    /// Summary line under the search box
    pub fn summary(&self) -> String {
        match &self.outcome {
            None => "Enter Haydon or Vendor part number".to_string(),
            Some(LookupOutcome::NoMatches) => {
                "No cross-reference found for that part number.".to_string()
            }
            Some(outcome) => format!("Found {} matching entry(ies)", outcome.entries().len()),
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.focus {
            Focus::Input => match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.submit(),
                KeyCode::Backspace => app.backspace(),
                KeyCode::Down | KeyCode::Tab if !app.entries().is_empty() => {
                    app.focus = Focus::Results;
                }
                KeyCode::Char(c) => app.push_char(c),
                _ => {}
            },
            Focus::Results => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('/') | KeyCode::Tab => app.focus = Focus::Input,
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    let len = app.entries().len();
                    if len > 0 {
                        app.state.select(Some(len - 1));
                    }
                }
                _ => {}
            },
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search input
            Constraint::Min(0),    // Results + details
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_input(f, chunks[0], app);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);

    render_table(f, content_chunks[0], app);

    if app.show_detail {
        let side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(content_chunks[1]);
        render_row_detail(f, side[0], app);
        render_product_details(f, side[1], app);
    } else {
        render_product_details(f, content_chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let border = if app.focus == Focus::Input {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input = Paragraph::new(Line::from(vec![
        Span::styled("Part #: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(app.query.as_str()),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" Haydon Cross-Reference "),
    );

    f.render_widget(input, area);

    if app.focus == Focus::Input {
        let x = area.x + 1 + "Part #: ".len() as u16 + app.query.chars().count() as u16;
        f.set_cursor(x.min(area.right().saturating_sub(2)), area.y + 1);
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Haydon Part #", "Vendor Part #", "Vendor"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .entries()
        .iter()
        .map(|entry| {
            Row::new(vec![
                Cell::from(truncate(&entry.haydon_part, 24)),
                Cell::from(truncate(entry.vendor_part.as_deref().unwrap_or(""), 24)),
                Cell::from(truncate(entry.vendor_name.as_deref().unwrap_or(""), 20)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [Constraint::Length(26), Constraint::Length(26), Constraint::Min(10)],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} ", app.summary())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn label(name: &str) -> Span<'_> {
    Span::styled(
        format!("  {}: ", name),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn render_row_detail(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Entry Details ");

    let Some(entry) = app.selected_entry() else {
        f.render_widget(Paragraph::new("No entry selected").block(block), area);
        return;
    };

    let mut content = vec![
        Line::from(vec![label("Haydon Part #"), Span::raw(entry.haydon_part.as_str())]),
        Line::from(vec![
            label("Vendor Part #"),
            Span::raw(entry.vendor_part.as_deref().unwrap_or("-")),
        ]),
        Line::from(vec![
            label("Vendor"),
            Span::raw(entry.vendor_name.as_deref().unwrap_or("-")),
        ]),
    ];
    for (column, value) in &entry.extra {
        content.push(Line::from(vec![label(column), Span::raw(value.as_str())]));
    }

    let panel = Paragraph::new(content).block(block).wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn render_product_details(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(" Product Details ");

    let dim = Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC);

    let content = match &app.outcome {
        None => vec![Line::from(Span::styled("  Search to see product details", dim))],
        Some(LookupOutcome::NoMatches) => vec![Line::from(Span::styled(
            "  No cross-reference found for that part number.",
            Style::default().fg(Color::Red),
        ))],
        Some(outcome) => {
            let LookupOutcome::Matched { core_part, reference, .. } = outcome else {
                return;
            };
            let mut lines = vec![Line::from(vec![label("Core part"), Span::raw(core_part.as_str())])];

            if let Some(url) = outcome.image_url() {
                lines.push(Line::from(vec![label("Image"), Span::raw(url)]));
            }

            match reference {
                Some(found) => {
                    lines.push(Line::from(vec![
                        label("Reference"),
                        Span::raw(format!("{} (via {})", found.entry.name, found.candidate)),
                    ]));
                    match outcome.submittal_url() {
                        Some(url) => lines.push(Line::from(vec![label("📄 Submittal"), Span::raw(url)])),
                        None => lines.push(Line::from(Span::styled(
                            "  No submittal file available.",
                            dim,
                        ))),
                    }
                }
                None => lines.push(Line::from(Span::styled(
                    "  No product image/submittal found in reference list.",
                    dim,
                ))),
            }

            lines
        }
    };

    let panel = Paragraph::new(content).block(block).wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.entries().len();
    let key = Style::default().fg(Color::Yellow);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    match app.focus {
        Focus::Input => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled("Enter", key));
            spans.push(Span::raw(" Search | "));
            spans.push(Span::styled("Tab", key));
            spans.push(Span::raw(" Results | "));
            spans.push(Span::styled("Esc", Style::default().fg(Color::Red)));
            spans.push(Span::raw(" Quit"));
        }
        Focus::Results => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled("Enter", key));
            spans.push(Span::raw(" Details | "));
            spans.push(Span::styled("/", key));
            spans.push(Span::raw(" Search | "));
            spans.push(Span::styled("↑/↓", key));
            spans.push(Span::raw(" Nav | "));
            spans.push(Span::styled("PgUp/PgDn", key));
            spans.push(Span::raw(" Fast | "));
            spans.push(Span::styled("q", Style::default().fg(Color::Red)));
            spans.push(Span::raw(" Quit"));
        }
    }

    let status_bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
