use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::actions::Action;
use crate::controller::{MonitorState, PollController};
use crate::exam::SessionRecord;
use crate::notify::{Banner, BannerKind, SharedOverlay};

/// Banner rows beyond this are cut off to keep the session list visible
const MAX_BANNER_LINES: usize = 8;

/// Theme colors
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg: Color::Rgb(30, 30, 30),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87),
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Terminal front end for the monitor
pub struct App {
    /// Currently selected session row
    pub list_state: ListState,
    /// Transient message for the footer
    pub message: Option<String>,
    pub theme: Theme,
    /// Banner written by the controller
    pub overlay: SharedOverlay,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
    session_count: usize,
    banner_area: Option<Rect>,
}

impl App {
    pub fn new(overlay: SharedOverlay) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            list_state,
            message: None,
            theme: Theme::default(),
            overlay,
            pending_actions: Vec::new(),
            session_count: 0,
            banner_area: None,
        }
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::Click { column, row } => {
                let hit = self
                    .banner_area
                    .is_some_and(|area| area.contains(Position::new(column, row)));
                if hit {
                    self.pending_actions.push(Action::ForceRefresh);
                }
                Ok(false)
            }
            Action::Quit => Ok(true),
            _ => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        self.message = None;

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.pending_actions.push(Action::Reload);
            }
            KeyCode::Char('R') => self.pending_actions.push(Action::Reload),
            KeyCode::Char('r') => self.pending_actions.push(Action::ForceRefresh),
            KeyCode::Char('y') => self.pending_actions.push(Action::CopyPurchaseLink),
            KeyCode::Char('j') | KeyCode::Down => self.next_session(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_session(),
            _ => {}
        }
        Ok(false)
    }

    fn next_session(&mut self) {
        if self.session_count == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.session_count => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_session(&mut self) {
        if self.session_count == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.session_count - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame, controller: &PollController) {
        self.session_count = controller.sessions().len();
        if let Some(selected) = self.list_state.selected() {
            if selected >= self.session_count && self.session_count > 0 {
                self.list_state.select(Some(self.session_count - 1));
            }
        }

        let banner = self.overlay.borrow().current().cloned();
        let banner_height = banner
            .as_ref()
            .map(|b| b.lines.len().min(MAX_BANNER_LINES) as u16 + 4)
            .unwrap_or(0);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),             // Header
                Constraint::Length(banner_height), // Banner
                Constraint::Min(0),                // Session list
                Constraint::Length(3),             // Footer
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0], controller);
        match banner {
            Some(ref banner) => {
                self.render_banner(frame, chunks[1], banner);
                self.banner_area = Some(chunks[1]);
            }
            None => self.banner_area = None,
        }
        self.render_sessions(frame, chunks[2], controller.sessions());
        self.render_footer(frame, chunks[3]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, controller: &PollController) {
        let (badge, color) = match controller.state() {
            MonitorState::Bootstrapping => ("STARTING", self.theme.dim),
            MonitorState::Polling => ("CHECKING", self.theme.accent),
            MonitorState::Waiting { degraded: false } => ("WATCHING", self.theme.fg),
            MonitorState::Waiting { degraded: true } => ("NO DATA", self.theme.error),
            MonitorState::Alerting => ("AVAILABLE", self.theme.success),
        };

        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " SlotSentry ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ {} │ Check #{} │ ", controller.source_label(), controller.cycle()),
                Style::default().fg(self.theme.dim),
            ),
            Span::styled(
                badge,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_banner(&self, frame: &mut Frame, area: Rect, banner: &Banner) {
        let (title, color) = match banner.kind {
            BannerKind::Alert => (" SESSIONS AVAILABLE ", self.theme.success),
            BannerKind::Degraded => (" No data ", self.theme.error),
            BannerKind::Status if banner.emphasis => (" Status ", self.theme.warning),
            BannerKind::Status => (" Status ", self.theme.dim),
        };

        let mut content = vec![Line::from(Span::styled(
            banner.headline.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))];

        for line in banner.lines.iter().take(MAX_BANNER_LINES) {
            let mut spans = vec![Span::styled(
                format!(" • {}", line.description),
                Style::default().fg(self.theme.fg),
            )];
            if let Some(ref note) = line.note {
                spans.push(Span::styled(
                    format!("  ⚠ {}", note),
                    Style::default().fg(self.theme.warning),
                ));
            }
            if let Some(ref link) = line.link {
                spans.push(Span::styled(
                    format!("  ↗ {}", link),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::UNDERLINED),
                ));
            }
            content.push(Line::from(spans));
        }

        let status_style = if banner.emphasis && banner.kind == BannerKind::Status {
            Style::default().fg(self.theme.warning)
        } else {
            Style::default().fg(self.theme.dim)
        };
        content.push(Line::from(Span::styled(banner.status_line.as_str(), status_style)));

        let widget = Paragraph::new(content)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color)),
            );
        frame.render_widget(widget, area);
    }

    fn render_sessions(&mut self, frame: &mut Frame, area: Rect, sessions: &[SessionRecord]) {
        let items: Vec<ListItem> = if sessions.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No sessions seen yet.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            sessions
                .iter()
                .map(|session| {
                    let icon = if session.is_available() {
                        Span::styled("● ", Style::default().fg(self.theme.success))
                    } else {
                        Span::styled("✗ ", Style::default().fg(self.theme.error))
                    };

                    let mut spans = vec![
                        icon,
                        Span::styled(
                            session.description.as_str(),
                            Style::default().fg(self.theme.fg),
                        ),
                    ];
                    if !session.price_student.is_empty() {
                        spans.push(Span::styled(
                            format!("  {}", session.price_student),
                            Style::default().fg(self.theme.dim),
                        ));
                    }
                    if session.has_last_spots() {
                        spans.push(Span::styled(
                            format!("  ⚠ {}", session.note),
                            Style::default().fg(self.theme.warning),
                        ));
                    }
                    if session.has_purchase_link() {
                        spans.push(Span::styled("  ↗", Style::default().fg(self.theme.accent)));
                    }

                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(format!(" Sessions ({}) ", sessions.len()))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = concat!(
            " q: Quit │ j/k: Navigate │ r: Refresh │ R: Reload │ y: Copy link",
            " │ Click banner: Refresh "
        );

        let content = match self.message {
            Some(ref msg) => Line::from(Span::styled(
                format!(" {} ", msg),
                Style::default().fg(self.theme.warning),
            )),
            None => Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim))),
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }
}
