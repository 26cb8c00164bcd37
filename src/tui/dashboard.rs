use crate::api::DeskApi;
use crate::dashboard::{
    AssignmentFilter, ConnectionStatus, DashboardPane, DashboardView, Delivery, LoginView,
    NoticeLevel, TranscriptLine,
};
use crate::dashboard::view::{sender_label, NoticeView, TranscriptPane};
use crate::push::PushChannel;
use crate::runtime::DashboardRuntime;
use crate::shared::{now_secs, ConversationId};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io::{self, IsTerminal, Stdout};
use std::time::{Duration, Instant};

const UI_POLL_INTERVAL: Duration = Duration::from_millis(60);
const CURSOR_BLINK_INTERVAL: Duration = Duration::from_millis(500);
const TYPING_EMIT_INTERVAL: Duration = Duration::from_secs(2);
pub const SCRIPT_KEYS_ENV: &str = "FRONTDESK_TUI_SCRIPT_KEYS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Login,
    List,
    Compose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginField {
    Username,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    Quit,
    Ignore,
    LoginChar(char),
    LoginBackspace,
    NextLoginField,
    SubmitLogin,
    MoveUp,
    MoveDown,
    Open,
    Close,
    CycleFilter,
    CycleChannel,
    TakeOver,
    HandBack,
    ToggleAi,
    DismissNotice,
    Refresh,
    Logout,
    StartCompose,
    ComposeChar(char),
    ComposeBackspace,
    SendCompose,
    CancelCompose,
}

/// Maps a key press to a dashboard action for the current input mode.
pub fn map_key(mode: InputMode, key: KeyEvent) -> UiAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return UiAction::Quit;
    }
    match mode {
        InputMode::Login => match key.code {
            KeyCode::Esc => UiAction::Quit,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up => UiAction::NextLoginField,
            KeyCode::Enter => UiAction::SubmitLogin,
            KeyCode::Backspace => UiAction::LoginBackspace,
            KeyCode::Char(c) => UiAction::LoginChar(c),
            _ => UiAction::Ignore,
        },
        InputMode::Compose => match key.code {
            KeyCode::Esc => UiAction::CancelCompose,
            KeyCode::Enter => UiAction::SendCompose,
            KeyCode::Backspace => UiAction::ComposeBackspace,
            KeyCode::Char(c) => UiAction::ComposeChar(c),
            _ => UiAction::Ignore,
        },
        InputMode::List => match key.code {
            KeyCode::Char('q') => UiAction::Quit,
            KeyCode::Esc => UiAction::Close,
            KeyCode::Up | KeyCode::Char('k') => UiAction::MoveUp,
            KeyCode::Down | KeyCode::Char('j') => UiAction::MoveDown,
            KeyCode::Enter => UiAction::Open,
            KeyCode::Tab => UiAction::CycleFilter,
            KeyCode::Char('c') => UiAction::CycleChannel,
            KeyCode::Char('t') => UiAction::TakeOver,
            KeyCode::Char('h') => UiAction::HandBack,
            KeyCode::Char('a') => UiAction::ToggleAi,
            KeyCode::Char('x') => UiAction::DismissNotice,
            KeyCode::Char('r') => UiAction::Refresh,
            KeyCode::Char('L') => UiAction::Logout,
            KeyCode::Char('i') => UiAction::StartCompose,
            _ => UiAction::Ignore,
        },
    }
}

/// Parses a comma separated key script such as `down,enter,i,h,i,enter,q`.
/// Single characters are typed literally.
pub fn parse_script_keys(raw: &str) -> Result<Vec<KeyEvent>, String> {
    let mut keys = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let mut modifiers = KeyModifiers::NONE;
        let code = match token.to_ascii_lowercase().as_str() {
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "enter" => KeyCode::Enter,
            "esc" => KeyCode::Esc,
            "tab" => KeyCode::Tab,
            "backspace" => KeyCode::Backspace,
            "space" => KeyCode::Char(' '),
            "comma" => KeyCode::Char(','),
            "ctrl-c" => {
                modifiers = KeyModifiers::CONTROL;
                KeyCode::Char('c')
            }
            _ => {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyCode::Char(c),
                    _ => {
                        return Err(format!(
                            "invalid {SCRIPT_KEYS_ENV} token `{token}`; valid tokens: up,down,enter,esc,tab,backspace,space,comma,ctrl-c or a single character"
                        ))
                    }
                }
            }
        };
        keys.push(KeyEvent::new(code, modifiers));
    }
    Ok(keys)
}

struct TuiState {
    username: String,
    password: String,
    login_field: LoginField,
    selected: usize,
    composing: bool,
    compose: String,
    last_typing_emit: Option<Instant>,
    cursor_visible: bool,
    last_cursor_tick: Instant,
}

impl TuiState {
    fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            login_field: LoginField::Username,
            selected: 0,
            composing: false,
            compose: String::new(),
            last_typing_emit: None,
            cursor_visible: true,
            last_cursor_tick: Instant::now(),
        }
    }

    fn mode(&self, view: &DashboardView) -> InputMode {
        match view {
            DashboardView::Login(_) => InputMode::Login,
            DashboardView::Dashboard(_) if self.composing => InputMode::Compose,
            DashboardView::Dashboard(_) => InputMode::List,
        }
    }

    fn advance_cursor_blink_if_needed(&mut self) {
        if self.last_cursor_tick.elapsed() >= CURSOR_BLINK_INTERVAL {
            self.cursor_visible = !self.cursor_visible;
            self.last_cursor_tick = Instant::now();
        }
    }

    fn cursor_suffix(&self) -> &'static str {
        if self.cursor_visible {
            "█"
        } else {
            " "
        }
    }

    fn typing_emit_due(&mut self, now: Instant) -> bool {
        let due = self
            .last_typing_emit
            .map_or(true, |last| now.duration_since(last) >= TYPING_EMIT_INTERVAL);
        if due {
            self.last_typing_emit = Some(now);
        }
        due
    }

    fn clamp_selection(&mut self, rows: usize) {
        if rows == 0 {
            self.selected = 0;
        } else if self.selected >= rows {
            self.selected = rows - 1;
        }
    }
}

/// Runs the interactive dashboard on an already started runtime until the
/// operator quits. Uses the key script in `FRONTDESK_TUI_SCRIPT_KEYS`
/// instead of the terminal when set.
pub fn run_dashboard_tui<A: DeskApi, P: PushChannel>(
    runtime: &mut DashboardRuntime<A, P>,
) -> Result<String, String> {
    if let Ok(raw) = std::env::var(SCRIPT_KEYS_ENV) {
        let keys = parse_script_keys(&raw)?;
        return Ok(run_scripted(runtime, keys));
    }
    if !(io::stdin().is_terminal() && io::stdout().is_terminal()) {
        return Err("watch requires an interactive terminal".to_string());
    }

    let mut terminal = setup_terminal()?;
    let mut state = TuiState::new();
    let result = run_event_loop(&mut terminal, runtime, &mut state);
    teardown_terminal(&mut terminal)?;
    result.map(|()| "watch ended".to_string())
}

fn run_event_loop<A: DeskApi, P: PushChannel>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &mut DashboardRuntime<A, P>,
    state: &mut TuiState,
) -> Result<(), String> {
    loop {
        let now = Instant::now();
        runtime.tick(now, now_secs());
        state.advance_cursor_blink_if_needed();

        let view = runtime.client().render(now);
        if let DashboardView::Dashboard(pane) = &view {
            state.clamp_selection(pane.rows.len());
        }
        terminal
            .draw(|frame| draw_dashboard_ui(frame, &view, state))
            .map_err(|e| format!("failed to render dashboard: {e}"))?;

        if !event::poll(UI_POLL_INTERVAL).map_err(|e| format!("failed to poll events: {e}"))? {
            continue;
        }
        let Event::Key(key) = event::read().map_err(|e| format!("failed to read event: {e}"))?
        else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let action = map_key(state.mode(&view), key);
        if action == UiAction::Quit {
            break;
        }
        apply_action(runtime, state, &view, action, now_secs());
    }
    Ok(())
}

fn run_scripted<A: DeskApi, P: PushChannel>(
    runtime: &mut DashboardRuntime<A, P>,
    keys: Vec<KeyEvent>,
) -> String {
    let mut state = TuiState::new();
    for key in keys {
        let now = Instant::now();
        runtime.tick(now, now_secs());
        let view = runtime.client().render(now);
        if let DashboardView::Dashboard(pane) = &view {
            state.clamp_selection(pane.rows.len());
        }
        let action = map_key(state.mode(&view), key);
        if action == UiAction::Quit {
            break;
        }
        apply_action(runtime, &mut state, &view, action, now_secs());
    }
    summarize(&runtime.client().render(Instant::now()))
}

fn apply_action<A: DeskApi, P: PushChannel>(
    runtime: &mut DashboardRuntime<A, P>,
    state: &mut TuiState,
    view: &DashboardView,
    action: UiAction,
    now_secs: i64,
) {
    let now = Instant::now();
    let highlighted = highlighted_conversation(view, state.selected);
    let client = runtime.client_mut();
    if action != UiAction::Ignore && client.state().is_signed_in() {
        client.record_activity(now_secs);
    }
    match action {
        UiAction::Quit | UiAction::Ignore => {}
        UiAction::LoginChar(c) => match state.login_field {
            LoginField::Username => state.username.push(c),
            LoginField::Password => state.password.push(c),
        },
        UiAction::LoginBackspace => {
            match state.login_field {
                LoginField::Username => state.username.pop(),
                LoginField::Password => state.password.pop(),
            };
        }
        UiAction::NextLoginField => {
            state.login_field = match state.login_field {
                LoginField::Username => LoginField::Password,
                LoginField::Password => LoginField::Username,
            };
        }
        UiAction::SubmitLogin => {
            if client.login(&state.username, &state.password).is_ok() {
                state.password.clear();
                state.login_field = LoginField::Username;
                state.selected = 0;
                runtime.note_fetch(now);
            }
        }
        UiAction::MoveUp => {
            state.selected = state.selected.saturating_sub(1);
        }
        UiAction::MoveDown => {
            state.selected = state.selected.saturating_add(1);
        }
        UiAction::Open => {
            if let Some(id) = highlighted {
                let _ = client.select_conversation(id);
            }
        }
        UiAction::Close => client.deselect_conversation(),
        UiAction::CycleFilter => {
            let filter = client.state().filter();
            let next = filter.with_assignment(filter.assignment.next());
            if client.refresh_conversations(next).is_ok() {
                state.selected = 0;
                runtime.note_fetch(now);
            }
        }
        UiAction::CycleChannel => {
            let filter = client.state().filter();
            let mut next = filter.clone();
            next.channel = filter.next_channel();
            if client.refresh_conversations(next).is_ok() {
                state.selected = 0;
                runtime.note_fetch(now);
            }
        }
        UiAction::TakeOver => {
            if let Some(id) = highlighted {
                if client.take_over(&id).is_ok() {
                    runtime.note_fetch(now);
                }
            }
        }
        UiAction::HandBack => {
            if let Some(id) = highlighted {
                let _ = client.hand_back_to_ai(&id);
            }
        }
        UiAction::ToggleAi => {
            let enabled = client.state().ai_enabled().unwrap_or(true);
            let _ = client.set_global_ai_enabled(!enabled);
        }
        UiAction::DismissNotice => {
            client.dismiss_latest_notice();
        }
        UiAction::Refresh => {
            let filter = client.state().filter().clone();
            if client.refresh_conversations(filter).is_ok() {
                runtime.note_fetch(now);
            }
        }
        UiAction::Logout => {
            let _ = client.logout();
            state.composing = false;
            state.compose.clear();
            runtime.note_fetch(now);
        }
        UiAction::StartCompose => {
            if client.state().active().is_some() {
                state.composing = true;
            }
        }
        UiAction::ComposeChar(c) => {
            state.compose.push(c);
            if state.typing_emit_due(now) {
                client.notify_typing();
            }
        }
        UiAction::ComposeBackspace => {
            state.compose.pop();
        }
        UiAction::SendCompose => {
            if client.send_message(&state.compose).is_ok() {
                state.compose.clear();
                state.composing = false;
            }
        }
        UiAction::CancelCompose => {
            state.composing = false;
        }
    }
}

fn highlighted_conversation(view: &DashboardView, selected: usize) -> Option<ConversationId> {
    match view {
        DashboardView::Dashboard(pane) => pane.rows.get(selected).map(|row| row.id.clone()),
        DashboardView::Login(_) => None,
    }
}

fn summarize(view: &DashboardView) -> String {
    match view {
        DashboardView::Login(login) => {
            let mut lines = vec!["view=login".to_string()];
            if let Some(error) = &login.error {
                lines.push(format!("error={error}"));
            }
            lines.join("\n")
        }
        DashboardView::Dashboard(pane) => {
            let mut lines = vec![
                "view=dashboard".to_string(),
                format!("agent={}", pane.agent_id),
                format!("filter={}", pane.filter),
                format!("conversations={}", pane.rows.len()),
            ];
            if let Some(transcript) = &pane.transcript {
                lines.push(format!("active={}", transcript.conversation_id));
                lines.push(format!("messages={}", message_count(transcript)));
            }
            if let Some(enabled) = pane.ai_enabled {
                lines.push(format!("ai_enabled={enabled}"));
            }
            lines.join("\n")
        }
    }
}

fn message_count(transcript: &TranscriptPane) -> usize {
    transcript
        .lines
        .iter()
        .filter(|line| matches!(line, TranscriptLine::Message { .. }))
        .count()
}

fn draw_dashboard_ui(frame: &mut Frame<'_>, view: &DashboardView, state: &TuiState) {
    match view {
        DashboardView::Login(login) => draw_login(frame, login, state),
        DashboardView::Dashboard(pane) => draw_pane(frame, pane, state),
    }
}

fn draw_login(frame: &mut Frame<'_>, login: &LoginView, state: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(vec![
        Line::raw("Frontdesk Agent Dashboard"),
        Line::raw("Tab switches field | Enter signs in | Esc quits"),
    ])
    .block(
        Block::default()
            .title("Sign in")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(header, sections[0]);

    let focused = |field: LoginField| {
        if state.login_field == field {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };
    let cursor = |field: LoginField| {
        if state.login_field == field {
            state.cursor_suffix()
        } else {
            ""
        }
    };
    let masked = "*".repeat(state.password.chars().count());
    frame.render_widget(
        Paragraph::new(format!("{}{}", state.username, cursor(LoginField::Username))).block(
            Block::default()
                .title("Username")
                .borders(Borders::ALL)
                .border_style(focused(LoginField::Username)),
        ),
        sections[1],
    );
    frame.render_widget(
        Paragraph::new(format!("{masked}{}", cursor(LoginField::Password))).block(
            Block::default()
                .title("Password")
                .borders(Borders::ALL)
                .border_style(focused(LoginField::Password)),
        ),
        sections[2],
    );

    let mut lines = Vec::new();
    if let Some(error) = &login.error {
        lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    lines.extend(notice_lines(&login.notices));
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().title("Status").borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        sections[3],
    );
}

fn draw_pane(frame: &mut Frame<'_>, pane: &DashboardPane, state: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(header_widget(pane), sections[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(sections[1]);
    draw_conversation_list(frame, pane, state, body[0]);
    draw_transcript(frame, pane.transcript.as_ref(), body[1]);

    let status = if pane.notices.is_empty() {
        vec![Line::raw(
            "Enter open | Tab filter | c channel | t take over | h hand back | a ai | i reply | r refresh | x dismiss | L logout | q quit",
        )]
    } else {
        notice_lines(&pane.notices)
    };
    frame.render_widget(
        Paragraph::new(status).block(Block::default().title("Status").borders(Borders::ALL)),
        sections[2],
    );

    let input = if state.composing {
        Paragraph::new(format!("you> {}{}", state.compose, state.cursor_suffix())).block(
            Block::default()
                .title("Reply")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
    } else {
        Paragraph::new("press i to reply in the open conversation")
            .block(Block::default().title("Reply").borders(Borders::ALL))
    };
    frame.render_widget(input, sections[3]);
}

fn header_widget(pane: &DashboardPane) -> Paragraph<'static> {
    let tabs = AssignmentFilter::ALL
        .iter()
        .map(|filter| {
            let label = format!(" {} ({}) ", filter, pane.counts.get(*filter));
            if *filter == pane.filter {
                Span::styled(
                    label,
                    Style::default().fg(Color::Black).bg(Color::Cyan),
                )
            } else {
                Span::raw(label)
            }
        })
        .collect::<Vec<_>>();
    let ai = match pane.ai_enabled {
        Some(true) => "on",
        Some(false) => "off",
        None => "?",
    };
    let connection_style = match pane.connection {
        ConnectionStatus::Connected => Style::default().fg(Color::Green),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
            Style::default().fg(Color::Yellow)
        }
        ConnectionStatus::Disconnected => Style::default().fg(Color::Red),
    };
    let channel = pane
        .channel
        .as_ref()
        .map(|channel| channel.as_str().to_string())
        .unwrap_or_else(|| "all".to_string());
    Paragraph::new(vec![
        Line::from(tabs),
        Line::from(vec![
            Span::raw(format!("agent={} channel={channel} ai={ai} push=", pane.agent_id)),
            Span::styled(pane.connection.as_str(), connection_style),
        ]),
    ])
    .block(
        Block::default()
            .title("Frontdesk")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
}

fn draw_conversation_list(frame: &mut Frame<'_>, pane: &DashboardPane, state: &TuiState, area: Rect) {
    let title = if pane.loading {
        "Conversations (loading)".to_string()
    } else {
        format!("Conversations ({})", pane.rows.len())
    };
    let items = pane
        .rows
        .iter()
        .map(|row| {
            let style = if row.needs_agent {
                Style::default().fg(Color::Magenta)
            } else if row.active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(Line::styled(row.to_string(), style))
        })
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !pane.rows.is_empty() && !state.composing {
        list_state.select(Some(state.selected));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_transcript(frame: &mut Frame<'_>, transcript: Option<&TranscriptPane>, area: Rect) {
    let Some(transcript) = transcript else {
        frame.render_widget(
            Paragraph::new("select a conversation and press Enter")
                .block(Block::default().title("Transcript").borders(Borders::ALL)),
            area,
        );
        return;
    };

    let channel = transcript
        .channel
        .as_ref()
        .map(|channel| channel.as_str())
        .unwrap_or("unknown");
    let title = format!("{} [{channel}] #{}", transcript.username, transcript.conversation_id);
    let mut lines = Vec::new();
    if transcript.loading {
        lines.push(Line::styled("loading…", Style::default().fg(Color::Gray)));
    }
    for line in &transcript.lines {
        match line {
            TranscriptLine::DateSeparator(label) => lines.push(Line::styled(
                format!("── {label} ──"),
                Style::default().fg(Color::DarkGray),
            )),
            TranscriptLine::Message {
                sender,
                text,
                time,
                delivery,
            } => {
                let color = match sender_label(*sender) {
                    "guest" => Color::White,
                    "ai" => Color::Green,
                    _ => Color::Yellow,
                };
                let marker = match delivery {
                    Delivery::Confirmed => "",
                    Delivery::Sent => " ✓",
                    Delivery::Pending => " …",
                };
                lines.push(Line::styled(
                    format!("[{time}] {}> {text}{marker}", sender_label(*sender)),
                    Style::default().fg(color),
                ));
            }
        }
    }
    if let Some(agent) = &transcript.typing {
        lines.push(Line::styled(
            format!("{agent} is typing…"),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ));
    }
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().title(title).borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn notice_lines(notices: &[NoticeView]) -> Vec<Line<'static>> {
    notices
        .iter()
        .map(|notice| {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Error => Color::Red,
            };
            Line::styled(notice.text.clone(), Style::default().fg(color))
        })
        .collect()
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, String> {
    enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {e}"))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)
        .map_err(|e| format!("failed to enter alternate screen: {e}"))?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|e| format!("failed to initialize terminal: {e}"))
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), String> {
    disable_raw_mode().map_err(|e| format!("failed to disable raw mode: {e}"))?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .map_err(|e| format!("failed to leave alternate screen: {e}"))?;
    terminal
        .show_cursor()
        .map_err(|e| format!("failed to restore cursor: {e}"))?;
    Ok(())
}
