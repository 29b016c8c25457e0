#![allow(clippy::arithmetic_side_effects)]
use {
    crossterm::{
        cursor,
        event::{
            self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
            KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
        },
        execute,
        terminal::{self},
    },
    hashbrown::{HashMap, HashSet},
    miette::IntoDiagnostic,
    ratatui::{
        Frame, Terminal,
        backend::CrosstermBackend,
        layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
        style::{Color, Modifier, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    },
    ratatui_image::{StatefulImage, picker::Picker, protocol::StatefulProtocol},
    std::{
        io, panic,
        time::{Duration, Instant},
    },
    storyreel::{
        Input, Player, PlayerEvent,
        feed::{LoadStatus, TileState},
        loader::{InsertMode, LoadRequest},
        navigation::NavKey,
        types::StoryId,
    },
    tokio::sync::mpsc::UnboundedReceiver,
    tracing::{debug, warn},
};

const FRAME: Duration = Duration::from_millis(16);
const NOTIFICATION_TTL: Duration = Duration::from_secs(3);
/// Height of a terminal row in logical pixels, for swipe distances.
const ROW_PIXELS: f32 = 16.0;
const GALLERY_WIDTH: u16 = 44;
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(
            io::stdout(),
            DisableMouseCapture,
            terminal::LeaveAlternateScreen,
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

pub struct TuiApp {
    player: Player,
    events: UnboundedReceiver<PlayerEvent>,
    picker: Picker,
    /// Decoded illustrations, ready for ratatui-image.
    images: HashMap<StoryId, StatefulProtocol>,
    broken_images: HashSet<StoryId>,
    list_state: ListState,
    list_area: Rect,
    show_help: bool,
    notification: Option<String>,
    notification_time: Option<Instant>,
    frame_count: usize,
}

impl TuiApp {
    pub fn new(player: Player, events: UnboundedReceiver<PlayerEvent>) -> Self {
        Self {
            player,
            events,
            picker: Picker::halfblocks(),
            images: HashMap::new(),
            broken_images: HashSet::new(),
            list_state: ListState::default().with_selected(Some(0)),
            list_area: Rect::default(),
            show_help: false,
            notification: None,
            notification_time: None,
            frame_count: 0,
        }
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notification = Some(message.into());
        self.notification_time = Some(Instant::now());
    }

    pub async fn run(&mut self) -> miette::Result<()> {
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = execute!(
                io::stdout(),
                DisableMouseCapture,
                terminal::LeaveAlternateScreen,
                cursor::Show
            );
            let _ = terminal::disable_raw_mode();
            original_hook(info);
        }));

        terminal::enable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )
        .into_diagnostic()?;

        let _guard = TerminalGuard;
        self.picker = Picker::from_query_stdio().unwrap_or_else(|_| Picker::halfblocks());
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        self.player.load_batch(LoadRequest::append());
        let result = self.main_loop(&mut terminal).await;

        drop(_guard);
        let _ = panic::take_hook();

        result
    }

    async fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> miette::Result<()> {
        loop {
            if let Some(t) = self.notification_time
                && t.elapsed() >= NOTIFICATION_TTL
            {
                self.notification = None;
                self.notification_time = None;
            }

            self.prepare_images();
            terminal.draw(|f| self.render_ui(f)).into_diagnostic()?;
            self.frame_count = self.frame_count.wrapping_add(1);

            tokio::select! {
                Some(event) = self.events.recv() => self.player.handle(event),
                () = tokio::time::sleep(FRAME) => {}
            }
            while let Ok(event) = self.events.try_recv() {
                self.player.handle(event);
            }
            self.player.tick();

            while event::poll(Duration::ZERO).into_diagnostic()? {
                let keep_going = match event::read().into_diagnostic()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                    Event::Mouse(mouse) => {
                        self.handle_mouse(mouse);
                        true
                    }
                    _ => true,
                };
                if !keep_going {
                    return Ok(());
                }
            }
        }
    }

    fn selected(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    fn select(&mut self, index: usize) {
        let len = self.player.feed().len();
        if len == 0 {
            return;
        }
        let index = index.min(len - 1);
        self.list_state.select(Some(index));
        if self.player.prefetch_if_at_end(index) {
            debug!(index, "gallery end reached, loading more stories");
        }
    }

    fn select_offset(&mut self, delta: isize) {
        let index = self.selected().saturating_add_signed(delta);
        self.select(index);
    }

    fn open_selected(&mut self) {
        let Some(tile) = self.player.feed().tiles().get(self.selected()) else {
            return;
        };
        let id = tile.id;
        if !tile.is_ready() {
            self.notify("This story is still being illustrated");
            return;
        }
        if !self.player.open_story(id) {
            self.notify("This story is not ready yet");
        }
    }

    /// The gallery comes back scrolled to the top, where the latest batch now is.
    fn after_close(&mut self) {
        self.list_state.select(Some(0));
        *self.list_state.offset_mut() = 0;
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match key.code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                return true;
            }
            KeyCode::Esc if self.show_help => {
                self.show_help = false;
                return true;
            }
            _ => {}
        }

        let now = Instant::now();
        if self.player.playback().surface_visible() {
            let nav = match key.code {
                KeyCode::Esc | KeyCode::Backspace => Some(NavKey::Escape),
                KeyCode::Up | KeyCode::Char('k') => Some(NavKey::Up),
                KeyCode::Left | KeyCode::Char('h') => Some(NavKey::Left),
                KeyCode::Down | KeyCode::Char('j' | ' ') => Some(NavKey::Down),
                KeyCode::Right | KeyCode::Char('l') => Some(NavKey::Right),
                _ => None,
            };
            let input = nav.map_or(Input::PointerDown, Input::Key);
            self.player.input(input, now);
            if !self.player.playback().surface_visible() {
                self.after_close();
            }
            return true;
        }

        self.player.input(Input::PointerDown, now);
        match key.code {
            KeyCode::Esc => return false,
            KeyCode::Down | KeyCode::Char('j') => self.select_offset(1),
            KeyCode::Up | KeyCode::Char('k') => self.select_offset(-1),
            KeyCode::Home | KeyCode::Char('g') => self.select(0),
            KeyCode::End | KeyCode::Char('G') => self.select(usize::MAX),
            KeyCode::Enter | KeyCode::Char(' ') => self.open_selected(),
            KeyCode::Char('r') => {
                if self.player.load_batch(LoadRequest::refresh(InsertMode::Prepend)) {
                    self.after_close();
                } else {
                    self.notify("Already loading stories");
                }
            }
            _ => {}
        }
        true
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let now = Instant::now();
        let y = f32::from(mouse.row) * ROW_PIXELS;
        let visible = self.player.playback().surface_visible();

        match mouse.kind {
            MouseEventKind::ScrollDown if visible => {
                self.player.input(Input::Wheel { delta_y: 1.0 }, now);
            }
            MouseEventKind::ScrollUp if visible => {
                self.player.input(Input::Wheel { delta_y: -1.0 }, now);
            }
            MouseEventKind::ScrollDown => self.select_offset(1),
            MouseEventKind::ScrollUp => self.select_offset(-1),
            MouseEventKind::Down(MouseButton::Left) => {
                self.player.input(Input::TouchStart { y }, now);
                if !visible {
                    self.click_gallery(mouse.column, mouse.row);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.player.input(Input::TouchEnd { y }, now);
            }
            _ => {}
        }

        if visible && !self.player.playback().surface_visible() {
            self.after_close();
        }
    }

    /// Clicking a tile selects it; clicking the selected tile opens it.
    fn click_gallery(&mut self, column: u16, row: u16) {
        let inner = Block::default().borders(Borders::ALL).inner(self.list_area);
        if !inner.contains(Position::new(column, row)) {
            return;
        }
        let index = self.list_state.offset() + usize::from(row - inner.y);
        if index >= self.player.feed().len() {
            return;
        }
        if index == self.selected() {
            self.open_selected();
        } else {
            self.select(index);
        }
    }

    /// Story whose illustration is on screen.
    fn shown_story(&self) -> Option<StoryId> {
        if self.player.playback().surface_visible() {
            self.player.library().current_record().map(|r| r.id)
        } else {
            self.player.feed().tiles().get(self.selected()).map(|t| t.id)
        }
    }

    fn prepare_images(&mut self) {
        let Some(id) = self.shown_story() else {
            return;
        };
        if self.images.contains_key(&id) || self.broken_images.contains(&id) {
            return;
        }
        let data = self
            .player
            .feed()
            .get(id)
            .and_then(|t| t.image())
            .or_else(|| {
                let library = self.player.library();
                library.position(id).and_then(|i| library.get(i)).and_then(|r| r.image())
            })
            .map(|image| image.data.clone());
        let Some(data) = data else {
            return;
        };

        match image::load_from_memory(&data) {
            Ok(decoded) => {
                self.images.insert(id, self.picker.new_resize_protocol(decoded));
            }
            Err(err) => {
                warn!(%id, "cannot decode illustration: {err}");
                self.broken_images.insert(id);
            }
        }
    }

    fn spinner(&self) -> &'static str {
        SPINNER[(self.frame_count / 4) % SPINNER.len()]
    }

    fn render_ui(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        if self.player.playback().surface_visible() {
            self.render_story(frame, chunks[0]);
        } else {
            self.render_gallery(frame, chunks[0]);
        }
        self.render_status_bar(frame, chunks[1]);

        if let Some(ref msg) = self.notification {
            self.render_notification(frame, chunks[0], msg);
        }

        if self.show_help {
            self.render_help_overlay(frame);
        }
    }

    fn render_gallery(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(GALLERY_WIDTH), Constraint::Min(0)])
            .split(area);
        self.list_area = chunks[0];

        let spinner = self.spinner();
        let feed = self.player.feed();
        let items: Vec<ListItem> = feed
            .tiles()
            .iter()
            .map(|tile| {
                let marker = match &tile.state {
                    TileState::Pending => Span::styled(format!("{spinner} "), Style::default().fg(Color::Yellow)),
                    TileState::Ready(image) if image.cached => Span::styled("\u{1f4be} ", Style::default().fg(Color::Cyan)),
                    TileState::Ready(_) => Span::styled("\u{25b6} ", Style::default().fg(Color::Green)),
                };
                ListItem::new(Line::from(vec![marker, Span::raw(tile.prompt.clone())]))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Stories ({}) ", feed.len())),
            )
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, chunks[0], &mut self.list_state);

        let preview = Block::default().borders(Borders::ALL).title(" Preview ");
        let inner = preview.inner(chunks[1]);
        frame.render_widget(preview, chunks[1]);

        let selected = self.list_state.selected().and_then(|i| feed.tiles().get(i));
        if let Some(protocol) = selected.and_then(|tile| self.images.get_mut(&tile.id)) {
            frame.render_stateful_widget(StatefulImage::default(), inner, protocol);
            return;
        }

        let message = match (selected, feed.status()) {
            (Some(tile), _) if !tile.is_ready() => Line::from(format!("{spinner} Illustrating...")),
            (Some(_), _) => Line::from(""),
            (None, LoadStatus::Loading) => Line::from(format!("{spinner} Loading stories...")),
            (None, LoadStatus::Failed(msg)) => Line::from(vec![
                Span::styled(msg.clone(), Style::default().fg(Color::Red)),
                Span::raw("  [r] Retry"),
            ]),
            (None, LoadStatus::Idle) => Line::from("No stories yet. Press r to load some."),
        };
        let placeholder = Paragraph::new(message)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(placeholder, centered_row(inner));
    }

    fn render_story(&mut self, frame: &mut Frame, area: Rect) {
        let visible_lines = u16::try_from(self.player.config().subtitles.visible_lines).unwrap_or(2);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(visible_lines.saturating_add(2))])
            .split(area);

        let current = self.player.library().current_record();
        if let Some(protocol) = current.and_then(|record| self.images.get_mut(&record.id)) {
            frame.render_stateful_widget(StatefulImage::default(), chunks[0], protocol);
        }

        let playback = self.player.playback();
        if playback.subtitle_visible()
            && let Some(subtitle) = playback.subtitle()
        {
            let lines: Vec<Line> = subtitle
                .visible_lines()
                .map(|(index, _, words)| {
                    let mut spans = Vec::with_capacity(words.len() * 2);
                    for unit in words {
                        if unit.space_before {
                            spans.push(Span::raw(" "));
                        }
                        let style = if unit.current {
                            Style::default()
                                .fg(Color::Black)
                                .bg(Color::Yellow)
                                .add_modifier(Modifier::BOLD)
                        } else if unit.spoken {
                            Style::default().fg(Color::White)
                        } else {
                            Style::default().fg(Color::DarkGray)
                        };
                        spans.push(Span::styled(unit.word.text.clone(), style));
                    }
                    let line = Line::from(spans).alignment(Alignment::Center);
                    if subtitle.active_line() == Some(index) {
                        line.style(Style::default().add_modifier(Modifier::BOLD))
                    } else {
                        line
                    }
                })
                .collect();

            let subtitles = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
            frame.render_widget(subtitles, chunks[1]);
        }

        if playback.story_loader_visible() {
            let popup = centered_rect(chunks[0], 24, 3);
            frame.render_widget(Clear, popup);
            let loader = Paragraph::new(format!("{} Loading story...", self.spinner()))
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL))
                .style(Style::default().fg(Color::Yellow));
            frame.render_widget(loader, popup);
        }
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let playback = self.player.playback();
        let mut spans = Vec::new();

        if playback.surface_visible() {
            let library = self.player.library();
            spans.push(Span::styled(
                format!(" Story {}/{} ", library.current() + 1, library.len()),
                Style::default().fg(Color::Gray),
            ));
            if self.player.is_loading() {
                spans.push(Span::styled(
                    format!("| {} more stories ", self.spinner()),
                    Style::default().fg(Color::Yellow),
                ));
            }
            if playback.unlock().pending_retry().is_some() {
                spans.push(Span::styled(
                    "| press any key for sound ",
                    Style::default().fg(Color::Magenta),
                ));
            }
            spans.push(Span::styled(
                "| [\u{2191}/\u{2193}] Prev/Next | [Esc] Gallery | [?] Help | [q] Quit",
                Style::default().fg(Color::Gray),
            ));
        } else {
            let feed = self.player.feed();
            let status = match feed.status() {
                LoadStatus::Idle => Span::styled(format!(" {} stories ", feed.len()), Style::default().fg(Color::Gray)),
                LoadStatus::Loading => Span::styled(
                    format!(" {} Loading stories ", self.spinner()),
                    Style::default().fg(Color::Yellow),
                ),
                LoadStatus::Failed(msg) => Span::styled(format!(" {msg} "), Style::default().fg(Color::Red)),
            };
            spans.push(status);
            spans.push(Span::styled(
                "| [Enter] Play | [r] New stories | [?] Help | [q] Quit",
                Style::default().fg(Color::Gray),
            ));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_notification(&self, frame: &mut Frame, area: Rect, message: &str) {
        let notification_area = Rect {
            x: area.x + area.width / 4,
            y: area.y + area.height / 2,
            width: area.width / 2,
            height: 3,
        };

        let notification = Paragraph::new(message)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Notification")
                    .style(Style::default().fg(Color::Yellow)),
            )
            .style(Style::default().fg(Color::White));

        frame.render_widget(Clear, notification_area);
        frame.render_widget(notification, notification_area);
    }

    fn render_help_overlay(&self, frame: &mut Frame) {
        let popup_area = centered_rect(frame.area(), 60, 22);
        frame.render_widget(Clear, popup_area);

        let heading = |text: &'static str, color: Color| {
            Line::from(Span::styled(
                text,
                Style::default().add_modifier(Modifier::BOLD).fg(color),
            ))
        };

        let lines = vec![
            heading("Gallery", Color::Cyan),
            Line::from("  Up/Down, j/k      Select story"),
            Line::from("  Enter, Space      Play selected story"),
            Line::from("  Click             Select, click again to play"),
            Line::from("  r                 Load new stories at the top"),
            Line::from("  Scroll wheel      Select story"),
            Line::from(""),
            heading("Playing", Color::Yellow),
            Line::from("  Down/Right, j/l   Next story"),
            Line::from("  Up/Left, k/h      Previous story"),
            Line::from("  Scroll / drag     Next or previous story"),
            Line::from("  Esc               Back to the gallery"),
            Line::from(""),
            heading("Other", Color::Gray),
            Line::from("  ?                 Toggle this help"),
            Line::from("  q, Ctrl-c         Quit"),
            Line::from(""),
            Line::from(Span::styled(
                "  Any key or click also enables sound.",
                Style::default().fg(Color::DarkGray),
            )),
        ];

        let help = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Controls ")
                    .title_alignment(Alignment::Center)
                    .style(Style::default().fg(Color::Cyan)),
            )
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: false });

        frame.render_widget(help, popup_area);
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(2));
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

fn centered_row(area: Rect) -> Rect {
    Rect {
        x: area.x,
        y: area.y + area.height / 2,
        width: area.width,
        height: area.height.min(1),
    }
}
