use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use image::imageops::FilterType;
use image::GenericImageView;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::controller::Controller;
use crate::decorate::{parse_hex_color, Entity};
use crate::machine::{Context as PresentationContext, Intent, State};
use crate::preload::ImageCache;

const COLOR_CARD_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_NEUTRAL: Color = Color::Rgb(245, 245, 245);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK_RATE: Duration = Duration::from_millis(120);
const MAX_SPRITE_COLS: u16 = 48;
const MAX_SPRITE_ROWS: u16 = 24;
const CARD_MIN_WIDTH: u16 = 36;

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= TICK_RATE {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Intent(Intent),
    Quit,
}

fn action_for_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }
    match key.code {
        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Char('l') => {
            Some(Action::Intent(Intent::Load))
        }
        KeyCode::Esc | KeyCode::Char('a') => Some(Action::Intent(Intent::Abort)),
        KeyCode::Char('q') => Some(Action::Quit),
        _ => None,
    }
}

/// One of the four mutually exclusive screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen<'a> {
    Idle,
    Loading,
    Ready(&'a Entity),
    Failed,
}

fn screen_for<'a>(state: State, context: &'a PresentationContext) -> Screen<'a> {
    match state {
        State::Idle => Screen::Idle,
        State::Loading { .. } => Screen::Loading,
        State::Ready => match context.entity() {
            Some(entity) => Screen::Ready(entity),
            None => unreachable!("ready state without an entity"),
        },
        State::Failed => Screen::Failed,
    }
}

/// Black or white, whichever reads better on `bg`.
fn contrast_text(bg: Color) -> Color {
    match bg {
        Color::Rgb(r, g, b) => {
            let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
            if luma > 150.0 {
                Color::Black
            } else {
                Color::White
            }
        }
        _ => Color::Reset,
    }
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn fit_dimensions(width: u32, height: u32, max_cols: u16, max_rows: u16) -> (u32, u32) {
    let max_w = u32::from(max_cols.max(1));
    let max_h = u32::from(max_rows.max(1)) * 2;
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let scale = (f64::from(max_w) / f64::from(width)).min(f64::from(max_h) / f64::from(height));
    let scale = scale.min(1.0);
    let w = ((f64::from(width) * scale).round() as u32).clamp(1, max_w);
    let h = ((f64::from(height) * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Renders image bytes as half-block cells: each cell carries two pixels.
fn sprite_lines(bytes: &[u8], max_cols: u16, max_rows: u16, bg: Color) -> Result<Vec<Line<'static>>> {
    let img = image::load_from_memory(bytes).context("ui: decode sprite")?;
    let img = crop_transparent(&img);
    let (w, h) = fit_dimensions(img.width(), img.height(), max_cols, max_rows);
    let scaled = img.resize_exact(w, h, FilterType::Nearest).to_rgba8();

    let pixel = |x: u32, y: u32| -> Color {
        if y >= scaled.height() {
            return bg;
        }
        let [r, g, b, a] = scaled.get_pixel(x, y).0;
        if a < 128 {
            bg
        } else {
            Color::Rgb(r, g, b)
        }
    };

    let mut lines = Vec::new();
    let mut y = 0;
    while y < scaled.height() {
        let spans = (0..scaled.width())
            .map(|x| {
                Span::styled(
                    "▀",
                    Style::default().fg(pixel(x, y)).bg(pixel(x, y + 1)),
                )
            })
            .collect::<Vec<_>>();
        lines.push(Line::from(spans));
        y += 2;
    }
    Ok(lines)
}

/// Front sprites carry a wide transparent margin; trim it before scaling.
fn crop_transparent(img: &image::DynamicImage) -> image::DynamicImage {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0, 0);
    for (x, y, pixel) in img.pixels() {
        if pixel.0[3] >= 128 {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if min_x > max_x || min_y > max_y {
        return img.clone();
    }
    img.crop_imm(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

struct SpriteCache {
    url: String,
    cols: u16,
    rows: u16,
    lines: Vec<Line<'static>>,
}

pub struct Model {
    controller: Controller,
    images: ImageCache,
    spinner: Spinner,
    sprite: Option<SpriteCache>,
    needs_redraw: bool,
}

impl Model {
    pub fn new(controller: Controller, images: ImageCache) -> Self {
        Self {
            controller,
            images,
            spinner: Spinner::new(),
            sprite: None,
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.controller.poll() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match action_for_key(key) {
                            Some(Action::Quit) => break,
                            Some(Action::Intent(intent)) => {
                                if intent == Intent::Load {
                                    self.spinner.reset();
                                }
                                if self.controller.dispatch(intent) {
                                    self.mark_dirty();
                                }
                            }
                            None => {}
                        }
                    }
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= TICK_RATE {
                last_tick = Instant::now();
                if self.controller.is_loading() && self.spinner.advance() {
                    self.mark_dirty();
                }
                if self.awaiting_sprite() {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    /// A timed-out preload keeps filling the cache in the background; until
    /// it lands the Ready screen has to keep redrawing to pick it up.
    fn awaiting_sprite(&self) -> bool {
        if self.controller.state() != State::Ready {
            return false;
        }
        match self.controller.context().entity() {
            Some(entity) => !entity.image.is_empty() && !self.images.contains(&entity.image),
            None => false,
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        let context = self.controller.context().clone();
        let bg = parse_hex_color(context.background()).unwrap_or(COLOR_NEUTRAL);
        frame.render_widget(Block::default().style(Style::default().bg(bg)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(full);

        let body = match screen_for(self.controller.state(), &context) {
            Screen::Idle => self.idle_text(),
            Screen::Loading => self.loading_text(),
            Screen::Ready(entity) => self.ready_text(entity, layout[0]),
            Screen::Failed => self.failed_text(&context),
        };
        self.draw_card(frame, layout[0], body);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(contrast_text(bg))
                    .bg(bg)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[1]);
    }

    fn draw_card(&self, frame: &mut Frame<'_>, area: Rect, body: Text<'static>) {
        let content_width = body
            .lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0);
        let width = (content_width as u16).saturating_add(6).max(CARD_MIN_WIDTH);
        let height = (body.lines.len() as u16).saturating_add(4);
        let card = centered_rect(width, height, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_ACCENT))
            .title(" Pokedex ")
            .style(Style::default().bg(COLOR_CARD_BG).fg(COLOR_TEXT_PRIMARY));
        let paragraph = Paragraph::new(body)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, card);
    }

    fn idle_text(&self) -> Text<'static> {
        Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Who's that creature?",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Press Enter to roll a random one.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ])
    }

    fn loading_text(&self) -> Text<'static> {
        Text::from(vec![
            Line::default(),
            Line::from(vec![
                Span::styled(self.spinner.frame(), Style::default().fg(COLOR_ACCENT)),
                Span::raw(" Searching the tall grass…"),
            ]),
            Line::default(),
            Line::from(Span::styled(
                "Esc to give up.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ])
    }

    fn ready_text(&mut self, entity: &Entity, area: Rect) -> Text<'static> {
        let mut lines = vec![
            Line::from(Span::styled(
                title_case(&entity.name),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(vec![
                Span::styled(format!("#{:03}", entity.id), Style::default().fg(COLOR_TEXT_SECONDARY)),
                Span::raw("  "),
                Span::styled(entity.category.clone(), Style::default().fg(COLOR_ACCENT)),
            ]),
            Line::default(),
        ];
        let cols = area.width.saturating_sub(8).min(MAX_SPRITE_COLS);
        let rows = area.height.saturating_sub(12).min(MAX_SPRITE_ROWS);
        if cols > 0 && rows > 0 {
            lines.extend(self.sprite_for(&entity.image, cols, rows));
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Enter for another.",
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        Text::from(lines)
    }

    fn failed_text(&self, context: &PresentationContext) -> Text<'static> {
        let mut lines = vec![
            Line::default(),
            Line::from(Span::styled(
                "The creature got away.",
                Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Press Enter to try again.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ];
        if let Some(entity) = context.entity() {
            lines.push(Line::from(Span::styled(
                format!("Last seen: {}", title_case(&entity.name)),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }
        Text::from(lines)
    }

    fn sprite_for(&mut self, url: &str, cols: u16, rows: u16) -> Vec<Line<'static>> {
        if let Some(cached) = &self.sprite {
            if cached.url == url && cached.cols == cols && cached.rows == rows {
                return cached.lines.clone();
            }
        }
        let Some(bytes) = self.images.get(url) else {
            return vec![Line::from(Span::styled(
                "[sprite unavailable]",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))];
        };
        match sprite_lines(&bytes, cols, rows, COLOR_CARD_BG) {
            Ok(lines) => {
                self.sprite = Some(SpriteCache {
                    url: url.to_string(),
                    cols,
                    rows,
                    lines: lines.clone(),
                });
                lines
            }
            Err(_) => vec![Line::from(Span::styled(
                "[sprite unreadable]",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))],
        }
    }

    fn footer_text(&self) -> String {
        match self.controller.state() {
            State::Loading { .. } => "Esc: abort · q: quit".to_string(),
            _ => "Enter: roll · q: quit".to_string(),
        }
    }
}
