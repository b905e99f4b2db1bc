//! Drawing helpers for the terminal screen: the robot face, the locked
//! screen, the game-selection cards, and a canvas over the virtual 800x480
//! space games draw in.
use ratatui::layout::{Alignment, Constraint, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Circle, Context, Line as Stroke, Rectangle};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::core::presentation::FaceState;
use crate::core::registry::GameDescriptor;

/// Resolution every game sees, whatever the terminal size.
pub const VIRTUAL_SIZE: (u16, u16) = (800, 480);

const FACE_BLUE: Color = Color::Rgb(0, 120, 215);
const CARD_COLORS: [Color; 4] = [Color::Green, Color::Blue, Color::Magenta, Color::Yellow];
const CARDS_PER_ROW: usize = 3;

/// Virtual point under a terminal cell, `None` outside `area`.
pub fn to_virtual(column: u16, row: u16, area: Rect) -> Option<(i32, i32)> {
    if area.is_empty() || !area.contains(Position::new(column, row)) {
        return None;
    }
    let (w, h) = VIRTUAL_SIZE;
    let x = (f64::from(column - area.x) + 0.5) * f64::from(w) / f64::from(area.width);
    let y = (f64::from(row - area.y) + 0.5) * f64::from(h) / f64::from(area.height);
    Some((x as i32, y as i32))
}

/// Canvas spanning the virtual screen. Use the painters below: they take
/// top-left-origin coordinates like pointer events do.
pub fn virtual_canvas<F>(painter: F) -> Canvas<'static, F>
where
    F: Fn(&mut Context),
{
    let (w, h) = VIRTUAL_SIZE;
    Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([0.0, f64::from(w)])
        .y_bounds([0.0, f64::from(h)])
        .paint(painter)
}

fn flip(y: f64) -> f64 {
    f64::from(VIRTUAL_SIZE.1) - y
}

pub fn circle(ctx: &mut Context, x: f64, y: f64, radius: f64, color: Color) {
    ctx.draw(&Circle {
        x,
        y: flip(y),
        radius,
        color,
    });
}

/// Concentric rings; Braille has no fill.
pub fn disc(ctx: &mut Context, x: f64, y: f64, radius: f64, color: Color) {
    let mut r = radius;
    while r > 0.0 {
        circle(ctx, x, y, r, color);
        r -= 3.0;
    }
}

pub fn rect(ctx: &mut Context, x: f64, y: f64, width: f64, height: f64, color: Color) {
    ctx.draw(&Rectangle {
        x,
        y: flip(y + height),
        width,
        height,
        color,
    });
}

pub fn filled_rect(ctx: &mut Context, x: f64, y: f64, width: f64, height: f64, color: Color) {
    let mut row = y;
    while row <= y + height {
        line(ctx, (x, row), (x + width, row), color);
        row += 3.0;
    }
}

pub fn line(ctx: &mut Context, (x1, y1): (f64, f64), (x2, y2): (f64, f64), color: Color) {
    ctx.draw(&Stroke {
        x1,
        y1: flip(y1),
        x2,
        y2: flip(y2),
        color,
    });
}

pub fn label<'a>(ctx: &mut Context<'a>, x: f64, y: f64, text: impl Into<Line<'a>>) {
    ctx.print(x, flip(y), text);
}

fn eye_color(state: FaceState) -> Color {
    match state {
        FaceState::Listening => Color::Green,
        FaceState::Thinking => Color::Rgb(200, 200, 0),
        _ => FACE_BLUE,
    }
}

/// The robot face. `mouth` is the current opening while speech plays.
pub fn face(frame: &mut Frame, area: Rect, state: FaceState, mouth: Option<u8>) {
    let eyes = eye_color(state);
    let caption = state.caption();
    let canvas = virtual_canvas(move |ctx| {
        for x in [250.0, 550.0] {
            disc(ctx, x, 200.0, 60.0, eyes);
            disc(ctx, x, 200.0, 20.0, Color::Black);
        }
        ctx.layer();

        match mouth {
            Some(open) => {
                let height = 10.0 + f64::from(open.min(50));
                rect(ctx, 300.0, 350.0 - height / 2.0, 200.0, height, Color::White);
            }
            None => {
                // lower half of an ellipse inside (300, 320, 200, 100)
                let steps = 48;
                let point = |i: i32| {
                    let t = std::f64::consts::PI * (1.0 + f64::from(i) / f64::from(steps));
                    (400.0 + 100.0 * t.cos(), 370.0 - 50.0 * t.sin())
                };
                for i in 0..steps {
                    line(ctx, point(i), point(i + 1), Color::White);
                }
            }
        }

        if let Some(text) = caption {
            label(ctx, 400.0 - 4.0 * text.len() as f64, 450.0, Span::styled(text, Style::new().fg(Color::White)));
        }
    });
    frame.render_widget(canvas, area);
}

pub fn locked(frame: &mut Frame, area: Rect) {
    let [_, middle, _] = Layout::vertical([Constraint::Fill(1), Constraint::Length(1), Constraint::Fill(1)]).areas(area);
    frame.render_widget(
        Paragraph::new("BLOQUEADO - Contatar Suporte")
            .style(Style::new().fg(Color::Red).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        middle,
    );
}

/// Draws one card per game and returns where each landed, for hit testing.
pub fn menu(frame: &mut Frame, area: Rect, games: &[GameDescriptor]) -> Vec<Rect> {
    let [title, body] = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);
    frame.render_widget(
        Paragraph::new(" ESCOLHA UM JOGO ")
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center),
        title,
    );

    if games.is_empty() {
        frame.render_widget(Paragraph::new("Nenhum jogo disponível").alignment(Alignment::Center), body);
        return Vec::new();
    }

    let rows = games.len().div_ceil(CARDS_PER_ROW);
    let row_areas = Layout::vertical(vec![Constraint::Ratio(1, rows as u32); rows]).split(body);
    let mut cards = Vec::with_capacity(games.len());
    for (row, chunk) in games.chunks(CARDS_PER_ROW).enumerate() {
        let cells = Layout::horizontal(vec![Constraint::Ratio(1, CARDS_PER_ROW as u32); CARDS_PER_ROW])
            .margin(1)
            .split(row_areas[row]);
        for (col, game) in chunk.iter().enumerate() {
            let index = row * CARDS_PER_ROW + col;
            let color = CARD_COLORS[index % CARD_COLORS.len()];
            let card = cells[col];
            frame.render_widget(
                Paragraph::new(game.description.as_str())
                    .wrap(Wrap { trim: true })
                    .alignment(Alignment::Center)
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .border_style(Style::new().fg(color))
                            .title(format!(" [{}] {} ", index + 1, game.name))
                            .title_style(Style::new().fg(color).add_modifier(Modifier::BOLD)),
                    ),
                card,
            );
            cards.push(card);
        }
    }
    cards
}

/// Bottom line: what is being typed, plus key hints.
pub fn status(frame: &mut Frame, area: Rect, typed: &str, playing: bool) {
    let hints = if playing {
        "[Enter] falar  [Tab] encerrar jogo  [Esc] sair"
    } else {
        "[Enter] falar  [Tab] jogos  [Esc] sair"
    };
    let [input, keys] = Layout::horizontal([Constraint::Min(0), Constraint::Length(hints.chars().count() as u16)])
        .areas(area);
    frame.render_widget(
        Paragraph::new(Line::from(vec![Span::styled("> ", Style::new().fg(Color::Cyan)), Span::raw(typed.to_string())])),
        input,
    );
    frame.render_widget(Paragraph::new(hints).style(Style::new().fg(Color::DarkGray)), keys);
}
