use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::game::Side;

fn half(frame: &mut Frame, area: Rect, side: Side) {
    let color = match side {
        Side::Red => Color::Rgb(255, 50, 50),
        Side::Blue => Color::Rgb(0, 0, 255),
    };
    let padding = "\n".repeat(usize::from(area.height / 2));
    frame.render_widget(
        Paragraph::new(format!("{padding}{}", side.label()))
            .alignment(Alignment::Center)
            .style(Style::new().bg(color).fg(Color::White).add_modifier(Modifier::BOLD)),
        area,
    );
}

/// Red on the left half, blue on the right half.
pub fn scene(frame: &mut Frame, area: Rect) {
    let [left, right] = Layout::horizontal([Constraint::Percentage(50); 2]).areas(area);
    half(frame, left, Side::Red);
    half(frame, right, Side::Blue);
}
