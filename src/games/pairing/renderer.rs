use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::Span;
use ratatui::Frame;

use super::game::{Shape, Target, RADIUS, TARGET_SIZE};
use crate::core::renderer::{circle, disc, filled_rect, label, rect, virtual_canvas};

/// Squares at the bottom, circles on top of them, score in the corner.
pub fn scene(frame: &mut Frame, area: Rect, targets: &[Target], shapes: &[Shape], score: u32) {
    let score = format!("Pontos: {score}");
    let canvas = virtual_canvas(|ctx| {
        let size = f64::from(TARGET_SIZE);
        for t in targets {
            filled_rect(ctx, f64::from(t.x), f64::from(t.y), size, size, t.hue.color());
            rect(ctx, f64::from(t.x), f64::from(t.y), size, size, Color::White);
        }
        ctx.layer();

        for s in shapes {
            disc(ctx, f64::from(s.x), f64::from(s.y), f64::from(RADIUS), s.hue.color());
            circle(ctx, f64::from(s.x), f64::from(s.y), f64::from(RADIUS), Color::White);
        }
        label(ctx, 10.0, 20.0, Span::styled(score.clone(), Style::new().fg(Color::White)));
    });
    frame.render_widget(canvas, area);
}
