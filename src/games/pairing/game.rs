use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use ratatui::layout::Rect;
use ratatui::style::Color;
use ratatui::Frame;
use tracing::debug;

use crate::core::game::{heard_any, Game, GameContext};
use crate::core::presentation::FaceState;
use crate::core::renderer::VIRTUAL_SIZE;
use crate::games::Debounce;

const TARGET_Y: i32 = 350;
const TARGET_START_X: i32 = 100;
const TARGET_SPACING: i32 = 150;
pub(super) const TARGET_SIZE: i32 = 80;
pub(super) const RADIUS: i32 = 40;
/// Extra reach around a circle so small fingers still grab it.
const GRAB_SLACK: i32 = 20;
const POINTS_PER_MATCH: u32 = 10;
const LAST_LEVEL: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hue {
    Red,
    Blue,
    Green,
    Yellow,
}

impl Hue {
    const ALL: [Hue; 4] = [Hue::Red, Hue::Blue, Hue::Green, Hue::Yellow];

    pub fn name(self) -> &'static str {
        match self {
            Hue::Red => "vermelho",
            Hue::Blue => "azul",
            Hue::Green => "verde",
            Hue::Yellow => "amarelo",
        }
    }

    pub fn color(self) -> Color {
        match self {
            Hue::Red => Color::Rgb(255, 0, 0),
            Hue::Blue => Color::Rgb(0, 0, 255),
            Hue::Green => Color::Rgb(0, 255, 0),
            Hue::Yellow => Color::Rgb(255, 255, 0),
        }
    }
}

/// A square drop zone; `(x, y)` is its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub x: i32,
    pub y: i32,
    pub hue: Hue,
}

/// A draggable circle; `(x, y)` is its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub x: i32,
    pub y: i32,
    pub hue: Hue,
    pub matched: bool,
}

impl Shape {
    fn reaches(&self, x: i32, y: i32) -> bool {
        let (dx, dy) = (f64::from(x - self.x), f64::from(y - self.y));
        dx.hypot(dy) <= f64::from(RADIUS + GRAB_SLACK)
    }

    /// Bounding square overlaps the target square.
    fn overlaps(&self, target: &Target) -> bool {
        let (left, top) = (self.x - RADIUS, self.y - RADIUS);
        let size = 2 * RADIUS;
        left < target.x + TARGET_SIZE && left + size > target.x && top < target.y + TARGET_SIZE && top + size > target.y
    }
}

fn on_screen(x: i32, y: i32) -> bool {
    let (w, h) = VIRTUAL_SIZE;
    (0..i32::from(w)).contains(&x) && (0..i32::from(h)).contains(&y)
}

pub struct PairingGame {
    ctx: GameContext,
    running: bool,
    rng: StdRng,
    targets: Vec<Target>,
    /// Drawn in order; the one being dragged is moved last so it sits on top.
    shapes: Vec<Shape>,
    /// Index into `shapes` of the circle under the finger.
    selected: Option<usize>,
    score: u32,
    level: u32,
    debounce: Debounce,
}

impl PairingGame {
    pub fn new(ctx: GameContext) -> Result<Self> {
        let rng = match ctx.setting_u64("seed") {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let debounce = Debounce::new(Duration::from_millis(ctx.setting_u64("debounce_ms").unwrap_or(50)));
        Ok(Self {
            ctx,
            running: false,
            rng,
            targets: Vec::new(),
            shapes: Vec::new(),
            selected: None,
            score: 0,
            level: 1,
            debounce,
        })
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    fn generate_level(&mut self) {
        let count = (self.level as usize + 1).min(Hue::ALL.len());
        let mut hues = Hue::ALL[..count].to_vec();
        hues.shuffle(&mut self.rng);

        self.selected = None;
        self.targets = hues
            .iter()
            .enumerate()
            .map(|(i, &hue)| Target {
                x: TARGET_START_X + i as i32 * TARGET_SPACING,
                y: TARGET_Y,
                hue,
            })
            .collect();
        self.shapes = hues
            .iter()
            .map(|&hue| Shape {
                x: self.rng.random_range(50..=700),
                y: self.rng.random_range(50..=200),
                hue,
                matched: false,
            })
            .collect();
        debug!(level = self.level, shapes = self.shapes.len(), "pairing level ready");
    }

    /// Judge the dropped circle. Returns what to say.
    fn drop_shape(&mut self, index: usize) -> Option<String> {
        let shape = self.shapes[index];
        let target = *self.targets.iter().find(|t| shape.overlaps(t))?;
        if target.hue != shape.hue {
            debug!(dropped = shape.hue.name(), on = target.hue.name(), "wrong square");
            return Some("Ah não! Tente de novo.".to_string());
        }

        let placed = &mut self.shapes[index];
        placed.matched = true;
        placed.x = target.x + TARGET_SIZE / 2;
        placed.y = target.y + TARGET_SIZE / 2;
        self.score += POINTS_PER_MATCH;

        if !self.shapes.iter().all(|s| s.matched) {
            return Some("Muito bem!".to_string());
        }
        self.level += 1;
        if self.level > LAST_LEVEL {
            self.finish("Muito bem! Parabéns! Você completou todos os níveis!");
            return None;
        }
        self.generate_level();
        Some("Muito bem! Próximo nível!".to_string())
    }

    fn finish(&mut self, preface: &str) {
        self.running = false;
        self.selected = None;
        let farewell = format!("Fim de jogo! Você fez {} pontos.", self.score);
        let line = if preface.is_empty() { farewell } else { format!("{preface} {farewell}") };
        self.ctx.voice.speak(&line);
        self.ctx.screen.set_state(FaceState::Idle);
    }
}

impl Game for PairingGame {
    fn name(&self) -> &str {
        "Parear Cores"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.score = 0;
        self.level = 1;
        self.debounce.reset();
        self.generate_level();
        self.ctx.screen.set_state(FaceState::Idle);
        self.ctx
            .voice
            .speak("Jogo de Parear! Arraste as bolinhas para os quadrados da mesma cor.");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.finish("");
        }
        Ok(())
    }

    fn on_pointer_down(&mut self, x: i32, y: i32) -> Result<()> {
        if !self.running || !on_screen(x, y) || !self.debounce.accept() {
            return Ok(());
        }
        let Some(index) = self.shapes.iter().position(|s| !s.matched && s.reaches(x, y)) else {
            return Ok(());
        };
        let shape = self.shapes.remove(index);
        debug!(hue = shape.hue.name(), "picked up");
        self.shapes.push(shape);
        self.selected = Some(self.shapes.len() - 1);
        Ok(())
    }

    fn on_pointer_move(&mut self, x: i32, y: i32) -> Result<()> {
        if !on_screen(x, y) {
            return Ok(());
        }
        if let Some(index) = self.selected {
            self.shapes[index].x = x;
            self.shapes[index].y = y;
        }
        Ok(())
    }

    /// Releases wherever the finger lifts; the drop is judged on the circle.
    fn on_pointer_up(&mut self, _x: i32, _y: i32) -> Result<()> {
        let Some(index) = self.selected.take() else {
            return Ok(());
        };
        if let Some(line) = self.drop_shape(index) {
            self.ctx.voice.speak(&line);
        }
        Ok(())
    }

    fn on_voice(&mut self, transcript: &str) -> Result<bool> {
        if heard_any(transcript, &["sair"]) {
            self.finish("");
            return Ok(true);
        }
        Ok(false)
    }

    fn tick(&mut self) -> Result<()> {
        Ok(())
    }

    fn render(&self, frame: &mut Frame, area: Rect) -> bool {
        super::renderer::scene(frame, area, &self.targets, &self.shapes, self.score);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{test_context, FakeVoice};
    use std::sync::Arc;

    fn started(seed: u64) -> (PairingGame, Arc<FakeVoice>) {
        let (ctx, voice, _) = test_context();
        let settings = format!("seed = {seed}\ndebounce_ms = 0").parse::<toml::Table>().unwrap();
        let mut game = PairingGame::new(ctx.with_settings(settings)).unwrap();
        game.start().unwrap();
        (game, voice)
    }

    fn target_center(game: &PairingGame, hue: Hue) -> (i32, i32) {
        let t = game.targets.iter().find(|t| t.hue == hue).unwrap();
        (t.x + TARGET_SIZE / 2, t.y + TARGET_SIZE / 2)
    }

    /// Grab the first unmatched circle and drop it on the square `pick` chooses.
    fn drag(game: &mut PairingGame, pick: impl Fn(Hue) -> Hue) {
        let shape = *game.shapes.iter().find(|s| !s.matched).unwrap();
        game.on_pointer_down(shape.x, shape.y).unwrap();
        let held = game.shapes[game.selected.unwrap()].hue;
        let (x, y) = target_center(game, pick(held));
        game.on_pointer_move(x, y).unwrap();
        game.on_pointer_up(x, y).unwrap();
    }

    #[test]
    fn level_layout() {
        let (game, _) = started(1);
        assert_eq!(game.targets.len(), 2);
        assert_eq!(game.shapes.len(), 2);
        let xs: Vec<i32> = game.targets.iter().map(|t| t.x).collect();
        assert_eq!(xs, vec![100, 250]);
        assert!(game.targets.iter().all(|t| t.y == 350));
        for s in &game.shapes {
            assert!((50..=700).contains(&s.x) && (50..=200).contains(&s.y));
        }
    }

    #[test]
    fn matching_square_scores() {
        let (mut game, voice) = started(2);
        drag(&mut game, |held| held);
        assert_eq!(game.score(), 10);
        assert_eq!(voice.spoken().last().map(String::as_str), Some("Muito bem!"));
        let matched = game.shapes.iter().find(|s| s.matched).unwrap();
        assert_eq!((matched.x, matched.y), target_center(&game, matched.hue));
    }

    #[test]
    fn wrong_square_keeps_the_circle_free() {
        let (mut game, voice) = started(3);
        drag(&mut game, |held| game_other(held));
        assert_eq!(game.score(), 0);
        assert!(game.shapes.iter().all(|s| !s.matched));
        assert_eq!(voice.spoken().last().map(String::as_str), Some("Ah não! Tente de novo."));
        assert!(game.selected.is_none());
    }

    /// The other hue on a two-color first level.
    fn game_other(held: Hue) -> Hue {
        match held {
            Hue::Red => Hue::Blue,
            _ => Hue::Red,
        }
    }

    #[test]
    fn generous_hitbox() {
        let (mut game, _) = started(4);
        game.shapes = vec![Shape { x: 400, y: 100, hue: Hue::Red, matched: false }];

        game.on_pointer_down(461, 100).unwrap();
        assert!(game.selected.is_none());
        game.on_pointer_down(455, 100).unwrap();
        assert_eq!(game.selected, Some(0));
    }

    #[test]
    fn dropping_in_empty_space_says_nothing() {
        let (mut game, voice) = started(5);
        let shape = game.shapes[0];
        game.on_pointer_down(shape.x, shape.y).unwrap();
        game.on_pointer_move(400, 20).unwrap();
        game.on_pointer_up(400, 20).unwrap();
        assert_eq!(voice.spoken().len(), 1);
        assert!(game.selected.is_none());
    }

    #[test]
    fn levels_grow_then_the_game_ends_itself() {
        let (mut game, voice) = started(6);
        drag(&mut game, |h| h);
        drag(&mut game, |h| h);
        assert_eq!(game.level(), 2);
        assert_eq!(game.shapes.len(), 3);
        assert_eq!(voice.spoken().last().map(String::as_str), Some("Muito bem! Próximo nível!"));

        for _ in 0..3 {
            drag(&mut game, |h| h);
        }
        assert_eq!(game.level(), 3);
        assert_eq!(game.shapes.len(), 4);

        for _ in 0..4 {
            drag(&mut game, |h| h);
        }
        assert!(!game.is_running());
        assert_eq!(game.score(), 90);
        assert_eq!(
            voice.spoken().last().map(String::as_str),
            Some("Muito bem! Parabéns! Você completou todos os níveis! Fim de jogo! Você fez 90 pontos.")
        );

        // already over: stop must not speak again
        let said = voice.spoken().len();
        game.stop().unwrap();
        assert_eq!(voice.spoken().len(), said);
    }

    #[test]
    fn finger_release_quirk_does_not_double_count() {
        let (mut game, _) = started(7);
        let shape = game.shapes[0];
        // a touch lift arrives as down+up at the same point
        game.on_pointer_down(shape.x, shape.y).unwrap();
        game.on_pointer_up(shape.x, shape.y).unwrap();
        assert_eq!(game.score(), 0);
        assert!(game.selected.is_none());
    }
}
