use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ratatui::layout::Rect;
use ratatui::Frame;
use tracing::debug;

use crate::core::game::{heard_any, Game, GameContext};
use crate::core::presentation::FaceState;
use crate::games::Debounce;

/// Screen half, and the color painted on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Red,
    Blue,
}

impl Side {
    /// How the robot says it.
    pub fn word(self) -> &'static str {
        match self {
            Side::Red => "vermelho",
            Side::Blue => "azul",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Red => "VERMELHO",
            Side::Blue => "AZUL",
        }
    }
}

pub struct ColorsGame {
    ctx: GameContext,
    running: bool,
    width: i32,
    height: i32,
    rng: StdRng,
    target: Option<Side>,
    /// Set after a hit; the next round is asked once it passes.
    next_round_at: Option<Instant>,
    round_delay: Duration,
    debounce: Debounce,
}

impl ColorsGame {
    pub fn new(ctx: GameContext) -> Result<Self> {
        let (width, height) = ctx.screen.screen_size();
        let rng = match ctx.setting_u64("seed") {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let debounce = Debounce::new(Duration::from_millis(ctx.setting_u64("debounce_ms").unwrap_or(200)));
        let round_delay = Duration::from_millis(ctx.setting_u64("round_delay_ms").unwrap_or(1000));
        Ok(Self {
            ctx,
            running: false,
            width: i32::from(width),
            height: i32::from(height),
            rng,
            target: None,
            next_round_at: None,
            round_delay,
            debounce,
        })
    }

    /// Pick a color and ask for it, after `preface` in the same utterance.
    fn new_round(&mut self, preface: &str) {
        let target = if self.rng.random_bool(0.5) { Side::Red } else { Side::Blue };
        self.target = Some(target);
        self.next_round_at = None;
        debug!(?target, "new colors round");

        let ask = match target {
            Side::Red => "Toque no Vermelho!",
            Side::Blue => "Toque no Azul!",
        };
        let line = if preface.is_empty() { ask.to_string() } else { format!("{preface} {ask}") };
        self.ctx.voice.speak(&line);
        self.debounce.arm();
    }

    fn side_at(&self, x: i32) -> Side {
        if x < self.width / 2 {
            Side::Red
        } else {
            Side::Blue
        }
    }

    fn finish(&mut self) {
        self.running = false;
        self.target = None;
        self.next_round_at = None;
        self.ctx.voice.speak("Fim de jogo!");
        self.ctx.screen.set_state(FaceState::Idle);
    }
}

impl Game for ColorsGame {
    fn name(&self) -> &str {
        "Jogo das Cores"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.ctx.screen.set_state(FaceState::Idle);
        self.new_round("Vou pedir uma cor e você toca nela!");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.finish();
        }
        Ok(())
    }

    fn on_pointer_down(&mut self, x: i32, y: i32) -> Result<()> {
        if !(0..self.width).contains(&x) || !(0..self.height).contains(&y) {
            return Ok(());
        }
        let Some(target) = self.target else {
            return Ok(());
        };
        if !self.debounce.accept() {
            return Ok(());
        }

        let touched = self.side_at(x);
        debug!(x, y, ?touched, ?target, "colors touch");
        if touched == target {
            self.ctx.voice.speak("Acertou! Muito bem!");
            self.target = None;
            self.next_round_at = Some(Instant::now() + self.round_delay);
        } else {
            self.ctx.voice.speak(&format!(
                "Ops, esse é o {}. Tente tocar no {}!",
                touched.word(),
                target.word()
            ));
        }
        Ok(())
    }

    fn on_voice(&mut self, transcript: &str) -> Result<bool> {
        if heard_any(transcript, &["sair"]) {
            self.finish();
            return Ok(true);
        }
        Ok(false)
    }

    fn tick(&mut self) -> Result<()> {
        if self.next_round_at.is_some_and(|at| Instant::now() >= at) {
            self.new_round("");
        }
        Ok(())
    }

    fn render(&self, frame: &mut Frame, area: Rect) -> bool {
        super::renderer::scene(frame, area);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{test_context, FakeVoice};
    use std::sync::Arc;

    fn game(extra: &str) -> (ColorsGame, Arc<FakeVoice>) {
        let (ctx, voice, _) = test_context();
        let settings = format!("seed = 7\ndebounce_ms = 0\nround_delay_ms = 0\n{extra}")
            .parse::<toml::Table>()
            .unwrap();
        (ColorsGame::new(ctx.with_settings(settings)).unwrap(), voice)
    }

    fn touch_point(side: Side) -> (i32, i32) {
        match side {
            Side::Red => (100, 240),
            Side::Blue => (700, 240),
        }
    }

    #[test]
    fn start_explains_and_asks_in_one_utterance() {
        let (mut game, voice) = game("");
        game.start().unwrap();
        let spoken = voice.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].starts_with("Vou pedir uma cor e você toca nela! Toque no "));
    }

    #[test]
    fn right_half_wins_then_next_round_on_tick() {
        let (mut game, voice) = game("");
        game.start().unwrap();
        let target = game.target.unwrap();

        let (x, y) = touch_point(target);
        game.on_pointer_down(x, y).unwrap();
        assert_eq!(voice.spoken()[1], "Acertou! Muito bem!");
        assert!(game.target.is_none());

        // touches between rounds are ignored
        game.on_pointer_down(x, y).unwrap();
        assert_eq!(voice.spoken().len(), 2);

        game.tick().unwrap();
        assert!(game.target.is_some());
        assert!(voice.spoken()[2].starts_with("Toque no "));
    }

    #[test]
    fn wrong_half_names_both_colors() {
        let (mut game, voice) = game("");
        game.start().unwrap();
        let target = game.target.unwrap();
        let wrong = if target == Side::Red { Side::Blue } else { Side::Red };

        let (x, y) = touch_point(wrong);
        game.on_pointer_down(x, y).unwrap();
        assert_eq!(
            voice.spoken()[1],
            format!("Ops, esse é o {}. Tente tocar no {}!", wrong.word(), target.word())
        );
        assert_eq!(game.target, Some(target));
    }

    #[test]
    fn quick_second_touch_is_debounced() {
        let (mut game, voice) = game("");
        game.debounce = Debounce::new(Duration::from_secs(60));
        game.start().unwrap();
        game.on_pointer_down(100, 100).unwrap();
        assert_eq!(voice.spoken().len(), 1);
    }

    #[test]
    fn off_screen_touch_is_ignored() {
        let (mut game, voice) = game("");
        game.start().unwrap();
        game.on_pointer_down(-5, 100).unwrap();
        game.on_pointer_down(100, 480).unwrap();
        assert_eq!(voice.spoken().len(), 1);
    }

    #[test]
    fn sair_ends_the_game() {
        let (mut game, voice) = game("");
        game.start().unwrap();
        assert!(game.on_voice("quero sair").unwrap());
        assert!(!game.is_running());
        game.stop().unwrap();
        assert_eq!(voice.spoken().iter().filter(|s| *s == "Fim de jogo!").count(), 1);
    }
}
