use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::core::game::{heard_any, Game, GameContext};
use crate::core::presentation::FaceState;

const EXIT_WORDS: &[&str] = &["sair", "parar"];

/// Repeats whatever it hears until told to stop.
pub struct ParrotGame {
    ctx: GameContext,
    running: bool,
    listen_window: Duration,
}

impl ParrotGame {
    pub fn new(ctx: GameContext) -> Result<Self> {
        let listen_window = Duration::from_secs(ctx.setting_u64("listen_secs").unwrap_or(5));
        Ok(Self {
            ctx,
            running: false,
            listen_window,
        })
    }

    fn echo(&mut self, heard: &str) {
        if heard_any(heard, EXIT_WORDS) {
            debug!(%heard, "parrot exit word");
            self.finish();
            return;
        }
        self.ctx.screen.set_state(FaceState::Talking);
        self.ctx.voice.speak(heard);
    }

    fn finish(&mut self) {
        self.running = false;
        self.ctx.voice.speak("Saindo do modo papagaio.");
        self.ctx.screen.set_state(FaceState::Idle);
    }
}

impl Game for ParrotGame {
    fn name(&self) -> &str {
        "Modo Papagaio"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.ctx.screen.set_state(FaceState::Listening);
        self.ctx.voice.speak("Modo papagaio ativado! Fale sair para parar.");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.finish();
        }
        Ok(())
    }

    fn on_voice(&mut self, transcript: &str) -> Result<bool> {
        self.echo(transcript);
        Ok(true)
    }

    fn tick(&mut self) -> Result<()> {
        if self.ctx.voice.is_speaking() {
            return Ok(());
        }
        self.ctx.screen.set_state(FaceState::Listening);
        if let Some(heard) = self.ctx.voice.listen(self.listen_window) {
            self.echo(&heard);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::presentation::Presentation;
    use crate::core::testing::test_context;

    #[test]
    fn repeats_what_it_hears() {
        let (ctx, voice, screen) = test_context();
        let mut game = ParrotGame::new(ctx).unwrap();
        game.start().unwrap();

        voice.hear("eu gosto de bolo");
        game.tick().unwrap();
        assert_eq!(voice.spoken().last().map(String::as_str), Some("eu gosto de bolo"));
        assert_eq!(screen.state(), FaceState::Talking);
    }

    #[test]
    fn exit_word_ends_the_game() {
        let (ctx, voice, _) = test_context();
        let mut game = ParrotGame::new(ctx).unwrap();
        game.start().unwrap();

        voice.hear("PARAR agora");
        game.tick().unwrap();
        assert!(!game.is_running());
        assert_eq!(voice.spoken().last().map(String::as_str), Some("Saindo do modo papagaio."));
    }

    #[test]
    fn listen_window_comes_from_settings() {
        let (ctx, voice, _) = test_context();
        let settings = "listen_secs = 2".parse::<toml::Table>().unwrap();
        let mut game = ParrotGame::new(ctx.with_settings(settings)).unwrap();
        game.start().unwrap();
        game.tick().unwrap();
        assert_eq!(voice.listens.lock().unwrap().as_slice(), &[Duration::from_secs(2)]);
    }

    #[test]
    fn stop_before_start_says_nothing() {
        let (ctx, voice, _) = test_context();
        let mut game = ParrotGame::new(ctx).unwrap();
        game.stop().unwrap();
        assert!(voice.spoken().is_empty());
    }
}
