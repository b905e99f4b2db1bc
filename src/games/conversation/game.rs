use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::core::game::{heard_any, Game, GameContext};
use crate::core::presentation::FaceState;

const EXIT_WORDS: &[&str] = &["sair", "tchau"];

pub struct ConversationGame {
    ctx: GameContext,
    running: bool,
    listen_window: Duration,
}

impl ConversationGame {
    pub fn new(ctx: GameContext) -> Result<Self> {
        let listen_window = Duration::from_secs(ctx.setting_u64("listen_secs").unwrap_or(5));
        Ok(Self {
            ctx,
            running: false,
            listen_window,
        })
    }

    fn answer(&mut self, heard: &str) {
        if heard_any(heard, EXIT_WORDS) {
            self.finish();
            return;
        }
        self.ctx.screen.set_state(FaceState::Thinking);
        let reply = self.ctx.brain.process(heard);
        debug!(%heard, %reply, "conversation turn");
        self.ctx.screen.set_state(FaceState::Talking);
        self.ctx.voice.speak(&reply);
    }

    fn finish(&mut self) {
        self.running = false;
        self.ctx.voice.speak("Até logo! Encerrando conversa.");
        self.ctx.screen.set_state(FaceState::Idle);
    }
}

impl Game for ConversationGame {
    fn name(&self) -> &str {
        "Modo Conversa"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.ctx.screen.set_state(FaceState::Listening);
        self.ctx.voice.speak("Modo conversa iniciado! Pode falar comigo.");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.finish();
        }
        Ok(())
    }

    fn on_voice(&mut self, transcript: &str) -> Result<bool> {
        self.answer(transcript);
        Ok(true)
    }

    fn tick(&mut self) -> Result<()> {
        // never listen to our own voice
        if self.ctx.voice.is_speaking() {
            self.ctx.screen.set_state(FaceState::Talking);
            return Ok(());
        }
        self.ctx.screen.set_state(FaceState::Listening);
        if let Some(heard) = self.ctx.voice.listen(self.listen_window) {
            self.answer(&heard);
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
    fn heard_speech_goes_to_the_brain() {
        let (ctx, voice, screen) = test_context();
        let mut game = ConversationGame::new(ctx).unwrap();
        game.start().unwrap();

        voice.hear("por que o céu é azul?");
        game.tick().unwrap();

        assert_eq!(
            voice.spoken(),
            vec!["Modo conversa iniciado! Pode falar comigo.", "resposta: por que o céu é azul?"]
        );
        assert_eq!(voice.listens.lock().unwrap().as_slice(), &[Duration::from_secs(5)]);
        assert_eq!(screen.state(), FaceState::Talking);
    }

    #[test]
    fn silence_keeps_listening() {
        let (ctx, voice, screen) = test_context();
        let mut game = ConversationGame::new(ctx).unwrap();
        game.start().unwrap();
        game.tick().unwrap();
        assert_eq!(voice.spoken().len(), 1);
        assert_eq!(screen.state(), FaceState::Listening);
        assert!(game.is_running());
    }

    #[test]
    fn does_not_listen_while_talking() {
        let (ctx, voice, _) = test_context();
        let mut game = ConversationGame::new(ctx).unwrap();
        game.start().unwrap();
        let _speaking = voice.signal.begin();
        game.tick().unwrap();
        assert!(voice.listens.lock().unwrap().is_empty());
    }

    #[test]
    fn goodbye_ends_the_conversation_once() {
        let (ctx, voice, screen) = test_context();
        let mut game = ConversationGame::new(ctx).unwrap();
        game.start().unwrap();

        assert!(game.on_voice("Tchau, Tirilo").unwrap());
        assert!(!game.is_running());
        game.stop().unwrap();

        let goodbyes = voice.spoken().iter().filter(|s| s.starts_with("Até logo")).count();
        assert_eq!(goodbyes, 1);
        assert_eq!(screen.state(), FaceState::Idle);
    }
}
