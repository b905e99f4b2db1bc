use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::core::game::{Game, GameContext};
use crate::core::presentation::FaceState;
use crate::services::telemetry::TelemetryEvent;

/// Passive listener. Never speaks; every transcript goes to the cloud diary.
pub struct DiaryGame {
    ctx: GameContext,
    running: bool,
    listen_window: Duration,
    /// Therapy session the transcripts belong to, if one was given.
    session_id: Option<String>,
}

impl DiaryGame {
    pub fn new(ctx: GameContext) -> Result<Self> {
        let listen_window = Duration::from_secs(ctx.setting_u64("listen_secs").unwrap_or(8));
        let session_id = ctx.setting_str("session_id").map(str::to_string);
        Ok(Self {
            ctx,
            running: false,
            listen_window,
            session_id,
        })
    }

    fn note(&self, text: &str) {
        debug!(%text, "diary entry");
        self.ctx.screen.set_state(FaceState::Thinking);
        self.ctx
            .telemetry
            .record(TelemetryEvent::transcript(text, self.session_id.clone()));
        self.ctx.screen.set_state(FaceState::Listening);
    }
}

impl Game for DiaryGame {
    fn name(&self) -> &str {
        "Diário de Sessão"
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.ctx.screen.set_state(FaceState::Listening);
        match &self.session_id {
            Some(id) => info!(session = %id, "diary started"),
            None => warn!("diary started without a session id, entries are unlinked"),
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            self.ctx.screen.set_state(FaceState::Idle);
            info!("diary stopped");
        }
        Ok(())
    }

    fn on_voice(&mut self, transcript: &str) -> Result<bool> {
        self.note(transcript);
        Ok(true)
    }

    fn tick(&mut self) -> Result<()> {
        if let Some(heard) = self.ctx.voice.listen(self.listen_window) {
            self.note(&heard);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::presentation::Presentation;
    use crate::core::testing::recording_context;

    #[test]
    fn transcripts_are_recorded_with_the_session() {
        let (ctx, voice, screen, mut rx) = recording_context();
        let settings = "session_id = \"abc-123\"".parse::<toml::Table>().unwrap();
        let mut game = DiaryGame::new(ctx.with_settings(settings)).unwrap();
        game.start().unwrap();

        voice.hear("hoje eu brinquei no parque");
        game.tick().unwrap();

        match rx.try_recv().unwrap() {
            TelemetryEvent::Transcript { text, session_id, .. } => {
                assert_eq!(text, "hoje eu brinquei no parque");
                assert_eq!(session_id.as_deref(), Some("abc-123"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(voice.listens.lock().unwrap().as_slice(), &[Duration::from_secs(8)]);
        assert_eq!(screen.state(), FaceState::Listening);
        assert!(voice.spoken().is_empty());
    }

    #[test]
    fn silence_records_nothing() {
        let (ctx, _, _, mut rx) = recording_context();
        let mut game = DiaryGame::new(ctx).unwrap();
        game.start().unwrap();
        game.tick().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn typed_voice_is_consumed() {
        let (ctx, _, _, mut rx) = recording_context();
        let mut game = DiaryGame::new(ctx).unwrap();
        game.start().unwrap();
        assert!(game.on_voice("oi").unwrap());
        assert!(matches!(
            rx.try_recv().unwrap(),
            TelemetryEvent::Transcript { session_id: None, .. }
        ));
    }
}
