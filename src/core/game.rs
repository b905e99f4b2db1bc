/// Core game interface for the robot's pluggable mini-games
use std::sync::Arc;

use anyhow::Result;

use crate::core::presentation::Presentation;
use crate::services::brain::Brain;
use crate::services::hardware::Voice;
use crate::services::telemetry::Telemetry;

/// Free-form `[settings]` table from a game manifest.
pub type GameSettings = toml::Table;

/// Shared collaborators handed to every game factory.
///
/// Everything is reference counted: the collaborators outlive any single game.
#[derive(Clone)]
pub struct GameContext {
    pub voice: Arc<dyn Voice>,
    pub screen: Arc<dyn Presentation>,
    pub brain: Arc<dyn Brain>,
    pub telemetry: Telemetry,
    pub settings: GameSettings,
}

impl GameContext {
    pub fn new(
        voice: Arc<dyn Voice>,
        screen: Arc<dyn Presentation>,
        brain: Arc<dyn Brain>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            voice,
            screen,
            brain,
            telemetry,
            settings: GameSettings::new(),
        }
    }

    /// Same collaborators, different per-game settings.
    pub fn with_settings(&self, settings: GameSettings) -> Self {
        Self {
            settings,
            ..self.clone()
        }
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.settings
            .get(key)
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
    }
}

/// Main game trait that all games must implement.
///
/// Only the session controller calls these. A game flips its running flag to
/// true inside `start` and nowhere else; it may end itself by calling its own
/// `stop`, which the controller notices on the next reconcile.
pub trait Game: Send {
    /// Human readable name, used in logs and speech.
    fn name(&self) -> &str;

    fn is_running(&self) -> bool;

    /// One-time setup: instructions, first round, initial state.
    fn start(&mut self) -> Result<()>;

    /// Must be a no-op when the game is not running.
    fn stop(&mut self) -> Result<()>;

    /// Coordinates are absolute screen units; anything off-screen is ignored.
    fn on_pointer_down(&mut self, _x: i32, _y: i32) -> Result<()> {
        Ok(())
    }

    fn on_pointer_up(&mut self, _x: i32, _y: i32) -> Result<()> {
        Ok(())
    }

    fn on_pointer_move(&mut self, _x: i32, _y: i32) -> Result<()> {
        Ok(())
    }

    /// Returns whether the transcript was consumed.
    fn on_voice(&mut self, _transcript: &str) -> Result<bool> {
        Ok(false)
    }

    /// Called once per main loop iteration while running. May block for a
    /// bounded window (listening), never indefinitely.
    fn tick(&mut self) -> Result<()>;

    /// Draw the game's own scene into `area`. Return `false` to keep the
    /// face on screen.
    fn render(&self, _frame: &mut ratatui::Frame, _area: ratatui::layout::Rect) -> bool {
        false
    }
}

/// Case-insensitive "did the child say any of these words".
pub fn heard_any(transcript: &str, words: &[&str]) -> bool {
    let transcript = transcript.to_lowercase();
    words.iter().any(|w| transcript.contains(w))
}

/// A contract-level input, already in absolute screen coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown { x: i32, y: i32 },
    PointerUp { x: i32, y: i32 },
    PointerMove { x: i32, y: i32 },
    Voice(String),
    Tick,
}
