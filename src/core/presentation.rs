/// Presentation collaborator: what the core needs from a screen.
use crate::core::game::Game;
use crate::core::registry::GameDescriptor;
use crate::core::router::RawPointer;

/// What the face (or the screen around it) is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaceState {
    #[default]
    Idle,
    Talking,
    Listening,
    Thinking,
    GameSelection,
    Locked,
}

impl FaceState {
    /// Caption shown under the face, if any.
    pub fn caption(self) -> Option<&'static str> {
        match self {
            FaceState::Listening => Some("Ouvindo..."),
            FaceState::Thinking => Some("Pensando..."),
            _ => None,
        }
    }
}

/// Everything a screen backend can report in one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Window closed, Esc or Ctrl-C.
    Quit,
    Pointer(RawPointer),
    /// A transcript typed or recognized by the UI layer.
    Voice(String),
    /// A tap on a card of the selection screen.
    SelectGame(String),
    /// Open/close the selection screen when idle; end the game when playing.
    ToggleMenu,
}

pub trait Presentation: Send + Sync {
    fn set_state(&self, state: FaceState);

    fn state(&self) -> FaceState;

    /// Current drawable size, in the same units pointer events use.
    fn screen_size(&self) -> (u16, u16);

    /// Redraw. `Some(game)` gives the active game a chance to draw its scene.
    fn draw(&self, game: Option<&dyn Game>) -> anyhow::Result<()>;

    /// Non-blocking: returns whatever arrived since the last call.
    fn poll_events(&self) -> anyhow::Result<Vec<UiEvent>>;

    /// Games offered on the selection screen.
    fn set_catalog(&self, games: Vec<GameDescriptor>);
}
