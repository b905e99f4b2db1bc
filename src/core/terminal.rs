/// Terminal implementation of the robot screen (ratatui + crossterm).
use std::io::stdout;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Position, Rect};
use ratatui::{DefaultTerminal, Terminal};
use tracing::{debug, info};

use crate::core::game::Game;
use crate::core::presentation::{FaceState, Presentation, UiEvent};
use crate::core::registry::GameDescriptor;
use crate::core::renderer::{self, VIRTUAL_SIZE};
use crate::core::router::RawPointer;
use crate::error::StartupError;
use crate::services::hardware::SpeechFeed;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn undo_setup() {
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), LeaveAlternateScreen, DisableMouseCapture, crossterm::cursor::Show);
}

/// What the screen remembers between frames.
#[derive(Default)]
struct View {
    state: FaceState,
    catalog: Vec<GameDescriptor>,
    /// Transcript being typed on the bottom line.
    typed: String,
    /// Where the last frame put the face or game scene.
    canvas: Rect,
    /// Menu cards of the last frame, in catalog order.
    cards: Vec<Rect>,
}

impl View {
    fn translate(&mut self, event: Event) -> Option<UiEvent> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.key(key),
            Event::Mouse(mouse) => self.mouse(mouse),
            _ => None,
        }
    }

    fn key(&mut self, key: KeyEvent) -> Option<UiEvent> {
        match key.code {
            KeyCode::Esc => Some(UiEvent::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(UiEvent::Quit),
            KeyCode::Tab => Some(UiEvent::ToggleMenu),
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.typed);
                let text = text.trim();
                (!text.is_empty()).then(|| UiEvent::Voice(text.to_string()))
            }
            KeyCode::Backspace => {
                self.typed.pop();
                None
            }
            KeyCode::Char(c) if self.state == FaceState::GameSelection && self.typed.is_empty() && c.is_ascii_digit() => {
                let index = c.to_digit(10)? as usize;
                let game = self.catalog.get(index.checked_sub(1)?)?;
                Some(UiEvent::SelectGame(game.id.clone()))
            }
            KeyCode::Char(c) => {
                self.typed.push(c);
                None
            }
            _ => None,
        }
    }

    fn mouse(&mut self, mouse: MouseEvent) -> Option<UiEvent> {
        if self.state == FaceState::GameSelection {
            if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
                return None;
            }
            let at = Position::new(mouse.column, mouse.row);
            let index = self.cards.iter().position(|card| card.contains(at))?;
            return self.catalog.get(index).map(|g| UiEvent::SelectGame(g.id.clone()));
        }

        let (x, y) = renderer::to_virtual(mouse.column, mouse.row, self.canvas)?;
        let raw = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => RawPointer::MouseDown { x, y },
            MouseEventKind::Up(MouseButton::Left) => RawPointer::MouseUp { x, y },
            MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => RawPointer::MouseMove { x, y },
            _ => return None,
        };
        Some(UiEvent::Pointer(raw))
    }
}

/// Full-screen terminal face with mouse capture. Mouse positions are
/// reported in the virtual 800x480 space games are written against.
pub struct TerminalScreen {
    terminal: Mutex<DefaultTerminal>,
    view: Mutex<View>,
    speech: SpeechFeed,
}

impl TerminalScreen {
    /// Raw mode and alternate screen are set up by hand: panics caught
    /// around game code must not tear the screen down.
    pub fn new(speech: SpeechFeed) -> Result<Self, StartupError> {
        enable_raw_mode()?;
        let terminal = execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)
            .and_then(|()| Terminal::new(CrosstermBackend::new(stdout())))
            .inspect_err(|_| undo_setup())?;
        info!("terminal screen ready");
        Ok(Self {
            terminal: Mutex::new(terminal),
            view: Mutex::new(View::default()),
            speech,
        })
    }

    /// Give the terminal back to the shell. Safe to call more than once.
    pub fn restore(&self) {
        undo_setup();
    }

    /// Mouth opening while speech plays, `None` when silent.
    fn mouth(&self) -> Option<u8> {
        let speaking = *self.speech.speaking.borrow();
        speaking.then(|| *self.speech.mouth.borrow() / 2)
    }
}

impl Drop for TerminalScreen {
    fn drop(&mut self) {
        self.restore();
    }
}

impl Presentation for TerminalScreen {
    fn set_state(&self, state: FaceState) {
        let mut view = lock(&self.view);
        if view.state != state {
            debug!(from = ?view.state, to = ?state, "face state");
            view.state = state;
        }
    }

    fn state(&self) -> FaceState {
        lock(&self.view).state
    }

    fn screen_size(&self) -> (u16, u16) {
        VIRTUAL_SIZE
    }

    fn draw(&self, game: Option<&dyn Game>) -> anyhow::Result<()> {
        let mouth = self.mouth();
        let mut view = lock(&self.view);
        let view = &mut *view;
        let mut terminal = lock(&self.terminal);

        terminal
            .draw(|frame| {
                let [main, status] = Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(frame.area());
                view.canvas = main;
                view.cards.clear();

                let scene = game.is_some_and(|g| g.render(frame, main));
                if !scene {
                    match view.state {
                        FaceState::Locked => renderer::locked(frame, main),
                        FaceState::GameSelection if game.is_none() => {
                            view.cards = renderer::menu(frame, main, &view.catalog);
                        }
                        state => renderer::face(frame, main, state, mouth),
                    }
                }
                renderer::status(frame, status, &view.typed, game.is_some());
            })
            .context("terminal draw failed")?;
        Ok(())
    }

    fn poll_events(&self) -> anyhow::Result<Vec<UiEvent>> {
        let mut view = lock(&self.view);
        let mut events = Vec::new();
        while event::poll(Duration::ZERO).context("polling terminal events")? {
            let raw = event::read().context("reading terminal event")?;
            if let Some(ui) = view.translate(raw) {
                events.push(ui);
            }
        }
        Ok(events)
    }

    fn set_catalog(&self, games: Vec<GameDescriptor>) {
        lock(&self.view).catalog = games;
    }
}
