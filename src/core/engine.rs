use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::command::{Command, RemoteCommand};
use crate::core::game::{heard_any, GameContext};
use crate::core::presentation::{FaceState, Presentation, UiEvent};
use crate::core::router::{InputRouter, Routed};
use crate::core::session::SessionController;
use crate::error::{GameFault, StartError};
use crate::services::brain::Brain;
use crate::services::hardware::Voice;
use crate::services::telemetry::{SessionResult, Telemetry, TelemetryEvent};

const QUIT_WORDS: &[&str] = &["tchau", "sair"];
const STOPPING: &str = "Parando atividades.";
const CRASH_APOLOGY: &str = "Ops, tive um probleminha com esse jogo.";

/// Whether the loop should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Process-wide driver. Runs on one blocking thread and is the only owner of
/// the session, so nothing it touches needs a lock.
pub struct Engine {
    session: SessionController,
    router: InputRouter,
    screen: Arc<dyn Presentation>,
    voice: Arc<dyn Voice>,
    brain: Arc<dyn Brain>,
    telemetry: Telemetry,
    commands: mpsc::UnboundedReceiver<RemoteCommand>,
    frame: Duration,
    locked: bool,
}

impl Engine {
    pub fn new(
        session: SessionController,
        ctx: &GameContext,
        commands: mpsc::UnboundedReceiver<RemoteCommand>,
        frame: Duration,
    ) -> Self {
        Self {
            session,
            router: InputRouter::new(),
            screen: ctx.screen.clone(),
            voice: ctx.voice.clone(),
            brain: ctx.brain.clone(),
            telemetry: ctx.telemetry.clone(),
            commands,
            frame,
            locked: false,
        }
    }

    /// A locked robot only draws its locked screen and waits for quit.
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Loop at the target frame rate until quit, then stop whatever runs.
    pub fn run(mut self) {
        info!(frame = ?self.frame, locked = self.locked, "main loop started");
        loop {
            let started = Instant::now();
            if self.step() == Flow::Quit {
                break;
            }
            if let Some(rest) = self.frame.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        self.end_session();
        info!("main loop stopped");
    }

    /// One iteration: UI events, remote commands, tick, redraw.
    pub fn step(&mut self) -> Flow {
        match self.screen.poll_events() {
            Ok(events) => {
                for event in events {
                    if self.handle_ui(event) == Flow::Quit {
                        return Flow::Quit;
                    }
                    // a game that ended itself gets no further input
                    self.settle();
                }
            }
            Err(e) => warn!(error = %format!("{e:#}"), "polling ui events failed"),
        }

        if !self.locked {
            self.drain_commands();
            // only running games are ticked
            self.settle();
            if let Routed::Crashed(fault) = self.router.tick(&mut self.session) {
                self.on_crash(fault);
            }
            self.settle();
        }

        self.redraw();
        Flow::Continue
    }

    /// Drop a game that ended itself.
    fn settle(&mut self) {
        if let Some(game) = self.session.active_id().map(str::to_string) {
            if self.session.reconcile() {
                self.session_over(&game, SessionResult::Finished);
            }
        }
    }

    fn handle_ui(&mut self, event: UiEvent) -> Flow {
        if event == UiEvent::Quit {
            return Flow::Quit;
        }
        if self.locked {
            debug!(?event, "locked, ignoring input");
            return Flow::Continue;
        }

        match event {
            UiEvent::Quit => return Flow::Quit,
            UiEvent::Pointer(raw) => {
                let size = self.screen.screen_size();
                if let Routed::Crashed(fault) = self.router.pointer(&mut self.session, raw, size) {
                    self.on_crash(fault);
                }
            }
            UiEvent::Voice(text) if self.session.is_idle() => return self.idle_voice(&text),
            UiEvent::Voice(text) => {
                if let Routed::Crashed(fault) = self.router.voice(&mut self.session, &text) {
                    self.on_crash(fault);
                }
            }
            UiEvent::SelectGame(id) => self.launch(&id),
            UiEvent::ToggleMenu => {
                if self.session.is_idle() {
                    let next = match self.screen.state() {
                        FaceState::GameSelection => FaceState::Idle,
                        _ => FaceState::GameSelection,
                    };
                    self.screen.set_state(next);
                } else {
                    self.end_session();
                }
            }
        }
        Flow::Continue
    }

    /// Voice with no game running: goodbye words quit, anything else is a
    /// question for the brain.
    fn idle_voice(&mut self, text: &str) -> Flow {
        if heard_any(text, QUIT_WORDS) {
            info!(%text, "goodbye heard");
            return Flow::Quit;
        }
        self.screen.set_state(FaceState::Thinking);
        let reply = self.brain.process(text);
        self.screen.set_state(FaceState::Idle);
        self.voice.speak(&reply);
        Flow::Continue
    }

    fn drain_commands(&mut self) {
        while let Ok(remote) = self.commands.try_recv() {
            let command = Command::parse(&remote);
            info!(id = remote.id, ?command, "remote command");
            match command {
                Command::Stop => {
                    self.end_session();
                    self.voice.speak(STOPPING);
                }
                Command::StartMode(id) => self.launch(&id),
                Command::Say(text) => self.voice.speak(&text),
                Command::Ping => self.telemetry.record(TelemetryEvent::pong()),
                Command::Unknown(name) => warn!(%name, "unknown remote command"),
            }
        }
    }

    fn launch(&mut self, id: &str) {
        // start_game stops the previous game itself
        if let Some(previous) = self.session.active_id() {
            self.telemetry.record(TelemetryEvent::session(previous, SessionResult::Finished));
        }
        // leave the selection screen; the game sets its own face in start()
        self.screen.set_state(FaceState::Idle);
        match self.session.try_start(id) {
            Ok(()) => {
                if let Some(active) = self.session.active_id() {
                    self.telemetry.record(TelemetryEvent::session(active, SessionResult::Started));
                }
            }
            Err(StartError::Crashed(fault)) => {
                self.telemetry.record(TelemetryEvent::session(&fault.game, SessionResult::Started));
                self.on_crash(fault);
            }
            Err(e) => {
                debug!(error = %e, "launch failed");
                self.voice.speak(&format!("Não consegui abrir o jogo {id}."));
            }
        }
    }

    /// Stop the active game (if any) and go back to the idle face.
    fn end_session(&mut self) {
        let Some(game) = self.session.active_id().map(str::to_string) else {
            self.screen.set_state(FaceState::Idle);
            return;
        };
        self.session.stop_game();
        self.session_over(&game, SessionResult::Finished);
    }

    fn on_crash(&mut self, fault: GameFault) {
        warn!(%fault, "session ended by a crash");
        self.session_over(&fault.game, SessionResult::Crashed);
        self.voice.speak(CRASH_APOLOGY);
    }

    fn session_over(&mut self, game: &str, result: SessionResult) {
        self.screen.set_state(FaceState::Idle);
        self.telemetry.record(TelemetryEvent::session(game, result));
    }

    fn redraw(&mut self) {
        if self.session.is_idle() {
            if let Err(e) = self.screen.draw(None) {
                warn!(error = %format!("{e:#}"), "draw failed");
            }
            return;
        }
        // a panicking render is a crash like any other contract call
        let screen = self.screen.clone();
        let outcome = self.session.invoke("render", |game| {
            if let Err(e) = screen.draw(Some(&*game)) {
                warn!(error = %format!("{e:#}"), "draw failed");
            }
            Ok(())
        });
        if let Some(fault) = outcome.crashed().cloned() {
            self.on_crash(fault);
        }
    }
}
