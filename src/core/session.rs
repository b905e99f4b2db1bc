use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::core::game::Game;
use crate::core::registry::{normalize_id, GameRegistry};
use crate::error::{panic_message, FaultKind, GameFault, StartError};

/// The one game currently receiving input and ticks.
struct ActiveSession {
    id: String,
    game: Box<dyn Game>,
}

/// Result of running a contract call against the active game.
#[derive(Debug)]
pub enum Invocation<T> {
    /// No game is active; nothing was called.
    Idle,
    Done(T),
    /// The game failed and has been force-stopped.
    Crashed(GameFault),
}

impl<T> Invocation<T> {
    pub fn crashed(&self) -> Option<&GameFault> {
        match self {
            Invocation::Crashed(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Runs a contract method, turning errors and panics into a `GameFault`.
fn guarded<T>(game_id: &str, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T, GameFault> {
    let kind = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => FaultKind::Error(format!("{e:#}")),
        Err(payload) => FaultKind::Panic(panic_message(payload.as_ref())),
    };
    Err(GameFault {
        game: game_id.to_string(),
        op,
        kind,
    })
}

/// Owns "which game is active": Idle or Active(id), never more than one.
pub struct SessionController {
    registry: GameRegistry,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(registry: GameRegistry) -> Self {
        Self {
            registry,
            active: None,
        }
    }

    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut GameRegistry {
        &mut self.registry
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.id.as_str())
    }

    pub fn active_game(&self) -> Option<&dyn Game> {
        self.active.as_ref().map(|s| s.game.as_ref())
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Stop whatever runs, then start `id`, loading games once on a miss.
    pub fn start_game(&mut self, id: &str) -> bool {
        self.try_start(id).is_ok()
    }

    /// Like `start_game`, but says why the game did not start.
    pub fn try_start(&mut self, id: &str) -> Result<(), StartError> {
        let id = normalize_id(id);
        if self.active.is_some() {
            self.stop_game();
        }

        if !self.registry.has(&id) {
            debug!(game = %id, "not loaded, rescanning games");
            self.registry.load_all();
        }
        if !self.registry.has(&id) {
            warn!(game = %id, "game not found");
            return Err(StartError::NotFound(id));
        }

        let game = self.registry.checkout(&id).inspect_err(|e| {
            warn!(game = %id, error = %e, "cannot instantiate game");
        })?;

        info!(game = %id, name = %game.name(), "starting game");
        self.active = Some(ActiveSession { id: id.clone(), game });

        match self.invoke("start", |game| game.start()) {
            Invocation::Done(()) => Ok(()),
            Invocation::Crashed(fault) => Err(StartError::Crashed(fault)),
            Invocation::Idle => Err(StartError::NotFound(id)),
        }
    }

    /// No-op when idle.
    pub fn stop_game(&mut self) {
        let Some(mut session) = self.active.take() else {
            return;
        };
        info!(game = %session.id, "stopping game");
        if let Err(fault) = guarded(&session.id, "stop", || session.game.stop()) {
            warn!(game = %fault.game, kind = ?fault.kind, "stop failed, dropping game anyway");
        }
    }

    /// Run `f` against the active game under the fault guard.
    pub fn invoke<T>(&mut self, op: &'static str, f: impl FnOnce(&mut dyn Game) -> Result<T>) -> Invocation<T> {
        let Some(session) = self.active.as_mut() else {
            return Invocation::Idle;
        };
        let game = session.game.as_mut();
        match guarded(&session.id, op, || f(game)) {
            Ok(value) => Invocation::Done(value),
            Err(fault) => {
                error!(game = %fault.game, op, kind = ?fault.kind, "game crashed");
                self.force_stop();
                Invocation::Crashed(fault)
            }
        }
    }

    /// Drop a game that ended itself. Returns whether a session ended.
    pub fn reconcile(&mut self) -> bool {
        match &self.active {
            Some(session) if !session.game.is_running() => {
                debug!(game = %session.id, "game ended itself");
                self.stop_game();
                true
            }
            _ => false,
        }
    }

    /// Best-effort stop after a crash; the instance is dropped either way.
    fn force_stop(&mut self) {
        if let Some(mut session) = self.active.take() {
            let _ = guarded(&session.id, "stop", || session.game.stop());
        }
    }
}
