pub mod app;
pub mod config;
pub mod error;

pub mod core {
    pub mod command;
    pub mod engine;
    pub mod game;
    pub mod presentation;
    pub mod registry;
    pub mod renderer;
    pub mod router;
    pub mod session;
    pub mod terminal;

    #[cfg(test)]
    pub(crate) mod testing;
}

/// Collaborators the game core talks to: voice hardware, conversational AI,
/// the fleet service and its command feed, telemetry.
pub mod services {
    pub mod brain;
    pub mod cloud;
    pub mod hardware;
    pub mod poller;
    pub mod telemetry;
}

pub mod games;

// Re-export for convenience
pub use crate::core::game::{Game, GameContext};
