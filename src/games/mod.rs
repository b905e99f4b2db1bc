pub mod macros;
pub mod colors;
pub mod conversation;
pub mod diary;
pub mod pairing;
pub mod parrot;

use std::time::{Duration, Instant};

use crate::register_games;

/// Ignores touches closer together than a window.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    last: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True (and re-armed) when enough time passed since the last accepted touch.
    pub fn accept(&mut self) -> bool {
        let now = Instant::now();
        if self.last.is_some_and(|last| now.duration_since(last) < self.window) {
            return false;
        }
        self.last = Some(now);
        true
    }

    pub fn arm(&mut self) {
        self.last = Some(Instant::now());
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

// Register all games here - add a module and one entry
register_games! {
    conversation => {
        game: ConversationGame,
        id: "conversation",
        name: "Modo Conversa",
        description: "Converse com o Tirilo sobre qualquer assunto"
    },
    colors => {
        game: ColorsGame,
        id: "colors",
        name: "Jogo das Cores",
        description: "Toque na cor que o Tirilo pedir"
    },
    parrot => {
        game: ParrotGame,
        id: "parrot",
        name: "Modo Papagaio",
        description: "O Tirilo repete tudo o que ouvir"
    },
    pairing => {
        game: PairingGame,
        id: "pairing",
        name: "Parear Cores",
        description: "Arraste as bolinhas para os quadrados da mesma cor"
    },
    diary => {
        game: DiaryGame,
        id: "diary",
        name: "Diário de Sessão",
        description: "O Tirilo escuta em silêncio e anota a sessão"
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::GameRegistry;
    use crate::core::testing::test_context;

    #[test]
    fn every_builtin_game_constructs() {
        let (ctx, _, _) = test_context();
        let mut registry = GameRegistry::new(builtin_catalog(), ctx);
        let report = registry.load_all();
        assert!(report.errors.is_empty());
        let mut expected: Vec<String> = builtin_ids().iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(report.loaded, expected);
        for id in builtin_ids() {
            let game = registry.get(id).unwrap();
            assert!(!game.is_running(), "{id} must start stopped");
        }
    }

    #[test]
    fn debounce_rejects_quick_repeats() {
        let mut debounce = Debounce::new(Duration::from_secs(60));
        assert!(debounce.accept());
        assert!(!debounce.accept());
        debounce.reset();
        assert!(debounce.accept());
    }

    #[test]
    fn zero_window_accepts_everything() {
        let mut debounce = Debounce::new(Duration::ZERO);
        debounce.arm();
        assert!(debounce.accept());
        assert!(debounce.accept());
    }
}
