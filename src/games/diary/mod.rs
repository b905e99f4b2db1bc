/// Silent session diary: transcribes what is said during a therapy session.
pub mod game;

pub use game::DiaryGame;
