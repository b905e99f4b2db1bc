/// Free conversation with the brain, by voice.
pub mod game;

pub use game::ConversationGame;
