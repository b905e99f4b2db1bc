/// Drag-and-drop game: circles go onto the square of the same color.
pub mod game;
pub mod renderer;

pub use game::PairingGame;
