/// Touch game: the screen is split in two colors and the robot asks for one.
pub mod game;
pub mod renderer;

pub use game::ColorsGame;
