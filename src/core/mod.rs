pub mod clock;
pub mod player;
