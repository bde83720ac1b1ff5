pub mod chart;
pub mod geometry;
pub mod history;
pub mod note;
pub mod playfield;
pub mod speed;
pub mod sync;
pub mod timing;
