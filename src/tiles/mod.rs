// src/tiles/mod.rs

//! Tiling and the per-round graph builder driving the runner.

pub mod grid;
pub mod manager;

pub use grid::{PrioritizedTile, TileGrid};
pub use manager::{CompletionReport, RoundReport, Scene, TileTaskManager};
