// src/graph/mod.rs

//! Task graph construction.
//!
//! - [`task`] defines the closed set of task kinds and their lifecycle.
//! - [`task_graph`] holds nodes (task + priority + dependency count) and
//!   dependency edges for one scheduling round.
//! - [`priority`] describes the priority bands graphs are built with.

pub mod priority;
pub mod task;
pub mod task_graph;

pub use priority::{Priority, PriorityBands};
pub use task::{
    ImageDecodeTask, RasterOutcome, RasterReply, RasterTask, Task, TaskId, TaskKind, TaskPhase,
    TaskSetFinishedTask,
};
pub use task_graph::{Edge, Node, TaskGraph};
