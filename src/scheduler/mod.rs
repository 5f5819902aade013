// src/scheduler/mod.rs

//! Running task graphs.
//!
//! - [`origin`] holds the origin-thread hooks: buffer providers, the
//!   sequenced runner completion signals post to, and the helpers that run
//!   schedule/complete hooks over a graph.
//! - [`runner`] owns the worker pool that executes graphs.

pub mod origin;
pub mod runner;

pub use origin::{
    MemoryBufferProvider, OriginClosure, OriginTaskQueue, OriginTaskRunner, RasterBuffer,
    RasterBufferProvider, SequencedTaskRunner, complete_tasks_on_origin_thread,
    create_task_set_finished_task, origin_task_runner, schedule_tasks_on_origin_thread,
};
pub use runner::{NamespaceToken, TaskGraphRunner};
