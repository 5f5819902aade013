// src/scheduler/origin.rs

//! Origin-thread side of scheduling.
//!
//! The origin thread builds graphs, runs the lightweight schedule/complete
//! hooks and receives completion signals. Worker threads talk back to it only
//! through a [`SequencedTaskRunner`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::graph::{Task, TaskGraph, TaskKind, TaskSetFinishedTask};
use crate::raster::Size;
use crate::sync::lock;
use crate::types::{ResourceFormat, TileId};

/// Destination memory a raster task plays back into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    pub tile: TileId,
    pub format: ResourceFormat,
    pub size: Size,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

impl RasterBuffer {
    /// Zeroed buffer with a 4-byte aligned stride.
    pub fn new(tile: TileId, format: ResourceFormat, size: Size) -> Self {
        let stride = format.min_row_bytes(size.width).next_multiple_of(4);
        Self {
            tile,
            format,
            size,
            stride,
            pixels: vec![0; stride * size.height as usize],
        }
    }
}

/// Client consulted by raster tasks on the origin thread.
pub trait RasterBufferProvider: Send + Sync {
    fn acquire_buffer_for_raster(&self, tile: TileId, size: Size) -> RasterBuffer;

    /// `contents_valid` is false when the task was canceled before running.
    fn release_buffer_for_raster(&self, buffer: RasterBuffer, contents_valid: bool);
}

/// Keeps the most recent valid buffer of every tile in memory.
#[derive(Debug)]
pub struct MemoryBufferProvider {
    format: ResourceFormat,
    ready: Mutex<HashMap<TileId, RasterBuffer>>,
    acquired: AtomicUsize,
    discarded: AtomicUsize,
}

impl MemoryBufferProvider {
    pub fn new(format: ResourceFormat) -> Self {
        Self {
            format,
            ready: Mutex::new(HashMap::new()),
            acquired: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    pub fn format(&self) -> ResourceFormat {
        self.format
    }

    pub fn buffer(&self, tile: TileId) -> Option<RasterBuffer> {
        lock(&self.ready).get(&tile).cloned()
    }

    pub fn ready_tiles(&self) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = lock(&self.ready).keys().copied().collect();
        tiles.sort();
        tiles
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl RasterBufferProvider for MemoryBufferProvider {
    fn acquire_buffer_for_raster(&self, tile: TileId, size: Size) -> RasterBuffer {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        // Reuse the previous contents so partial playback only touches the
        // invalidated area.
        match lock(&self.ready).remove(&tile) {
            Some(previous) if previous.size == size && previous.format == self.format => previous,
            _ => RasterBuffer::new(tile, self.format, size),
        }
    }

    fn release_buffer_for_raster(&self, buffer: RasterBuffer, contents_valid: bool) {
        if contents_valid {
            lock(&self.ready).insert(buffer.tile, buffer);
        } else {
            debug!(tile = %buffer.tile, "discarding buffer of canceled raster task");
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub type OriginClosure = Box<dyn FnOnce() + Send + 'static>;

/// Posts closures to run later, in order, on one logical thread.
pub trait SequencedTaskRunner: Send + Sync {
    /// Returns false if the receiving side is gone.
    fn post_task(&self, task: OriginClosure) -> bool;
}

#[derive(Debug, Clone)]
pub struct OriginTaskRunner {
    tx: mpsc::UnboundedSender<OriginClosure>,
}

impl SequencedTaskRunner for OriginTaskRunner {
    fn post_task(&self, task: OriginClosure) -> bool {
        self.tx.send(task).is_ok()
    }
}

/// Receiving end of an [`OriginTaskRunner`], drained by the origin thread.
#[derive(Debug)]
pub struct OriginTaskQueue {
    rx: mpsc::UnboundedReceiver<OriginClosure>,
}

impl OriginTaskQueue {
    /// Run everything posted so far without waiting.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait for the next posted closure and run it. Returns false once every
    /// runner has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

pub fn origin_task_runner() -> (OriginTaskRunner, OriginTaskQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OriginTaskRunner { tx }, OriginTaskQueue { rx })
}

/// Run the origin-side scheduling hooks for every node not yet scheduled.
///
/// Tasks already scheduled in an earlier round are skipped, so overlapping
/// graphs never schedule a task twice. Returns the number of tasks scheduled
/// by this call.
pub fn schedule_tasks_on_origin_thread(client: &dyn RasterBufferProvider, graph: &TaskGraph) -> usize {
    let mut scheduled = 0;
    for node in graph.nodes() {
        let task = node.task();
        if task.has_been_scheduled() {
            continue;
        }

        task.will_schedule();
        task.schedule_on_origin_thread(client);
        task.did_schedule();
        scheduled += 1;
    }
    trace!(scheduled, nodes = graph.len(), "scheduled tasks on origin thread");
    scheduled
}

/// Run the origin-side completion hooks for tasks collected from the runner.
pub fn complete_tasks_on_origin_thread(client: &dyn RasterBufferProvider, tasks: &[Arc<Task>]) {
    for task in tasks {
        task.will_complete();
        task.complete_on_origin_thread(client);
        task.did_complete();
        task.run_reply_on_origin_thread();
    }
}

/// Create a completion signal that posts `callback` to `runner` when a worker
/// runs it.
pub fn create_task_set_finished_task(
    runner: Arc<dyn SequencedTaskRunner>,
    callback: impl FnOnce() + Send + 'static,
) -> Arc<Task> {
    Task::new(TaskKind::TaskSetFinished(TaskSetFinishedTask::new(
        runner,
        Box::new(callback),
    )))
}
