// src/graph/task.rs

//! Schedulable units of work.
//!
//! The set of task kinds is closed, so a [`Task`] carries a [`TaskKind`]
//! variant instead of a trait object. Every kind exposes the same capability
//! contract:
//!
//! - [`Task::schedule_on_origin_thread`] runs once on the origin thread
//!   before the task is handed to workers.
//! - [`Task::run_on_worker_thread`] is the body, executed on a worker.
//! - [`Task::complete_on_origin_thread`] and
//!   [`Task::run_reply_on_origin_thread`] run on the origin thread after the
//!   runner reports the task as completed (or canceled).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::raster::{
    DecodedImageStore, ImageDecoder, ImageId, RasterSource, Rect, playback_to_memory,
};
use crate::scheduler::{OriginClosure, RasterBuffer, RasterBufferProvider, SequencedTaskRunner};
use crate::sync::lock;
use crate::types::TileId;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Lifecycle of a task. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskPhase {
    Created = 0,
    Scheduled = 1,
    Running = 2,
    FinishedRunning = 3,
    Completed = 4,
}

impl TaskPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskPhase::Created,
            1 => TaskPhase::Scheduled,
            2 => TaskPhase::Running,
            3 => TaskPhase::FinishedRunning,
            _ => TaskPhase::Completed,
        }
    }
}

/// Result handed to a raster task's reply once it completes on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOutcome {
    pub tile: TileId,
    /// The task was dropped from the graph before a worker ever ran it.
    pub was_canceled: bool,
}

pub type RasterReply = Box<dyn FnOnce(RasterOutcome) + Send + 'static>;

/// Decodes one image into the shared [`DecodedImageStore`].
pub struct ImageDecodeTask {
    image: ImageId,
    decoder: Arc<dyn ImageDecoder>,
    store: DecodedImageStore,
}

impl ImageDecodeTask {
    pub fn new(image: ImageId, decoder: Arc<dyn ImageDecoder>, store: DecodedImageStore) -> Self {
        Self {
            image,
            decoder,
            store,
        }
    }

    pub fn image(&self) -> &ImageId {
        &self.image
    }

    fn run(&self) {
        let started = Instant::now();
        let decoded = self.decoder.decode();
        debug!(
            image = %self.image,
            width = decoded.size.width,
            height = decoded.size.height,
            elapsed_us = started.elapsed().as_micros() as u64,
            "decoded image"
        );
        self.store.insert(self.image.clone(), Arc::new(decoded));
    }
}

/// Plays a raster source back into the buffer of one tile.
pub struct RasterTask {
    tile: TileId,
    source: Arc<dyn RasterSource>,
    bitmap_rect: Rect,
    playback_rect: Rect,
    scale: f32,
    dependencies: Vec<Arc<Task>>,
    buffer: Mutex<Option<RasterBuffer>>,
    reply: Mutex<Option<RasterReply>>,
}

impl RasterTask {
    pub fn new(
        tile: TileId,
        source: Arc<dyn RasterSource>,
        bitmap_rect: Rect,
        playback_rect: Rect,
        scale: f32,
        dependencies: Vec<Arc<Task>>,
    ) -> Self {
        Self {
            tile,
            source,
            bitmap_rect,
            playback_rect,
            scale,
            dependencies,
            buffer: Mutex::new(None),
            reply: Mutex::new(None),
        }
    }

    pub fn with_reply(mut self, reply: impl FnOnce(RasterOutcome) + Send + 'static) -> Self {
        self.reply = Mutex::new(Some(Box::new(reply)));
        self
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn bitmap_rect(&self) -> Rect {
        self.bitmap_rect
    }

    /// Image decode tasks this raster task reads from.
    pub fn dependencies(&self) -> &[Arc<Task>] {
        &self.dependencies
    }

    fn schedule(&self, client: &dyn RasterBufferProvider) {
        let buffer = client.acquire_buffer_for_raster(self.tile, self.bitmap_rect.size());
        *lock(&self.buffer) = Some(buffer);
    }

    fn run(&self) {
        let mut guard = lock(&self.buffer);
        let Some(buffer) = guard.as_mut() else {
            warn!(tile = %self.tile, "raster task ran without a buffer; skipping playback");
            return;
        };

        let started = Instant::now();
        playback_to_memory(
            &mut buffer.pixels,
            buffer.format,
            buffer.size,
            buffer.stride,
            self.source.as_ref(),
            self.bitmap_rect,
            self.playback_rect,
            self.scale,
        );
        debug!(
            tile = %self.tile,
            format = %buffer.format,
            elapsed_us = started.elapsed().as_micros() as u64,
            "rastered tile"
        );
    }

    fn complete(&self, client: &dyn RasterBufferProvider, contents_valid: bool) {
        if let Some(buffer) = lock(&self.buffer).take() {
            client.release_buffer_for_raster(buffer, contents_valid);
        }
    }

    fn reply(&self, was_canceled: bool) {
        if let Some(reply) = lock(&self.reply).take() {
            reply(RasterOutcome {
                tile: self.tile,
                was_canceled,
            });
        }
    }
}

/// Completion signal: posts its callback back to the origin when run.
pub struct TaskSetFinishedTask {
    runner: Arc<dyn SequencedTaskRunner>,
    callback: Mutex<Option<OriginClosure>>,
}

impl TaskSetFinishedTask {
    pub fn new(runner: Arc<dyn SequencedTaskRunner>, callback: OriginClosure) -> Self {
        Self {
            runner,
            callback: Mutex::new(Some(callback)),
        }
    }

    fn run(&self) {
        match lock(&self.callback).take() {
            Some(callback) => {
                if !self.runner.post_task(callback) {
                    warn!("origin task runner rejected task-set-finished callback");
                }
            }
            None => warn!("task-set-finished task ran twice; callback already posted"),
        }
    }
}

pub enum TaskKind {
    ImageDecode(ImageDecodeTask),
    Raster(RasterTask),
    TaskSetFinished(TaskSetFinishedTask),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::ImageDecode(_) => "image_decode",
            TaskKind::Raster(_) => "raster",
            TaskKind::TaskSetFinished(_) => "task_set_finished",
        }
    }
}

/// A unit of schedulable work, shared between graphs and caches via `Arc`.
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    phase: AtomicU8,
    /// Set by `did_run`; survives the jump to `Completed` so canceled tasks
    /// can be told apart from finished ones.
    ran: AtomicBool,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Task {
    pub fn new(kind: TaskKind) -> Arc<Task> {
        Arc::new(Task {
            id: TaskId::next(),
            kind,
            phase: AtomicU8::new(TaskPhase::Created as u8),
            ran: AtomicBool::new(false),
        })
    }

    pub fn image_decode(
        image: ImageId,
        decoder: Arc<dyn ImageDecoder>,
        store: DecodedImageStore,
    ) -> Arc<Task> {
        Task::new(TaskKind::ImageDecode(ImageDecodeTask::new(image, decoder, store)))
    }

    pub fn raster(task: RasterTask) -> Arc<Task> {
        Task::new(TaskKind::Raster(task))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn as_raster(&self) -> Option<&RasterTask> {
        match &self.kind {
            TaskKind::Raster(raster) => Some(raster),
            _ => None,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        TaskPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn advance(&self, to: TaskPhase) {
        let previous = TaskPhase::from_u8(self.phase.fetch_max(to as u8, Ordering::AcqRel));
        trace!(task = %self.id, kind = self.kind.name(), from = ?previous, to = ?to, "task phase");
    }

    pub fn will_schedule(&self) {
        debug_assert!(
            !self.has_been_scheduled(),
            "{} ({}) scheduled twice",
            self.id,
            self.kind.name()
        );
    }

    pub fn did_schedule(&self) {
        self.advance(TaskPhase::Scheduled);
    }

    pub fn has_been_scheduled(&self) -> bool {
        self.phase() >= TaskPhase::Scheduled
    }

    pub fn will_run(&self) {
        debug_assert!(
            self.phase() <= TaskPhase::Scheduled,
            "{} started running in phase {:?}",
            self.id,
            self.phase()
        );
        self.advance(TaskPhase::Running);
    }

    pub fn did_run(&self) {
        self.ran.store(true, Ordering::Release);
        self.advance(TaskPhase::FinishedRunning);
    }

    pub fn has_finished_running(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    pub fn will_complete(&self) {
        debug_assert!(!self.has_completed(), "{} completed twice", self.id);
    }

    pub fn did_complete(&self) {
        self.advance(TaskPhase::Completed);
    }

    pub fn has_completed(&self) -> bool {
        self.phase() == TaskPhase::Completed
    }

    pub fn schedule_on_origin_thread(&self, client: &dyn RasterBufferProvider) {
        match &self.kind {
            TaskKind::Raster(raster) => raster.schedule(client),
            TaskKind::ImageDecode(_) | TaskKind::TaskSetFinished(_) => {}
        }
    }

    pub fn run_on_worker_thread(&self) {
        match &self.kind {
            TaskKind::ImageDecode(decode) => decode.run(),
            TaskKind::Raster(raster) => raster.run(),
            TaskKind::TaskSetFinished(finished) => finished.run(),
        }
    }

    pub fn complete_on_origin_thread(&self, client: &dyn RasterBufferProvider) {
        match &self.kind {
            TaskKind::Raster(raster) => raster.complete(client, self.has_finished_running()),
            TaskKind::ImageDecode(_) | TaskKind::TaskSetFinished(_) => {}
        }
    }

    pub fn run_reply_on_origin_thread(&self) {
        match &self.kind {
            TaskKind::Raster(raster) => raster.reply(!self.has_finished_running()),
            TaskKind::ImageDecode(_) | TaskKind::TaskSetFinished(_) => {}
        }
    }
}
