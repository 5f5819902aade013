use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use tilegraph::raster::Size;
use tilegraph::scheduler::{OriginClosure, RasterBuffer, RasterBufferProvider, SequencedTaskRunner};
use tilegraph::types::{ResourceFormat, TileId};

/// Buffer provider that hands out fresh buffers and records every call.
pub struct RecordingBufferProvider {
    format: ResourceFormat,
    acquired: Mutex<Vec<TileId>>,
    released: Mutex<Vec<(RasterBuffer, bool)>>,
}

impl RecordingBufferProvider {
    pub fn new(format: ResourceFormat) -> Self {
        Self {
            format,
            acquired: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn acquired(&self) -> Vec<TileId> {
        self.acquired.lock().unwrap().clone()
    }

    /// `(tile, contents_valid)` per release, in call order.
    pub fn releases(&self) -> Vec<(TileId, bool)> {
        self.released
            .lock()
            .unwrap()
            .iter()
            .map(|(buffer, valid)| (buffer.tile, *valid))
            .collect()
    }

    pub fn released_buffer(&self, tile: TileId) -> Option<RasterBuffer> {
        self.released
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(buffer, _)| buffer.tile == tile)
            .map(|(buffer, _)| buffer.clone())
    }
}

impl RasterBufferProvider for RecordingBufferProvider {
    fn acquire_buffer_for_raster(&self, tile: TileId, size: Size) -> RasterBuffer {
        self.acquired.lock().unwrap().push(tile);
        RasterBuffer::new(tile, self.format, size)
    }

    fn release_buffer_for_raster(&self, buffer: RasterBuffer, contents_valid: bool) {
        self.released.lock().unwrap().push((buffer, contents_valid));
    }
}

/// Sequenced runner that queues closures until the test runs them.
#[derive(Default)]
pub struct ManualTaskRunner {
    queue: Mutex<Vec<OriginClosure>>,
    closed: AtomicBool,
}

impl ManualTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every later post, like a runner whose thread has gone away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run queued closures in post order; returns how many ran.
    pub fn run_all(&self) -> usize {
        let tasks = std::mem::take(&mut *self.queue.lock().unwrap());
        let ran = tasks.len();
        for task in tasks {
            task();
        }
        ran
    }
}

impl SequencedTaskRunner for ManualTaskRunner {
    fn post_task(&self, task: OriginClosure) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.queue.lock().unwrap().push(task);
        true
    }
}

/// Sequenced runner whose `post_task` blocks the posting worker until the
/// test opens the gate. Lets tests hold a task in the running state.
pub struct GateTaskRunner {
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub struct GateHandle {
    started: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

pub fn gate() -> (Arc<GateTaskRunner>, GateHandle) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Arc::new(GateTaskRunner {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        }),
        GateHandle {
            started: started_rx,
            release: release_tx,
        },
    )
}

impl GateHandle {
    /// Wait until a worker is blocked inside the gate.
    pub fn wait_started(&self) {
        self.started
            .recv_timeout(Duration::from_secs(5))
            .expect("gated task never started");
    }

    pub fn open(&self) {
        self.release.send(()).expect("gate runner dropped");
    }
}

impl SequencedTaskRunner for GateTaskRunner {
    fn post_task(&self, task: OriginClosure) -> bool {
        let _ = self.started.lock().unwrap().send(());
        let _ = self
            .release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5));
        task();
        true
    }
}
