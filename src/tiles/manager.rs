// src/tiles/manager.rs

//! Origin-side driver that turns a raster queue into task graph rounds.
//!
//! Each call to [`TileTaskManager::schedule_tasks`] builds a fresh graph:
//!
//! - one completion signal per [`TaskSet`], in the task-set-finished band;
//! - per queued tile a raster task (reused while the previous one is still in
//!   flight) plus the decode tasks of the images it draws;
//! - an edge from every raster task into the signal of each set it belongs
//!   to, so a signal only runs once all of its set's rasters have.
//!
//! The signals keep their band priority: once ready, a signal outranks every
//! tile task. Ordering by band alone would let a signal overtake rasters that
//! have not been picked up yet; the edges make its firing point exact.
//!
//! The graph then goes through origin scheduling and replaces the previous
//! round in the runner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::errors::{Result, TilegraphError};
use crate::graph::{PriorityBands, RasterOutcome, RasterTask, Task, TaskGraph, TaskKind};
use crate::raster::{DecodedImageStore, ImageDecoder, ImageId, RasterSource};
use crate::scheduler::{
    NamespaceToken, OriginTaskQueue, OriginTaskRunner, RasterBufferProvider, SequencedTaskRunner,
    TaskGraphRunner, complete_tasks_on_origin_thread, create_task_set_finished_task,
    origin_task_runner, schedule_tasks_on_origin_thread,
};
use crate::sync::lock;
use crate::tiles::grid::{PrioritizedTile, TileGrid};
use crate::types::{NUMBER_OF_TASK_SETS, TaskSet, TileId};

/// Content being tiled, and where its images come from.
#[derive(Clone)]
pub struct Scene {
    pub source: Arc<dyn RasterSource>,
    pub decoders: HashMap<ImageId, Arc<dyn ImageDecoder>>,
    pub images: DecodedImageStore,
}

/// What one call to [`TileTaskManager::schedule_tasks`] submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub tiles: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Tasks that went through origin scheduling for the first time.
    pub newly_scheduled: usize,
    /// Raster tasks carried over from an earlier round.
    pub reused_raster_tasks: usize,
    /// Decode tasks in the graph.
    pub decode_tasks: usize,
}

/// What one call to [`TileTaskManager::check_for_completed_tasks`] saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    pub rastered: Vec<TileId>,
    pub canceled: Vec<TileId>,
    pub decoded: usize,
    pub canceled_decodes: usize,
}

impl CompletionReport {
    fn merge(&mut self, other: CompletionReport) {
        self.rastered.extend(other.rastered);
        self.canceled.extend(other.canceled);
        self.decoded += other.decoded;
        self.canceled_decodes += other.canceled_decodes;
    }
}

pub struct TileTaskManager {
    runner: Arc<TaskGraphRunner>,
    namespace: NamespaceToken,
    client: Arc<dyn RasterBufferProvider>,
    origin_runner: Arc<OriginTaskRunner>,
    origin_queue: OriginTaskQueue,
    bands: PriorityBands,
    grid: TileGrid,
    scene: Scene,
    decode_tasks: HashMap<ImageId, Arc<Task>>,
    raster_tasks: HashMap<TileId, Arc<Task>>,
    outcomes: Arc<Mutex<Vec<RasterOutcome>>>,
    /// Latest round whose signal fired, per task set.
    finished_rounds: Arc<Mutex<[u64; NUMBER_OF_TASK_SETS]>>,
    round: u64,
    graph: TaskGraph,
}

impl TileTaskManager {
    pub fn new(
        runner: Arc<TaskGraphRunner>,
        client: Arc<dyn RasterBufferProvider>,
        bands: PriorityBands,
        grid: TileGrid,
        scene: Scene,
    ) -> Self {
        let namespace = runner.generate_namespace_token();
        let (origin_runner, origin_queue) = origin_task_runner();
        Self {
            runner,
            namespace,
            client,
            origin_runner: Arc::new(origin_runner),
            origin_queue,
            bands,
            grid,
            scene,
            decode_tasks: HashMap::new(),
            raster_tasks: HashMap::new(),
            outcomes: Arc::new(Mutex::new(Vec::new())),
            finished_rounds: Arc::new(Mutex::new([0; NUMBER_OF_TASK_SETS])),
            round: 0,
            graph: TaskGraph::new(),
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    /// Graph submitted by the latest round.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Raster tasks scheduled but not yet completed on the origin.
    pub fn in_flight_tiles(&self) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = self.raster_tasks.keys().copied().collect();
        tiles.sort();
        tiles
    }

    /// Submit a new round for `queue`, most urgent tile first.
    pub fn schedule_tasks(&mut self, queue: &[PrioritizedTile]) -> Result<RoundReport> {
        self.round += 1;
        let round = self.round;
        self.graph.reset();

        let mut report = RoundReport {
            round,
            tiles: queue.len(),
            ..RoundReport::default()
        };

        let mut set_tasks = Vec::with_capacity(NUMBER_OF_TASK_SETS);
        for set in TaskSet::ALL {
            let rasters = queue.iter().filter(|tile| tile.sets.contains(set)).count();
            let finished_rounds = Arc::clone(&self.finished_rounds);
            let runner: Arc<dyn SequencedTaskRunner> = self.origin_runner.clone();
            let task = create_task_set_finished_task(runner, move || {
                let mut rounds = lock(&finished_rounds);
                rounds[set.index()] = rounds[set.index()].max(round);
                debug!(?set, round, "task set finished");
            });
            self.graph.insert_node_for_task(
                &task,
                self.bands.task_set_finished_priority(set),
                u32::try_from(rasters).unwrap_or(u32::MAX),
            );
            set_tasks.push(task);
        }

        for (order, prioritized) in queue.iter().enumerate() {
            let raster = match self.raster_tasks.get(&prioritized.tile) {
                Some(task) => {
                    report.reused_raster_tasks += 1;
                    Arc::clone(task)
                }
                None => {
                    let task = self.create_raster_task(prioritized.tile);
                    self.raster_tasks.insert(prioritized.tile, Arc::clone(&task));
                    task
                }
            };

            let decodes: &[Arc<Task>] = raster
                .as_raster()
                .map(RasterTask::dependencies)
                .unwrap_or_default();
            self.graph.insert_nodes_for_raster_task(
                &raster,
                decodes,
                self.bands.tile_task_priority(order),
            );

            for set in prioritized.sets.iter() {
                self.graph.insert_edge(&raster, &set_tasks[set.index()]);
            }
        }

        report.nodes = self.graph.len();
        report.edges = self.graph.edges().len();
        report.decode_tasks = self
            .graph
            .nodes()
            .iter()
            .filter(|node| matches!(node.task().kind(), TaskKind::ImageDecode(_)))
            .count();
        report.newly_scheduled = schedule_tasks_on_origin_thread(self.client.as_ref(), &self.graph);
        self.runner.schedule_tasks(self.namespace, &self.graph)?;

        info!(
            round,
            tiles = report.tiles,
            nodes = report.nodes,
            edges = report.edges,
            reused = report.reused_raster_tasks,
            decodes = report.decode_tasks,
            "scheduled raster round"
        );
        Ok(report)
    }

    fn create_raster_task(&mut self, tile: TileId) -> Arc<Task> {
        let rect = self.grid.tile_rect(tile);
        let scale = self.grid.scale();
        let decodes: Vec<Arc<Task>> = self
            .scene
            .source
            .images_in_rect(rect, scale)
            .into_iter()
            .filter_map(|image| self.decode_task_for(image))
            .collect();

        let outcomes = Arc::clone(&self.outcomes);
        Task::raster(
            RasterTask::new(tile, Arc::clone(&self.scene.source), rect, rect, scale, decodes)
                .with_reply(move |outcome| lock(&outcomes).push(outcome)),
        )
    }

    /// Decode task for `image`, or `None` when it is already decoded or has
    /// no decoder.
    fn decode_task_for(&mut self, image: ImageId) -> Option<Arc<Task>> {
        if let Some(task) = self.decode_tasks.get(&image) {
            return Some(Arc::clone(task));
        }
        if self.scene.images.contains(&image) {
            return None;
        }
        let Some(decoder) = self.scene.decoders.get(&image) else {
            warn!(%image, "no decoder registered for image; drawing without it");
            return None;
        };

        let task = Task::image_decode(
            image.clone(),
            Arc::clone(decoder),
            self.scene.images.clone(),
        );
        self.decode_tasks.insert(image, Arc::clone(&task));
        Some(task)
    }

    /// Run the origin completion hooks of everything the runner finished or
    /// canceled since the last call.
    pub fn check_for_completed_tasks(&mut self) -> CompletionReport {
        let tasks = self.runner.collect_completed_tasks(self.namespace);
        complete_tasks_on_origin_thread(self.client.as_ref(), &tasks);

        let mut report = CompletionReport::default();
        for task in &tasks {
            match task.kind() {
                TaskKind::Raster(raster) => {
                    let current = self
                        .raster_tasks
                        .get(&raster.tile())
                        .is_some_and(|t| t.id() == task.id());
                    if current {
                        self.raster_tasks.remove(&raster.tile());
                    }
                }
                TaskKind::ImageDecode(decode) => {
                    if task.has_finished_running() {
                        report.decoded += 1;
                    } else {
                        // Completed without running: nothing was decoded, so
                        // the next round needs a fresh task.
                        self.decode_tasks.remove(decode.image());
                        report.canceled_decodes += 1;
                    }
                }
                TaskKind::TaskSetFinished(_) => {}
            }
        }

        for outcome in lock(&self.outcomes).drain(..) {
            if outcome.was_canceled {
                report.canceled.push(outcome.tile);
            } else {
                report.rastered.push(outcome.tile);
            }
        }

        if !tasks.is_empty() {
            debug!(
                completed = tasks.len(),
                rastered = report.rastered.len(),
                canceled = report.canceled.len(),
                "checked for completed tasks"
            );
        }
        report
    }

    /// Whether the signal of `set` for the latest round has been delivered.
    pub fn is_task_set_finished(&self, set: TaskSet) -> bool {
        lock(&self.finished_rounds)[set.index()] >= self.round
    }

    /// Pump the origin queue until the latest round's signal for `set` fires.
    pub async fn wait_for_task_set(&mut self, set: TaskSet) -> Result<()> {
        self.origin_queue.run_pending();
        while !self.is_task_set_finished(set) {
            if !self.origin_queue.run_next().await {
                return Err(TilegraphError::RunnerShutDown);
            }
        }
        debug!(?set, round = self.round, "done waiting for task set");
        Ok(())
    }

    /// Block until the runner has nothing left running for this manager,
    /// then complete everything on the origin.
    pub fn wait_until_idle(&mut self) -> CompletionReport {
        self.runner.wait_for_tasks_to_finish_running(self.namespace);
        self.origin_queue.run_pending();
        self.check_for_completed_tasks()
    }

    /// Cancel all pending work and drain what is still running.
    pub fn shutdown(&mut self) -> Result<CompletionReport> {
        self.graph.reset();
        let mut report = CompletionReport::default();
        match self.runner.schedule_tasks(self.namespace, &self.graph) {
            Ok(()) => {}
            Err(TilegraphError::RunnerShutDown) => {
                warn!("runner already shut down; completing what it reported");
            }
            Err(e) => return Err(e),
        }
        report.merge(self.wait_until_idle());

        self.decode_tasks.clear();
        if !self.raster_tasks.is_empty() {
            warn!(
                tiles = self.raster_tasks.len(),
                "raster tasks never completed before shutdown"
            );
            self.raster_tasks.clear();
        }
        info!(
            rastered = report.rastered.len(),
            canceled = report.canceled.len(),
            "tile task manager shut down"
        );
        Ok(report)
    }
}
