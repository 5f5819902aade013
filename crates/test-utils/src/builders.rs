#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Context;

use tilegraph::config::{ConfigFile, ImageConfig, ImageItem, RawConfigFile, RectItem};
use tilegraph::graph::{RasterTask, Task};
use tilegraph::raster::{
    Color, DecodedImageStore, ImageId, ImagePattern, PatternImageDecoder, RasterSource,
    RecordedRasterSource, Rect, Size,
};
use tilegraph::scheduler::{SequencedTaskRunner, create_task_set_finished_task};
use tilegraph::types::{ResourceFormat, TileId};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.pool.workers = workers;
        self
    }

    pub fn format(mut self, format: ResourceFormat) -> Self {
        self.config.playback.format = format;
        self
    }

    pub fn tile_size(mut self, width: u32, height: u32) -> Self {
        self.config.playback.tile_width = width;
        self.config.playback.tile_height = height;
        self
    }

    pub fn scene_size(mut self, width: u32, height: u32) -> Self {
        self.config.scene.width = width;
        self.config.scene.height = height;
        self
    }

    pub fn viewport(mut self, viewport: Rect) -> Self {
        self.config.scene.viewport = viewport;
        self
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.config.scene.rounds = rounds;
        self
    }

    pub fn rect(mut self, rect: Rect, color: Color) -> Self {
        self.config.scene.rect.push(RectItem { rect, color });
        self
    }

    pub fn image(mut self, name: &str, width: u32, height: u32, pattern: ImagePattern) -> Self {
        self.config.image.insert(
            name.to_string(),
            ImageConfig {
                width,
                height,
                pattern,
            },
        );
        self
    }

    pub fn draw_image(mut self, name: &str, rect: Rect) -> Self {
        self.config.scene.draw_image.push(ImageItem {
            image: name.to_string(),
            rect,
        });
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    /// Validate the built config, keeping the validation error as the root
    /// cause.
    pub fn try_build(self) -> anyhow::Result<ConfigFile> {
        ConfigFile::try_from(self.config).context("builder produced an invalid config")
    }

    pub fn build(self) -> ConfigFile {
        self.try_build().expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn tile(column: u32, row: u32) -> TileId {
    TileId { column, row }
}

/// Decode task producing a `size` image of one colour into `store`.
pub fn solid_decode_task(
    store: &DecodedImageStore,
    name: &str,
    size: Size,
    color: Color,
) -> Arc<Task> {
    Task::image_decode(
        ImageId::new(name),
        Arc::new(PatternImageDecoder::new(size, ImagePattern::Solid { color })),
        store.clone(),
    )
}

/// Raster task covering `rect` at scale 1 with no reply.
pub fn raster_task(
    tile: TileId,
    source: Arc<dyn RasterSource>,
    rect: Rect,
    decodes: Vec<Arc<Task>>,
) -> Arc<Task> {
    Task::raster(RasterTask::new(tile, source, rect, rect, 1.0, decodes))
}

/// Source that fills its whole area with `color`.
pub fn solid_source(size: Size, color: Color) -> Arc<RecordedRasterSource> {
    Arc::new(RecordedRasterSource::new(size, color, DecodedImageStore::new()))
}

/// Drive `task` through a full run and origin completion, as if an earlier
/// round had already finished it.
pub fn run_to_completion(task: &Task) {
    task.will_run();
    task.run_on_worker_thread();
    task.did_run();
    task.will_complete();
    task.did_complete();
}

/// Task that appends `label` to `log` on the origin once posted and run.
///
/// Posting happens on the worker before any dependent can start, so with a
/// [`ManualTaskRunner`](crate::fakes::ManualTaskRunner) the post order is the
/// run order.
pub fn recording_task(
    runner: Arc<dyn SequencedTaskRunner>,
    log: &Arc<Mutex<Vec<String>>>,
    label: &str,
) -> Arc<Task> {
    let log = Arc::clone(log);
    let label = label.to_string();
    create_task_set_finished_task(runner, move || log.lock().unwrap().push(label))
}
