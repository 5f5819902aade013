// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod raster;
pub mod scheduler;
pub mod tiles;
pub mod types;

mod sync;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{load_from_path, resolve_config_path};
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::raster::RasterSource;
use crate::scheduler::{MemoryBufferProvider, TaskGraphRunner};
use crate::tiles::{PrioritizedTile, TileTaskManager};
use crate::types::{TaskSet, TileId};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, then for every round moves the viewport, queues the
/// tiles that have no valid buffer yet and waits until the tiles required
/// for activation are done. The last round waits for every tile. Finally
/// prints one blake3 digest per tile buffer.
pub async fn run(args: CliArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = resolve_config_path(args.config.as_deref(), &cwd);
    let mut raw = load_from_path(&config_path)?;
    apply_overrides(&mut raw, &args);
    let cfg = ConfigFile::try_from(raw)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let runner = Arc::new(TaskGraphRunner::new(cfg.pool.workers)?);
    let provider = Arc::new(MemoryBufferProvider::new(cfg.playback.format));
    let grid = cfg.grid();
    let mut manager = TileTaskManager::new(
        Arc::clone(&runner),
        provider.clone(),
        cfg.priority,
        grid,
        cfg.scene(),
    );

    let rounds = cfg.scene.rounds;
    for round in 0..rounds {
        let viewport = cfg.viewport_at(round);
        let ready: HashSet<TileId> = provider.ready_tiles().into_iter().collect();
        let queue: Vec<PrioritizedTile> = grid
            .prioritize(viewport)
            .into_iter()
            .filter(|tile| !ready.contains(&tile.tile))
            .collect();

        let report = manager.schedule_tasks(&queue)?;
        let wait_for = if round + 1 == rounds {
            TaskSet::All
        } else {
            TaskSet::RequiredForActivation
        };
        manager.wait_for_task_set(wait_for).await?;
        let completed = manager.check_for_completed_tasks();

        println!(
            "round {}: viewport {:?} queued {} reused {} decodes {} -> rastered {} canceled {}",
            report.round,
            viewport,
            report.tiles,
            report.reused_raster_tasks,
            report.decode_tasks,
            completed.rastered.len(),
            completed.canceled.len()
        );
    }

    let drained = manager.shutdown()?;
    debug!(
        rastered = drained.rastered.len(),
        canceled = drained.canceled.len(),
        "drained remaining work"
    );
    runner.shutdown();

    for tile in provider.ready_tiles() {
        if let Some(buffer) = provider.buffer(tile) {
            println!(
                "tile {tile} {} {}x{} stride {} {}",
                buffer.format,
                buffer.size.width,
                buffer.size.height,
                buffer.stride,
                blake3::hash(&buffer.pixels).to_hex()
            );
        }
    }

    info!(
        tiles = provider.ready_tiles().len(),
        acquired = provider.acquired_count(),
        discarded = provider.discarded_count(),
        "raster complete"
    );
    Ok(())
}

fn apply_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(rounds) = args.rounds {
        raw.scene.rounds = rounds;
    }
    if let Some(workers) = args.workers {
        raw.pool.workers = workers;
    }
    if let Some(format) = args.format {
        raw.playback.format = format;
    }
}

/// Print the tiling and the first round's queue without rastering.
fn print_dry_run(cfg: &ConfigFile) {
    let grid = cfg.grid();
    let scene = cfg.scene();

    println!("tilegraph dry-run");
    println!("  pool.workers = {}", cfg.pool.workers);
    println!(
        "  priority = benchmark {} / task_set_finished {} / tile {}",
        cfg.priority.benchmark, cfg.priority.task_set_finished_base, cfg.priority.tile_task_base
    );
    println!(
        "  playback = {} tiles {}x{} scale {}",
        cfg.playback.format, cfg.playback.tile_width, cfg.playback.tile_height, cfg.playback.scale
    );
    println!(
        "  scene = {}x{} rounds {} ({} rects, {} images)",
        cfg.scene.width,
        cfg.scene.height,
        cfg.scene.rounds,
        cfg.scene.rect.len(),
        cfg.scene.draw_image.len()
    );
    println!();

    println!("tiles ({}):", grid.len());
    for (order, tile) in grid.prioritize(cfg.viewport_at(0)).iter().enumerate() {
        let rect = grid.tile_rect(tile.tile);
        let sets: Vec<String> = tile.sets.iter().map(|set| format!("{set:?}")).collect();
        let images: Vec<String> = scene
            .source
            .images_in_rect(rect, grid.scale())
            .iter()
            .map(|image| image.to_string())
            .collect();
        println!(
            "  - {} priority {} rect {:?}",
            tile.tile,
            cfg.priority.tile_task_priority(order),
            rect
        );
        println!("      sets: {}", sets.join(", "));
        if !images.is_empty() {
            println!("      images: {}", images.join(", "));
        }
    }

    debug!("dry-run complete (no raster)");
}
