// tests/tile_manager.rs

use std::collections::HashSet;
use std::sync::Arc;

use tilegraph::config::ConfigFile;
use tilegraph::graph::TaskKind;
use tilegraph::raster::{Color, ImageDecoder, ImagePattern, Rect, playback_to_memory};
use tilegraph::scheduler::{MemoryBufferProvider, TaskGraphRunner};
use tilegraph::tiles::{PrioritizedTile, TileTaskManager};
use tilegraph::types::{ResourceFormat, TaskSet, TileId};
use tilegraph_test_utils::builders::ConfigFileBuilder;
use tilegraph_test_utils::{init_tracing, with_timeout};

fn config(workers: usize, format: ResourceFormat) -> ConfigFile {
    ConfigFileBuilder::new()
        .workers(workers)
        .format(format)
        .scene_size(96, 64)
        .tile_size(32, 32)
        .viewport(Rect::new(0, 0, 40, 32))
        .rect(Rect::new(8, 8, 70, 40), Color::rgba(180, 40, 40, 255))
        .image(
            "checker",
            4,
            4,
            ImagePattern::Checker {
                cell: 1,
                a: Color::BLACK,
                b: Color::rgba(0, 0, 255, 128),
            },
        )
        .image(
            "fade",
            8,
            2,
            ImagePattern::HorizontalGradient {
                from: Color::WHITE,
                to: Color::rgba(0, 0, 0, 0),
            },
        )
        .draw_image("checker", Rect::new(20, 20, 30, 30))
        .draw_image("fade", Rect::new(60, 4, 30, 10))
        .build()
}

struct Harness {
    cfg: ConfigFile,
    runner: Arc<TaskGraphRunner>,
    provider: Arc<MemoryBufferProvider>,
    manager: TileTaskManager,
}

fn harness(workers: usize, format: ResourceFormat) -> Harness {
    init_tracing();
    let cfg = config(workers, format);
    let runner = Arc::new(TaskGraphRunner::new(cfg.pool.workers).unwrap());
    let provider = Arc::new(MemoryBufferProvider::new(format));
    let manager = TileTaskManager::new(
        Arc::clone(&runner),
        provider.clone(),
        cfg.priority,
        cfg.grid(),
        cfg.scene(),
    );
    Harness {
        cfg,
        runner,
        provider,
        manager,
    }
}

fn full_queue(h: &Harness) -> Vec<PrioritizedTile> {
    h.cfg.grid().prioritize(h.cfg.viewport_at(0))
}

#[tokio::test]
async fn every_tile_rasters_and_matches_direct_playback() {
    let mut h = harness(3, ResourceFormat::Bgra8888);
    let queue = full_queue(&h);
    assert_eq!(queue.len(), 6);

    let report = h.manager.schedule_tasks(&queue).unwrap();
    assert_eq!(report.tiles, 6);
    assert_eq!(report.decode_tasks, 2);
    assert_eq!(report.newly_scheduled, report.nodes);

    with_timeout(h.manager.wait_for_task_set(TaskSet::All))
        .await
        .unwrap();
    let done = h.manager.wait_until_idle();
    assert_eq!(done.rastered.len(), 6);
    assert!(done.canceled.is_empty());
    assert_eq!(done.decoded, 2);

    let grid = h.cfg.grid();
    let source = h.cfg.scene();
    // Decode into the reference store so both sides draw the images.
    for (id, decoder) in &source.decoders {
        source.images.insert(id.clone(), Arc::new(decoder.decode()));
    }
    for tile in grid.tiles() {
        let buffer = h.provider.buffer(tile).expect("tile rastered");
        let rect = grid.tile_rect(tile);
        let mut expected = vec![0u8; buffer.pixels.len()];
        playback_to_memory(
            &mut expected,
            ResourceFormat::Bgra8888,
            rect.size(),
            buffer.stride,
            source.source.as_ref(),
            rect,
            rect,
            grid.scale(),
        );
        assert_eq!(buffer.pixels, expected, "tile {tile}");
    }
}

#[tokio::test]
async fn completion_signals_sit_between_benchmark_and_tile_priorities() {
    let mut h = harness(2, ResourceFormat::Rgba8888);
    let queue = full_queue(&h);
    h.manager.schedule_tasks(&queue).unwrap();

    let bands = h.cfg.priority;
    let graph = h.manager.graph();
    let min_tile_priority = graph
        .nodes()
        .iter()
        .filter(|node| !matches!(node.task().kind(), TaskKind::TaskSetFinished(_)))
        .map(|node| node.priority())
        .min()
        .unwrap();

    let signals: Vec<_> = graph
        .nodes()
        .iter()
        .filter(|node| matches!(node.task().kind(), TaskKind::TaskSetFinished(_)))
        .collect();
    assert_eq!(signals.len(), 3);
    for node in signals {
        assert!(node.priority() > bands.benchmark);
        assert!(node.priority() < min_tile_priority);
        assert!(bands.is_task_set_finished_priority(node.priority()));
    }

    // One edge per set membership: 2 visible tiles join three sets, 4 join one.
    assert_eq!(
        graph.edges().len() - graph_decode_edges(graph),
        2 * 3 + 4
    );
    h.manager.shutdown().unwrap();
}

fn graph_decode_edges(graph: &tilegraph::graph::TaskGraph) -> usize {
    graph
        .edges()
        .iter()
        .filter(|edge| {
            graph
                .node_for(edge.dependency)
                .is_some_and(|node| matches!(node.task().kind(), TaskKind::ImageDecode(_)))
        })
        .count()
}

#[tokio::test]
async fn activation_set_finishes_with_visible_tiles() {
    let mut h = harness(2, ResourceFormat::Rgba8888);
    let queue = full_queue(&h);
    let visible: HashSet<TileId> = queue
        .iter()
        .filter(|tile| tile.sets.contains(TaskSet::RequiredForActivation))
        .map(|tile| tile.tile)
        .collect();
    assert_eq!(visible.len(), 2);

    h.manager.schedule_tasks(&queue).unwrap();
    with_timeout(h.manager.wait_for_task_set(TaskSet::RequiredForActivation))
        .await
        .unwrap();
    assert!(h.manager.is_task_set_finished(TaskSet::RequiredForActivation));

    let mut rastered = HashSet::new();
    let report = h.manager.shutdown().unwrap();
    rastered.extend(report.rastered.iter().copied());
    for tile in &visible {
        assert!(rastered.contains(tile), "visible tile {tile} was not rastered");
    }
    assert_eq!(report.rastered.len() + report.canceled.len(), 6);
}

#[tokio::test]
async fn in_flight_raster_tasks_are_reused_across_rounds() {
    let mut h = harness(1, ResourceFormat::Rgba8888);
    let queue = full_queue(&h);

    let first = h.manager.schedule_tasks(&queue).unwrap();
    let second = h.manager.schedule_tasks(&queue).unwrap();

    assert_eq!(first.reused_raster_tasks, 0);
    assert_eq!(second.reused_raster_tasks, queue.len());
    // Nothing is scheduled on the origin twice.
    assert_eq!(second.newly_scheduled, 3);
    assert_eq!(h.manager.in_flight_tiles().len(), queue.len());

    with_timeout(h.manager.wait_for_task_set(TaskSet::All))
        .await
        .unwrap();
    let done = h.manager.wait_until_idle();
    assert_eq!(done.rastered.len(), queue.len());
    assert!(h.manager.in_flight_tiles().is_empty());
    assert_eq!(h.provider.acquired_count(), queue.len());
}

#[tokio::test]
async fn decoded_images_are_not_scheduled_again() {
    let mut h = harness(2, ResourceFormat::Rgba8888);
    let queue = full_queue(&h);
    h.manager.schedule_tasks(&queue).unwrap();
    with_timeout(h.manager.wait_for_task_set(TaskSet::All))
        .await
        .unwrap();
    h.manager.wait_until_idle();

    // Re-raster everything; decodes already completed.
    let again = h.manager.schedule_tasks(&queue).unwrap();
    assert_eq!(again.decode_tasks, 0);
    assert_eq!(again.reused_raster_tasks, 0);
    with_timeout(h.manager.wait_for_task_set(TaskSet::All))
        .await
        .unwrap();
    let done = h.manager.wait_until_idle();
    assert_eq!(done.decoded, 0);
    assert_eq!(done.rastered.len(), queue.len());
}

#[tokio::test]
async fn dropping_tiles_from_the_queue_cancels_them() {
    let mut h = harness(1, ResourceFormat::Rgba8888);
    let queue = full_queue(&h);
    h.manager.schedule_tasks(&queue).unwrap();
    h.manager.schedule_tasks(&queue[..1]).unwrap();

    with_timeout(h.manager.wait_for_task_set(TaskSet::All))
        .await
        .unwrap();
    let done = h.manager.wait_until_idle();

    assert!(done.rastered.contains(&queue[0].tile));
    assert_eq!(done.rastered.len() + done.canceled.len(), queue.len());
    assert_eq!(h.provider.discarded_count(), done.canceled.len());
    assert_eq!(h.provider.ready_tiles().len(), done.rastered.len());
}

#[tokio::test]
async fn empty_queue_signals_every_set_immediately() {
    let mut h = harness(1, ResourceFormat::Rgba8888);
    let report = h.manager.schedule_tasks(&[]).unwrap();
    assert_eq!(report.nodes, 3);

    for set in TaskSet::ALL {
        with_timeout(h.manager.wait_for_task_set(set)).await.unwrap();
    }
    h.manager.shutdown().unwrap();
    h.runner.shutdown();
}
