// tests/runner.rs

use std::sync::{Arc, Mutex};

use tilegraph::errors::TilegraphError;
use tilegraph::graph::{Task, TaskGraph, TaskPhase};
use tilegraph::raster::{
    Color, DecodedImageStore, DisplayItem, ImageId, RecordedRasterSource, Rect, Size,
};
use tilegraph::scheduler::{
    SequencedTaskRunner, TaskGraphRunner, complete_tasks_on_origin_thread,
    schedule_tasks_on_origin_thread,
};
use tilegraph::types::ResourceFormat;
use tilegraph_test_utils::builders::{raster_task, recording_task, solid_decode_task, tile};
use tilegraph_test_utils::fakes::{ManualTaskRunner, RecordingBufferProvider, gate};
use tilegraph_test_utils::init_tracing;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn drained(origin: &ManualTaskRunner, log: &Log) -> Vec<String> {
    origin.run_all();
    std::mem::take(&mut *log.lock().unwrap())
}

#[test]
fn ready_tasks_run_in_priority_order() {
    init_tracing();
    let runner = TaskGraphRunner::new(1).unwrap();
    let ns = runner.generate_namespace_token();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let mut graph = TaskGraph::new();
    for (label, priority) in [("low", 9), ("high", 1), ("mid", 5), ("mid-later", 5)] {
        graph.insert_node_for_task(&recording_task(origin.clone(), &log, label), priority, 0);
    }
    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    assert_eq!(drained(&origin, &log), vec!["high", "mid", "mid-later", "low"]);
    assert_eq!(runner.collect_completed_tasks(ns).len(), 4);
    assert!(runner.collect_completed_tasks(ns).is_empty());
}

#[test]
fn dependency_outranks_priority() {
    let runner = TaskGraphRunner::new(2).unwrap();
    let ns = runner.generate_namespace_token();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let decode = recording_task(origin.clone(), &log, "dependency");
    let dependent = recording_task(origin.clone(), &log, "dependent");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&decode, 20, 0);
    graph.insert_node_for_task(&dependent, 0, 1);
    graph.insert_edge(&decode, &dependent);

    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    assert_eq!(drained(&origin, &log), vec!["dependency", "dependent"]);
    assert!(dependent.has_finished_running());
}

#[test]
fn join_waits_for_every_sibling() {
    let runner = TaskGraphRunner::new(4).unwrap();
    let ns = runner.generate_namespace_token();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let join = recording_task(origin.clone(), &log, "join");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&join, 1, 8);
    for i in 0..8 {
        let sibling = recording_task(origin.clone(), &log, &format!("sibling-{i}"));
        graph.insert_node_for_task(&sibling, 4 + i, 0);
        graph.insert_edge(&sibling, &join);
    }

    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    let order = drained(&origin, &log);
    assert_eq!(order.len(), 9);
    assert_eq!(order.last().map(String::as_str), Some("join"));
}

#[test]
fn decode_feeds_raster_playback() {
    let runner = TaskGraphRunner::new(3).unwrap();
    let ns = runner.generate_namespace_token();
    let client = RecordingBufferProvider::new(ResourceFormat::Rgba8888);

    let store = DecodedImageStore::new();
    let decode = solid_decode_task(&store, "logo", Size::new(2, 2), Color::rgba(0, 0, 255, 255));
    let source = Arc::new(
        RecordedRasterSource::new(Size::new(8, 8), Color::WHITE, store.clone()).with_item(
            DisplayItem::DrawImage {
                image: ImageId::new("logo"),
                rect: Rect::new(0, 0, 4, 4),
            },
        ),
    );
    let raster = raster_task(tile(0, 0), source, Rect::new(0, 0, 8, 8), vec![Arc::clone(&decode)]);

    let mut graph = TaskGraph::new();
    graph.insert_nodes_for_raster_task(&raster, &[Arc::clone(&decode)], 4);
    schedule_tasks_on_origin_thread(&client, &graph);
    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    let completed = runner.collect_completed_tasks(ns);
    assert_eq!(completed.len(), 2);
    complete_tasks_on_origin_thread(&client, &completed);

    let buffer = client.released_buffer(tile(0, 0)).unwrap();
    let px = |x: usize, y: usize| &buffer.pixels[y * buffer.stride + x * 4..][..4];
    assert_eq!(px(1, 1), &[0, 0, 255, 255]);
    assert_eq!(px(6, 6), &[255, 255, 255, 255]);
}

#[test]
fn replaced_graph_cancels_tasks_that_never_started() {
    let runner = TaskGraphRunner::new(1).unwrap();
    let ns = runner.generate_namespace_token();
    let (gate_runner, gate) = gate();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let blocker = recording_task(gate_runner, &log, "blocker");
    let pending = recording_task(origin.clone(), &log, "pending");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&blocker, 1, 0);
    graph.insert_node_for_task(&pending, 2, 0);
    runner.schedule_tasks(ns, &graph).unwrap();
    gate.wait_started();

    runner.schedule_tasks(ns, &TaskGraph::new()).unwrap();
    let canceled = runner.collect_completed_tasks(ns);
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].id(), pending.id());
    assert_eq!(blocker.phase(), TaskPhase::Running);

    gate.open();
    runner.wait_for_tasks_to_finish_running(ns);
    let finished = runner.collect_completed_tasks(ns);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id(), blocker.id());
    assert!(!pending.has_finished_running());
    assert_eq!(drained(&origin, &log), vec!["blocker"]);
}

#[test]
fn dependents_of_a_running_task_survive_replacement() {
    let runner = TaskGraphRunner::new(2).unwrap();
    let ns = runner.generate_namespace_token();
    let (gate_runner, gate) = gate();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let blocker = recording_task(gate_runner, &log, "blocker");
    let follower = recording_task(origin.clone(), &log, "follower");
    let build = || {
        let mut graph = TaskGraph::new();
        graph.insert_node_for_task(&blocker, 3, 0);
        graph.insert_node_for_task(&follower, 4, 1);
        graph.insert_edge(&blocker, &follower);
        graph
    };

    runner.schedule_tasks(ns, &build()).unwrap();
    gate.wait_started();
    runner.schedule_tasks(ns, &build()).unwrap();
    gate.open();
    runner.wait_for_tasks_to_finish_running(ns);

    origin.run_all();
    assert_eq!(*log.lock().unwrap(), vec!["blocker", "follower"]);
    assert_eq!(runner.collect_completed_tasks(ns).len(), 2);
}

#[test]
fn finished_dependency_is_not_run_again() {
    let runner = TaskGraphRunner::new(2).unwrap();
    let ns = runner.generate_namespace_token();
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let first = recording_task(origin.clone(), &log, "first");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&first, 4, 0);
    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    let second = recording_task(origin.clone(), &log, "second");
    graph.reset();
    graph.insert_node_for_task(&first, 4, 0);
    graph.insert_node_for_task(&second, 5, 1);
    graph.insert_edge(&first, &second);
    runner.schedule_tasks(ns, &graph).unwrap();
    runner.wait_for_tasks_to_finish_running(ns);

    assert_eq!(drained(&origin, &log), vec!["first", "second"]);
}

#[test]
fn namespaces_are_independent() {
    let runner = TaskGraphRunner::new(2).unwrap();
    let (ns_a, ns_b) = (
        runner.generate_namespace_token(),
        runner.generate_namespace_token(),
    );
    assert_ne!(ns_a, ns_b);
    let origin = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let a = recording_task(origin.clone(), &log, "a");
    let b = recording_task(origin.clone(), &log, "b");
    let mut graph_a = TaskGraph::new();
    graph_a.insert_node_for_task(&a, 4, 0);
    let mut graph_b = TaskGraph::new();
    graph_b.insert_node_for_task(&b, 4, 0);

    runner.schedule_tasks(ns_a, &graph_a).unwrap();
    runner.schedule_tasks(ns_b, &graph_b).unwrap();
    runner.wait_for_tasks_to_finish_running(ns_a);
    runner.wait_for_tasks_to_finish_running(ns_b);

    let done_a = runner.collect_completed_tasks(ns_a);
    let done_b = runner.collect_completed_tasks(ns_b);
    assert_eq!(done_a.len(), 1);
    assert_eq!(done_a[0].id(), a.id());
    assert_eq!(done_b[0].id(), b.id());
}

#[test]
fn invalid_graph_is_rejected_before_replacing() {
    let runner = TaskGraphRunner::new(1).unwrap();
    let ns = runner.generate_namespace_token();
    let origin: Arc<dyn SequencedTaskRunner> = Arc::new(ManualTaskRunner::new());
    let log = new_log();

    let first = recording_task(Arc::clone(&origin), &log, "first");
    let second = recording_task(Arc::clone(&origin), &log, "second");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&first, 4, 1);
    graph.insert_node_for_task(&second, 4, 1);
    graph.insert_edge(&first, &second);
    graph.insert_edge(&second, &first);

    let result = runner.schedule_tasks(ns, &graph);
    assert!(matches!(result, Err(TilegraphError::GraphCycle(_))));
    assert_eq!(first.phase(), TaskPhase::Created);
}

#[test]
fn shutdown_rejects_new_graphs_and_zero_workers_is_an_error() {
    assert!(matches!(
        TaskGraphRunner::new(0),
        Err(TilegraphError::ConfigError(_))
    ));

    let runner = TaskGraphRunner::new(2).unwrap();
    let ns = runner.generate_namespace_token();
    runner.shutdown();
    runner.shutdown();

    let task: Arc<Task> = recording_task(Arc::new(ManualTaskRunner::new()), &new_log(), "late");
    let mut graph = TaskGraph::new();
    graph.insert_node_for_task(&task, 4, 0);
    assert!(matches!(
        runner.schedule_tasks(ns, &graph),
        Err(TilegraphError::RunnerShutDown)
    ));
    // Returns immediately once shut down.
    runner.wait_for_tasks_to_finish_running(ns);
}
