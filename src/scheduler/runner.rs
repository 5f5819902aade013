// src/scheduler/runner.rs

//! Fixed pool of worker threads executing task graphs.
//!
//! Every namespace owns at most one live graph generation. Workers pick the
//! lowest priority value across all namespaces, breaking ties by the order in
//! which nodes became ready. Dependency counters are decremented by the worker
//! that finished the dependency, outside the runner lock; everything else
//! (phase transitions, queue updates, graph replacement) happens under it.
//!
//! Replacing a namespace's graph never interrupts a running task. Tasks of the
//! old graph that have not started and are absent from the new one are
//! canceled: they move straight to the completed list without running.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, trace};

use crate::errors::{Result, TilegraphError};
use crate::graph::{Priority, Task, TaskGraph, TaskId, TaskPhase};
use crate::sync::lock;

/// Identifies one client of a [`TaskGraphRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceToken(u64);

impl fmt::Display for NamespaceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns#{}", self.0)
    }
}

struct ScheduledNode {
    task: Arc<Task>,
    priority: Priority,
    dependencies: AtomicU32,
}

/// Runner-owned copy of one scheduled graph.
struct Generation {
    nodes: Vec<ScheduledNode>,
    /// Outgoing edges by node index.
    dependents: Vec<Vec<usize>>,
    index: HashMap<TaskId, usize>,
}

impl Generation {
    /// Copy `graph`, discounting edges whose dependency already ran.
    fn build(graph: &TaskGraph) -> Self {
        let mut index = HashMap::with_capacity(graph.len());
        let mut nodes = Vec::with_capacity(graph.len());
        for (i, node) in graph.nodes().iter().enumerate() {
            index.insert(node.task().id(), i);
            nodes.push(ScheduledNode {
                task: Arc::clone(node.task()),
                priority: node.priority(),
                dependencies: AtomicU32::new(node.dependencies()),
            });
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        for edge in graph.edges() {
            let (Some(&from), Some(&to)) = (index.get(&edge.dependency), index.get(&edge.dependent))
            else {
                continue;
            };
            if is_resolved(&nodes[from].task) {
                release_one(&nodes[to].dependencies);
            } else {
                dependents[from].push(to);
            }
        }

        Self {
            nodes,
            dependents,
            index,
        }
    }
}

/// Has run, or was completed on the origin without running.
fn is_resolved(task: &Task) -> bool {
    task.has_finished_running() || task.has_completed()
}

/// Decrement a dependency counter without wrapping. Returns true for the
/// decrement that reached zero.
fn release_one(dependencies: &AtomicU32) -> bool {
    dependencies
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        == Ok(1)
}

struct ReadyEntry {
    priority: Priority,
    sequence: u64,
    namespace: NamespaceToken,
    generation: Arc<Generation>,
    node: usize,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    // BinaryHeap pops the greatest entry; lower priority values and earlier
    // sequence numbers must compare greater.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Namespace {
    generation: Arc<Generation>,
    running: Vec<Arc<Task>>,
    completed: Vec<Arc<Task>>,
    /// Nodes of the live generation that have not finished running.
    remaining: usize,
}

impl Namespace {
    fn new() -> Self {
        Self {
            generation: Arc::new(Generation::build(&TaskGraph::new())),
            running: Vec::new(),
            completed: Vec::new(),
            remaining: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.remaining == 0 && self.running.is_empty()
    }
}

struct RunnerState {
    namespaces: HashMap<NamespaceToken, Namespace>,
    ready: BinaryHeap<ReadyEntry>,
    next_sequence: u64,
    shutdown: bool,
}

impl RunnerState {
    fn push_ready(&mut self, namespace: NamespaceToken, generation: &Arc<Generation>, node: usize) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ready.push(ReadyEntry {
            priority: generation.nodes[node].priority,
            sequence,
            namespace,
            generation: Arc::clone(generation),
            node,
        });
    }

    /// Pop the best entry that still belongs to a live generation and whose
    /// task has not started.
    fn pop_runnable(&mut self) -> Option<ReadyEntry> {
        while let Some(entry) = self.ready.pop() {
            let live = self
                .namespaces
                .get(&entry.namespace)
                .is_some_and(|ns| Arc::ptr_eq(&ns.generation, &entry.generation));
            if !live {
                continue;
            }
            let task = &entry.generation.nodes[entry.node].task;
            if task.phase() >= TaskPhase::Running {
                continue;
            }
            return Some(entry);
        }
        None
    }
}

struct Shared {
    state: Mutex<RunnerState>,
    has_ready_tasks: Condvar,
    has_namespaces_with_finished_running_tasks: Condvar,
    next_namespace: AtomicU64,
}

impl Shared {
    fn wait<'a>(&self, cvar: &Condvar, guard: MutexGuard<'a, RunnerState>) -> MutexGuard<'a, RunnerState> {
        cvar.wait(guard).unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Executes [`TaskGraph`]s on a fixed pool of worker threads.
pub struct TaskGraphRunner {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl fmt::Debug for TaskGraphRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraphRunner")
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}

impl TaskGraphRunner {
    /// Spawn `worker_count` worker threads.
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(TilegraphError::ConfigError(
                "task graph runner needs at least one worker".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(RunnerState {
                namespaces: HashMap::new(),
                ready: BinaryHeap::new(),
                next_sequence: 0,
                shutdown: false,
            }),
            has_ready_tasks: Condvar::new(),
            has_namespaces_with_finished_running_tasks: Condvar::new(),
            next_namespace: AtomicU64::new(1),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("tilegraph-worker-{i}"))
                .spawn(move || run_worker(&shared, i))?;
            workers.push(handle);
        }
        info!(workers = worker_count, "task graph runner started");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn generate_namespace_token(&self) -> NamespaceToken {
        let token = NamespaceToken(self.shared.next_namespace.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.state)
            .namespaces
            .insert(token, Namespace::new());
        token
    }

    /// Replace the graph of `token`.
    ///
    /// Running tasks keep running. Tasks that already finished running are
    /// not run again and their outgoing edges count as resolved. Tasks of the
    /// previous graph that never started and are not part of `graph` are
    /// canceled into the completed list.
    pub fn schedule_tasks(&self, token: NamespaceToken, graph: &TaskGraph) -> Result<()> {
        graph.validate()?;

        let mut state = lock(&self.shared.state);
        if state.shutdown {
            return Err(TilegraphError::RunnerShutDown);
        }

        let generation = Arc::new(Generation::build(graph));
        let ns = state.namespaces.entry(token).or_insert_with(Namespace::new);

        // A canceled task that reappears before being collected runs after all.
        ns.completed
            .retain(|task| task.has_finished_running() || !generation.index.contains_key(&task.id()));

        let mut canceled = 0usize;
        for node in &ns.generation.nodes {
            let task = &node.task;
            if generation.index.contains_key(&task.id())
                || task.phase() >= TaskPhase::Running
                || task.has_completed()
                || ns.completed.iter().any(|done| done.id() == task.id())
            {
                continue;
            }
            ns.completed.push(Arc::clone(task));
            canceled += 1;
        }

        let mut remaining = 0usize;
        let mut ready = Vec::new();
        for (i, node) in generation.nodes.iter().enumerate() {
            let task = &node.task;
            if is_resolved(task) {
                continue;
            }
            remaining += 1;
            if task.phase() < TaskPhase::Running && node.dependencies.load(Ordering::Acquire) == 0 {
                ready.push(i);
            }
        }

        ns.generation = Arc::clone(&generation);
        ns.remaining = remaining;
        let idle = ns.is_idle();

        for &i in &ready {
            state.push_ready(token, &generation, i);
        }

        debug!(
            namespace = %token,
            nodes = graph.len(),
            edges = graph.edges().len(),
            ready = ready.len(),
            canceled,
            "scheduled task graph"
        );

        drop(state);
        if !ready.is_empty() {
            self.shared.has_ready_tasks.notify_all();
        }
        if idle || canceled > 0 {
            self.shared
                .has_namespaces_with_finished_running_tasks
                .notify_all();
        }
        Ok(())
    }

    /// Block until every task of the current graph of `token` has finished
    /// running and no task of an earlier graph is still running.
    pub fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken) {
        let mut state = lock(&self.shared.state);
        loop {
            let idle = state.namespaces.get(&token).is_none_or(Namespace::is_idle);
            if idle || state.shutdown {
                return;
            }
            state = self
                .shared
                .wait(&self.shared.has_namespaces_with_finished_running_tasks, state);
        }
    }

    /// Take the tasks of `token` that finished running or were canceled since
    /// the last call.
    pub fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<Arc<Task>> {
        let mut state = lock(&self.shared.state);
        state
            .namespaces
            .get_mut(&token)
            .map(|ns| std::mem::take(&mut ns.completed))
            .unwrap_or_default()
    }

    /// Stop the workers and join them. Tasks that have not started are
    /// abandoned. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.ready.clear();
        }
        self.shared.has_ready_tasks.notify_all();
        self.shared
            .has_namespaces_with_finished_running_tasks
            .notify_all();

        let workers = std::mem::take(&mut *lock(&self.workers));
        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "worker thread panicked");
            }
        }
        info!("task graph runner shut down");
    }
}

impl Drop for TaskGraphRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared, worker: usize) {
    trace!(worker, "worker started");
    loop {
        let (entry, task) = {
            let mut state = lock(&shared.state);
            let entry = loop {
                if state.shutdown {
                    trace!(worker, "worker exiting");
                    return;
                }
                if let Some(entry) = state.pop_runnable() {
                    break entry;
                }
                state = shared.wait(&shared.has_ready_tasks, state);
            };

            let task = Arc::clone(&entry.generation.nodes[entry.node].task);
            task.will_run();
            if let Some(ns) = state.namespaces.get_mut(&entry.namespace) {
                ns.running.push(Arc::clone(&task));
            }
            (entry, task)
        };

        trace!(worker, task = %task.id(), kind = task.kind().name(), priority = entry.generation.nodes[entry.node].priority, "running task");
        if catch_unwind(AssertUnwindSafe(|| task.run_on_worker_thread())).is_err() {
            error!(worker, task = %task.id(), kind = task.kind().name(), "task panicked on worker thread");
        }

        let newly_ready: Vec<usize> = entry.generation.dependents[entry.node]
            .iter()
            .copied()
            .filter(|&dependent| release_one(&entry.generation.nodes[dependent].dependencies))
            .collect();

        let mut state = lock(&shared.state);
        task.did_run();

        let Some(ns) = state.namespaces.get_mut(&entry.namespace) else {
            continue;
        };
        ns.running.retain(|running| running.id() != task.id());
        ns.completed.push(Arc::clone(&task));

        // The graph may have been replaced while the task ran. The new
        // generation counted this task as an unresolved dependency, so its
        // edges are released there instead.
        let current = Arc::clone(&ns.generation);
        let ready: Vec<usize> = if Arc::ptr_eq(&current, &entry.generation) {
            ns.remaining = ns.remaining.saturating_sub(1);
            newly_ready
        } else if let Some(&i) = current.index.get(&task.id()) {
            ns.remaining = ns.remaining.saturating_sub(1);
            current.dependents[i]
                .iter()
                .copied()
                .filter(|&dependent| release_one(&current.nodes[dependent].dependencies))
                .collect()
        } else {
            Vec::new()
        };
        let idle = ns.is_idle();

        for &i in &ready {
            state.push_ready(entry.namespace, &current, i);
        }
        drop(state);

        if !ready.is_empty() {
            shared.has_ready_tasks.notify_all();
        }
        if idle {
            shared.has_namespaces_with_finished_running_tasks.notify_all();
        }
    }
}
