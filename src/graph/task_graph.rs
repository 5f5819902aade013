// src/graph/task_graph.rs

//! Node + edge description of one scheduling round.
//!
//! The graph is built on the origin thread and handed to the
//! [`TaskGraphRunner`](crate::scheduler::TaskGraphRunner), which copies what it
//! needs. Nodes hold a shared reference to their task; edges refer to tasks by
//! identity.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::trace;

use crate::errors::{Result, TilegraphError};
use crate::graph::priority::Priority;
use crate::graph::task::{Task, TaskId};

#[derive(Debug, Clone)]
pub struct Node {
    task: Arc<Task>,
    priority: Priority,
    dependencies: u32,
}

impl Node {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Number of unresolved incoming edges.
    pub fn dependencies(&self) -> u32 {
        self.dependencies
    }
}

/// `dependency` must finish running before `dependent` may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub dependency: TaskId,
    pub dependent: TaskId,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.index.contains_key(&task)
    }

    pub fn node_for(&self, task: TaskId) -> Option<&Node> {
        self.index.get(&task).map(|&i| &self.nodes[i])
    }

    pub fn edges_into(&self, task: TaskId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.dependent == task)
    }

    pub fn edges_from(&self, task: TaskId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.dependency == task)
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.index.clear();
    }

    /// Append a node for `task`.
    ///
    /// Inserting a task that already has a node is a caller bug and panics in
    /// debug builds.
    pub fn insert_node_for_task(&mut self, task: &Arc<Task>, priority: Priority, dependencies: u32) {
        debug_assert!(
            !self.contains(task.id()),
            "{} ({}) inserted into the task graph twice",
            task.id(),
            task.kind().name()
        );

        trace!(task = %task.id(), kind = task.kind().name(), priority, dependencies, "insert node");
        self.index.insert(task.id(), self.nodes.len());
        self.nodes.push(Node {
            task: Arc::clone(task),
            priority,
            dependencies,
        });
    }

    /// Append an edge. The dependency must already have a node.
    pub fn insert_edge(&mut self, dependency: &Task, dependent: &Task) {
        debug_assert!(
            self.contains(dependency.id()),
            "edge {} -> {} inserted before its dependency node",
            dependency.id(),
            dependent.id()
        );

        self.edges.push(Edge {
            dependency: dependency.id(),
            dependent: dependent.id(),
        });
    }

    /// Insert `raster_task` together with the decode tasks it reads from.
    ///
    /// Decode tasks that already completed are skipped entirely: no node, no
    /// edge, no dependency. The rest get a node at `priority` (unless already
    /// present) and an edge into the raster task, whose node ends up with one
    /// dependency per outstanding decode.
    pub fn insert_nodes_for_raster_task(
        &mut self,
        raster_task: &Arc<Task>,
        decode_tasks: &[Arc<Task>],
        priority: Priority,
    ) {
        let mut dependencies = 0u32;

        for decode_task in decode_tasks {
            if decode_task.has_completed() {
                continue;
            }

            dependencies += 1;

            if !self.contains(decode_task.id()) {
                self.insert_node_for_task(decode_task, priority, 0);
            }

            self.insert_edge(decode_task, raster_task);
        }

        self.insert_node_for_task(raster_task, priority, dependencies);
    }

    /// Resolve every outgoing edge of `task`, returning the dependents whose
    /// dependency count dropped to zero.
    pub fn process_completed_dependency(&mut self, task: TaskId) -> Vec<TaskId> {
        let dependents: Vec<TaskId> = self.edges_from(task).map(|edge| edge.dependent).collect();

        let mut ready = Vec::new();
        for dependent in dependents {
            let Some(&i) = self.index.get(&dependent) else {
                continue;
            };
            let node = &mut self.nodes[i];
            if node.dependencies > 0 {
                node.dependencies -= 1;
                if node.dependencies == 0 {
                    ready.push(dependent);
                }
            }
        }
        ready
    }

    /// Check that every edge endpoint has a node and that there are no cycles.
    pub fn validate(&self) -> Result<()> {
        let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();

        for node in &self.nodes {
            graph.add_node(node.task.id());
        }

        for edge in &self.edges {
            for endpoint in [edge.dependency, edge.dependent] {
                if !self.contains(endpoint) {
                    return Err(TilegraphError::MissingNode(endpoint));
                }
            }
            graph.add_edge(edge.dependency, edge.dependent, ());
        }

        toposort(&graph, None).map(|_| ()).map_err(|cycle| {
            TilegraphError::GraphCycle(format!("cycle detected involving {}", cycle.node_id()))
        })
    }
}
