// src/graph/priority.rs

//! Priority bands used when building a task graph.
//!
//! Lower numeric values run first. The space is split into three disjoint
//! bands:
//!
//! ```text
//! benchmark < task_set_finished_base .. +NUMBER_OF_TASK_SETS <= tile_task_base ..
//! ```
//!
//! A completion signal sits in a more urgent band than ordinary tile work, so
//! it is picked up as soon as the raster tasks it waits on have finished.

use serde::Deserialize;

use crate::errors::{Result, TilegraphError};
use crate::types::{NUMBER_OF_TASK_SETS, TaskSet};

/// Numeric priority of a graph node.
pub type Priority = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PriorityBands {
    /// Most urgent priority, reserved for benchmark work.
    pub benchmark: Priority,
    /// First priority of the completion-signal band.
    pub task_set_finished_base: Priority,
    /// First priority of the ordinary tile task band.
    pub tile_task_base: Priority,
}

impl Default for PriorityBands {
    fn default() -> Self {
        Self {
            benchmark: 0,
            task_set_finished_base: 1,
            tile_task_base: 1 + NUMBER_OF_TASK_SETS as Priority,
        }
    }
}

impl PriorityBands {
    pub fn validate(&self) -> Result<()> {
        if self.benchmark >= self.task_set_finished_base {
            return Err(TilegraphError::ConfigError(format!(
                "[priority].benchmark ({}) must be lower than task_set_finished_base ({})",
                self.benchmark, self.task_set_finished_base
            )));
        }

        let band_end = self
            .task_set_finished_base
            .checked_add(NUMBER_OF_TASK_SETS as Priority)
            .ok_or_else(|| {
                TilegraphError::ConfigError(
                    "[priority].task_set_finished_base overflows the priority space".to_string(),
                )
            })?;

        if band_end > self.tile_task_base {
            return Err(TilegraphError::ConfigError(format!(
                "[priority].tile_task_base ({}) overlaps the task-set-finished band [{}, {})",
                self.tile_task_base, self.task_set_finished_base, band_end
            )));
        }

        Ok(())
    }

    pub fn task_set_finished_priority(&self, set: TaskSet) -> Priority {
        self.task_set_finished_base + set.index() as Priority
    }

    /// Priority of the tile task at position `order` in the raster queue.
    pub fn tile_task_priority(&self, order: usize) -> Priority {
        let order = Priority::try_from(order).unwrap_or(Priority::MAX);
        self.tile_task_base.saturating_add(order)
    }

    pub fn is_task_set_finished_priority(&self, priority: Priority) -> bool {
        priority >= self.task_set_finished_base
            && priority < self.task_set_finished_base + NUMBER_OF_TASK_SETS as Priority
    }
}
