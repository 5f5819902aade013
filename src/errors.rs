// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only recoverable conditions live here (bad config files, malformed
//! graphs handed to the runner, a runner that already shut down). Caller
//! contract breaches such as inserting the same task twice or playing back
//! into an unsupported pixel format are assertions, not errors.

use thiserror::Error;

use crate::graph::TaskId;

#[derive(Error, Debug)]
pub enum TilegraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in task graph: {0}")]
    GraphCycle(String),

    #[error("Edge references task {0} which has no node in the graph")]
    MissingNode(TaskId),

    #[error("Task graph runner has been shut down")]
    RunnerShutDown,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TilegraphError>;
