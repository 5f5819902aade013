// src/config/mod.rs

//! Configuration loading and validation for tilegraph.
//!
//! - `model.rs` maps the TOML layout.
//! - `loader.rs` finds and reads a file from disk.
//! - `validate.rs` turns a [`RawConfigFile`] into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    CONFIG_FILE_NAME, default_config_path, find_config, load_and_validate, load_from_path,
    resolve_config_path,
};
pub use model::{
    ConfigFile, ImageConfig, ImageItem, PlaybackSection, PoolSection, RawConfigFile, RectItem,
    SceneSection,
};
