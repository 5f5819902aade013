// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// File name looked up when no explicit config file is given.
pub const CONFIG_FILE_NAME: &str = "Tilegraph.toml";

/// Read and deserialize a config file without semantic validation.
///
/// Use [`load_and_validate`] unless overrides need to be applied in between.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        rects = config.scene.rect.len(),
        draw_images = config.scene.draw_image.len(),
        images = config.image.len(),
        "loaded config"
    );

    Ok(config)
}

/// Read, deserialize and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Pick the config file to load.
///
/// A directory stands for the [`CONFIG_FILE_NAME`] inside it. Without a
/// path, the nearest config file in `cwd` or one of its ancestors wins,
/// falling back to [`default_config_path`] so a missing file still reports
/// the name that was looked for.
pub fn resolve_config_path(requested: Option<&Path>, cwd: &Path) -> PathBuf {
    match requested {
        Some(path) if path.is_dir() => path.join(CONFIG_FILE_NAME),
        Some(path) => path.to_path_buf(),
        None => match find_config(cwd) {
            Some(found) => {
                debug!(path = %found.display(), "discovered config file");
                found
            }
            None => default_config_path(),
        },
    }
}

/// Nearest [`CONFIG_FILE_NAME`] in `start` or one of its ancestors.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}
