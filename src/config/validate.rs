// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TilegraphError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TilegraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_pool(cfg)?;
    cfg.priority.validate()?;
    validate_playback(cfg)?;
    validate_scene(cfg)?;
    validate_images(cfg)?;
    Ok(())
}

fn config_error(message: String) -> TilegraphError {
    TilegraphError::ConfigError(message)
}

fn validate_pool(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pool.workers == 0 {
        return Err(config_error(
            "[pool].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_playback(cfg: &RawConfigFile) -> Result<()> {
    let playback = &cfg.playback;

    // Caught here so a bad file is a config error rather than a playback
    // assertion on a worker thread.
    if !playback.format.supports_playback_to_memory() {
        return Err(config_error(format!(
            "[playback].format '{}' cannot be played back to memory",
            playback.format
        )));
    }

    if playback.tile_width == 0 || playback.tile_height == 0 {
        return Err(config_error(format!(
            "[playback] tile size must be non-empty (got {}x{})",
            playback.tile_width, playback.tile_height
        )));
    }

    if !playback.scale.is_finite() || playback.scale <= 0.0 {
        return Err(config_error(format!(
            "[playback].scale must be a positive number (got {})",
            playback.scale
        )));
    }

    Ok(())
}

fn validate_scene(cfg: &RawConfigFile) -> Result<()> {
    let scene = &cfg.scene;

    if scene.width == 0 || scene.height == 0 {
        return Err(config_error(format!(
            "[scene] size must be non-empty (got {}x{})",
            scene.width, scene.height
        )));
    }

    if scene.rounds == 0 {
        return Err(config_error(
            "[scene].rounds must be >= 1 (got 0)".to_string(),
        ));
    }

    for (i, item) in scene.draw_image.iter().enumerate() {
        if !cfg.image.contains_key(&item.image) {
            return Err(config_error(format!(
                "[[scene.draw_image]] #{} references unknown image '{}'",
                i + 1,
                item.image
            )));
        }
    }

    Ok(())
}

fn validate_images(cfg: &RawConfigFile) -> Result<()> {
    for (name, image) in cfg.image.iter() {
        if image.width == 0 || image.height == 0 {
            return Err(config_error(format!(
                "[image.{name}] size must be non-empty (got {}x{})",
                image.width, image.height
            )));
        }
    }
    Ok(())
}
