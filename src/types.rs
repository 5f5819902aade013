// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Pixel layout of a destination buffer.
///
/// Only the four-channel formats can be targeted by
/// [`playback_to_memory`](crate::raster::playback_to_memory); the rest exist
/// so that callers holding a resource of another format get a hard failure
/// instead of garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFormat {
    Rgba8888,
    Bgra8888,
    Argb8888,
    Rgba4444,
    Alpha8,
    Luminance8,
    Rgb565,
    Red8,
    Etc1,
}

impl ResourceFormat {
    pub const ALL: [ResourceFormat; 9] = [
        ResourceFormat::Rgba8888,
        ResourceFormat::Bgra8888,
        ResourceFormat::Argb8888,
        ResourceFormat::Rgba4444,
        ResourceFormat::Alpha8,
        ResourceFormat::Luminance8,
        ResourceFormat::Rgb565,
        ResourceFormat::Red8,
        ResourceFormat::Etc1,
    ];

    pub fn bits_per_pixel(self) -> usize {
        match self {
            ResourceFormat::Rgba8888 | ResourceFormat::Bgra8888 | ResourceFormat::Argb8888 => 32,
            ResourceFormat::Rgba4444 | ResourceFormat::Rgb565 => 16,
            ResourceFormat::Alpha8 | ResourceFormat::Luminance8 | ResourceFormat::Red8 => 8,
            ResourceFormat::Etc1 => 4,
        }
    }

    /// Tightly packed row size in bytes for `width` pixels.
    pub fn min_row_bytes(self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel()).div_ceil(8)
    }

    pub fn supports_playback_to_memory(self) -> bool {
        matches!(
            self,
            ResourceFormat::Rgba8888
                | ResourceFormat::Bgra8888
                | ResourceFormat::Argb8888
                | ResourceFormat::Rgba4444
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceFormat::Rgba8888 => "rgba8888",
            ResourceFormat::Bgra8888 => "bgra8888",
            ResourceFormat::Argb8888 => "argb8888",
            ResourceFormat::Rgba4444 => "rgba4444",
            ResourceFormat::Alpha8 => "alpha8",
            ResourceFormat::Luminance8 => "luminance8",
            ResourceFormat::Rgb565 => "rgb565",
            ResourceFormat::Red8 => "red8",
            ResourceFormat::Etc1 => "etc1",
        }
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ResourceFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| format!("invalid resource format: {wanted}"))
    }
}

/// Number of distinct [`TaskSet`] categories.
pub const NUMBER_OF_TASK_SETS: usize = 3;

/// Category of raster work whose completion callers want to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskSet {
    /// Tiles that must be ready before a pending tree can be activated.
    RequiredForActivation,
    /// Tiles that must be ready before the next frame can be drawn.
    RequiredForDraw,
    /// Every scheduled tile.
    All,
}

impl TaskSet {
    pub const ALL: [TaskSet; NUMBER_OF_TASK_SETS] = [
        TaskSet::RequiredForActivation,
        TaskSet::RequiredForDraw,
        TaskSet::All,
    ];

    pub fn index(self) -> usize {
        match self {
            TaskSet::RequiredForActivation => 0,
            TaskSet::RequiredForDraw => 1,
            TaskSet::All => 2,
        }
    }
}

/// Small fixed-size set of [`TaskSet`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSetCollection([bool; NUMBER_OF_TASK_SETS]);

impl TaskSetCollection {
    pub fn with(mut self, set: TaskSet) -> Self {
        self.0[set.index()] = true;
        self
    }

    pub fn contains(&self, set: TaskSet) -> bool {
        self.0[set.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskSet> + '_ {
        TaskSet::ALL.into_iter().filter(|set| self.contains(*set))
    }
}

/// Identity of a tile within a scene grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub column: u32,
    pub row: u32,
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}
