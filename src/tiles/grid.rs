// src/tiles/grid.rs

use std::cmp::Reverse;

use crate::raster::{Rect, Size};
use crate::types::{TaskSet, TaskSetCollection, TileId};

/// Fixed tiling of scaled content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    content_size: Size,
    tile_size: Size,
    scale: f32,
}

/// A tile queued for raster together with the task sets it counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritizedTile {
    pub tile: TileId,
    pub sets: TaskSetCollection,
}

impl TileGrid {
    pub fn new(content_size: Size, tile_size: Size, scale: f32) -> Self {
        Self {
            content_size,
            tile_size,
            scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    /// Content bounds in scaled space.
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.content_size).scale_to_enclosing(self.scale)
    }

    pub fn columns(&self) -> u32 {
        if self.tile_size.is_empty() {
            return 0;
        }
        self.bounds().width.div_ceil(self.tile_size.width)
    }

    pub fn rows(&self) -> u32 {
        if self.tile_size.is_empty() {
            return 0;
        }
        self.bounds().height.div_ceil(self.tile_size.height)
    }

    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scaled-space rectangle of `tile`, clipped to the content bounds.
    pub fn tile_rect(&self, tile: TileId) -> Rect {
        let x = tile.column.saturating_mul(self.tile_size.width);
        let y = tile.row.saturating_mul(self.tile_size.height);
        let rect = Rect::new(
            i32::try_from(x).unwrap_or(i32::MAX),
            i32::try_from(y).unwrap_or(i32::MAX),
            self.tile_size.width,
            self.tile_size.height,
        );
        rect.intersect(&self.bounds())
    }

    /// Tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        let columns = self.columns();
        (0..self.rows()).flat_map(move |row| (0..columns).map(move |column| TileId { column, row }))
    }

    /// Every tile ordered for raster around `viewport` (scaled space).
    ///
    /// Tiles intersecting the viewport come first and are required for
    /// activation and draw. The rest follow by distance to the viewport.
    /// Every tile belongs to [`TaskSet::All`].
    pub fn prioritize(&self, viewport: Rect) -> Vec<PrioritizedTile> {
        let mut keyed: Vec<((Reverse<bool>, i64, TileId), PrioritizedTile)> = self
            .tiles()
            .map(|tile| {
                let rect = self.tile_rect(tile);
                let visible = rect.intersects(&viewport);
                let mut sets = TaskSetCollection::default().with(TaskSet::All);
                if visible {
                    sets = sets
                        .with(TaskSet::RequiredForActivation)
                        .with(TaskSet::RequiredForDraw);
                }
                (
                    (Reverse(visible), distance(&rect, &viewport), tile),
                    PrioritizedTile { tile, sets },
                )
            })
            .collect();
        keyed.sort_by_key(|(key, _)| *key);
        keyed.into_iter().map(|(_, tile)| tile).collect()
    }
}

/// Manhattan gap between two rectangles; zero when they touch or overlap.
fn distance(a: &Rect, b: &Rect) -> i64 {
    let dx = (i64::from(b.x) - a.right())
        .max(i64::from(a.x) - b.right())
        .max(0);
    let dy = (i64::from(b.y) - a.bottom())
        .max(i64::from(a.y) - b.bottom())
        .max(0);
    dx + dy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_tiles_are_clipped_to_content() {
        let grid = TileGrid::new(Size::new(100, 50), Size::new(64, 64), 1.0);
        assert_eq!(grid.columns(), 2);
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.tile_rect(TileId { column: 1, row: 0 }), Rect::new(64, 0, 36, 50));
    }

    #[test]
    fn visible_tiles_come_first_and_join_every_set() {
        let grid = TileGrid::new(Size::new(256, 64), Size::new(64, 64), 1.0);
        let queue = grid.prioritize(Rect::new(130, 0, 40, 40));

        assert_eq!(queue[0].tile, TileId { column: 2, row: 0 });
        assert!(queue[0].sets.contains(TaskSet::RequiredForActivation));
        assert!(queue[0].sets.contains(TaskSet::RequiredForDraw));

        // Remaining tiles follow by distance to the viewport.
        let rest: Vec<u32> = queue[1..].iter().map(|t| t.tile.column).collect();
        assert_eq!(rest, vec![1, 3, 0]);
        for tile in &queue[1..] {
            assert!(tile.sets.contains(TaskSet::All));
            assert!(!tile.sets.contains(TaskSet::RequiredForDraw));
        }
    }
}
