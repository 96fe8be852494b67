//! Note grid overlay: one colored tile per note, laid out like the grid rows.

use glam::{Mat4, Vec3};

use crate::projector::{InstanceRaw, InstanceSet};
use crate::sound::chromestesia::note_color;
use crate::sound::NoteGrid;

/// Tile edge (pixels)
pub const TILE_PX: f32 = 18.0;

/// Space between tiles and from the viewport edge (pixels)
pub const GAP_PX: f32 = 4.0;

/// Builds the overlay instance set from the latest note grid.
#[derive(Debug, Default)]
pub struct NoteVisualizer {
    tiles: InstanceSet,
    /// Notes currently shown, row by row
    shape: Vec<usize>,
}

impl NoteVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &InstanceSet {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut InstanceSet {
        &mut self.tiles
    }

    /// Row lengths of the grid being shown
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// World transform of tile `(column, row)` anchored at the viewport's
    /// top-left corner (y grows downward)
    pub fn tile_transform(column: usize, row: usize, viewport: (u32, u32)) -> [[f32; 4]; 4] {
        let step = TILE_PX + GAP_PX;
        let translation = Mat4::from_translation(Vec3::new(
            -(viewport.0 as f32) / 2.0 + GAP_PX + column as f32 * step,
            -(viewport.1 as f32) / 2.0 + GAP_PX + row as f32 * step,
            0.0,
        ));
        (translation * Mat4::from_scale(Vec3::new(TILE_PX, TILE_PX, 1.0))).to_cols_array_2d()
    }

    /// Rebuild the tiles; `None` clears the overlay.
    pub fn update(&mut self, notes: Option<&NoteGrid>, viewport: (u32, u32)) {
        let Some(notes) = notes else {
            self.clear();
            return;
        };

        let instances = notes
            .rows()
            .iter()
            .enumerate()
            .flat_map(|(row, cells)| {
                cells.iter().enumerate().map(move |(column, note)| InstanceRaw {
                    transform: Self::tile_transform(column, row, viewport),
                    color: note_color(*note),
                })
            })
            .collect();

        self.tiles = InstanceSet::from_instances(instances);
        self.shape = notes.rows().iter().map(Vec::len).collect();
    }

    pub fn clear(&mut self) {
        self.tiles = InstanceSet::from_instances(Vec::new());
        self.shape.clear();
    }
}
