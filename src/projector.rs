//! Grid → GPU instance projection.
//!
//! Cells are drawn as instanced quads. Every slot's world transform is fixed
//! by its grid coordinate, so transforms are computed once in
//! [`GridProjector::prepare`]; each render tick only colors (or, for the
//! split policy, list membership) change.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::info;

use crate::grid::{CellState, GridStore};
use crate::params::{ColorScheme, ProjectionPolicy};

/// Per-instance data uploaded to the instance vertex buffer
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 3],
}

impl InstanceRaw {
    /// Zero-scale transform: the instance collapses to a point and is never visible
    pub fn hidden() -> Self {
        Self::zeroed()
    }
}

/// GPU-visible instance array with a per-frame valid count.
///
/// Capacity is fixed when the set is allocated in `prepare` and never
/// changes until the next full prepare.
#[derive(Debug, Clone, Default)]
pub struct InstanceSet {
    instances: Vec<InstanceRaw>,
    count: usize,
    transforms_dirty: bool,
    colors_dirty: bool,
}

impl InstanceSet {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: vec![InstanceRaw::hidden(); capacity],
            count: 0,
            transforms_dirty: true,
            colors_dirty: true,
        }
    }

    /// Fully visible set built from a ready instance list
    pub fn from_instances(instances: Vec<InstanceRaw>) -> Self {
        Self {
            count: instances.len(),
            instances,
            transforms_dirty: true,
            colors_dirty: true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    /// Leading entries valid this frame
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    /// The valid prefix, ready for upload
    pub fn visible(&self) -> &[InstanceRaw] {
        &self.instances[..self.count]
    }

    pub fn is_dirty(&self) -> bool {
        self.transforms_dirty || self.colors_dirty
    }

    pub fn colors_dirty(&self) -> bool {
        self.colors_dirty
    }

    pub fn mark_uploaded(&mut self) {
        self.transforms_dirty = false;
        self.colors_dirty = false;
    }
}

pub(crate) const fn hex_to_rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

pub(crate) fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Cell state → linear RGB color, indexed by state ordinal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorLut {
    scheme: ColorScheme,
    colors: [[f32; 3]; CellState::COUNT],
}

impl ColorLut {
    pub fn new(scheme: ColorScheme) -> Self {
        // Ordered by ordinal: dead, alive, decaying 1..3
        let hex: [u32; CellState::COUNT] = match scheme {
            ColorScheme::Dark => [0x000000, 0xffffff, 0x494949, 0x222222, 0x080808],
            ColorScheme::Light => [0xffffff, 0x000000, 0xbebebe, 0xd3d3d3, 0xe8e8e8],
        };

        let colors = hex.map(|h| hex_to_rgb(h).map(srgb_to_linear));
        Self { scheme, colors }
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    pub fn color(&self, state: CellState) -> [f32; 3] {
        self.colors[state.ordinal()]
    }

    /// Clear color behind the grid
    pub fn background(&self) -> [f32; 3] {
        self.color(CellState::Dead)
    }
}

/// What a `prepare` call had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareKind {
    /// New shape: instance sets reallocated and every transform written
    Full,
    /// Same shape: transforms kept, seed color and counts reset
    Reseed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PreparedShape {
    width: u32,
    height: u32,
    cell_edge: f32,
    generation_id: u64,
}

/// Projects grid state into instance sets.
pub struct GridProjector {
    policy: ProjectionPolicy,
    cell_edge: f32,
    lut: ColorLut,
    prepared: Option<PreparedShape>,
    /// Fixed per-cell transforms, row-major
    transforms: Vec<[[f32; 4]; 4]>,
    /// Sweep policy: one slot per cell
    cells: InstanceSet,
    /// Split policy: compacted alive / decaying lists
    living: InstanceSet,
    decaying: InstanceSet,
    /// Bumped whenever instance capacities change
    layout_version: u64,
}

impl GridProjector {
    pub fn new(policy: ProjectionPolicy, cell_edge: f32, scheme: ColorScheme) -> Self {
        Self {
            policy,
            cell_edge,
            lut: ColorLut::new(scheme),
            prepared: None,
            transforms: Vec::new(),
            cells: InstanceSet::default(),
            living: InstanceSet::default(),
            decaying: InstanceSet::default(),
            layout_version: 0,
        }
    }

    pub fn policy(&self) -> ProjectionPolicy {
        self.policy
    }

    pub fn lut(&self) -> &ColorLut {
        &self.lut
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Whether the last `prepare` ran for this exact grid instance
    pub fn is_prepared_for<G: GridStore + ?Sized>(&self, grid: &G) -> bool {
        self.prepared.is_some_and(|p| {
            p.width == grid.width()
                && p.height == grid.height()
                && p.generation_id == grid.generation_id()
        })
    }

    /// Rebuild the color lookup table; takes effect on the next prepare/update.
    pub fn set_color_scheme(&mut self, scheme: ColorScheme) {
        if self.lut.scheme() != scheme {
            self.lut = ColorLut::new(scheme);
        }
    }

    /// Instance sets to draw this frame, in draw order
    pub fn instance_sets(&self) -> Vec<&InstanceSet> {
        match self.policy {
            ProjectionPolicy::ColorSweep => vec![&self.cells],
            ProjectionPolicy::SplitCompaction => vec![&self.decaying, &self.living],
        }
    }

    pub fn instance_sets_mut(&mut self) -> Vec<&mut InstanceSet> {
        match self.policy {
            ProjectionPolicy::ColorSweep => vec![&mut self.cells],
            ProjectionPolicy::SplitCompaction => vec![&mut self.decaying, &mut self.living],
        }
    }

    /// Slots required for a `width x height` grid under the current policy
    pub fn instance_capacity(&self, width: u32, height: u32) -> usize {
        let cells = width as usize * height as usize;
        match self.policy {
            ProjectionPolicy::ColorSweep => cells,
            // One trailing slot past the last appended instance always exists
            ProjectionPolicy::SplitCompaction => cells + 1,
        }
    }

    /// Size of the largest instance buffer a `width x height` grid needs (bytes)
    pub fn instance_buffer_bytes(&self, width: u32, height: u32) -> u64 {
        self.instance_capacity(width, height) as u64 * std::mem::size_of::<InstanceRaw>() as u64
    }

    /// World transform of cell `(x, y)`: a unit quad scaled to the cell edge,
    /// centered on the viewport origin
    pub fn cell_transform(&self, x: u32, y: u32, width: u32, height: u32) -> [[f32; 4]; 4] {
        let edge = self.cell_edge;
        let translation = Mat4::from_translation(Vec3::new(
            x as f32 * edge - width as f32 * edge / 2.0,
            y as f32 * edge - height as f32 * edge / 2.0,
            0.0,
        ));
        (translation * Mat4::from_scale(Vec3::new(edge, edge, 1.0))).to_cols_array_2d()
    }

    /// One-time setup for a grid instance; must run before `update` and again
    /// after every regenerate or reallocation.
    pub fn prepare<G: GridStore + ?Sized>(&mut self, grid: &G) -> PrepareKind {
        let (width, height) = (grid.width(), grid.height());
        let shape = PreparedShape {
            width,
            height,
            cell_edge: self.cell_edge,
            generation_id: grid.generation_id(),
        };

        let same_shape = self.prepared.is_some_and(|p| {
            p.width == width && p.height == height && p.cell_edge == self.cell_edge
        });

        let kind = if same_shape {
            PrepareKind::Reseed
        } else {
            self.transforms = (0..height)
                .flat_map(|y| (0..width).map(move |x| (x, y)))
                .map(|(x, y)| self.cell_transform(x, y, width, height))
                .collect();

            let capacity = self.instance_capacity(width, height);
            match self.policy {
                ProjectionPolicy::ColorSweep => {
                    self.cells = InstanceSet::with_capacity(capacity);
                    for (slot, transform) in self.cells.instances.iter_mut().zip(&self.transforms)
                    {
                        slot.transform = *transform;
                    }
                    self.living = InstanceSet::default();
                    self.decaying = InstanceSet::default();
                }
                ProjectionPolicy::SplitCompaction => {
                    self.cells = InstanceSet::default();
                    self.living = InstanceSet::with_capacity(capacity);
                    self.decaying = InstanceSet::with_capacity(capacity);
                }
            }

            self.layout_version += 1;
            info!(
                "Prepared instances for {}x{} grid ({} slots per set, {} px cells)",
                width, height, capacity, self.cell_edge
            );
            PrepareKind::Full
        };

        // Placeholder color on slot 0 so per-instance color storage exists
        let placeholder = self.lut.background();
        match self.policy {
            ProjectionPolicy::ColorSweep => {
                self.cells.instances[0].color = placeholder;
                self.cells.count = self.cells.capacity();
                self.cells.colors_dirty = true;
            }
            ProjectionPolicy::SplitCompaction => {
                for set in [&mut self.living, &mut self.decaying] {
                    set.instances[0] = InstanceRaw::hidden();
                    set.instances[0].color = placeholder;
                    set.count = 0;
                    set.transforms_dirty = true;
                    set.colors_dirty = true;
                }
            }
        }

        self.prepared = Some(shape);
        kind
    }

    /// Project the current grid state. Single pass over every cell.
    ///
    /// Returns false (and does nothing) when `prepare` has not run for this grid.
    pub fn update<G: GridStore + ?Sized>(&mut self, grid: &G) -> bool {
        if !self.is_prepared_for(grid) {
            return false;
        }

        let snapshot = grid.snapshot();

        match self.policy {
            ProjectionPolicy::ColorSweep => {
                for (slot, &state) in self.cells.instances.iter_mut().zip(snapshot.cells()) {
                    slot.color = self.lut.colors[state.ordinal()];
                }
                self.cells.count = self.cells.capacity();
                self.cells.colors_dirty = true;
            }
            ProjectionPolicy::SplitCompaction => {
                let mut living = 0;
                let mut decaying = 0;

                for (i, &state) in snapshot.cells().iter().enumerate() {
                    let instance = InstanceRaw {
                        transform: self.transforms[i],
                        color: self.lut.colors[state.ordinal()],
                    };

                    if state == CellState::Alive {
                        self.living.instances[living] = instance;
                        living += 1;
                    } else if state.is_decaying() {
                        self.decaying.instances[decaying] = instance;
                        decaying += 1;
                    }
                }

                // One extra slot, overwritten so last tick's tail never shows
                for (set, appended) in [(&mut self.living, living), (&mut self.decaying, decaying)]
                {
                    set.instances[appended] = InstanceRaw::hidden();
                    set.count = appended + 1;
                    set.transforms_dirty = true;
                    set.colors_dirty = true;
                }
            }
        }

        true
    }

    /// Forget the prepared grid (teardown)
    pub fn reset(&mut self) {
        self.prepared = None;
        self.transforms.clear();
        self.cells = InstanceSet::default();
        self.living = InstanceSet::default();
        self.decaying = InstanceSet::default();
        self.layout_version += 1;
    }
}
