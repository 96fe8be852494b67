//! Simulation grid contract.
//!
//! The automaton itself is an opaque engine: the pipeline only needs
//! dimensions, a read-only view of the cell buffer, one advance call and an
//! aggregate query over sub-rectangles. [`LifeGrid`] is the engine shipped
//! with the crate; anything implementing [`GridStore`] can replace it.

mod life;
mod patterns;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

pub use life::{LifeEngine, LifeGrid};
pub use patterns::{Pattern, PATTERNS};

/// Per-cell state, ordered from alive through the decay stages to dead.
///
/// The discriminant doubles as the cell's value in aggregate sums.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellState {
    #[default]
    Dead = 0,
    Alive = 1,
    Decaying1 = 2,
    Decaying2 = 3,
    Decaying3 = 4,
}

impl CellState {
    /// Number of variants (size of any lookup table keyed by state)
    pub const COUNT: usize = 5;

    pub const ALL: [CellState; Self::COUNT] = [
        CellState::Dead,
        CellState::Alive,
        CellState::Decaying1,
        CellState::Decaying2,
        CellState::Decaying3,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn is_decaying(self) -> bool {
        matches!(
            self,
            CellState::Decaying1 | CellState::Decaying2 | CellState::Decaying3
        )
    }

    pub fn is_dead(self) -> bool {
        self == CellState::Dead
    }
}

/// Borrowed, allocation-free view over a grid's cell buffer.
///
/// The view borrows the grid immutably, so it cannot outlive the next
/// `advance` or `regenerate` call.
#[derive(Clone, Copy, Debug)]
pub struct GridSnapshot<'a> {
    width: u32,
    height: u32,
    cells: &'a [CellState],
}

impl<'a> GridSnapshot<'a> {
    pub fn new(width: u32, height: u32, cells: &'a [CellState]) -> Self {
        debug_assert_eq!(cells.len(), width as usize * height as usize);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major cell buffer, `cells[y * width + x]`
    pub fn cells(&self) -> &'a [CellState] {
        self.cells
    }

    pub fn get(&self, x: u32, y: u32) -> Option<CellState> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[y as usize * self.width as usize + x as usize])
    }

    /// Iterate `(x, y, state)` in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, CellState)> + 'a {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &state)| ((i % width) as u32, (i / width) as u32, state))
    }

    /// Sum of state ordinals over the region `(region_x, region_y)` of a
    /// partition into `region_width x region_height` windows.
    ///
    /// Windows crossing the right/bottom edge are clipped; empty windows sum to 0.
    pub fn sub_region_sum(
        &self,
        region_x: u32,
        region_y: u32,
        region_width: u32,
        region_height: u32,
    ) -> i64 {
        let start_x = region_x as u64 * region_width as u64;
        let start_y = region_y as u64 * region_height as u64;
        let stop_x = (start_x + region_width as u64).min(self.width as u64);
        let stop_y = (start_y + region_height as u64).min(self.height as u64);

        if stop_x <= start_x || stop_y <= start_y {
            return 0;
        }

        let width = self.width as usize;
        (start_y as usize..stop_y as usize)
            .map(|y| {
                let row = &self.cells[y * width..(y + 1) * width];
                row[start_x as usize..stop_x as usize]
                    .iter()
                    .map(|c| c.ordinal() as i64)
                    .sum::<i64>()
            })
            .sum()
    }
}

/// A live simulation grid owned by the engine.
///
/// The pipeline reads through [`GridStore::snapshot`] and mutates only
/// through [`GridStore::advance`] and [`GridStore::regenerate`].
pub trait GridStore {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Changes whenever the grid's content is replaced (create/regenerate)
    fn generation_id(&self) -> u64;

    /// One simulation step
    fn advance(&mut self);

    /// New random content, same dimensions, no reallocation
    fn regenerate(&mut self);

    fn snapshot(&self) -> GridSnapshot<'_>;

    fn cell_state(&self, x: u32, y: u32) -> CellState {
        self.snapshot().get(x, y).unwrap_or_default()
    }

    fn sub_region_sum(
        &self,
        region_x: u32,
        region_y: u32,
        region_width: u32,
        region_height: u32,
    ) -> i64 {
        self.snapshot()
            .sub_region_sum(region_x, region_y, region_width, region_height)
    }
}

/// Factory side of the engine: allocates grids.
pub trait GridEngine {
    type Grid: GridStore;

    /// Allocate a grid; zero dimensions are rejected.
    fn create(&mut self, width: u32, height: u32) -> Result<Self::Grid>;
}

static NEXT_GENERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id for a freshly generated grid content
pub fn next_generation_id() -> u64 {
    NEXT_GENERATION_ID.fetch_add(1, Ordering::Relaxed)
}
