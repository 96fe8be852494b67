//! Game-of-Life engine with fade-out decay stages.

use log::debug;

use super::patterns::{pick_weighted, PATTERNS};
use super::{next_generation_id, CellState, GridEngine, GridSnapshot, GridStore};
use crate::error::{check_dimensions, Result};
use crate::params::GridConfig;

/// Probability that a stratum receives a pattern on regeneration
const PLACEMENT_PROBABILITY: f32 = 0.4;

/// Allocates [`LifeGrid`]s, each with its own RNG stream derived from the seed.
#[derive(Debug, Clone)]
pub struct LifeEngine {
    seed: u64,
    divisions: (u32, u32),
    grids_created: u64,
}

impl LifeEngine {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            seed: config.seed,
            divisions: (config.divisions_x, config.divisions_y),
            grids_created: 0,
        }
    }
}

impl GridEngine for LifeEngine {
    type Grid = LifeGrid;

    fn create(&mut self, width: u32, height: u32) -> Result<LifeGrid> {
        check_dimensions(width, height)?;

        let rng = fastrand::Rng::with_seed(self.seed.wrapping_add(self.grids_created));
        self.grids_created += 1;

        Ok(LifeGrid::new(width, height, self.divisions, rng))
    }
}

/// Double-buffered automaton grid.
pub struct LifeGrid {
    width: u32,
    height: u32,
    cells: Vec<CellState>,
    /// Previous generation, read while computing the next one
    previous: Vec<CellState>,
    generation_id: u64,
    /// Number of `advance` calls since the content was generated
    generation: u64,
    divisions: (u32, u32),
    rng: fastrand::Rng,
}

impl LifeGrid {
    fn new(width: u32, height: u32, divisions: (u32, u32), rng: fastrand::Rng) -> Self {
        let size = width as usize * height as usize;
        let mut grid = Self {
            width,
            height,
            cells: vec![CellState::Dead; size],
            previous: vec![CellState::Dead; size],
            generation_id: 0,
            generation: 0,
            divisions,
            rng,
        };
        grid.regenerate();
        grid
    }

    /// Build a grid from explicit content (no random seeding)
    pub fn from_cells(width: u32, height: u32, cells: Vec<CellState>) -> Result<Self> {
        check_dimensions(width, height)?;
        if cells.len() != width as usize * height as usize {
            return Err(crate::error::LifewaveError::InvalidConfig(format!(
                "expected {} cells for {}x{}, got {}",
                width as usize * height as usize,
                width,
                height,
                cells.len()
            )));
        }

        Ok(Self {
            width,
            height,
            previous: cells.clone(),
            cells,
            generation_id: next_generation_id(),
            generation: 0,
            divisions: (1, 1),
            rng: fastrand::Rng::with_seed(0),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == CellState::Alive).count()
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width as usize + x
    }

    fn alive_neighbours(&self, x: usize, y: usize) -> u32 {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut count = 0;

        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                if (nx != x || ny != y) && self.previous[ny * width + nx] == CellState::Alive {
                    count += 1;
                }
            }
        }

        count
    }
}

/// Transition for one cell given its alive-neighbour count
fn next_state(cell: CellState, alive_neighbours: u32) -> CellState {
    match (cell, alive_neighbours) {
        (CellState::Alive, 2 | 3) => CellState::Alive,
        (CellState::Alive, _) => CellState::Decaying1,
        (_, 3) => CellState::Alive,
        (CellState::Decaying1, _) => CellState::Decaying2,
        (CellState::Decaying2, _) => CellState::Decaying3,
        (CellState::Decaying3, _) => CellState::Dead,
        (CellState::Dead, _) => CellState::Dead,
    }
}

impl GridStore for LifeGrid {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn generation_id(&self) -> u64 {
        self.generation_id
    }

    fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.cells);

        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let index = self.index(x, y);
                let count = self.alive_neighbours(x, y);
                self.cells[index] = next_state(self.previous[index], count);
            }
        }

        self.generation += 1;
    }

    fn regenerate(&mut self) {
        let width = self.width as usize;
        let height = self.height as usize;

        // Stratified placement: one candidate pattern per stratum
        let stratum_w = width.div_ceil(self.divisions.0.max(1) as usize).max(1);
        let stratum_h = height.div_ceil(self.divisions.1.max(1) as usize).max(1);
        let strata_x = (width / stratum_w).max(1);
        let strata_y = (height / stratum_h).max(1);

        self.cells.fill(CellState::Dead);

        let mut occupied = vec![false; strata_x * strata_y];
        let mut placed = vec![0usize; PATTERNS.len()];

        for gy in 0..strata_y {
            for gx in 0..strata_x {
                if self.rng.f32() > PLACEMENT_PROBABILITY {
                    continue;
                }

                let pattern_index = pick_weighted(&mut self.rng);
                let pattern = &PATTERNS[pattern_index];
                let x = gx * stratum_w + self.rng.usize(0..=stratum_w);
                let y = gy * stratum_h + self.rng.usize(0..=stratum_h);

                if x + pattern.width() > width || y + pattern.height() > height {
                    continue;
                }

                // Strata covered by the pattern, counted from its own stratum
                let last_gx = (gx + pattern.width().div_ceil(stratum_w)).min(strata_x - 1);
                let last_gy = (gy + pattern.height().div_ceil(stratum_h)).min(strata_y - 1);

                let free = (gy..=last_gy)
                    .all(|sy| (gx..=last_gx).all(|sx| !occupied[sy * strata_x + sx]));
                if !free {
                    continue;
                }

                for sy in gy..=last_gy {
                    for sx in gx..=last_gx {
                        occupied[sy * strata_x + sx] = true;
                    }
                }

                for local_y in 0..pattern.height() {
                    for local_x in 0..pattern.width() {
                        let index = self.index(x + local_x, y + local_y);
                        self.cells[index] = if pattern.is_alive(local_x, local_y) {
                            CellState::Alive
                        } else {
                            CellState::Dead
                        };
                    }
                }

                placed[pattern_index] += 1;
            }
        }

        self.previous.copy_from_slice(&self.cells);
        self.generation_id = next_generation_id();
        self.generation = 0;

        for (pattern, count) in PATTERNS.iter().zip(&placed) {
            debug!("Regenerated grid: {} x{}", pattern.name, count);
        }
    }

    fn snapshot(&self) -> GridSnapshot<'_> {
        GridSnapshot::new(self.width, self.height, &self.cells)
    }
}
