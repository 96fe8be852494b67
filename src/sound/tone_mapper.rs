//! Grid → notes sonification.
//!
//! The grid is cut into a near-square arrangement of regions, one
//! aggregate-sum query per region, and each non-zero sum picks a note from
//! one of two scales by parity. The partition is deliberately approximate:
//! rounding can leave regions empty, and a row simply stops there.

use crate::grid::GridStore;

use super::notes::{Note, NoteGrid, MAJOR_PENTATONIC, MINOR_PENTATONIC};

/// Region partition computed for one grid and polyphony ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    pub columns: u32,
    pub rows: u32,
    pub region_width: u32,
    pub region_height: u32,
}

impl RegionLayout {
    /// Partition a `width x height` grid for `max_tones` notes.
    ///
    /// Returns `None` when `max_tones` is 0.
    pub fn compute(width: u32, height: u32, max_tones: usize) -> Option<Self> {
        if max_tones == 0 || width == 0 || height == 0 {
            return None;
        }

        let max_tones = max_tones as u32;
        let aspect = width as f64 / height as f64;

        let columns = ((aspect * max_tones as f64).sqrt().round() as u32).clamp(1, max_tones);
        let rows = max_tones.div_ceil(columns);

        Some(Self {
            columns,
            rows,
            region_width: (width as f64 / columns as f64).round() as u32,
            region_height: (height as f64 / rows as f64).round() as u32,
        })
    }
}

/// Scale for a region sum: odd sums use the minor scale
pub fn scale_for(sum: i64) -> &'static [Note; 16] {
    if sum.rem_euclid(2) == 1 {
        &MINOR_PENTATONIC
    } else {
        &MAJOR_PENTATONIC
    }
}

/// Index into a scale of length `n`, always in `0..n` regardless of sign
pub fn scale_index(sum: i64, n: usize) -> usize {
    let n = n as i64;
    (((sum % n) + n) % n) as usize
}

/// Note for a non-zero region sum
pub fn note_for_sum(sum: i64) -> Note {
    let scale = scale_for(sum);
    scale[scale_index(sum, scale.len())]
}

/// Output of one sonification pass
#[derive(Debug, Clone, PartialEq)]
pub struct ToneMap {
    pub layout: Option<RegionLayout>,
    pub notes: NoteGrid,
}

/// Samples a grid into a [`NoteGrid`]. Costs at most `max_tones` region queries.
#[derive(Debug, Clone)]
pub struct ToneMapper {
    max_tones: usize,
}

impl ToneMapper {
    pub fn new(max_tones: usize) -> Self {
        Self { max_tones }
    }

    pub fn max_tones(&self) -> usize {
        self.max_tones
    }

    pub fn set_max_tones(&mut self, max_tones: usize) {
        self.max_tones = max_tones;
    }

    pub fn map<G: GridStore + ?Sized>(&self, grid: &G) -> ToneMap {
        let Some(layout) = RegionLayout::compute(grid.width(), grid.height(), self.max_tones)
        else {
            return ToneMap {
                layout: None,
                notes: NoteGrid::default(),
            };
        };

        let mut rows = Vec::with_capacity(layout.rows as usize);
        let mut emitted = 0;

        'rows: for gy in 0..layout.rows {
            let mut row = Vec::with_capacity(layout.columns as usize);

            for gx in 0..layout.columns {
                if emitted == self.max_tones {
                    if !row.is_empty() {
                        rows.push(row);
                    }
                    break 'rows;
                }

                let sum =
                    grid.sub_region_sum(gx, gy, layout.region_width, layout.region_height);
                if sum == 0 {
                    // Empty or silent region ends this row
                    break;
                }

                row.push(note_for_sum(sum));
                emitted += 1;
            }

            if !row.is_empty() {
                rows.push(row);
            }
        }

        ToneMap {
            layout: Some(layout),
            notes: NoteGrid::new(rows),
        }
    }
}
