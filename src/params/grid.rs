//! Grid sizing and seeding parameters.

/// Grid configuration
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Edge length of one cell on screen (pixels)
    /// Also the world-space size of one instance quad
    pub cell_edge_px: f32,

    /// Seeding strata across the grid width
    pub divisions_x: u32,

    /// Seeding strata across the grid height
    pub divisions_y: u32,

    /// RNG seed for pattern placement
    pub seed: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_edge_px: 7.0,
            divisions_x: 30,
            divisions_y: 60,
            seed: 42,
        }
    }
}

impl GridConfig {
    /// Grid dimensions (cells) that fit a surface of the given pixel size.
    ///
    /// Returns `None` while the surface has not been measured (zero size).
    pub fn cells_for_surface(&self, width_px: u32, height_px: u32) -> Option<(u32, u32)> {
        let width = (width_px as f32 / self.cell_edge_px).floor() as u32;
        let height = (height_px as f32 / self.cell_edge_px).floor() as u32;

        if width == 0 || height == 0 {
            None
        } else {
            Some((width, height))
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.cell_edge_px > 0.0) {
            return Err(format!(
                "Cell edge must be > 0 px, got {}",
                self.cell_edge_px
            ));
        }
        if self.divisions_x == 0 || self.divisions_y == 0 {
            return Err("Seeding divisions must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_for_surface() {
        let config = GridConfig::default();
        assert_eq!(config.cells_for_surface(1280, 720), Some((182, 102)));
        assert_eq!(config.cells_for_surface(0, 720), None);
        assert_eq!(config.cells_for_surface(6, 720), None);
    }

    #[test]
    fn test_validate() {
        assert!(GridConfig::default().validate().is_ok());

        let bad = GridConfig {
            cell_edge_px: 0.0,
            ..GridConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
