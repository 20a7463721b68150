//! Dense 2D simulation grids.
//!
//! Every grid cell carries four float channels, matching the vec4 storage
//! layout the compute kernels use. Grids are allocated once per run and
//! double-buffered so a pass always reads a complete snapshot while writing
//! the alternate instance.

/// One grid cell: four float channels.
pub type Cell = [f32; 4];

// Water grid channel assignments.
pub const CH_FLOW: usize = 0;
pub const CH_FLOW_SED: usize = 1;
pub const CH_STILL: usize = 2;
pub const CH_STILL_SED: usize = 3;

// Seed/distance grid channel assignments (ridge preprocessing only).
pub const CH_SEED_X: usize = 0;
pub const CH_SEED_Y: usize = 1;
pub const CH_SEED_H: usize = 2;
pub const CH_DIST: usize = 3;

/// Sentinel distance for cells that have not yet adopted a seed.
pub const DIST_SENTINEL: f32 = 1.0e9;

/// A dense width×height grid of 4-channel cells.
///
/// Unlike an equirectangular map, erosion grids do not wrap: out-of-bounds
/// neighbors are simply absent, and kernels skip them.
#[derive(Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    data: Vec<Cell>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![[0.0; 4]; width * height],
        }
    }

    pub fn new_with(width: usize, height: usize, cell: Cell) -> Self {
        Self {
            width,
            height,
            data: vec![cell; width * height],
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let idx = self.index(x, y);
        self.data[idx] = cell;
    }

    #[inline]
    pub fn channel(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[self.index(x, y)][c]
    }

    #[inline]
    pub fn set_channel(&mut self, x: usize, y: usize, c: usize, value: f32) {
        let idx = self.index(x, y);
        self.data[idx][c] = value;
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn fill(&mut self, cell: Cell) {
        self.data.fill(cell);
    }

    /// Extract one channel as a flat row-major array.
    pub fn channel_vec(&self, c: usize) -> Vec<f32> {
        self.data.iter().map(|cell| cell[c]).collect()
    }

    /// Raw cell slice, row-major.
    pub fn cells(&self) -> &[Cell] {
        &self.data
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.data
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.data.iter().enumerate().map(move |(idx, cell)| {
            let x = idx % self.width;
            let y = idx / self.width;
            (x, y, cell)
        })
    }
}

/// Ping-pong pair of grid instances.
///
/// Exactly one instance is "current" at any time; kernels read the current
/// instance and write the other, then the orchestrator flips parity. The
/// flip is an index swap, never a data copy.
pub struct DoubleBuffered {
    grids: [Grid; 2],
    current: usize,
}

impl DoubleBuffered {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            grids: [Grid::new(width, height), Grid::new(width, height)],
            current: 0,
        }
    }

    pub fn new_with(width: usize, height: usize, cell: Cell) -> Self {
        Self {
            grids: [
                Grid::new_with(width, height, cell),
                Grid::new_with(width, height, cell),
            ],
            current: 0,
        }
    }

    /// Seed both instances from an existing grid.
    pub fn from_grid(grid: Grid) -> Self {
        Self {
            grids: [grid.clone(), grid],
            current: 0,
        }
    }

    pub fn current(&self) -> &Grid {
        &self.grids[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Grid {
        &mut self.grids[self.current]
    }

    /// Borrow the read snapshot and the write target simultaneously.
    pub fn split(&mut self) -> (&Grid, &mut Grid) {
        let (a, b) = self.grids.split_at_mut(1);
        if self.current == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Copy the current instance wholesale into the back instance.
    ///
    /// Required before passes that only write a strict subset of cells
    /// (the Margolus checkerboard); non-participating cells must retain
    /// their value in the output.
    pub fn copy_to_back(&mut self) {
        let (src, dst) = self.split();
        dst.cells_mut().copy_from_slice(src.cells());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_buffer_swap_is_index_flip() {
        let mut db = DoubleBuffered::new(4, 4);
        db.current_mut().set(1, 1, [5.0, 0.0, 0.0, 0.0]);
        db.swap();
        // Back buffer untouched by the swap itself.
        assert_eq!(db.current().get(1, 1), [0.0; 4]);
        db.swap();
        assert_eq!(db.current().get(1, 1), [5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_copy_to_back_preserves_all_cells() {
        let mut db = DoubleBuffered::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                db.current_mut().set(x, y, [x as f32, y as f32, 0.0, 1.0]);
            }
        }
        db.copy_to_back();
        db.swap();
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(db.current().get(x, y), [x as f32, y as f32, 0.0, 1.0]);
            }
        }
    }

    #[test]
    fn test_bounds_check() {
        let grid = Grid::new(8, 4);
        assert!(grid.in_bounds(0, 0));
        assert!(grid.in_bounds(7, 3));
        assert!(!grid.in_bounds(8, 0));
        assert!(!grid.in_bounds(0, 4));
        assert!(!grid.in_bounds(-1, 2));
    }
}
