//! Final equilibration: Margolus-neighborhood water leveling.
//!
//! After the erosion loop, each 2×2 block settles its still water to a
//! single flat level found by bisection. Four checkerboard offsets per pass
//! guarantee every adjacent cell pairing is eventually equilibrated. The
//! solver conserves the block's total water volume up to the bisection's
//! numeric tolerance.

use rayon::prelude::*;

use crate::config::EquilibrationConfig;
use crate::grid::{DoubleBuffered, Grid, CH_STILL};

/// The four checkerboard offsets applied per pass.
pub const OFFSETS: [(usize, usize); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Bisect for the flat water level `L` over up to four cell heights such
/// that `sum(max(0, L - h_i))` equals `total_water_height`.
///
/// The sum is monotonically increasing in `L`, so bisection over
/// `[min h, max h + total / count]` converges unconditionally.
pub fn solve_water_level(heights: &[f32], total_water_height: f32, iterations: u32) -> f32 {
    debug_assert!(!heights.is_empty());
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &h in heights {
        lo = lo.min(h);
        hi = hi.max(h);
    }
    hi += total_water_height / heights.len() as f32;

    for _ in 0..iterations {
        let mid = 0.5 * (lo + hi);
        let filled: f32 = heights.iter().map(|&h| (mid - h).max(0.0)).sum();
        if filled > total_water_height {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// One checkerboard sub-pass over all aligned 2×2 blocks.
///
/// The caller must have copied the still-water channel wholesale into
/// `water_out` beforehand: this pass writes participating blocks only, and
/// non-participating cells keep their copied value.
pub fn sub_pass(
    terrain: &Grid,
    water_in: &Grid,
    water_out: &mut Grid,
    offset: (usize, usize),
    bisection_iterations: u32,
    water_height_factor: f32,
) {
    let width = terrain.width;
    let height = terrain.height;
    if offset.0 >= width || offset.1 >= height {
        return;
    }

    // Blocks in distinct block rows touch disjoint cell rows, so every
    // aligned pair of grid rows is an independent work item.
    let skip = offset.1 * width;
    water_out.cells_mut()[skip..]
        .par_chunks_mut(width * 2)
        .enumerate()
        .for_each(|(chunk, rows)| {
            let by = offset.1 + chunk * 2;
            let mut bx = offset.0;
            while bx < width {
                // Gather the valid cells of this block (clamped at grid edges).
                let mut cells: [(usize, usize); 4] = [(0, 0); 4];
                let mut heights = [0.0f32; 4];
                let mut count = 0usize;
                let mut total_water = 0.0f32;
                for dy in 0..2usize {
                    for dx in 0..2usize {
                        let x = bx + dx;
                        let y = by + dy;
                        if x < width && y < height {
                            cells[count] = (x, y);
                            heights[count] = terrain.channel(x, y, 0);
                            total_water +=
                                water_in.channel(x, y, CH_STILL) * water_height_factor;
                            count += 1;
                        }
                    }
                }
                if count > 0 && total_water > 0.0 {
                    let level =
                        solve_water_level(&heights[..count], total_water, bisection_iterations);
                    for i in 0..count {
                        let (x, y) = cells[i];
                        let new_still = (level - heights[i]).max(0.0) / water_height_factor;
                        rows[(y - by) * width + x][CH_STILL] = new_still;
                    }
                }
                bx += 2;
            }
        });
}

/// Run the configured number of full passes; each pass visits all four
/// checkerboard offsets, pre-copying the water grid before every sub-pass.
pub fn run(
    terrain: &Grid,
    water: &mut DoubleBuffered,
    params: &EquilibrationConfig,
    water_height_factor: f32,
) {
    for _ in 0..params.passes {
        for &offset in &OFFSETS {
            water.copy_to_back();
            {
                let (water_in, water_out) = water.split();
                sub_pass(
                    terrain,
                    water_in,
                    water_out,
                    offset,
                    params.bisection_iterations,
                    water_height_factor,
                );
            }
            water.swap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CH_FLOW, CH_STILL_SED};

    #[test]
    fn test_bisection_reference_case() {
        // Heights [0,1,2,3], total water height 3.0.
        let level = solve_water_level(&[0.0, 1.0, 2.0, 3.0], 3.0, 32);
        let filled: f32 = [0.0f32, 1.0, 2.0, 3.0]
            .iter()
            .map(|&h| (level - h).max(0.0))
            .sum();
        assert!((filled - 3.0).abs() < 1.0e-4, "filled {}", filled);
        // Analytic solution: water covers the three lowest cells at L = 2.
        assert!((level - 2.0).abs() < 1.0e-4);
    }

    #[test]
    fn test_bisection_single_cell() {
        let level = solve_water_level(&[1.5], 0.75, 32);
        assert!((level - 2.25).abs() < 1.0e-4);
    }

    #[test]
    fn test_sub_pass_conserves_block_volume() {
        let mut terrain = Grid::new(4, 4);
        let mut water = Grid::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                terrain.set_channel(x, y, 0, ((x * 5 + y * 3) % 7) as f32 * 0.1);
                water.set_channel(x, y, CH_STILL, ((x + y) % 3) as f32 * 0.4);
            }
        }
        let whf = 0.25;
        let mut out = water.clone();
        sub_pass(&terrain, &water, &mut out, (0, 0), 32, whf);

        // Each aligned 2x2 block conserves its total volume.
        for by in (0..4).step_by(2) {
            for bx in (0..4).step_by(2) {
                let block_total = |g: &Grid| -> f32 {
                    let mut sum = 0.0;
                    for dy in 0..2 {
                        for dx in 0..2 {
                            sum += g.channel(bx + dx, by + dy, CH_STILL);
                        }
                    }
                    sum
                };
                let before = block_total(&water);
                let after = block_total(&out);
                assert!(
                    (before - after).abs() < 1.0e-3,
                    "block ({},{}) {} -> {}",
                    bx,
                    by,
                    before,
                    after
                );
            }
        }
    }

    #[test]
    fn test_sub_pass_leaves_non_participants() {
        // Offset (1,1) on a 4x4 grid: row 0 and column 0 cells only join
        // blocks clamped at the far edge; cell (0,0) participates in no
        // block and must keep its pre-copied value.
        let terrain = Grid::new(4, 4);
        let mut water = Grid::new(4, 4);
        water.set_channel(0, 0, CH_STILL, 0.9);
        let mut out = water.clone();
        sub_pass(&terrain, &water, &mut out, (1, 1), 16, 0.25);
        assert_eq!(out.channel(0, 0, CH_STILL), 0.9);
    }

    #[test]
    fn test_flat_terrain_levels_out() {
        // All water in one corner of a flat 2x2 block spreads evenly.
        let terrain = Grid::new(2, 2);
        let mut water = DoubleBuffered::new(2, 2);
        water.current_mut().set_channel(0, 0, CH_STILL, 1.0);
        let params = EquilibrationConfig {
            passes: 1,
            bisection_iterations: 32,
        };
        run(&terrain, &mut water, &params, 0.25);
        for (_, _, cell) in water.current().iter() {
            assert!((cell[CH_STILL] - 0.25).abs() < 1.0e-3, "{}", cell[CH_STILL]);
        }
    }

    #[test]
    fn test_isolated_basins_keep_separate_levels() {
        // Two basins separated by a wall taller than either water level:
        // each basin settles flat without leaking across the wall.
        let mut terrain = Grid::new(4, 1);
        terrain.set_channel(2, 0, 0, 5.0);
        let mut water = DoubleBuffered::new(4, 1);
        water.current_mut().set_channel(0, 0, CH_STILL, 2.0);
        water.current_mut().set_channel(3, 0, CH_STILL, 0.5);
        let params = EquilibrationConfig {
            passes: 3,
            bisection_iterations: 32,
        };
        run(&terrain, &mut water, &params, 1.0);

        let still = |x: usize| water.current().channel(x, 0, CH_STILL);
        assert!((still(0) - 1.0).abs() < 1.0e-3);
        assert!((still(1) - 1.0).abs() < 1.0e-3);
        assert_eq!(still(2), 0.0);
        assert!((still(3) - 0.5).abs() < 1.0e-3);
    }

    #[test]
    fn test_other_channels_untouched() {
        let terrain = Grid::new(4, 4);
        let mut water = DoubleBuffered::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                water
                    .current_mut()
                    .set(x, y, [0.3, 0.01, 0.6, 0.02]);
            }
        }
        let params = EquilibrationConfig::default();
        run(&terrain, &mut water, &params, 0.25);
        for (_, _, cell) in water.current().iter() {
            assert_eq!(cell[CH_FLOW], 0.3);
            assert_eq!(cell[CH_STILL_SED], 0.02);
        }
    }
}
