//! Nearest-seed distance field (jump flood) and the ridge blend stage.
//!
//! The builder propagates nearest-seed coordinates across the grid in
//! O(log(max(W,H))) passes, each examining eight neighbors at the pass's
//! step offset. The final pass folds the per-cell best distances into a
//! single global maximum through a fixed-point reduction; the blend stage
//! then normalizes by that maximum and mixes the result with the inverted
//! noise height.

use rayon::prelude::*;

use crate::config::RidgeConfig;
use crate::grid::{DoubleBuffered, Grid, CH_DIST, CH_SEED_X, CH_SEED_Y};

/// Fixed-point scale for the quantized global max-distance accumulator.
pub const DIST_FIXED_SCALE: f32 = 1024.0;

/// Number of propagation passes for a W×H grid.
pub fn pass_count(width: usize, height: usize) -> u32 {
    let max_dim = width.max(height).max(1) as u32;
    32 - max_dim.leading_zeros()
}

/// Step size for a given pass index.
///
/// Pass 0 uses step 1; pass i uses `max(W,H) >> i`, clamped to at least 1.
/// The progression is non-monotonic relative to the textbook sequence, but
/// the pass count still visits every power of two, so coverage holds.
pub fn step_for_pass(width: usize, height: usize, pass: u32) -> i32 {
    if pass == 0 {
        1
    } else {
        ((width.max(height) as u32) >> pass).max(1) as i32
    }
}

/// One propagation pass: every cell examines 8 neighbors at `step` offset
/// and adopts any closer valid seed. Reads `src`, writes `dst`.
pub fn flood_pass(src: &Grid, dst: &mut Grid, step: i32) {
    let width = src.width;
    let height = src.height;
    dst.cells_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut best = src.get(x, y);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx * step;
                        let ny = y as i32 + dy * step;
                        if !src.in_bounds(nx, ny) {
                            continue;
                        }
                        let neighbor = src.get(nx as usize, ny as usize);
                        if neighbor[CH_SEED_X] < 0.0 {
                            continue;
                        }
                        let sx = neighbor[CH_SEED_X];
                        let sy = neighbor[CH_SEED_Y];
                        let ddx = x as f32 - sx;
                        let ddy = y as f32 - sy;
                        let dist = (ddx * ddx + ddy * ddy).sqrt();
                        if dist < best[CH_DIST] {
                            best = [sx, sy, neighbor[2], dist];
                        }
                    }
                }
                *out = best;
            }
        });
}

/// Fold all per-cell distances into the global maximum, quantized to fixed
/// point exactly like the shader's shared-memory + atomic-max reduction.
pub fn max_distance(grid: &Grid) -> f32 {
    let quantized = grid
        .cells()
        .par_iter()
        .map(|cell| {
            let d = cell[CH_DIST];
            if d < 0.0 || d >= crate::grid::DIST_SENTINEL {
                0
            } else {
                (d * DIST_FIXED_SCALE) as u32
            }
        })
        .max()
        .unwrap_or(0);
    quantized as f32 / DIST_FIXED_SCALE
}

/// Run the full pass sequence over the double-buffered seed grid.
/// Returns the global maximum distance; the final field is in `current()`.
pub fn build(seeds: &mut DoubleBuffered) -> f32 {
    let width = seeds.current().width;
    let height = seeds.current().height;
    let passes = pass_count(width, height);
    for pass in 0..passes {
        let step = step_for_pass(width, height, pass);
        let (src, dst) = seeds.split();
        flood_pass(src, dst, step);
        seeds.swap();
    }
    max_distance(seeds.current())
}

/// Blend the normalized distance field with the inverted noise height to
/// produce the structured initial terrain.
pub fn blend(noise_height: &Grid, seeds: &Grid, max_dist: f32, ridge: &RidgeConfig, out: &mut Grid) {
    let width = out.width;
    let denom = ridge.heightmap_weight + ridge.distance_weight;
    let blend_factor = if denom > 0.0 {
        (ridge.distance_weight / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    out.cells_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, cell) in row.iter_mut().enumerate() {
                let h = noise_height.channel(x, y, 0);
                let dist = seeds.channel(x, y, CH_DIST);
                let norm = if max_dist > 0.0 {
                    (dist / max_dist).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let inverted = 1.0 - h;
                cell[0] = inverted + (norm - inverted) * blend_factor;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DIST_SENTINEL, CH_SEED_H};

    fn seed_grid_with_one_seed(size: usize, sx: usize, sy: usize) -> DoubleBuffered {
        let mut db = DoubleBuffered::new_with(
            size,
            size,
            [-1.0, -1.0, 0.0, DIST_SENTINEL],
        );
        db.current_mut().set(sx, sy, [sx as f32, sy as f32, 0.7, 0.0]);
        // Both instances start from the same classification.
        db.copy_to_back();
        db
    }

    #[test]
    fn test_pass_count_matches_log2() {
        assert_eq!(pass_count(8, 8), 4); // floor(log2(8)) + 1
        assert_eq!(pass_count(64, 64), 7);
        assert_eq!(pass_count(64, 128), 8);
        assert_eq!(pass_count(1, 1), 1);
    }

    #[test]
    fn test_step_progression() {
        // Observed sequence: fine pass first, then decreasing powers of two.
        let steps: Vec<i32> = (0..pass_count(64, 64))
            .map(|p| step_for_pass(64, 64, p))
            .collect();
        assert_eq!(steps, vec![1, 32, 16, 8, 4, 2, 1]);
    }

    #[test]
    fn test_single_seed_exact_distances() {
        let mut seeds = seed_grid_with_one_seed(8, 0, 0);
        let max = build(&mut seeds);

        for (x, y, cell) in seeds.current().iter() {
            let expected = ((x * x + y * y) as f32).sqrt();
            assert_eq!(cell[CH_SEED_X], 0.0);
            assert_eq!(cell[CH_SEED_Y], 0.0);
            assert!(
                (cell[CH_DIST] - expected).abs() < 1.0e-4,
                "cell ({},{}) distance {} expected {}",
                x,
                y,
                cell[CH_DIST],
                expected
            );
        }
        let expected_max = (2.0 * 49.0f32).sqrt();
        assert!((max - expected_max).abs() < 2.0 / DIST_FIXED_SCALE);
    }

    #[test]
    fn test_seed_height_propagates() {
        let mut seeds = seed_grid_with_one_seed(16, 5, 9);
        build(&mut seeds);
        for (_, _, cell) in seeds.current().iter() {
            assert_eq!(cell[CH_SEED_H], 0.7);
        }
    }

    #[test]
    fn test_blend_weights() {
        let size = 4;
        let mut noise = Grid::new(size, size);
        noise.fill([0.25, 0.0, 0.0, 0.0]);
        let mut seeds = Grid::new(size, size);
        seeds.fill([0.0, 0.0, 0.0, 2.0]);
        let mut out = Grid::new(size, size);

        // Pure heightmap: blend factor 0 leaves the inverted noise height.
        let ridge = RidgeConfig {
            seed_threshold: 0.5,
            heightmap_weight: 1.0,
            distance_weight: 0.0,
        };
        blend(&noise, &seeds, 4.0, &ridge, &mut out);
        assert!((out.channel(0, 0, 0) - 0.75).abs() < 1.0e-6);

        // Pure distance: normalized distance only.
        let ridge = RidgeConfig {
            seed_threshold: 0.5,
            heightmap_weight: 0.0,
            distance_weight: 1.0,
        };
        blend(&noise, &seeds, 4.0, &ridge, &mut out);
        assert!((out.channel(0, 0, 0) - 0.5).abs() < 1.0e-6);

        // Zero max distance normalizes to 0 everywhere.
        blend(&noise, &seeds, 0.0, &ridge, &mut out);
        assert_eq!(out.channel(0, 0, 0), 0.0);
    }
}
