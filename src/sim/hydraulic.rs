//! Hydraulic erosion kernel.
//!
//! Gather-style per-cell flow routing: every cell computes its own downhill
//! flow weights from a complete snapshot, then pulls inflow from uphill
//! neighbors using their reciprocal weights. No cell ever writes another
//! cell's state, so all cells run independently within a pass.

use rayon::prelude::*;

use crate::config::HydraulicConfig;
use crate::grid::{Grid, CH_FLOW, CH_FLOW_SED, CH_STILL, CH_STILL_SED};
use crate::sim::noise::cell_hash01;

/// 8-neighborhood offsets; index `7 - i` is the reciprocal direction of `i`.
pub const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Inverse neighbor distance (1 axial, 1/sqrt(2) diagonal).
pub const INV_DIST: [f32; 8] = [
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
];

/// Bounds of the adaptive flow-distribution exponent.
pub const EXPONENT_MIN: f32 = 0.8;
pub const EXPONENT_MAX: f32 = 2.5;

/// Scales the effective-height Laplacian into the [0,1] valleyness value.
pub const CURVATURE_SCALE: f32 = 8.0;

/// Water volume injected per spawned droplet.
pub const SPAWN_VOLUME: f32 = 0.25;

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Effective height: terrain plus weighted water depth, used for flow
/// direction. Still water counts at full weight, flowing water at
/// `flow_depth_weight` (pass 0 to ignore flowing water entirely).
#[inline]
pub fn effective_height(
    terrain: &Grid,
    water: &Grid,
    x: usize,
    y: usize,
    water_height_factor: f32,
    flow_depth_weight: f32,
) -> f32 {
    let h = terrain.channel(x, y, 0);
    let w = water.get(x, y);
    h + water_height_factor * (w[CH_STILL] + flow_depth_weight * w[CH_FLOW])
}

/// Per-cell downhill flow distribution.
pub struct FlowWeights {
    /// Normalized weight toward each of the 8 neighbors; sums to 1 when a
    /// downhill neighbor exists, 0 otherwise.
    pub weights: [f32; 8],
    /// Raw (pre-normalization) weight sum.
    pub total_raw: f32,
    /// Flow-weighted average downhill slope.
    pub avg_slope: f32,
    /// The adaptive distribution exponent used.
    pub exponent: f32,
}

impl FlowWeights {
    pub fn has_downhill(&self) -> bool {
        self.total_raw > 0.0
    }
}

/// Compute the adaptive multi-directional flow weights for one cell.
///
/// The discrete Laplacian of effective height over the 4-neighborhood acts
/// as a curvature proxy: positive curvature (cell below its surroundings)
/// raises the exponent, concentrating flow in valleys; negative curvature
/// lowers it, spreading flow across slopes.
pub fn flow_weights(
    terrain: &Grid,
    water: &Grid,
    x: usize,
    y: usize,
    water_height_factor: f32,
    flow_depth_weight: f32,
) -> FlowWeights {
    let eh = effective_height(terrain, water, x, y, water_height_factor, flow_depth_weight);

    // 4-neighborhood Laplacian; out-of-bounds neighbors contribute zero.
    let mut lap = 0.0f32;
    for &(dx, dy) in &[(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if terrain.in_bounds(nx, ny) {
            let neh = effective_height(
                terrain,
                water,
                nx as usize,
                ny as usize,
                water_height_factor,
                flow_depth_weight,
            );
            lap += neh - eh;
        }
    }
    let valleyness = (lap * CURVATURE_SCALE).clamp(0.0, 1.0);
    let exponent = EXPONENT_MIN + (EXPONENT_MAX - EXPONENT_MIN) * valleyness;

    let mut weights = [0.0f32; 8];
    let mut slopes = [0.0f32; 8];
    let mut total_raw = 0.0f32;
    for (i, &(dx, dy)) in NEIGHBORS.iter().enumerate() {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if !terrain.in_bounds(nx, ny) {
            continue;
        }
        let neh = effective_height(
            terrain,
            water,
            nx as usize,
            ny as usize,
            water_height_factor,
            flow_depth_weight,
        );
        if neh >= eh {
            continue;
        }
        let slope = (eh - neh) * INV_DIST[i];
        let raw = (slope * INV_DIST[i]).powf(exponent);
        weights[i] = raw;
        slopes[i] = slope;
        total_raw += raw;
    }

    let mut avg_slope = 0.0f32;
    if total_raw > 0.0 {
        for i in 0..8 {
            weights[i] /= total_raw;
            avg_slope += weights[i] * slopes[i];
        }
    }

    FlowWeights {
        weights,
        total_raw,
        avg_slope,
        exponent,
    }
}

/// One hydraulic erosion iteration. Reads complete snapshots of terrain and
/// water, writes the alternate instances.
pub fn step(
    terrain_in: &Grid,
    water_in: &Grid,
    terrain_out: &mut Grid,
    water_out: &mut Grid,
    params: &HydraulicConfig,
    iteration: u32,
) {
    let width = terrain_in.width;
    let whf = params.water_height_factor;
    let fdw = params.flow_depth_weight;

    let terrain_rows = terrain_out.cells_mut().par_chunks_mut(width);
    let water_rows = water_out.cells_mut().par_chunks_mut(width);
    terrain_rows
        .zip(water_rows)
        .enumerate()
        .for_each(|(y, (t_row, w_row))| {
            for x in 0..width {
                let own = flow_weights(terrain_in, water_in, x, y, whf, fdw);
                let eh = effective_height(terrain_in, water_in, x, y, whf, fdw);
                let t_cell = terrain_in.get(x, y);
                let w_cell = water_in.get(x, y);

                // Gather inflow from uphill neighbors: the fraction a
                // neighbor routes toward this cell is its own normalized
                // weight in the reciprocal direction.
                let mut inflow_water = 0.0f32;
                let mut inflow_sed = 0.0f32;
                for (i, &(dx, dy)) in NEIGHBORS.iter().enumerate() {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if !terrain_in.in_bounds(nx, ny) {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    let neh = effective_height(terrain_in, water_in, nx, ny, whf, fdw);
                    if neh <= eh {
                        continue;
                    }
                    let nw = flow_weights(terrain_in, water_in, nx, ny, whf, fdw);
                    let toward_me = nw.weights[7 - i];
                    if toward_me > 0.0 {
                        let n_water = water_in.get(nx, ny);
                        inflow_water += n_water[CH_FLOW] * toward_me;
                        inflow_sed += n_water[CH_FLOW_SED] * toward_me;
                    }
                }

                // Evaporation applies once to gathered inflow.
                inflow_water *= 1.0 - params.evaporation_rate;

                let mut new_height = t_cell[0];
                let mut new_flow;
                let mut new_flow_sed;
                let mut new_still = w_cell[CH_STILL];
                let mut new_still_sed = w_cell[CH_STILL_SED];

                if own.has_downhill() {
                    // The entire local stock flowed out along the weights;
                    // the new stock is the gathered inflow.
                    new_flow = inflow_water;
                    new_flow_sed = inflow_sed;

                    // Depth-scaled shear, gated through the smooth threshold.
                    let shear = new_flow * own.avg_slope;
                    let gate = smoothstep(params.shear_shallow, params.shear_deep, shear);
                    let capacity = new_flow * own.avg_slope * gate;

                    // Symmetric exchange: erode terrain when capacity
                    // exceeds sediment, deposit otherwise. Deposition is
                    // bounded by the sediment actually carried.
                    let mut delta = (capacity - new_flow_sed) * params.deposition_rate;
                    if delta < -new_flow_sed {
                        delta = -new_flow_sed;
                    }
                    new_height -= delta;
                    new_flow_sed += delta;
                } else {
                    // Pit: local flowing stock (minus evaporation) settles
                    // into the still pool; its sediment follows in full.
                    new_still += w_cell[CH_FLOW] * (1.0 - params.evaporation_rate);
                    new_still_sed += w_cell[CH_FLOW_SED];
                    new_flow = inflow_water;
                    new_flow_sed = inflow_sed;
                }

                // Droplet injection during the spawn window.
                if iteration < params.spawn_cycles
                    && cell_hash01(x as u32, y as u32, params.random_seed, iteration)
                        < params.spawn_density
                {
                    new_flow += SPAWN_VOLUME;
                }

                // Cap flowing water; overflow spills to the still pool with
                // its proportional sediment share.
                if new_flow > params.max_flow_volume {
                    let excess = new_flow - params.max_flow_volume;
                    let fraction = excess / new_flow;
                    new_still += excess;
                    new_still_sed += new_flow_sed * fraction;
                    new_flow_sed *= 1.0 - fraction;
                    new_flow = params.max_flow_volume;
                }

                t_row[x] = [new_height, t_cell[1], t_cell[2], t_cell[3]];
                w_row[x] = [
                    new_flow.max(0.0),
                    new_flow_sed.max(0.0),
                    new_still.max(0.0),
                    new_still_sed.max(0.0),
                ];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_terrain(size: usize, seed: u64, scale: f32) -> Grid {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut grid = Grid::new(size, size);
        for y in 0..size {
            for x in 0..size {
                grid.set_channel(x, y, 0, rng.gen::<f32>() * scale);
            }
        }
        grid
    }

    fn random_water(size: usize, seed: u64) -> Grid {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut grid = Grid::new(size, size);
        for y in 0..size {
            for x in 0..size {
                grid.set(
                    x,
                    y,
                    [
                        rng.gen::<f32>() * 0.5,
                        rng.gen::<f32>() * 0.1,
                        rng.gen::<f32>() * 0.3,
                        rng.gen::<f32>() * 0.05,
                    ],
                );
            }
        }
        grid
    }

    #[test]
    fn test_exponent_stays_in_bounds() {
        // Extreme curvature in both directions.
        let size = 5;
        let water = Grid::new(size, size);

        let mut spike = Grid::new(size, size);
        spike.set_channel(2, 2, 0, 1000.0);
        let w = flow_weights(&spike, &water, 2, 2, 0.25, 0.35);
        assert!(w.exponent >= EXPONENT_MIN && w.exponent <= EXPONENT_MAX);

        let mut pit = Grid::new_with(size, size, [1000.0, 0.0, 0.0, 0.0]);
        pit.set_channel(2, 2, 0, -1000.0);
        let w = flow_weights(&pit, &water, 2, 2, 0.25, 0.35);
        assert!(w.exponent >= EXPONENT_MIN && w.exponent <= EXPONENT_MAX);
        // A deep pit is maximal valleyness.
        assert!((w.exponent - EXPONENT_MAX).abs() < 1.0e-5);
    }

    #[test]
    fn test_flow_weights_normalized() {
        let size = 16;
        let terrain = random_terrain(size, 7, 1.0);
        let water = random_water(size, 8);
        for y in 0..size {
            for x in 0..size {
                let w = flow_weights(&terrain, &water, x, y, 0.25, 0.35);
                let sum: f32 = w.weights.iter().sum();
                if w.has_downhill() {
                    assert!((sum - 1.0).abs() < 1.0e-5, "weights sum {}", sum);
                } else {
                    assert_eq!(sum, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_pit_has_no_outflow() {
        let size = 3;
        let mut terrain = Grid::new_with(size, size, [5.0, 0.0, 0.0, 0.0]);
        terrain.set_channel(1, 1, 0, 0.0);
        let water = Grid::new(size, size);
        let w = flow_weights(&terrain, &water, 1, 1, 0.25, 0.35);
        assert!(!w.has_downhill());
    }

    #[test]
    fn test_water_and_sediment_never_negative() {
        let size = 24;
        let params = HydraulicConfig::default();
        let mut terrain = crate::grid::DoubleBuffered::from_grid(random_terrain(size, 21, 2.0));
        let mut water = crate::grid::DoubleBuffered::from_grid(random_water(size, 22));

        for iteration in 0..40 {
            {
                let (t_in, t_out) = terrain.split();
                let (w_in, w_out) = water.split();
                step(t_in, w_in, t_out, w_out, &params, iteration);
            }
            terrain.swap();
            water.swap();
            for (_, _, cell) in water.current().iter() {
                for &c in cell {
                    assert!(c >= 0.0, "negative channel {}", c);
                }
            }
        }
    }

    #[test]
    fn test_sediment_mass_conserved() {
        // Terrain mass + transported sediment mass is invariant under one
        // step: erosion mirrors terrain loss into carried sediment exactly.
        let size = 16;
        let params = HydraulicConfig {
            spawn_cycles: 0, // no injection, pure transport
            ..Default::default()
        };
        let terrain_in = random_terrain(size, 31, 1.0);
        let water_in = random_water(size, 32);
        let mut terrain_out = Grid::new(size, size);
        let mut water_out = Grid::new(size, size);
        step(&terrain_in, &water_in, &mut terrain_out, &mut water_out, &params, 0);

        let mass = |t: &Grid, w: &Grid| -> f64 {
            let mut sum = 0.0f64;
            for (x, y, cell) in t.iter() {
                sum += cell[0] as f64;
                let wc = w.get(x, y);
                sum += (wc[CH_FLOW_SED] + wc[CH_STILL_SED]) as f64;
            }
            sum
        };
        let before = mass(&terrain_in, &water_in);
        let after = mass(&terrain_out, &water_out);
        assert!(
            (before - after).abs() < 1.0e-3,
            "mass drift {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn test_flow_capped_with_spill() {
        let params = HydraulicConfig {
            max_flow_volume: 1.0,
            spawn_cycles: 0,
            evaporation_rate: 0.0,
            ..Default::default()
        };
        // 2x1 grid: the tall cell routes all of its heavy stock into the
        // low cell, pushing it far past the flow cap.
        let mut terrain = Grid::new(2, 1);
        terrain.set_channel(0, 0, 0, 10.0);
        let mut water = Grid::new(2, 1);
        water.set(0, 0, [8.0, 0.8, 0.0, 0.0]);

        let mut terrain_out = Grid::new(2, 1);
        let mut water_out = Grid::new(2, 1);
        step(&terrain, &water, &mut terrain_out, &mut water_out, &params, 0);

        let low = water_out.get(1, 0);
        assert!(low[CH_FLOW] <= params.max_flow_volume + 1.0e-5);
        // Overflow landed in the still pool.
        assert!((low[CH_FLOW] + low[CH_STILL] - 8.0).abs() < 1.0e-4);
        // Spilled sediment moved with its proportional water share.
        let total_sed: f32 = water_out
            .iter()
            .map(|(_, _, c)| c[CH_FLOW_SED] + c[CH_STILL_SED])
            .sum();
        assert!((total_sed - 0.8).abs() < 1.0e-4);
        let spilled_frac = low[CH_STILL] / 8.0;
        assert!((low[CH_STILL_SED] - 0.8 * spilled_frac).abs() < 1.0e-4);
    }
}
