//! Still-water redistribution kernel.
//!
//! Local slope-weighted settling of the pooled water between erosion steps.
//! Uses the same 8-direction weighting as the hydraulic kernel but driven
//! purely by terrain plus still water; flowing water and its sediment pass
//! through unmodified.

use rayon::prelude::*;

use crate::config::StillWaterConfig;
use crate::grid::{Grid, CH_FLOW, CH_FLOW_SED, CH_STILL, CH_STILL_SED};
use crate::sim::hydraulic::{effective_height, flow_weights, FlowWeights, NEIGHBORS};

/// Outflow volume for one cell: the relaxed share of its pool, scaled by
/// the raw outflow weight (clamped to [0,1]) and capped by the pool itself.
fn outflow_volume(still: f32, weights: &FlowWeights, relaxation: f32) -> f32 {
    let total = weights.total_raw.clamp(0.0, 1.0);
    (relaxation * still * total).min(still)
}

/// One redistribution pass. Reads complete snapshots, writes the alternate
/// water instance. Terrain is read-only here.
pub fn step(
    terrain: &Grid,
    water_in: &Grid,
    water_out: &mut Grid,
    params: &StillWaterConfig,
    water_height_factor: f32,
) {
    let width = terrain.width;
    water_out
        .cells_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let cell = water_in.get(x, y);
                // Flowing water is ignored for settling direction.
                let own = flow_weights(terrain, water_in, x, y, water_height_factor, 0.0);
                let eh = effective_height(terrain, water_in, x, y, water_height_factor, 0.0);

                let out_volume = outflow_volume(cell[CH_STILL], &own, params.relaxation);
                let own_concentration = if cell[CH_STILL] > 0.0 {
                    cell[CH_STILL_SED] / cell[CH_STILL]
                } else {
                    0.0
                };

                // Symmetric gather from uphill neighbors.
                let mut in_volume = 0.0f32;
                let mut in_sed = 0.0f32;
                for (i, &(dx, dy)) in NEIGHBORS.iter().enumerate() {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if !terrain.in_bounds(nx, ny) {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    let neh = effective_height(terrain, water_in, nx, ny, water_height_factor, 0.0);
                    if neh <= eh {
                        continue;
                    }
                    let nw = flow_weights(terrain, water_in, nx, ny, water_height_factor, 0.0);
                    let toward_me = nw.weights[7 - i];
                    if toward_me <= 0.0 {
                        continue;
                    }
                    let n_cell = water_in.get(nx, ny);
                    let n_out = outflow_volume(n_cell[CH_STILL], &nw, params.relaxation);
                    let moved = n_out * toward_me;
                    in_volume += moved;
                    // Sediment moves with the water at source concentration.
                    if n_cell[CH_STILL] > 0.0 {
                        in_sed += moved * (n_cell[CH_STILL_SED] / n_cell[CH_STILL]);
                    }
                }

                let out_sed = out_volume * own_concentration;
                let new_still = (cell[CH_STILL] - out_volume + in_volume).max(0.0);
                let new_still_sed = (cell[CH_STILL_SED] - out_sed + in_sed).max(0.0);

                *out = [cell[CH_FLOW], cell[CH_FLOW_SED], new_still, new_still_sed];
            }
        });
}
