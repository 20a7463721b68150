//! Thermal erosion kernel.
//!
//! Moisture-adaptive talus-angle slope relaxation. Where the outward slope
//! toward a neighbor exceeds the cell's allowed talus, the excess (scaled by
//! the thermal strength) moves downhill; the receiving side computes the
//! mirrored inward transfer with the source cell's talus, so material
//! removed from one cell is exactly the material added to the other.

use rayon::prelude::*;

use crate::config::ThermalConfig;
use crate::grid::{Grid, CH_FLOW, CH_STILL};
use crate::sim::hydraulic::{smoothstep, INV_DIST, NEIGHBORS};

/// Allowed talus slope for a cell: elevation-bracket interpolation of the
/// dry talus, relaxed toward the wet value by flowing-water depth, then
/// toward the immersed value by still-water depth in height units.
pub fn allowed_talus(
    height: f32,
    flow: f32,
    still: f32,
    params: &ThermalConfig,
    water_height_factor: f32,
) -> f32 {
    let bracket = if params.elevation_high > params.elevation_low {
        ((height - params.elevation_low) / (params.elevation_high - params.elevation_low))
            .clamp(0.0, 1.0)
    } else {
        0.0
    };
    let dry = params.dry_talus_low + (params.dry_talus_high - params.dry_talus_low) * bracket;

    let wetness = smoothstep(params.flow_ramp_low, params.flow_ramp_high, flow);
    let talus = dry + (params.talus_wet - dry) * wetness;

    let immersion = smoothstep(
        params.immersion_ramp_low,
        params.immersion_ramp_high,
        still * water_height_factor,
    );
    talus + (params.talus_immersed - talus) * immersion
}

/// Material moved from a source cell toward one lower neighbor: the slope
/// excess over the source's talus, distance-corrected, scaled by strength
/// and split across the 8 directions.
#[inline]
fn transfer(h_src: f32, h_dst: f32, talus_src: f32, inv_dist: f32, strength: f32) -> f32 {
    let rise = h_src - h_dst;
    let run = 1.0 / inv_dist;
    let excess = rise - talus_src * run;
    if excess > 0.0 {
        strength * excess / 8.0
    } else {
        0.0
    }
}

/// One thermal relaxation pass. Reads complete terrain and water snapshots,
/// writes the alternate terrain instance. Water is read-only.
pub fn step(
    terrain_in: &Grid,
    water: &Grid,
    terrain_out: &mut Grid,
    params: &ThermalConfig,
    water_height_factor: f32,
) {
    let width = terrain_in.width;
    terrain_out
        .cells_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let cell = terrain_in.get(x, y);
                let h = cell[0];
                let w = water.get(x, y);
                let talus = allowed_talus(h, w[CH_FLOW], w[CH_STILL], params, water_height_factor);

                let mut delta = 0.0f32;
                for (i, &(dx, dy)) in NEIGHBORS.iter().enumerate() {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if !terrain_in.in_bounds(nx, ny) {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    let nh = terrain_in.channel(nx, ny, 0);
                    if nh < h {
                        // Outward: this cell sheds its excess slope.
                        delta -= transfer(h, nh, talus, INV_DIST[i], params.strength);
                    } else if nh > h {
                        // Inward: the steeper neighbor sheds toward us,
                        // judged by its own talus.
                        let nw = water.get(nx, ny);
                        let n_talus = allowed_talus(
                            nh,
                            nw[CH_FLOW],
                            nw[CH_STILL],
                            params,
                            water_height_factor,
                        );
                        delta += transfer(nh, h, n_talus, INV_DIST[i], params.strength);
                    }
                }

                delta = delta.clamp(-params.max_delta, params.max_delta);
                *out = [h + delta, cell[1], cell[2], cell[3]];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_talus_elevation_brackets() {
        let params = ThermalConfig::default();
        let low = allowed_talus(0.0, 0.0, 0.0, &params, 0.25);
        let high = allowed_talus(1.0, 0.0, 0.0, &params, 0.25);
        let mid = allowed_talus(0.5, 0.0, 0.0, &params, 0.25);
        assert!((low - params.dry_talus_low).abs() < 1.0e-6);
        assert!((high - params.dry_talus_high).abs() < 1.0e-6);
        assert!(mid > low && mid < high);
    }

    #[test]
    fn test_talus_relaxes_with_moisture() {
        let params = ThermalConfig::default();
        let dry = allowed_talus(0.5, 0.0, 0.0, &params, 0.25);
        let wet = allowed_talus(0.5, params.flow_ramp_high, 0.0, &params, 0.25);
        let immersed = allowed_talus(0.5, 0.0, 10.0, &params, 0.25);
        assert!(wet < dry);
        assert!((wet - params.talus_wet).abs() < 1.0e-6);
        assert!((immersed - params.talus_immersed).abs() < 1.0e-6);
    }

    #[test]
    fn test_steep_cliff_relaxes_and_conserves_mass() {
        let size = 8;
        let mut terrain = Grid::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let h = if x < size / 2 { 1.0 } else { 0.0 };
                terrain.set_channel(x, y, 0, h);
            }
        }
        let water = Grid::new(size, size);
        let params = ThermalConfig {
            max_delta: 10.0, // large clamp so transfers stay symmetric
            ..Default::default()
        };

        let before: f64 = terrain.iter().map(|(_, _, c)| c[0] as f64).sum();
        let mut out = Grid::new(size, size);
        step(&terrain, &water, &mut out, &params, 0.25);
        let after: f64 = out.iter().map(|(_, _, c)| c[0] as f64).sum();

        // Cliff edge moved material downhill.
        assert!(out.channel(size / 2 - 1, 2, 0) < 1.0);
        assert!(out.channel(size / 2, 2, 0) > 0.0);
        // Unclamped transfers are symmetric, so total height is conserved.
        assert!((before - after).abs() < 1.0e-4);
    }

    #[test]
    fn test_max_delta_clamp() {
        let size = 5;
        let mut terrain = Grid::new(size, size);
        terrain.set_channel(2, 2, 0, 100.0);
        let water = Grid::new(size, size);
        let params = ThermalConfig::default();

        let mut out = Grid::new(size, size);
        step(&terrain, &water, &mut out, &params, 0.25);
        let delta = (out.channel(2, 2, 0) - 100.0).abs();
        // f32 resolution near 100.0 is ~7.6e-6, so allow for it.
        assert!(delta <= params.max_delta + 1.0e-4, "delta {}", delta);
    }

    #[test]
    fn test_gentle_slope_untouched() {
        // Slope below the dry talus moves nothing.
        let size = 8;
        let params = ThermalConfig::default();
        let mut terrain = Grid::new(size, size);
        for y in 0..size {
            for x in 0..size {
                terrain.set_channel(x, y, 0, x as f32 * params.dry_talus_low * 0.5);
            }
        }
        let water = Grid::new(size, size);
        let mut out = Grid::new(size, size);
        step(&terrain, &water, &mut out, &params, 0.25);
        for (x, y, cell) in out.iter() {
            assert_eq!(cell[0], terrain.channel(x, y, 0));
        }
    }
}
