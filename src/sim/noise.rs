//! Fractal gradient noise for the initial height field.
//!
//! Hash-based 2D gradient noise, layered with a fixed per-octave rotation
//! and frequency doubling. The same construction runs in the noise compute
//! shader; keeping the CPU mirror hash-identical means both backends agree
//! on where ridge seeds fall for a given configuration.

use crate::config::{NoiseConfig, RidgeConfig};
use crate::grid::{Grid, CH_DIST, CH_SEED_H, CH_SEED_X, CH_SEED_Y, DIST_SENTINEL};

/// Base plane frequency at zoom 1.
pub const NOISE_BASE_FREQUENCY: f32 = 4.0;

/// Fixed per-octave rotation (orthonormal, ~36.87 degrees).
const ROT: [f32; 4] = [0.8, -0.6, 0.6, 0.8];

// Independent sample offsets for the two warp components.
const WARP_OFFSET_A: (f32, f32) = (5.2, 1.3);
const WARP_OFFSET_B: (f32, f32) = (8.3, 2.8);

/// PCG integer hash.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747796405).wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277803737);
    (word >> 22) ^ word
}

/// Hash a value into [0,1).
#[inline]
pub fn hash01(input: u32) -> f32 {
    (pcg_hash(input) >> 8) as f32 / 16777216.0
}

/// Deterministic per-cell hash in [0,1), pure in (coordinate, seed, salt).
///
/// Drives droplet injection: no stateful generator, so results are
/// reproducible and embarrassingly parallel.
#[inline]
pub fn cell_hash01(x: u32, y: u32, seed: u32, salt: u32) -> f32 {
    let mut h = pcg_hash(x ^ pcg_hash(y ^ pcg_hash(seed)));
    h = pcg_hash(h ^ salt);
    (h >> 8) as f32 / 16777216.0
}

/// Unit gradient at an integer lattice point.
#[inline]
fn lattice_gradient(ix: i32, iy: i32, seed: u32) -> (f32, f32) {
    let h = pcg_hash(ix as u32 ^ pcg_hash(iy as u32 ^ pcg_hash(seed)));
    let angle = (h >> 8) as f32 / 16777216.0 * std::f32::consts::TAU;
    (angle.cos(), angle.sin())
}

#[inline]
fn fade(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Single layer of 2D gradient noise, roughly in [-1,1].
pub fn gradient_noise(px: f32, py: f32, seed: u32) -> f32 {
    let ix = px.floor() as i32;
    let iy = py.floor() as i32;
    let fx = px - ix as f32;
    let fy = py - iy as f32;

    let dot = |gx: i32, gy: i32| -> f32 {
        let (vx, vy) = lattice_gradient(ix + gx, iy + gy, seed);
        vx * (fx - gx as f32) + vy * (fy - gy as f32)
    };

    let u = fade(fx);
    let v = fade(fy);
    let n0 = mix(dot(0, 0), dot(1, 0), u);
    let n1 = mix(dot(0, 1), dot(1, 1), u);
    // Scale so single-layer output fills [-1,1] reasonably.
    mix(n0, n1, v) * 1.4142135
}

/// Fractal sum: `octaves` layers, each rotated by a fixed matrix and
/// doubled in frequency, amplitude scaled by `persistence` per layer.
/// Normalized by the total accumulated amplitude, so output stays in [-1,1].
pub fn fbm(px: f32, py: f32, octaves: u32, persistence: f32, seed: u32) -> f32 {
    let mut x = px;
    let mut y = py;
    let mut amplitude = 1.0f32;
    let mut total = 0.0f32;
    let mut norm = 0.0f32;
    for octave in 0..octaves {
        total += gradient_noise(x, y, seed.wrapping_add(octave)) * amplitude;
        norm += amplitude;
        amplitude *= persistence;
        let rx = ROT[0] * x + ROT[1] * y;
        let ry = ROT[2] * x + ROT[3] * y;
        x = rx * 2.0;
        y = ry * 2.0;
    }
    if norm > 0.0 {
        total / norm
    } else {
        0.0
    }
}

/// Map a grid coordinate to the seed-offset sample plane.
#[inline]
pub fn sample_position(x: usize, y: usize, width: usize, height: usize, params: &NoiseConfig) -> (f32, f32) {
    let u = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
    let v = (y as f32 + 0.5) / height as f32 * 2.0 - 1.0;
    let freq = NOISE_BASE_FREQUENCY / params.zoom.max(1.0e-6);
    let ox = params.seed as f32 * 0.618034;
    let oy = params.seed as f32 * 0.754877;
    (u * freq + ox, v * freq + oy)
}

/// Evaluate the full noise stack (optional domain warp + fbm) at a sample
/// position, returning a normalized height in [0,1].
pub fn height_at(px: f32, py: f32, params: &NoiseConfig) -> f32 {
    let (mut x, mut y) = (px, py);
    if params.warp_factor != 0.0 {
        // Second independent noise evaluation perturbing the sample position.
        let wx = fbm(
            px + WARP_OFFSET_A.0,
            py + WARP_OFFSET_A.1,
            params.octaves,
            params.persistence,
            params.seed.wrapping_add(7919),
        );
        let wy = fbm(
            px + WARP_OFFSET_B.0,
            py + WARP_OFFSET_B.1,
            params.octaves,
            params.persistence,
            params.seed.wrapping_add(104729),
        );
        x += wx * params.warp_factor;
        y += wy * params.warp_factor;
    }
    let raw = fbm(x, y, params.octaves, params.persistence, params.seed);
    (raw * 0.5 + 0.5).clamp(0.0, 1.0)
}

/// Generate the initial height field into the terrain grid (channel 0).
/// In ridge mode also classify seed cells into the seed/distance grid.
pub fn generate(
    params: &NoiseConfig,
    ridge: Option<&RidgeConfig>,
    terrain: &mut Grid,
    seeds: Option<&mut Grid>,
) {
    let width = terrain.width;
    let height = terrain.height;
    let mut seeds = seeds;
    for y in 0..height {
        for x in 0..width {
            let (px, py) = sample_position(x, y, width, height, params);
            let h = height_at(px, py, params);
            terrain.set_channel(x, y, 0, h);

            if let (Some(ridge), Some(seed_grid)) = (ridge, seeds.as_deref_mut()) {
                let cell = if h > ridge.seed_threshold {
                    // Seed record: own coordinate, own height, distance 0.
                    let mut c = [0.0f32; 4];
                    c[CH_SEED_X] = x as f32;
                    c[CH_SEED_Y] = y as f32;
                    c[CH_SEED_H] = h;
                    c[CH_DIST] = 0.0;
                    c
                } else {
                    let mut c = [0.0f32; 4];
                    c[CH_SEED_X] = -1.0;
                    c[CH_SEED_Y] = -1.0;
                    c[CH_SEED_H] = 0.0;
                    c[CH_DIST] = DIST_SENTINEL;
                    c
                };
                seed_grid.set(x, y, cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_output_normalized() {
        let params = NoiseConfig {
            octaves: 6,
            ..Default::default()
        };
        for y in 0..64 {
            for x in 0..64 {
                let (px, py) = sample_position(x, y, 64, 64, &params);
                let h = height_at(px, py, &params);
                assert!((0.0..=1.0).contains(&h), "height {} out of range", h);
            }
        }
    }

    #[test]
    fn test_noise_deterministic() {
        let params = NoiseConfig {
            seed: 1234,
            warp_factor: 0.4,
            ..Default::default()
        };
        let a = height_at(3.7, -2.1, &params);
        let b = height_at(3.7, -2.1, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_changes_field() {
        let a = NoiseConfig {
            seed: 1,
            ..Default::default()
        };
        let b = NoiseConfig {
            seed: 2,
            ..Default::default()
        };
        let (pa_x, pa_y) = sample_position(10, 10, 64, 64, &a);
        let (pb_x, pb_y) = sample_position(10, 10, 64, 64, &b);
        assert_ne!(height_at(pa_x, pa_y, &a), height_at(pb_x, pb_y, &b));
    }

    #[test]
    fn test_ridge_classification() {
        let params = NoiseConfig::default();
        let ridge = RidgeConfig {
            seed_threshold: 0.5,
            ..Default::default()
        };
        let mut terrain = Grid::new(32, 32);
        let mut seeds = Grid::new(32, 32);
        generate(&params, Some(&ridge), &mut terrain, Some(&mut seeds));

        let mut seed_count = 0;
        for (x, y, cell) in seeds.iter() {
            let h = terrain.channel(x, y, 0);
            if h > ridge.seed_threshold {
                assert_eq!(cell[CH_SEED_X], x as f32);
                assert_eq!(cell[CH_SEED_Y], y as f32);
                assert_eq!(cell[CH_SEED_H], h);
                assert_eq!(cell[CH_DIST], 0.0);
                seed_count += 1;
            } else {
                assert_eq!(cell[CH_SEED_X], -1.0);
                assert_eq!(cell[CH_SEED_Y], -1.0);
                assert_eq!(cell[CH_DIST], DIST_SENTINEL);
            }
        }
        assert!(seed_count > 0, "expected at least one seed cell");
    }

    #[test]
    fn test_cell_hash_uniformity() {
        // Coarse check that the spawn hash is roughly uniform in [0,1).
        let mut below_half = 0usize;
        let n = 10_000;
        for i in 0..n {
            let v = cell_hash01(i % 100, i / 100, 42, 3);
            assert!((0.0..1.0).contains(&v));
            if v < 0.5 {
                below_half += 1;
            }
        }
        let frac = below_half as f32 / n as f32;
        assert!((0.45..0.55).contains(&frac), "hash bias: {}", frac);
    }
}
