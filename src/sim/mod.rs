//! Erosion simulation pipeline.
//!
//! Sequences the kernels described by the configuration: procedural noise,
//! optional ridge structuring (jump flood + blend), the hydraulic /
//! still-water / thermal loop, and the final Margolus equilibration. Every
//! kernel exists twice: a WGSL compute shader dispatched by [`gpu`], and a
//! CPU mirror with identical semantics used as the fallback path and as the
//! reference for tests.

pub mod distance;
pub mod equilibrate;
pub mod gpu;
pub mod hydraulic;
pub mod noise;
pub mod shaders;
pub mod still_water;
pub mod thermal;

use crate::config::SimulationConfig;
use crate::grid::{DoubleBuffered, CH_FLOW, CH_FLOW_SED, CH_STILL, CH_STILL_SED};

/// Failure taxonomy for a simulation run.
///
/// Configuration errors are rejected before any dispatch; device and
/// readback errors are fatal for the run and never retried.
#[derive(Debug)]
pub enum SimulationError {
    /// Invalid configuration (non-positive dimensions, non-finite values).
    Config(String),
    /// No compute adapter/device could be acquired.
    DeviceUnavailable,
    /// The device failed mid-run (lost device, validation, out of memory).
    Device(String),
    /// Mapping the final buffers for host access failed.
    Readback(String),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            SimulationError::DeviceUnavailable => write!(f, "no compute device available"),
            SimulationError::Device(msg) => write!(f, "compute device error: {}", msg),
            SimulationError::Readback(msg) => write!(f, "readback failed: {}", msg),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Final grids read back from the pipeline, row-major `width × height`.
///
/// This is the whole boundary to the visualization layer; internal buffer
/// layout and channel packing never leak through it.
pub struct SimulationOutput {
    pub width: usize,
    pub height: usize,
    pub height_map: Vec<f32>,
    pub flowing_water: Vec<f32>,
    pub flowing_sediment: Vec<f32>,
    pub still_water: Vec<f32>,
    pub still_sediment: Vec<f32>,
}

impl SimulationOutput {
    /// Total water volume across both pools.
    pub fn total_water(&self) -> f64 {
        self.flowing_water.iter().map(|&v| v as f64).sum::<f64>()
            + self.still_water.iter().map(|&v| v as f64).sum::<f64>()
    }
}

/// Run the pipeline on the GPU. Fails with `DeviceUnavailable` when no
/// compute adapter can be acquired.
pub fn run(config: &SimulationConfig) -> Result<SimulationOutput, SimulationError> {
    config.validate().map_err(SimulationError::Config)?;
    let ctx = gpu::GpuContext::new().ok_or(SimulationError::DeviceUnavailable)?;
    ctx.run(config)
}

/// Run the pipeline on the GPU if a device is available, falling back to
/// the CPU reference path otherwise.
pub fn run_auto(config: &SimulationConfig) -> Result<SimulationOutput, SimulationError> {
    config.validate().map_err(SimulationError::Config)?;
    match gpu::GpuContext::new() {
        Some(ctx) => {
            println!("Using GPU compute pipeline");
            ctx.run(config)
        }
        None => {
            println!("GPU not available, using CPU pipeline");
            run_cpu(config)
        }
    }
}

/// Run the full pipeline on the CPU reference path.
pub fn run_cpu(config: &SimulationConfig) -> Result<SimulationOutput, SimulationError> {
    config.validate().map_err(SimulationError::Config)?;

    let width = config.width;
    let height = config.height;
    let mut terrain = DoubleBuffered::new(width, height);
    let mut water = DoubleBuffered::new(width, height);

    // Initial height field, with seed classification in ridge mode.
    if let Some(ridge) = &config.ridge {
        let mut seeds = DoubleBuffered::new(width, height);
        noise::generate(
            &config.noise,
            Some(ridge),
            terrain.current_mut(),
            Some(seeds.current_mut()),
        );
        let max_dist = distance::build(&mut seeds);
        {
            let (noise_height, structured) = terrain.split();
            distance::blend(noise_height, seeds.current(), max_dist, ridge, structured);
        }
        terrain.swap();
    } else {
        noise::generate(&config.noise, None, terrain.current_mut(), None);
    }

    // Erosion loop: hydraulic, still-water settling, thermal, in lock step.
    for iteration in 0..config.iterations {
        {
            let (t_in, t_out) = terrain.split();
            let (w_in, w_out) = water.split();
            hydraulic::step(t_in, w_in, t_out, w_out, &config.hydraulic, iteration);
        }
        terrain.swap();
        water.swap();

        {
            let (w_in, w_out) = water.split();
            still_water::step(
                terrain.current(),
                w_in,
                w_out,
                &config.still_water,
                config.hydraulic.water_height_factor,
            );
        }
        water.swap();

        {
            let (t_in, t_out) = terrain.split();
            thermal::step(
                t_in,
                water.current(),
                t_out,
                &config.thermal,
                config.hydraulic.water_height_factor,
            );
        }
        terrain.swap();
    }

    // Final mass-conserving water leveling.
    equilibrate::run(
        terrain.current(),
        &mut water,
        &config.equilibration,
        config.hydraulic.water_height_factor,
    );

    let terrain_grid = terrain.current();
    let water_grid = water.current();
    Ok(SimulationOutput {
        width,
        height,
        height_map: terrain_grid.channel_vec(0),
        flowing_water: water_grid.channel_vec(CH_FLOW),
        flowing_sediment: water_grid.channel_vec(CH_FLOW_SED),
        still_water: water_grid.channel_vec(CH_STILL),
        still_sediment: water_grid.channel_vec(CH_STILL_SED),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RidgeConfig;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            width: 64,
            height: 64,
            iterations: 50,
            noise: crate::config::NoiseConfig {
                octaves: 4,
                warp_factor: 0.0,
                seed: 9,
                ..Default::default()
            },
            hydraulic: crate::config::HydraulicConfig {
                spawn_cycles: 10,
                ..Default::default()
            },
            equilibration: crate::config::EquilibrationConfig {
                passes: 8,
                bisection_iterations: 24,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_run_deterministic() {
        let config = SimulationConfig {
            width: 32,
            height: 32,
            iterations: 12,
            ..small_config()
        };
        let a = run_cpu(&config).unwrap();
        let b = run_cpu(&config).unwrap();
        assert_eq!(a.height_map, b.height_map);
        assert_eq!(a.flowing_water, b.flowing_water);
        assert_eq!(a.flowing_sediment, b.flowing_sediment);
        assert_eq!(a.still_water, b.still_water);
        assert_eq!(a.still_sediment, b.still_sediment);
    }

    #[test]
    fn test_end_to_end_scenario() {
        // 64x64, 4 octaves, zero warp, 50 iterations, spawn_cycles 10.
        let config = small_config();
        let out = run_cpu(&config).unwrap();

        assert_eq!(out.height_map.len(), 64 * 64);
        for &h in &out.height_map {
            assert!(h.is_finite(), "non-finite height {}", h);
        }
        for channel in [
            &out.flowing_water,
            &out.flowing_sediment,
            &out.still_water,
            &out.still_sediment,
        ] {
            for &v in channel.iter() {
                assert!(v.is_finite());
                assert!(v >= 0.0, "negative channel value {}", v);
            }
        }

        // Total water is bounded by what the spawn window could inject.
        let max_injected = (config.hydraulic.spawn_cycles as f64)
            * (64.0 * 64.0)
            * hydraulic::SPAWN_VOLUME as f64;
        assert!(out.total_water() <= max_injected);
        assert!(out.total_water() > 0.0);
    }

    #[test]
    fn test_ridge_mode_runs() {
        let config = SimulationConfig {
            width: 32,
            height: 32,
            iterations: 8,
            ridge: Some(RidgeConfig {
                seed_threshold: 0.55,
                heightmap_weight: 1.0,
                distance_weight: 2.0,
            }),
            ..small_config()
        };
        let out = run_cpu(&config).unwrap();
        for &h in &out.height_map {
            assert!(h.is_finite());
        }
    }

    #[test]
    fn test_negative_thermal_clamp_rejected_before_dispatch() {
        let mut config = SimulationConfig {
            width: 16,
            height: 16,
            iterations: 2,
            ..small_config()
        };
        config.thermal.max_delta = -0.01;
        match run_cpu(&config) {
            Err(SimulationError::Config(msg)) => assert!(msg.contains("max_delta")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_dispatch() {
        let config = SimulationConfig {
            width: 0,
            ..Default::default()
        };
        match run_cpu(&config) {
            Err(SimulationError::Config(msg)) => assert!(msg.contains("dimensions")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }
}
