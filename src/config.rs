//! Simulation configuration.
//!
//! A single structured record with named, typed, defaulted fields. The
//! record is validated once before any dispatch; kernels never see an
//! invalid parameter.

use serde::{Deserialize, Serialize};

/// Fractal noise parameters for the initial height field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Seed offsetting the sample plane.
    pub seed: u32,
    /// Plane scale; higher zoom means larger features.
    pub zoom: f32,
    /// Number of fractal layers.
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0).
    pub persistence: f32,
    /// Domain warp strength; 0 disables the warp evaluation.
    pub warp_factor: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            zoom: 1.0,
            octaves: 8,
            persistence: 0.5,
            warp_factor: 0.0,
        }
    }
}

/// Ridge-structuring preprocessing: seed thresholding, nearest-seed
/// distance propagation, and blend with the inverted noise height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RidgeConfig {
    /// Normalized height above which a cell becomes a ridge seed.
    pub seed_threshold: f32,
    /// Blend weight of the inverted noise height.
    pub heightmap_weight: f32,
    /// Blend weight of the normalized distance field.
    pub distance_weight: f32,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            seed_threshold: 0.6,
            heightmap_weight: 1.0,
            distance_weight: 1.0,
        }
    }
}

/// Hydraulic erosion parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HydraulicConfig {
    /// Droplets are injected only during the first `spawn_cycles` iterations.
    pub spawn_cycles: u32,
    /// Per-cell injection probability in [0,1] during a spawn cycle.
    pub spawn_density: f32,
    /// Rate of the capacity/sediment exchange (0.0-1.0).
    pub deposition_rate: f32,
    /// Fraction of gathered inflow lost per iteration (0.0-1.0).
    pub evaporation_rate: f32,
    /// Converts water volume to height units.
    pub water_height_factor: f32,
    /// Weight of flowing water in the effective height (still water counts
    /// at full weight).
    pub flow_depth_weight: f32,
    /// Lower bound of the smooth shear gate.
    pub shear_shallow: f32,
    /// Upper bound of the smooth shear gate.
    pub shear_deep: f32,
    /// Cap on per-cell flowing water; overflow spills to the still pool.
    pub max_flow_volume: f32,
    /// Seed for the deterministic droplet-injection hash.
    pub random_seed: u32,
}

impl Default for HydraulicConfig {
    fn default() -> Self {
        Self {
            spawn_cycles: 50,
            spawn_density: 0.12,
            deposition_rate: 0.12,
            evaporation_rate: 0.015,
            water_height_factor: 0.25,
            flow_depth_weight: 0.35,
            shear_shallow: 0.001,
            shear_deep: 0.05,
            max_flow_volume: 4.0,
            random_seed: 0,
        }
    }
}

/// Still-water redistribution parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StillWaterConfig {
    /// Fraction of the still pool eligible to move per iteration (0.0-1.0).
    pub relaxation: f32,
}

impl Default for StillWaterConfig {
    fn default() -> Self {
        Self { relaxation: 0.25 }
    }
}

/// Thermal erosion parameters. Talus values are slopes (rise/run).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThermalConfig {
    /// Talus for wet cells (significant flowing water).
    pub talus_wet: f32,
    /// Talus for fully immersed cells.
    pub talus_immersed: f32,
    /// Below this height the dry talus is `dry_talus_low`.
    pub elevation_low: f32,
    /// Above this height the dry talus is `dry_talus_high`.
    pub elevation_high: f32,
    /// Dry talus at low elevations.
    pub dry_talus_low: f32,
    /// Dry talus at high elevations.
    pub dry_talus_high: f32,
    /// Flowing-water depth where wetness starts to relax the talus.
    pub flow_ramp_low: f32,
    /// Flowing-water depth where the talus is fully wet.
    pub flow_ramp_high: f32,
    /// Still-water depth (height units) where immersion starts.
    pub immersion_ramp_low: f32,
    /// Still-water depth (height units) where the cell is fully immersed.
    pub immersion_ramp_high: f32,
    /// Fraction of the excess slope moved per pass (0.0-1.0).
    pub strength: f32,
    /// Stability clamp on the net per-cell height change per pass.
    pub max_delta: f32,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            talus_wet: 0.018,
            talus_immersed: 0.008,
            elevation_low: 0.2,
            elevation_high: 0.8,
            dry_talus_low: 0.025,
            dry_talus_high: 0.045,
            flow_ramp_low: 0.05,
            flow_ramp_high: 0.6,
            immersion_ramp_low: 0.002,
            immersion_ramp_high: 0.02,
            strength: 0.35,
            max_delta: 0.01,
        }
    }
}

/// Final equilibration (Margolus solver) parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquilibrationConfig {
    /// Number of full passes; each pass runs four checkerboard sub-passes.
    pub passes: u32,
    /// Bisection iterations per 2×2 block.
    pub bisection_iterations: u32,
}

impl Default for EquilibrationConfig {
    fn default() -> Self {
        Self {
            passes: 24,
            bisection_iterations: 24,
        }
    }
}

/// Complete per-run configuration record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub width: usize,
    pub height: usize,
    /// Erosion loop iteration count.
    pub iterations: u32,
    pub noise: NoiseConfig,
    /// Ridge-structuring preprocessing; `None` disables it and the raw
    /// noise height becomes the initial terrain.
    pub ridge: Option<RidgeConfig>,
    pub hydraulic: HydraulicConfig,
    pub still_water: StillWaterConfig,
    pub thermal: ThermalConfig,
    pub equilibration: EquilibrationConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            iterations: 200,
            noise: NoiseConfig::default(),
            ridge: None,
            hydraulic: HydraulicConfig::default(),
            still_water: StillWaterConfig::default(),
            thermal: ThermalConfig::default(),
            equilibration: EquilibrationConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate the record before any dispatch. Returns a specific message
    /// for the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "grid dimensions must be positive, got {}x{}",
                self.width, self.height
            ));
        }
        if self.noise.octaves == 0 {
            return Err("noise octave count must be at least 1".to_string());
        }

        // Every float parameter must be finite.
        let floats: &[(&str, f32)] = &[
            ("noise.zoom", self.noise.zoom),
            ("noise.persistence", self.noise.persistence),
            ("noise.warp_factor", self.noise.warp_factor),
            ("hydraulic.spawn_density", self.hydraulic.spawn_density),
            ("hydraulic.deposition_rate", self.hydraulic.deposition_rate),
            ("hydraulic.evaporation_rate", self.hydraulic.evaporation_rate),
            ("hydraulic.water_height_factor", self.hydraulic.water_height_factor),
            ("hydraulic.flow_depth_weight", self.hydraulic.flow_depth_weight),
            ("hydraulic.shear_shallow", self.hydraulic.shear_shallow),
            ("hydraulic.shear_deep", self.hydraulic.shear_deep),
            ("hydraulic.max_flow_volume", self.hydraulic.max_flow_volume),
            ("still_water.relaxation", self.still_water.relaxation),
            ("thermal.talus_wet", self.thermal.talus_wet),
            ("thermal.talus_immersed", self.thermal.talus_immersed),
            ("thermal.elevation_low", self.thermal.elevation_low),
            ("thermal.elevation_high", self.thermal.elevation_high),
            ("thermal.dry_talus_low", self.thermal.dry_talus_low),
            ("thermal.dry_talus_high", self.thermal.dry_talus_high),
            ("thermal.flow_ramp_low", self.thermal.flow_ramp_low),
            ("thermal.flow_ramp_high", self.thermal.flow_ramp_high),
            ("thermal.immersion_ramp_low", self.thermal.immersion_ramp_low),
            ("thermal.immersion_ramp_high", self.thermal.immersion_ramp_high),
            ("thermal.strength", self.thermal.strength),
            ("thermal.max_delta", self.thermal.max_delta),
        ];
        for &(name, value) in floats {
            if !value.is_finite() {
                return Err(format!("{} must be finite, got {}", name, value));
            }
        }
        if let Some(ridge) = &self.ridge {
            for &(name, value) in &[
                ("ridge.seed_threshold", ridge.seed_threshold),
                ("ridge.heightmap_weight", ridge.heightmap_weight),
                ("ridge.distance_weight", ridge.distance_weight),
            ] {
                if !value.is_finite() {
                    return Err(format!("{} must be finite, got {}", name, value));
                }
            }
            if ridge.heightmap_weight < 0.0 || ridge.distance_weight < 0.0 {
                return Err("ridge blend weights must be non-negative".to_string());
            }
        }

        // Range checks on rates and bounds.
        for &(name, value) in &[
            ("hydraulic.spawn_density", self.hydraulic.spawn_density),
            ("hydraulic.deposition_rate", self.hydraulic.deposition_rate),
            ("hydraulic.evaporation_rate", self.hydraulic.evaporation_rate),
            ("still_water.relaxation", self.still_water.relaxation),
            ("thermal.strength", self.thermal.strength),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0,1], got {}", name, value));
            }
        }
        if self.hydraulic.water_height_factor <= 0.0 {
            return Err("hydraulic.water_height_factor must be positive".to_string());
        }
        if self.hydraulic.max_flow_volume <= 0.0 {
            return Err("hydraulic.max_flow_volume must be positive".to_string());
        }
        if self.hydraulic.shear_deep <= self.hydraulic.shear_shallow {
            return Err("hydraulic.shear_deep must exceed shear_shallow".to_string());
        }
        if self.thermal.max_delta < 0.0 {
            return Err("thermal.max_delta must be non-negative".to_string());
        }
        if self.thermal.flow_ramp_high <= self.thermal.flow_ramp_low {
            return Err("thermal.flow_ramp_high must exceed flow_ramp_low".to_string());
        }
        if self.thermal.immersion_ramp_high <= self.thermal.immersion_ramp_low {
            return Err("thermal.immersion_ramp_high must exceed immersion_ramp_low".to_string());
        }
        if self.equilibration.bisection_iterations == 0 {
            return Err("equilibration.bisection_iterations must be at least 1".to_string());
        }
        Ok(())
    }

    /// Load a config record from a JSON file.
    pub fn from_json_file(path: &str) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path, e))?;
        serde_json::from_str(&text).map_err(|e| format!("cannot parse config {}: {}", path, e))
    }

    /// Write the record to a JSON file.
    pub fn to_json_file(&self, path: &str) -> Result<(), String> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| format!("cannot serialize config: {}", e))?;
        std::fs::write(path, text).map_err(|e| format!("cannot write config {}: {}", path, e))
    }
}
