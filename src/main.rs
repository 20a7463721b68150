use clap::Parser;

use terraflow::config::{RidgeConfig, SimulationConfig};
use terraflow::sim;

#[derive(Parser, Debug)]
#[command(name = "terraflow")]
#[command(about = "GPU-accelerated hydraulic and thermal terrain erosion")]
struct Args {
    /// Width of the terrain grid in cells (default 256)
    #[arg(short = 'W', long)]
    width: Option<usize>,

    /// Height of the terrain grid in cells (default 256)
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Noise seed (default 0)
    #[arg(short, long)]
    seed: Option<u32>,

    /// Number of erosion iterations (default 200)
    #[arg(short, long)]
    iterations: Option<u32>,

    /// Fractal noise octaves (default 8)
    #[arg(long)]
    octaves: Option<u32>,

    /// Noise zoom, higher means larger features (default 1.0)
    #[arg(long)]
    zoom: Option<f32>,

    /// Amplitude decay per octave (default 0.5)
    #[arg(long)]
    persistence: Option<f32>,

    /// Domain warp strength, 0 disables warping (default 0)
    #[arg(long)]
    warp: Option<f32>,

    /// Enable ridge structuring (jump-flood distance field blend)
    #[arg(long)]
    ridge: bool,

    /// Normalized height above which a cell becomes a ridge seed
    #[arg(long, default_value = "0.6")]
    seed_threshold: f32,

    /// Ridge blend weight of the inverted noise height
    #[arg(long, default_value = "1.0")]
    heightmap_weight: f32,

    /// Ridge blend weight of the normalized distance field
    #[arg(long, default_value = "1.0")]
    distance_weight: f32,

    /// Load the base configuration from a JSON file; explicitly passed
    /// flags override its fields
    #[arg(long)]
    config: Option<String>,

    /// Write the effective configuration to a JSON file and exit
    #[arg(long)]
    write_config: Option<String>,

    /// Force the CPU reference pipeline
    #[arg(long)]
    cpu: bool,
}

fn build_config(args: &Args) -> Result<SimulationConfig, String> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        config.noise.seed = seed;
        config.hydraulic.random_seed = seed;
    }
    if let Some(octaves) = args.octaves {
        config.noise.octaves = octaves;
    }
    if let Some(zoom) = args.zoom {
        config.noise.zoom = zoom;
    }
    if let Some(persistence) = args.persistence {
        config.noise.persistence = persistence;
    }
    if let Some(warp) = args.warp {
        config.noise.warp_factor = warp;
    }
    if args.ridge {
        config.ridge = Some(RidgeConfig {
            seed_threshold: args.seed_threshold,
            heightmap_weight: args.heightmap_weight,
            distance_weight: args.distance_weight,
        });
    }
    Ok(config)
}

fn print_summary(out: &sim::SimulationOutput) {
    let mut min_h = f32::MAX;
    let mut max_h = f32::MIN;
    for &h in &out.height_map {
        if h < min_h {
            min_h = h;
        }
        if h > max_h {
            max_h = h;
        }
    }
    println!("Height range: {:.3} to {:.3}", min_h, max_h);

    // Coarse height histogram across 10 bins.
    let mut bins = [0usize; 10];
    let span = (max_h - min_h).max(1.0e-6);
    for &h in &out.height_map {
        let bin = (((h - min_h) / span) * 10.0) as usize;
        bins[bin.min(9)] += 1;
    }
    let cells = out.height_map.len();
    for (i, &count) in bins.iter().enumerate() {
        let lo = min_h + span * i as f32 / 10.0;
        let bar = "#".repeat(count * 50 / cells.max(1));
        println!("  {:>6.3} | {:<50} {}", lo, bar, count);
    }

    let flowing: f64 = out.flowing_water.iter().map(|&v| v as f64).sum();
    let still: f64 = out.still_water.iter().map(|&v| v as f64).sum();
    let wet = out.still_water.iter().filter(|&&v| v > 1.0e-4).count();
    println!(
        "Water: {:.2} flowing, {:.2} still ({:.1}% of cells wet)",
        flowing,
        still,
        100.0 * wet as f64 / cells as f64
    );
}

fn main() {
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
    };

    if let Some(path) = &args.write_config {
        if let Err(msg) = config.to_json_file(path) {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        println!("Wrote configuration to {}", path);
        return;
    }

    println!(
        "Simulating {}x{} terrain, {} iterations, seed {}",
        config.width, config.height, config.iterations, config.noise.seed
    );

    let result = if args.cpu {
        sim::run_cpu(&config)
    } else {
        sim::run_auto(&config)
    };
    match result {
        Ok(out) => print_summary(&out),
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    }
}
