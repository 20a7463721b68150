//! GPU compute pipeline.
//!
//! All seven kernels run as compute dispatches over shared storage buffers.
//! Terrain, water and seed grids are double-buffered on the device; the host
//! only tracks which instance of each pair is current and flips the index
//! after every dispatch that wrote the alternate. Nothing is read back until
//! the full pass sequence has been submitted.

use wgpu::util::DeviceExt;

use crate::config::SimulationConfig;
use crate::sim::{distance, equilibrate, shaders, SimulationError, SimulationOutput};

const WORKGROUP_DIM: u32 = 16;
const MARGOLUS_WORKGROUP_DIM: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct NoiseParams {
    width: u32,
    height: u32,
    seed: u32,
    octaves: u32,
    zoom: f32,
    persistence: f32,
    warp_factor: f32,
    seed_threshold: f32,
    ridge_mode: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FloodParams {
    width: u32,
    height: u32,
    step: i32,
    is_final: u32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlendParams {
    width: u32,
    height: u32,
    heightmap_weight: f32,
    distance_weight: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct HydraulicParams {
    width: u32,
    height: u32,
    iteration: u32,
    spawn_cycles: u32,
    spawn_density: f32,
    deposition_rate: f32,
    evaporation_rate: f32,
    water_height_factor: f32,
    flow_depth_weight: f32,
    shear_shallow: f32,
    shear_deep: f32,
    max_flow_volume: f32,
    random_seed: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct StillParams {
    width: u32,
    height: u32,
    relaxation: f32,
    water_height_factor: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ThermalParams {
    width: u32,
    height: u32,
    _pad0: [u32; 2],
    talus_wet: f32,
    talus_immersed: f32,
    elevation_low: f32,
    elevation_high: f32,
    dry_talus_low: f32,
    dry_talus_high: f32,
    flow_ramp_low: f32,
    flow_ramp_high: f32,
    immersion_ramp_low: f32,
    immersion_ramp_high: f32,
    strength: f32,
    max_delta: f32,
    water_height_factor: f32,
    _pad1: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MargolusParams {
    width: u32,
    height: u32,
    offset_x: u32,
    offset_y: u32,
    bisection_iterations: u32,
    water_height_factor: f32,
    _pad: [u32; 2],
}

/// One compiled kernel with its bind group layout.
struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Binding role of a storage buffer in a kernel layout. Binding 0 is always
/// the uniform params block; the storage buffers follow in order.
#[derive(Clone, Copy)]
enum Slot {
    Read,
    ReadWrite,
}

/// A compute device plus the seven compiled pipelines.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    noise: Kernel,
    flood: Kernel,
    blend: Kernel,
    hydraulic: Kernel,
    still: Kernel,
    thermal: Kernel,
    margolus: Kernel,
}

impl GpuContext {
    /// Acquire a compute device. Returns `None` when no adapter is
    /// available, letting callers fall back to the CPU path.
    pub fn new() -> Option<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("erosion-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .ok()?;

        let noise = Self::build_kernel(
            &device,
            "noise",
            &shaders::noise_shader(),
            &[Slot::ReadWrite, Slot::ReadWrite],
        );
        let flood = Self::build_kernel(
            &device,
            "flood",
            &shaders::flood_shader(),
            &[Slot::Read, Slot::ReadWrite, Slot::ReadWrite],
        );
        let blend = Self::build_kernel(
            &device,
            "blend",
            &shaders::blend_shader(),
            &[Slot::Read, Slot::Read, Slot::Read, Slot::ReadWrite],
        );
        let hydraulic = Self::build_kernel(
            &device,
            "hydraulic",
            &shaders::hydraulic_shader(),
            &[Slot::Read, Slot::Read, Slot::ReadWrite, Slot::ReadWrite],
        );
        let still = Self::build_kernel(
            &device,
            "still-water",
            &shaders::still_water_shader(),
            &[Slot::Read, Slot::Read, Slot::ReadWrite],
        );
        let thermal = Self::build_kernel(
            &device,
            "thermal",
            &shaders::thermal_shader(),
            &[Slot::Read, Slot::Read, Slot::ReadWrite],
        );
        let margolus = Self::build_kernel(
            &device,
            "margolus",
            &shaders::margolus_shader(),
            &[Slot::Read, Slot::Read, Slot::ReadWrite],
        );

        Some(Self {
            device,
            queue,
            noise,
            flood,
            blend,
            hydraulic,
            still,
            thermal,
            margolus,
        })
    }

    fn build_kernel(device: &wgpu::Device, name: &str, source: &str, slots: &[Slot]) -> Kernel {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (i, slot) in slots.iter().enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: (i + 1) as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: matches!(slot, Slot::Read),
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        Kernel { pipeline, layout }
    }

    /// Encode and submit one dispatch: a fresh uniform buffer for the
    /// params block, the given storage buffers bound in order.
    fn dispatch(&self, kernel: &Kernel, params: &[u8], buffers: &[&wgpu::Buffer], groups: (u32, u32)) {
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("params"),
                contents: params,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }];
        for (i, buffer) in buffers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &kernel.layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    /// Run the full configured pipeline and read the final grids back.
    pub fn run(&self, config: &SimulationConfig) -> Result<SimulationOutput, SimulationError> {
        config.validate().map_err(SimulationError::Config)?;
        let width = config.width as u32;
        let height = config.height as u32;
        let grid_bytes = config.width as u64 * config.height as u64 * 16;
        let grid_groups = (
            width.div_ceil(WORKGROUP_DIM),
            height.div_ceil(WORKGROUP_DIM),
        );

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        // Device grids are zero-initialized on creation.
        let make_grid = |label: &str| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: grid_bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let terrain = [make_grid("terrain-a"), make_grid("terrain-b")];
        let water = [make_grid("water-a"), make_grid("water-b")];
        let seeds = [make_grid("seeds-a"), make_grid("seeds-b")];
        let max_dist = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("max-dist"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let mut t_cur = 0usize;
        let mut w_cur = 0usize;
        let mut s_cur = 0usize;

        let noise_params = NoiseParams {
            width,
            height,
            seed: config.noise.seed,
            octaves: config.noise.octaves,
            zoom: config.noise.zoom,
            persistence: config.noise.persistence,
            warp_factor: config.noise.warp_factor,
            seed_threshold: config
                .ridge
                .as_ref()
                .map(|r| r.seed_threshold)
                .unwrap_or(0.0),
            ridge_mode: config.ridge.is_some() as u32,
            _pad: [0; 3],
        };
        self.dispatch(
            &self.noise,
            bytemuck::bytes_of(&noise_params),
            &[&terrain[t_cur], &seeds[s_cur]],
            grid_groups,
        );

        if let Some(ridge) = &config.ridge {
            let passes = distance::pass_count(config.width, config.height);
            for pass in 0..passes {
                let params = FloodParams {
                    width,
                    height,
                    step: distance::step_for_pass(config.width, config.height, pass),
                    is_final: (pass + 1 == passes) as u32,
                };
                self.dispatch(
                    &self.flood,
                    bytemuck::bytes_of(&params),
                    &[&seeds[s_cur], &seeds[1 - s_cur], &max_dist],
                    grid_groups,
                );
                s_cur = 1 - s_cur;
            }

            let params = BlendParams {
                width,
                height,
                heightmap_weight: ridge.heightmap_weight,
                distance_weight: ridge.distance_weight,
            };
            self.dispatch(
                &self.blend,
                bytemuck::bytes_of(&params),
                &[&terrain[t_cur], &seeds[s_cur], &max_dist, &terrain[1 - t_cur]],
                grid_groups,
            );
            t_cur = 1 - t_cur;
        }

        let h = &config.hydraulic;
        let still_params = StillParams {
            width,
            height,
            relaxation: config.still_water.relaxation,
            water_height_factor: h.water_height_factor,
        };
        let t = &config.thermal;
        let thermal_params = ThermalParams {
            width,
            height,
            _pad0: [0; 2],
            talus_wet: t.talus_wet,
            talus_immersed: t.talus_immersed,
            elevation_low: t.elevation_low,
            elevation_high: t.elevation_high,
            dry_talus_low: t.dry_talus_low,
            dry_talus_high: t.dry_talus_high,
            flow_ramp_low: t.flow_ramp_low,
            flow_ramp_high: t.flow_ramp_high,
            immersion_ramp_low: t.immersion_ramp_low,
            immersion_ramp_high: t.immersion_ramp_high,
            strength: t.strength,
            max_delta: t.max_delta,
            water_height_factor: h.water_height_factor,
            _pad1: [0.0; 3],
        };

        for iteration in 0..config.iterations {
            let params = HydraulicParams {
                width,
                height,
                iteration,
                spawn_cycles: h.spawn_cycles,
                spawn_density: h.spawn_density,
                deposition_rate: h.deposition_rate,
                evaporation_rate: h.evaporation_rate,
                water_height_factor: h.water_height_factor,
                flow_depth_weight: h.flow_depth_weight,
                shear_shallow: h.shear_shallow,
                shear_deep: h.shear_deep,
                max_flow_volume: h.max_flow_volume,
                random_seed: h.random_seed,
                _pad: [0; 3],
            };
            self.dispatch(
                &self.hydraulic,
                bytemuck::bytes_of(&params),
                &[
                    &terrain[t_cur],
                    &water[w_cur],
                    &terrain[1 - t_cur],
                    &water[1 - w_cur],
                ],
                grid_groups,
            );
            t_cur = 1 - t_cur;
            w_cur = 1 - w_cur;

            self.dispatch(
                &self.still,
                bytemuck::bytes_of(&still_params),
                &[&terrain[t_cur], &water[w_cur], &water[1 - w_cur]],
                grid_groups,
            );
            w_cur = 1 - w_cur;

            self.dispatch(
                &self.thermal,
                bytemuck::bytes_of(&thermal_params),
                &[&terrain[t_cur], &water[w_cur], &terrain[1 - t_cur]],
                grid_groups,
            );
            t_cur = 1 - t_cur;
        }

        // Final equilibration. Each sub-pass copies the water grid wholesale
        // into the alternate instance first; the kernel then rewrites only
        // the still channel of participating blocks.
        for _ in 0..config.equilibration.passes {
            for &(ox, oy) in &equilibrate::OFFSETS {
                if ox >= config.width || oy >= config.height {
                    continue;
                }
                let mut encoder = self
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
                encoder.copy_buffer_to_buffer(&water[w_cur], 0, &water[1 - w_cur], 0, grid_bytes);
                self.queue.submit(Some(encoder.finish()));

                let blocks_x = ((config.width - ox) as u32).div_ceil(2);
                let blocks_y = ((config.height - oy) as u32).div_ceil(2);
                let params = MargolusParams {
                    width,
                    height,
                    offset_x: ox as u32,
                    offset_y: oy as u32,
                    bisection_iterations: config.equilibration.bisection_iterations,
                    water_height_factor: h.water_height_factor,
                    _pad: [0; 2],
                };
                self.dispatch(
                    &self.margolus,
                    bytemuck::bytes_of(&params),
                    &[&terrain[t_cur], &water[w_cur], &water[1 - w_cur]],
                    (
                        blocks_x.div_ceil(MARGOLUS_WORKGROUP_DIM),
                        blocks_y.div_ceil(MARGOLUS_WORKGROUP_DIM),
                    ),
                );
                w_cur = 1 - w_cur;
            }
        }

        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = oom.or(validation) {
            return Err(SimulationError::Device(error.to_string()));
        }

        let terrain_data = self.read_grid(&terrain[t_cur], grid_bytes)?;
        let water_data = self.read_grid(&water[w_cur], grid_bytes)?;

        let channel = |data: &[f32], c: usize| -> Vec<f32> {
            data.chunks_exact(4).map(|cell| cell[c]).collect()
        };
        Ok(SimulationOutput {
            width: config.width,
            height: config.height,
            height_map: channel(&terrain_data, 0),
            flowing_water: channel(&water_data, 0),
            flowing_sediment: channel(&water_data, 1),
            still_water: channel(&water_data, 2),
            still_sediment: channel(&water_data, 3),
        })
    }

    /// Copy a device grid into a staging buffer and map it for host access.
    fn read_grid(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<f32>, SimulationError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| SimulationError::Readback("map callback dropped".to_string()))?
            .map_err(|e| SimulationError::Readback(e.to_string()))?;

        let data = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&view).to_vec()
        };
        staging.unmap();
        Ok(data)
    }
}
