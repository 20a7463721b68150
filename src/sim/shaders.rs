//! WGSL compute kernel sources.
//!
//! Each kernel is assembled from a header (params struct + bindings) plus
//! shared helper blocks, so the hydraulic and still-water kernels use the
//! exact same flow-weight routine. Constants here mirror the CPU modules;
//! the tests assert they stay in sync.

/// PCG hash, shared by the noise and hydraulic kernels.
const PCG_SRC: &str = r#"
fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}
"#;

/// Effective-height and adaptive flow-weight helpers. Requires the binding
/// names `params` (with `width`/`height`), `terrain_in` and `water_in`.
const FLOW_SRC: &str = r#"
const EXPONENT_MIN: f32 = 0.8;
const EXPONENT_MAX: f32 = 2.5;
const CURVATURE_SCALE: f32 = 8.0;
const INV_SQRT2: f32 = 0.70710678;

fn cell_index(x: u32, y: u32) -> u32 {
    return y * params.width + x;
}

fn in_grid(x: i32, y: i32) -> bool {
    return x >= 0 && y >= 0 && x < i32(params.width) && y < i32(params.height);
}

fn eff_height(x: u32, y: u32, whf: f32, fdw: f32) -> f32 {
    let idx = cell_index(x, y);
    let w = water_in[idx];
    return terrain_in[idx].x + whf * (w.z + fdw * w.x);
}

struct Flow {
    weights: array<f32, 8>,
    total_raw: f32,
    avg_slope: f32,
}

fn flow_weights(x: u32, y: u32, whf: f32, fdw: f32) -> Flow {
    var offs = array<vec2<i32>, 8>(
        vec2(-1, -1), vec2(0, -1), vec2(1, -1), vec2(-1, 0),
        vec2(1, 0), vec2(-1, 1), vec2(0, 1), vec2(1, 1),
    );
    var inv_d = array<f32, 8>(
        INV_SQRT2, 1.0, INV_SQRT2, 1.0, 1.0, INV_SQRT2, 1.0, INV_SQRT2,
    );
    var axial = array<vec2<i32>, 4>(
        vec2(-1, 0), vec2(1, 0), vec2(0, -1), vec2(0, 1),
    );

    let eh = eff_height(x, y, whf, fdw);

    // 4-neighborhood Laplacian as a curvature proxy; positive curvature
    // (cell below its surroundings) concentrates flow in valleys.
    var lap = 0.0;
    for (var i = 0u; i < 4u; i++) {
        let n = vec2(i32(x), i32(y)) + axial[i];
        if (in_grid(n.x, n.y)) {
            lap += eff_height(u32(n.x), u32(n.y), whf, fdw) - eh;
        }
    }
    let valleyness = clamp(lap * CURVATURE_SCALE, 0.0, 1.0);
    let exponent = mix(EXPONENT_MIN, EXPONENT_MAX, valleyness);

    var result: Flow;
    result.total_raw = 0.0;
    var slopes = array<f32, 8>();
    for (var i = 0u; i < 8u; i++) {
        result.weights[i] = 0.0;
        let n = vec2(i32(x), i32(y)) + offs[i];
        if (!in_grid(n.x, n.y)) {
            continue;
        }
        let neh = eff_height(u32(n.x), u32(n.y), whf, fdw);
        if (neh >= eh) {
            continue;
        }
        let slope = (eh - neh) * inv_d[i];
        let raw = pow(slope * inv_d[i], exponent);
        result.weights[i] = raw;
        slopes[i] = slope;
        result.total_raw += raw;
    }

    result.avg_slope = 0.0;
    if (result.total_raw > 0.0) {
        for (var i = 0u; i < 8u; i++) {
            result.weights[i] = result.weights[i] / result.total_raw;
            result.avg_slope += result.weights[i] * slopes[i];
        }
    }
    return result;
}
"#;

const NOISE_HEADER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    seed: u32,
    octaves: u32,
    zoom: f32,
    persistence: f32,
    warp_factor: f32,
    seed_threshold: f32,
    ridge_mode: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> terrain_out: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> seeds_out: array<vec4<f32>>;
"#;

const NOISE_BODY: &str = r#"
const TAU: f32 = 6.28318530718;
const BASE_FREQUENCY: f32 = 4.0;
const DIST_SENTINEL: f32 = 1.0e9;

fn lattice_gradient(ix: i32, iy: i32, seed: u32) -> vec2<f32> {
    let h = pcg_hash(bitcast<u32>(ix) ^ pcg_hash(bitcast<u32>(iy) ^ pcg_hash(seed)));
    let angle = f32(h >> 8u) / 16777216.0 * TAU;
    return vec2(cos(angle), sin(angle));
}

fn gradient_noise(p: vec2<f32>, seed: u32) -> f32 {
    let i = floor(p);
    let f = p - i;
    let ix = i32(i.x);
    let iy = i32(i.y);
    let d00 = dot(lattice_gradient(ix, iy, seed), f);
    let d10 = dot(lattice_gradient(ix + 1, iy, seed), f - vec2(1.0, 0.0));
    let d01 = dot(lattice_gradient(ix, iy + 1, seed), f - vec2(0.0, 1.0));
    let d11 = dot(lattice_gradient(ix + 1, iy + 1, seed), f - vec2(1.0, 1.0));
    let u = f * f * (3.0 - 2.0 * f);
    let n0 = mix(d00, d10, u.x);
    let n1 = mix(d01, d11, u.x);
    return mix(n0, n1, u.y) * 1.4142135;
}

fn fbm(p_in: vec2<f32>, seed: u32) -> f32 {
    var p = p_in;
    var amplitude = 1.0;
    var total = 0.0;
    var norm = 0.0;
    let rot = mat2x2<f32>(vec2(0.8, 0.6), vec2(-0.6, 0.8));
    for (var octave = 0u; octave < params.octaves; octave++) {
        total += gradient_noise(p, seed + octave) * amplitude;
        norm += amplitude;
        amplitude *= params.persistence;
        p = rot * p * 2.0;
    }
    if (norm > 0.0) {
        return total / norm;
    }
    return 0.0;
}

fn height_at(p_in: vec2<f32>) -> f32 {
    var p = p_in;
    if (params.warp_factor != 0.0) {
        let wx = fbm(p_in + vec2(5.2, 1.3), params.seed + 7919u);
        let wy = fbm(p_in + vec2(8.3, 2.8), params.seed + 104729u);
        p += vec2(wx, wy) * params.warp_factor;
    }
    let raw = fbm(p, params.seed);
    return clamp(raw * 0.5 + 0.5, 0.0, 1.0);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let u = (f32(gid.x) + 0.5) / f32(params.width) * 2.0 - 1.0;
    let v = (f32(gid.y) + 0.5) / f32(params.height) * 2.0 - 1.0;
    let freq = BASE_FREQUENCY / max(params.zoom, 1.0e-6);
    let offset = vec2(f32(params.seed) * 0.618034, f32(params.seed) * 0.754877);
    let p = vec2(u, v) * freq + offset;
    let h = height_at(p);
    let idx = gid.y * params.width + gid.x;
    terrain_out[idx] = vec4(h, 0.0, 0.0, 0.0);
    if (params.ridge_mode == 1u) {
        if (h > params.seed_threshold) {
            seeds_out[idx] = vec4(f32(gid.x), f32(gid.y), h, 0.0);
        } else {
            seeds_out[idx] = vec4(-1.0, -1.0, 0.0, DIST_SENTINEL);
        }
    }
}
"#;

const FLOOD_SRC: &str = r#"
struct Params {
    width: u32,
    height: u32,
    step: i32,
    is_final: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> seeds_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> seeds_out: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> max_dist: atomic<u32>;

const DIST_FIXED_SCALE: f32 = 1024.0;
const DIST_SENTINEL: f32 = 1.0e9;

var<workgroup> wg_max: array<u32, 256>;

@compute @workgroup_size(16, 16)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_index) li: u32,
) {
    // No early return: every invocation must reach the barriers below.
    var q = 0u;
    if (gid.x < params.width && gid.y < params.height) {
        let idx = gid.y * params.width + gid.x;
        var best = seeds_in[idx];
        var offs = array<vec2<i32>, 8>(
            vec2(-1, -1), vec2(0, -1), vec2(1, -1), vec2(-1, 0),
            vec2(1, 0), vec2(-1, 1), vec2(0, 1), vec2(1, 1),
        );
        for (var i = 0u; i < 8u; i++) {
            let n = vec2(i32(gid.x), i32(gid.y)) + offs[i] * params.step;
            if (n.x < 0 || n.y < 0 || n.x >= i32(params.width) || n.y >= i32(params.height)) {
                continue;
            }
            let neighbor = seeds_in[u32(n.y) * params.width + u32(n.x)];
            if (neighbor.x < 0.0) {
                continue;
            }
            let d = distance(vec2(f32(gid.x), f32(gid.y)), neighbor.xy);
            if (d < best.w) {
                best = vec4(neighbor.xy, neighbor.z, d);
            }
        }
        seeds_out[idx] = best;
        if (best.x >= 0.0 && best.w < DIST_SENTINEL) {
            q = u32(best.w * DIST_FIXED_SCALE);
        }
    }

    // Two-level reduction: shared-memory max per workgroup, then a single
    // atomic fold into the global accumulator on the designated final pass.
    wg_max[li] = q;
    workgroupBarrier();
    var stride = 128u;
    while (stride > 0u) {
        if (li < stride) {
            wg_max[li] = max(wg_max[li], wg_max[li + stride]);
        }
        workgroupBarrier();
        stride = stride >> 1u;
    }
    if (li == 0u && params.is_final == 1u) {
        atomicMax(&max_dist, wg_max[0]);
    }
}
"#;

const BLEND_SRC: &str = r#"
struct Params {
    width: u32,
    height: u32,
    heightmap_weight: f32,
    distance_weight: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> noise_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> seeds_in: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> max_dist: u32;
@group(0) @binding(4) var<storage, read_write> terrain_out: array<vec4<f32>>;

const DIST_FIXED_SCALE: f32 = 1024.0;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let idx = gid.y * params.width + gid.x;
    let h = noise_in[idx].x;
    let dist = seeds_in[idx].w;
    let max_d = f32(max_dist) / DIST_FIXED_SCALE;
    var norm = 0.0;
    if (max_d > 0.0) {
        norm = clamp(dist / max_d, 0.0, 1.0);
    }
    let denom = params.heightmap_weight + params.distance_weight;
    var blend_f = 0.0;
    if (denom > 0.0) {
        blend_f = clamp(params.distance_weight / denom, 0.0, 1.0);
    }
    terrain_out[idx] = vec4(mix(1.0 - h, norm, blend_f), 0.0, 0.0, 0.0);
}
"#;

const HYDRAULIC_HEADER: &str = r#"
struct Params {
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
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> terrain_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> water_in: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> terrain_out: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read_write> water_out: array<vec4<f32>>;
"#;

const HYDRAULIC_BODY: &str = r#"
const SPAWN_VOLUME: f32 = 0.25;

fn cell_hash01(x: u32, y: u32, seed: u32, salt: u32) -> f32 {
    var h = pcg_hash(x ^ pcg_hash(y ^ pcg_hash(seed)));
    h = pcg_hash(h ^ salt);
    return f32(h >> 8u) / 16777216.0;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let x = gid.x;
    let y = gid.y;
    let idx = cell_index(x, y);
    let whf = params.water_height_factor;
    let fdw = params.flow_depth_weight;

    let own = flow_weights(x, y, whf, fdw);
    let eh = eff_height(x, y, whf, fdw);
    let t_cell = terrain_in[idx];
    let w_cell = water_in[idx];

    // Gather inflow from uphill neighbors via their reciprocal weights.
    var offs = array<vec2<i32>, 8>(
        vec2(-1, -1), vec2(0, -1), vec2(1, -1), vec2(-1, 0),
        vec2(1, 0), vec2(-1, 1), vec2(0, 1), vec2(1, 1),
    );
    var inflow_water = 0.0;
    var inflow_sed = 0.0;
    for (var i = 0u; i < 8u; i++) {
        let n = vec2(i32(x), i32(y)) + offs[i];
        if (!in_grid(n.x, n.y)) {
            continue;
        }
        let nx = u32(n.x);
        let ny = u32(n.y);
        let neh = eff_height(nx, ny, whf, fdw);
        if (neh <= eh) {
            continue;
        }
        let nw = flow_weights(nx, ny, whf, fdw);
        let toward_me = nw.weights[7u - i];
        if (toward_me > 0.0) {
            let n_water = water_in[cell_index(nx, ny)];
            inflow_water += n_water.x * toward_me;
            inflow_sed += n_water.y * toward_me;
        }
    }

    // Evaporation applies once to the gathered inflow.
    inflow_water *= 1.0 - params.evaporation_rate;

    var new_height = t_cell.x;
    var new_flow = inflow_water;
    var new_flow_sed = inflow_sed;
    var new_still = w_cell.z;
    var new_still_sed = w_cell.w;

    if (own.total_raw > 0.0) {
        let shear = new_flow * own.avg_slope;
        let gate = smoothstep(params.shear_shallow, params.shear_deep, shear);
        let capacity = new_flow * own.avg_slope * gate;
        var delta = (capacity - new_flow_sed) * params.deposition_rate;
        delta = max(delta, -new_flow_sed);
        new_height -= delta;
        new_flow_sed += delta;
    } else {
        // Pit: local stock settles into the still pool, sediment follows.
        new_still += w_cell.x * (1.0 - params.evaporation_rate);
        new_still_sed += w_cell.y;
    }

    if (params.iteration < params.spawn_cycles
        && cell_hash01(x, y, params.random_seed, params.iteration) < params.spawn_density) {
        new_flow += SPAWN_VOLUME;
    }

    if (new_flow > params.max_flow_volume) {
        let excess = new_flow - params.max_flow_volume;
        let fraction = excess / new_flow;
        new_still += excess;
        new_still_sed += new_flow_sed * fraction;
        new_flow_sed *= 1.0 - fraction;
        new_flow = params.max_flow_volume;
    }

    terrain_out[idx] = vec4(new_height, t_cell.yzw);
    water_out[idx] = max(
        vec4(new_flow, new_flow_sed, new_still, new_still_sed),
        vec4(0.0),
    );
}
"#;

const STILL_HEADER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    relaxation: f32,
    water_height_factor: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> terrain_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> water_in: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> water_out: array<vec4<f32>>;
"#;

const STILL_BODY: &str = r#"
fn outflow_volume(still: f32, total_raw: f32) -> f32 {
    let total = clamp(total_raw, 0.0, 1.0);
    return min(params.relaxation * still * total, still);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let x = gid.x;
    let y = gid.y;
    let idx = cell_index(x, y);
    let whf = params.water_height_factor;
    let cell = water_in[idx];

    // Flowing water is ignored for settling direction.
    let own = flow_weights(x, y, whf, 0.0);
    let eh = eff_height(x, y, whf, 0.0);

    let out_volume = outflow_volume(cell.z, own.total_raw);
    var own_concentration = 0.0;
    if (cell.z > 0.0) {
        own_concentration = cell.w / cell.z;
    }

    var offs = array<vec2<i32>, 8>(
        vec2(-1, -1), vec2(0, -1), vec2(1, -1), vec2(-1, 0),
        vec2(1, 0), vec2(-1, 1), vec2(0, 1), vec2(1, 1),
    );
    var in_volume = 0.0;
    var in_sed = 0.0;
    for (var i = 0u; i < 8u; i++) {
        let n = vec2(i32(x), i32(y)) + offs[i];
        if (!in_grid(n.x, n.y)) {
            continue;
        }
        let nx = u32(n.x);
        let ny = u32(n.y);
        let neh = eff_height(nx, ny, whf, 0.0);
        if (neh <= eh) {
            continue;
        }
        let nw = flow_weights(nx, ny, whf, 0.0);
        let toward_me = nw.weights[7u - i];
        if (toward_me <= 0.0) {
            continue;
        }
        let n_cell = water_in[cell_index(nx, ny)];
        let moved = outflow_volume(n_cell.z, nw.total_raw) * toward_me;
        in_volume += moved;
        if (n_cell.z > 0.0) {
            in_sed += moved * (n_cell.w / n_cell.z);
        }
    }

    let out_sed = out_volume * own_concentration;
    let new_still = max(cell.z - out_volume + in_volume, 0.0);
    let new_still_sed = max(cell.w - out_sed + in_sed, 0.0);
    water_out[idx] = vec4(cell.x, cell.y, new_still, new_still_sed);
}
"#;

const THERMAL_SRC: &str = r#"
struct Params {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
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
    _pad2: f32,
    _pad3: f32,
    _pad4: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> terrain_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> water_in: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> terrain_out: array<vec4<f32>>;

const INV_SQRT2: f32 = 0.70710678;

fn allowed_talus(height: f32, flow: f32, still: f32) -> f32 {
    var bracket = 0.0;
    if (params.elevation_high > params.elevation_low) {
        bracket = clamp(
            (height - params.elevation_low) / (params.elevation_high - params.elevation_low),
            0.0,
            1.0,
        );
    }
    let dry = mix(params.dry_talus_low, params.dry_talus_high, bracket);
    let wetness = smoothstep(params.flow_ramp_low, params.flow_ramp_high, flow);
    var talus = mix(dry, params.talus_wet, wetness);
    let immersion = smoothstep(
        params.immersion_ramp_low,
        params.immersion_ramp_high,
        still * params.water_height_factor,
    );
    return mix(talus, params.talus_immersed, immersion);
}

fn transfer(h_src: f32, h_dst: f32, talus_src: f32, inv_dist: f32) -> f32 {
    let run = 1.0 / inv_dist;
    let excess = (h_src - h_dst) - talus_src * run;
    if (excess > 0.0) {
        return params.strength * excess / 8.0;
    }
    return 0.0;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let idx = gid.y * params.width + gid.x;
    let cell = terrain_in[idx];
    let h = cell.x;
    let w = water_in[idx];
    let talus = allowed_talus(h, w.x, w.z);

    var offs = array<vec2<i32>, 8>(
        vec2(-1, -1), vec2(0, -1), vec2(1, -1), vec2(-1, 0),
        vec2(1, 0), vec2(-1, 1), vec2(0, 1), vec2(1, 1),
    );
    var inv_d = array<f32, 8>(
        INV_SQRT2, 1.0, INV_SQRT2, 1.0, 1.0, INV_SQRT2, 1.0, INV_SQRT2,
    );

    var delta = 0.0;
    for (var i = 0u; i < 8u; i++) {
        let n = vec2(i32(gid.x), i32(gid.y)) + offs[i];
        if (n.x < 0 || n.y < 0 || n.x >= i32(params.width) || n.y >= i32(params.height)) {
            continue;
        }
        let n_idx = u32(n.y) * params.width + u32(n.x);
        let nh = terrain_in[n_idx].x;
        if (nh < h) {
            delta -= transfer(h, nh, talus, inv_d[i]);
        } else if (nh > h) {
            let nw = water_in[n_idx];
            let n_talus = allowed_talus(nh, nw.x, nw.z);
            delta += transfer(nh, h, n_talus, inv_d[i]);
        }
    }

    delta = clamp(delta, -params.max_delta, params.max_delta);
    terrain_out[idx] = vec4(h + delta, cell.yzw);
}
"#;

const MARGOLUS_SRC: &str = r#"
struct Params {
    width: u32,
    height: u32,
    offset_x: u32,
    offset_y: u32,
    bisection_iterations: u32,
    water_height_factor: f32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> terrain_in: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> water_in: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> water_out: array<vec4<f32>>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let bx = params.offset_x + gid.x * 2u;
    let by = params.offset_y + gid.y * 2u;
    if (bx >= params.width || by >= params.height) {
        return;
    }

    // Gather the valid cells of this block (clamped at grid edges).
    var xs = array<u32, 4>();
    var ys = array<u32, 4>();
    var hs = array<f32, 4>();
    var count = 0u;
    var total_water = 0.0;
    for (var dy = 0u; dy < 2u; dy++) {
        for (var dx = 0u; dx < 2u; dx++) {
            let x = bx + dx;
            let y = by + dy;
            if (x < params.width && y < params.height) {
                let idx = y * params.width + x;
                xs[count] = x;
                ys[count] = y;
                hs[count] = terrain_in[idx].x;
                total_water += water_in[idx].z * params.water_height_factor;
                count++;
            }
        }
    }
    if (count == 0u || total_water <= 0.0) {
        return;
    }

    // Bisect for the flat level: sum(max(0, L - h_i)) is monotone in L.
    var lo = hs[0];
    var hi = hs[0];
    for (var i = 1u; i < count; i++) {
        lo = min(lo, hs[i]);
        hi = max(hi, hs[i]);
    }
    hi += total_water / f32(count);
    for (var it = 0u; it < params.bisection_iterations; it++) {
        let mid = 0.5 * (lo + hi);
        var filled = 0.0;
        for (var i = 0u; i < count; i++) {
            filled += max(0.0, mid - hs[i]);
        }
        if (filled > total_water) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let level = 0.5 * (lo + hi);

    for (var i = 0u; i < count; i++) {
        let idx = ys[i] * params.width + xs[i];
        var w = water_out[idx];
        w.z = max(0.0, level - hs[i]) / params.water_height_factor;
        water_out[idx] = w;
    }
}
"#;

pub fn noise_shader() -> String {
    format!("{}{}{}", NOISE_HEADER, PCG_SRC, NOISE_BODY)
}

pub fn flood_shader() -> String {
    FLOOD_SRC.to_string()
}

pub fn blend_shader() -> String {
    BLEND_SRC.to_string()
}

pub fn hydraulic_shader() -> String {
    format!("{}{}{}{}", HYDRAULIC_HEADER, PCG_SRC, FLOW_SRC, HYDRAULIC_BODY)
}

pub fn still_water_shader() -> String {
    format!("{}{}{}", STILL_HEADER, FLOW_SRC, STILL_BODY)
}

pub fn thermal_shader() -> String {
    THERMAL_SRC.to_string()
}

pub fn margolus_shader() -> String {
    MARGOLUS_SRC.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_constants_match_cpu() {
        // The WGSL constants must stay in sync with the CPU mirrors.
        let hydraulic = hydraulic_shader();
        assert!(hydraulic.contains(&format!(
            "const SPAWN_VOLUME: f32 = {:.2};",
            crate::sim::hydraulic::SPAWN_VOLUME
        )));
        assert!(hydraulic.contains("const EXPONENT_MIN: f32 = 0.8;"));
        assert!(hydraulic.contains("const EXPONENT_MAX: f32 = 2.5;"));
        assert!(hydraulic.contains("const CURVATURE_SCALE: f32 = 8.0;"));

        let flood = flood_shader();
        assert!(flood.contains(&format!(
            "const DIST_FIXED_SCALE: f32 = {:.1};",
            crate::sim::distance::DIST_FIXED_SCALE
        )));
    }

    #[test]
    fn test_shared_flow_block_present_in_both_kernels() {
        assert!(hydraulic_shader().contains("fn flow_weights"));
        assert!(still_water_shader().contains("fn flow_weights"));
    }
}
