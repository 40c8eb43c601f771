//! WGSL render shaders for the texture simulation
//!
//! Every pass renders into a node-state texture: fragment passes run once per
//! texel, point passes scatter into a target with additive blending. Each
//! source is the shared prelude plus one pass, joined at compile time.
//! Force-law variants are `override` constants set per pipeline.

/// Settings uniform, override switches, texel addressing and the full-screen
/// triangle shared by all passes
macro_rules! common {
    () => {
        r#"
struct Settings {
    gravity_center: vec2<f32>,
    gravity: f32,
    scaling: f32,
    edge_weight_influence: f32,
    jitter_tolerence: f32,
    node_count: u32,
    tex_width: u32,
    tex_height: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> settings: Settings;

override PREVENT_OVERLAP: bool = false;
override LIN_LOG: bool = false;
override STRONG_GRAVITY: bool = false;

fn texel_of(i: u32) -> vec2<i32> {
    return vec2<i32>(i32(i % settings.tex_width), i32(i / settings.tex_width));
}

fn index_of(frag: vec2<f32>) -> u32 {
    let c = vec2<u32>(frag);
    return c.y * settings.tex_width + c.x;
}

fn texel_to_ndc(i: u32) -> vec2<f32> {
    let c = vec2<f32>(texel_of(i)) + vec2<f32>(0.5);
    let size = vec2<f32>(f32(settings.tex_width), f32(settings.tex_height));
    return vec2<f32>(c.x / size.x * 2.0 - 1.0, 1.0 - c.y / size.y * 2.0);
}

@vertex
fn vs_fullscreen(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
    let corner = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    return vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
}
"#
    };
}

/// Repulsion from every other node plus gravity, one fragment per node
pub const REPULSION: &str = concat!(
    common!(),
    r#"
@group(0) @binding(1) var positions: texture_2d<f32>;

// Direction for two nodes on the same point; flips when the pair is swapped
fn separation_direction(a: u32, b: u32) -> vec2<f32> {
    var lo = a;
    var hi = b;
    var flip = 1.0;
    if (a > b) {
        lo = b;
        hi = a;
        flip = -1.0;
    }
    let t = fract(f32(lo) * 0.618034 + f32(hi) * 0.4142136);
    let angle = t * 6.2831855;
    return vec2<f32>(cos(angle), sin(angle)) * flip;
}

@fragment
fn fs_repulsion(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let i = index_of(frag.xy);
    if (i >= settings.node_count) {
        return vec4<f32>(0.0);
    }

    let node = textureLoad(positions, texel_of(i), 0);
    var force = vec2<f32>(0.0);

    for (var j = 0u; j < settings.node_count; j++) {
        if (j == i) {
            continue;
        }
        let other = textureLoad(positions, texel_of(j), 0);
        var v = node.xy - other.xy;
        let d2 = dot(v, v);
        if (d2 == 0.0) {
            if (!PREVENT_OVERLAP) {
                continue;
            }
            v = separation_direction(i, j);
        }

        var factor = 0.0;
        if (PREVENT_OVERLAP) {
            let d = sqrt(d2) - node.w - other.w;
            if (d > 0.0) {
                factor = settings.scaling * node.z * other.z / (d * d);
            } else if (d < 0.0) {
                factor = settings.scaling * 100.0 * node.z * other.z;
            }
        } else {
            factor = settings.scaling * node.z * other.z / d2;
        }
        force += v * factor;
    }

    let to_center = settings.gravity_center - node.xy;
    var g = settings.gravity * node.z;
    if (!STRONG_GRAVITY) {
        g = g / (1.0 + length(to_center));
    }
    force += to_center * g;

    return vec4<f32>(force, 0.0, 0.0);
}
"#
);

/// Edge attraction: one point per edge endpoint, placed on the receiving
/// node's texel and summed by additive blending
pub const ATTRACTION: &str = concat!(
    common!(),
    r#"
@group(0) @binding(1) var positions: texture_2d<f32>;

struct EdgeOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) @interpolate(flat) force: vec2<f32>,
}

@vertex
fn vs_attraction(@location(0) ends: vec2<u32>, @location(1) weight: f32) -> EdgeOut {
    var out: EdgeOut;
    // Outside the clip volume: dropped unless the edge contributes
    out.clip = vec4<f32>(2.0, 2.0, 0.0, 1.0);
    out.force = vec2<f32>(0.0);

    let a = textureLoad(positions, texel_of(ends.x), 0);
    let b = textureLoad(positions, texel_of(ends.y), 0);

    var w = weight;
    if (settings.edge_weight_influence == 0.0) {
        w = 1.0;
    } else if (settings.edge_weight_influence != 1.0) {
        w = pow(weight, settings.edge_weight_influence);
    }

    let v = a.xy - b.xy;
    var d = length(v);
    if (PREVENT_OVERLAP) {
        d = d - a.w - b.w;
        if (d <= 0.0) {
            return out;
        }
    }

    var factor = -w;
    if (LIN_LOG) {
        factor = -w * log(d + 1.0) / (d + 1.0);
    }

    out.force = v * factor;
    out.clip = vec4<f32>(texel_to_ndc(ends.x), 0.0, 1.0);
    return out;
}

@fragment
fn fs_attraction(edge: EdgeOut) -> @location(0) vec4<f32> {
    return vec4<f32>(edge.force, 0.0, 0.0);
}
"#
);

/// Per-node swing and traction, summed into a single texel
pub const WEIGHTED_SUM: &str = concat!(
    common!(),
    r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var forces: texture_2d<f32>;
@group(0) @binding(3) var forces_prev: texture_2d<f32>;

struct SumOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) @interpolate(flat) sums: vec2<f32>,
}

@vertex
fn vs_weighted_sum(@builtin(vertex_index) i: u32) -> SumOut {
    let t = texel_of(i);
    let mass = textureLoad(positions, t, 0).z;
    let f = textureLoad(forces, t, 0).xy;
    let fp = textureLoad(forces_prev, t, 0).xy;

    var out: SumOut;
    out.clip = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    out.sums = vec2<f32>(length(f - fp) * mass, length(f + fp) * 0.5 * mass);
    return out;
}

@fragment
fn fs_weighted_sum(sum: SumOut) -> @location(0) vec4<f32> {
    return vec4<f32>(sum.sums, 0.0, 0.0);
}
"#
);

/// Adaptive global speed from the summed swing and traction
pub const GLOBAL_SPEED: &str = concat!(
    common!(),
    r#"
@group(0) @binding(1) var weighted_sum: texture_2d<f32>;
@group(0) @binding(2) var speed_prev: texture_2d<f32>;

@fragment
fn fs_global_speed(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let sums = textureLoad(weighted_sum, vec2<i32>(0), 0);
    let swing = sums.x;
    let traction = sums.y;
    let prev = textureLoad(speed_prev, vec2<i32>(0), 0).x;
    let jt2 = settings.jitter_tolerence * settings.jitter_tolerence;

    var speed = prev;
    if (swing > 0.0) {
        speed = jt2 * traction / swing;
        if (prev > 0.0) {
            speed = min(speed, 1.5 * prev);
        }
    } else if (traction > 0.0) {
        if (prev > 0.0) {
            speed = 1.5 * prev;
        } else {
            speed = jt2;
        }
    }
    return vec4<f32>(speed, 0.0, 0.0, 0.0);
}
"#
);

/// Per-node integration into the other position texture
pub const INTEGRATE: &str = concat!(
    common!(),
    r#"
@group(0) @binding(1) var positions: texture_2d<f32>;
@group(0) @binding(2) var forces: texture_2d<f32>;
@group(0) @binding(3) var forces_prev: texture_2d<f32>;
@group(0) @binding(4) var speed: texture_2d<f32>;

@fragment
fn fs_integrate(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let t = vec2<i32>(frag.xy);
    let node = textureLoad(positions, t, 0);
    if (index_of(frag.xy) >= settings.node_count) {
        return node;
    }

    let f = textureLoad(forces, t, 0).xy;
    let fp = textureLoad(forces_prev, t, 0).xy;
    let g = textureLoad(speed, vec2<i32>(0), 0).x;

    var s = 0.1 * g / (0.1 + g * sqrt(length(f - fp)));
    let df = length(f);
    var p = node.xy;
    if (df > 0.0) {
        s = min(df * s, 10.0) / df;
        p = p + f * s;
    }
    return vec4<f32>(p, node.z, node.w);
}
"#
);
