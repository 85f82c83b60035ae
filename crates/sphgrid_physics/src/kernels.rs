use sphgrid_core::SimParams;

/// Poly6 weight of a pair at squared distance `r2`, without the
/// `mass * 315 / (64 pi h^9)` factor: `(h^2 - r^2)^3` inside the support.
#[inline]
pub fn poly6_unscaled(r2: f32, h2: f32) -> f32 {
    if r2 < h2 {
        let d = h2 - r2;
        d * d * d
    } else {
        0.0
    }
}

/// Pressure from the equation of state; never negative, so an under-dense
/// region does not pull particles together.
#[inline]
pub fn pressure(density: f32, params: &SimParams) -> f32 {
    (params.stiffness * (density - params.rest_density)).max(0.0)
}

/// Velocity contribution of neighbor `j` on particle `i`.
///
/// `diff = x_i - x_j`. Swapping `i` and `j` yields the exact negation, which
/// keeps the particle centroid fixed.
#[inline]
pub fn pressure_velocity(
    diff: [f32; 3],
    r2: f32,
    density_i: f32,
    pressure_i: f32,
    density_j: f32,
    pressure_j: f32,
    params: &SimParams,
) -> [f32; 3] {
    if r2 >= params.smoothing_length_sq || r2 < params.min_distance_sq {
        return [0.0; 3];
    }
    let r = r2.sqrt();
    let shared = (pressure_i + pressure_j) / (2.0 * (density_i * density_j));
    let w = params.smoothing_length - r;
    let scale = shared * params.spiky_grad_mass * w * w / r;
    [diff[0] * scale, diff[1] * scale, diff[2] * scale]
}

#[inline]
pub fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn length_sq(v: [f32; 3]) -> f32 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}
