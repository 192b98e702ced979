//! Deterministic noise and shaping helpers shared by the pattern kernels.
//!
//! Everything here is a pure function of its arguments so that a frame can be
//! evaluated for any pixel in any order and reproduce bit-for-bit.

use glam::{Mat2, Vec2, Vec3};

/// Fractional part in [0, 1), also for negative inputs.
#[inline]
pub fn fract(x: f32) -> f32 {
    let f = x - x.floor();
    // Rounding can push tiny negative inputs up to exactly 1.0.
    if f >= 1.0 {
        0.0
    } else {
        f
    }
}

#[inline]
pub fn fract2(v: Vec2) -> Vec2 {
    Vec2::new(fract(v.x), fract(v.y))
}

/// Hash of a 2D coordinate into [0, 1).
#[inline]
pub fn hash(st: Vec2) -> f32 {
    fract((st.dot(Vec2::new(12.9898, 78.233))).sin() * 43_758.547)
}

/// Two independent hashes of a 2D coordinate, each in [0, 1).
#[inline]
pub fn hash2(p: Vec2) -> Vec2 {
    let q = Vec2::new(
        p.dot(Vec2::new(127.1, 311.7)),
        p.dot(Vec2::new(269.5, 183.3)),
    );
    Vec2::new(fract(q.x.sin() * 43_758.547), fract(q.y.sin() * 43_758.547))
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}

#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Value noise: smoothstep-weighted blend of the four surrounding lattice
/// hashes. Output lies in [0, 1).
pub fn value_noise(st: Vec2) -> f32 {
    let i = st.floor();
    let f = st - i;
    let a = hash(i);
    let b = hash(i + Vec2::X);
    let c = hash(i + Vec2::Y);
    let d = hash(i + Vec2::ONE);
    let u = f * f * (Vec2::splat(3.0) - 2.0 * f);
    mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y
}

/// Five octaves of value noise with a half-radian rotation between octaves.
/// The octave weights sum to 0.96875, so the result stays below 1.
pub fn fbm(mut st: Vec2) -> f32 {
    let rotation = Mat2::from_angle(0.5);
    let mut value = 0.0;
    let mut amplitude = 0.5;
    for _ in 0..5 {
        value += amplitude * value_noise(st);
        st = rotation * st * 2.0 + Vec2::splat(100.0);
        amplitude *= 0.5;
    }
    value
}

/// Distance to the nearest animated feature point, capped at 1.
pub fn voronoi(x: Vec2, time: f32) -> f32 {
    let cell = x.floor();
    let local = x - cell;
    let mut nearest: f32 = 1.0;
    for j in -1..=1 {
        for i in -1..=1 {
            let offset = Vec2::new(i as f32, j as f32);
            let seed = hash2(cell + offset);
            let phase = Vec2::splat(time) + std::f32::consts::TAU * seed;
            let point = Vec2::splat(0.5) + 0.5 * Vec2::new(phase.x.sin(), phase.y.sin());
            nearest = nearest.min((offset + point - local).length());
        }
    }
    nearest
}

/// Rotates `color` about the gray axis by `angle` radians.
pub fn hue_shift(color: Vec3, angle: f32) -> Vec3 {
    let k = Vec3::splat(0.577_35);
    let (sin, cos) = angle.sin_cos();
    color * cos + k.cross(color) * sin + k * k.dot(color) * (1.0 - cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fract_stays_in_unit_interval() {
        for x in [-3.25_f32, -1e-9, 0.0, 0.5, 7.999_999, 1e6] {
            let f = fract(x);
            assert!((0.0..1.0).contains(&f), "fract({x}) = {f}");
        }
        assert!((fract(-0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn noise_functions_are_bounded_and_deterministic() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..2_000 {
            let p = Vec2::new(rng.f32() * 400.0 - 200.0, rng.f32() * 400.0 - 200.0);
            let n = value_noise(p);
            let f = fbm(p);
            let v = voronoi(p, rng.f32() * 50.0);
            assert!((0.0..=1.0).contains(&n));
            assert!((0.0..=1.0).contains(&f));
            assert!((0.0..=1.0).contains(&v));
            assert_eq!(value_noise(p), n);
            assert_eq!(fbm(p), f);
        }
    }

    #[test]
    fn hue_shift_preserves_gray_and_rotates_color() {
        let gray = Vec3::splat(0.4);
        assert!(hue_shift(gray, 1.0).abs_diff_eq(gray, 1e-4));

        let red = Vec3::new(1.0, 0.0, 0.0);
        let third_turn = hue_shift(red, std::f32::consts::TAU / 3.0);
        assert!(third_turn.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-4));
        assert!(hue_shift(red, 0.0).abs_diff_eq(red, 1e-7));
    }

    #[test]
    fn step_and_smoothstep_edges() {
        assert_eq!(step(0.5, 0.49), 0.0);
        assert_eq!(step(0.5, 0.5), 1.0);
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
    }
}
