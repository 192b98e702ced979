//! The per-mode pattern kernels.
//!
//! Every kernel is a plain function of the frame context and one sample
//! position. Results are raw: the caller clamps and bounds them.

use glam::Vec2;

use super::noise::{fbm, fract2, hash, smoothstep, step, value_noise, voronoi};
use super::{PatternContext, Sample, Shape};

/// GLSL `sign`: zero maps to zero.
#[inline]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
fn polar(p: Vec2) -> (f32, f32) {
    (p.y.atan2(p.x), p.length())
}

/// Drifting fractal vapour pushed upwards by flow and bass.
pub(super) fn vapor(ctx: &PatternContext, s: Sample) -> Shape {
    let t = ctx.time;
    let n = fbm(s.p * 2.0 + Vec2::new(0.0, t * 0.5));
    let displacement = Vec2::new(
        (n - 0.5) * ctx.drive,
        0.005 + ctx.flow * 0.02 + ctx.audio.bass * 0.01,
    );
    let pattern = fbm(s.p * 3.0 + Vec2::splat(t * 0.2));
    Shape::new(displacement, pattern).with_weight(pattern + ctx.audio.mid * 0.5)
}

pub(super) fn melt(ctx: &PatternContext, s: Sample) -> Shape {
    let t = ctx.time;
    let displacement = Vec2::new(
        (s.uv.y * 10.0 + t).sin() * ctx.drive * 0.5,
        -(0.01 + ctx.flow * 0.05 + ctx.audio.bass * 0.03),
    );
    let p = s.p;
    let v = (p.x * 5.0 + t).sin() + (p.y * 5.0 + t).sin() + ((p.x + p.y) * 5.0 + t).sin();
    Shape::new(displacement, (v + 3.0) / 6.0)
}

/// Rotates each point about the centre by an angle that oscillates with radius.
pub(super) fn liquefy(ctx: &PatternContext, s: Sample) -> Shape {
    let p = s.p;
    let angle = (p.length() * 3.0 - ctx.time).sin() * (ctx.drive + ctx.flow * 0.05);
    let (sin, cos) = angle.sin_cos();
    let rotated = Vec2::new(cos * p.x - sin * p.y, sin * p.x + cos * p.y);
    let cells = voronoi(p * (3.0 + ctx.audio.mid * 5.0), ctx.time);
    Shape::new(rotated - p, smoothstep(0.0, 1.0, cells))
}

pub(super) fn smudge(ctx: &PatternContext, s: Sample) -> Shape {
    let t = ctx.time;
    let cell = (s.uv * 50.0).floor() / 50.0;
    let mut displacement = Vec2::ZERO;
    if hash(cell + Vec2::splat(t.floor())) > 0.9 - ctx.audio.bass * 0.5 {
        displacement.x = (hash(cell) - 0.5) * 0.2;
    }
    displacement.y += ctx.flow * 0.01;
    let pattern = hash(cell + Vec2::splat(t));
    Shape::new(displacement, pattern).with_weight(step(0.5, pattern))
}

pub(super) fn ripple(ctx: &PatternContext, s: Sample) -> Shape {
    let wave = (s.p.length() * 20.0 - ctx.time * 2.0).sin();
    let displacement = s.p.normalize_or_zero() * wave * ctx.drive * 0.2;
    Shape::new(displacement, wave * 0.5 + 0.5)
}

pub(super) fn lattice(ctx: &PatternContext, s: Sample) -> Shape {
    let p = s.p;
    let t = ctx.time;
    let cell = fract2(p * 5.0) - Vec2::splat(0.5);
    let displacement = Vec2::new((p.y * 10.0 + t).sin(), (p.x * 10.0 + t).cos()) * ctx.drive * 0.1;
    Shape::new(displacement, smoothstep(0.4, 0.5, cell.length()))
}

pub(super) fn spiral(ctx: &PatternContext, s: Sample) -> Shape {
    let (angle, radius) = polar(s.p);
    let arm = (angle * 5.0 + radius * 10.0 - ctx.time * 2.0).sin();
    let heading = angle + arm;
    let displacement = Vec2::new(heading.cos(), heading.sin()) * ctx.drive * 0.1;
    Shape::new(displacement, arm * 0.5 + 0.5)
}

pub(super) fn turbo(ctx: &PatternContext, s: Sample) -> Shape {
    let n = value_noise(s.p * 20.0 + Vec2::splat(ctx.time * 5.0));
    Shape::new(Vec2::splat(n) * ctx.drive * 0.5, n)
}

pub(super) fn shard(ctx: &PatternContext, s: Sample) -> Shape {
    let p = s.p;
    let m = (fract2(p * 4.0 + Vec2::splat(ctx.time * 0.1)) - Vec2::splat(0.5)).abs();
    let d = m.max_element();
    let displacement = Vec2::new(sign(p.x), sign(p.y)) * d * ctx.drive * 0.2;
    Shape::new(displacement, step(0.4, d))
}

pub(super) fn plasma(ctx: &PatternContext, s: Sample) -> Shape {
    let p = s.p;
    let t = ctx.time;
    let v = (p.x * 10.0 + t).sin() + (p.y * 10.0 + t).sin() + ((p.x + p.y) * 10.0 + t).sin();
    let displacement = Vec2::new(v.sin(), v.cos()) * ctx.drive * 0.1;
    Shape::new(displacement, v * 0.3 + 0.5)
}

/// Slow circular wobble; the colour follows the high band only.
pub(super) fn echo(ctx: &PatternContext, s: Sample) -> Shape {
    let t = ctx.time;
    let displacement = Vec2::new(t.sin(), t.cos()) * 0.01 * (1.0 + ctx.audio.bass);
    let pattern = s.uv.distance(Vec2::splat(0.5));
    Shape::new(displacement, pattern).with_weight(ctx.audio.high)
}

pub(super) fn vortex(ctx: &PatternContext, s: Sample) -> Shape {
    let (angle, radius) = polar(s.p);
    let v = (radius * 10.0 - ctx.time * 4.0).sin();
    let displacement = Vec2::new((angle + v).sin(), (angle + v).cos()) * ctx.drive * 0.2;
    Shape::new(displacement, smoothstep(0.0, 1.0, v))
}

pub(super) fn cyber(ctx: &PatternContext, s: Sample) -> Shape {
    let cell = (s.p * 10.0).floor();
    let rnd = hash(cell + Vec2::splat(ctx.time.floor()));
    let displacement = if rnd > 0.8 {
        Vec2::new(rnd - 0.5, 0.0) * ctx.drive
    } else {
        Vec2::ZERO
    };
    Shape::new(displacement, step(0.5, rnd))
}

pub(super) fn noise(ctx: &PatternContext, s: Sample) -> Shape {
    let n = hash(s.uv * ctx.time);
    Shape::new(Vec2::splat(n - 0.5) * ctx.drive * 0.5, n).with_weight(step(0.5, n))
}

pub(super) fn flow_field(ctx: &PatternContext, s: Sample) -> Shape {
    let heading = value_noise(s.p * 3.0 + Vec2::splat(ctx.time * 0.1)) * 6.28;
    let displacement = Vec2::new(heading.cos(), heading.sin()) * ctx.drive * 0.2;
    Shape::new(displacement, value_noise(s.p * 10.0))
}

/// Mirrored into the first quadrant, so the field repeats across both axes.
pub(super) fn kaleido(ctx: &PatternContext, s: Sample) -> Shape {
    let t = ctx.time;
    let (angle, radius) = polar(s.p.abs());
    let displacement =
        Vec2::new((angle * 4.0 + t).sin(), (radius * 5.0 - t).cos()) * ctx.drive * 0.1;
    Shape::new(displacement, (angle * 8.0).sin() * 0.5 + 0.5)
}

pub(super) fn datamosh(ctx: &PatternContext, s: Sample) -> Shape {
    let block = (s.uv * 20.0).floor() / 20.0;
    let n = hash(block + Vec2::splat((ctx.time * 5.0).floor()));
    Shape::new(Vec2::splat(n - 0.5) * ctx.drive * 0.5, step(0.5, n))
}

pub(super) fn membrane(ctx: &PatternContext, s: Sample) -> Shape {
    let p = s.p;
    let displacement = p * (p.length() * 10.0 - ctx.time).sin() * ctx.drive * 0.1;
    let cells = (p.x * 20.0).sin() * (p.y * 20.0).sin();
    Shape::new(displacement, smoothstep(0.0, 1.0, cells))
}

pub(super) fn reaction(ctx: &PatternContext, s: Sample) -> Shape {
    let t = Vec2::splat(ctx.time);
    let a = value_noise(s.p * 5.0 + t);
    let b = value_noise(s.p * 5.0 - t);
    let displacement = Vec2::new(a - b, b - a) * ctx.drive * 0.2;
    Shape::new(displacement, smoothstep(0.4, 0.6, a))
}

pub(super) fn matrix(ctx: &PatternContext, s: Sample) -> Shape {
    let displacement = Vec2::new(0.0, 0.05 + ctx.drive * 0.1);
    let cell = (s.uv * Vec2::new(50.0, 10.0)).floor();
    let n = hash(cell + Vec2::splat((ctx.time * 10.0).floor()));
    Shape::new(displacement, step(0.9, n))
}

pub(super) fn neon(ctx: &PatternContext, s: Sample) -> Shape {
    let v = (s.p.x * 10.0 + s.p.y * 10.0 + ctx.time).sin();
    let pattern = v.abs();
    Shape::new(Vec2::splat(v) * ctx.drive * 0.1, pattern).with_weight(pattern.powf(0.2))
}

pub(super) fn circuit(ctx: &PatternContext, s: Sample) -> Shape {
    let cell = (s.uv * 30.0).floor();
    let r = hash(cell);
    let step_size = ctx.drive * 0.1;
    let displacement = if r > 0.5 {
        Vec2::new(step_size * sign(r - 0.75), 0.0)
    } else {
        Vec2::new(0.0, step_size * sign(r - 0.25))
    };
    Shape::new(displacement, step(0.8, hash(cell + Vec2::splat(ctx.time))))
}

pub(super) fn jitter(ctx: &PatternContext, s: Sample) -> Shape {
    let t = Vec2::splat(ctx.time);
    let offset = Vec2::new(hash(s.uv + t), hash(s.uv - t)) - Vec2::splat(0.5);
    Shape::new(offset * ctx.drive * 0.5, hash(s.uv * 2.0))
}

/// Contracts towards the centre, harder the further out a point sits.
pub(super) fn void(ctx: &PatternContext, s: Sample) -> Shape {
    let radius = s.p.length();
    let displacement = -s.p.normalize_or_zero() * ctx.drive * 0.1 * radius;
    Shape::new(displacement, radius).with_weight(1.0 - radius.min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_sign_keeps_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(2.0), 1.0);
        assert_eq!(sign(-0.1), -1.0);
    }
}
