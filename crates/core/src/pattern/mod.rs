//! Per-pixel pattern generation.
//!
//! A [`PatternContext`] captures everything a frame needs (mode, simulated
//! time, clamped parameters and the audio envelope) and evaluates the selected
//! kernel at any pixel. Evaluation is pure, so pixels can be computed in any
//! order and on any thread.

mod kernels;
pub mod noise;

use glam::{Vec2, Vec3};

use crate::{
    audio::AudioEnvelope,
    params::{clamp_unit, ParameterState},
    VisualMode,
};

/// Largest displacement component, in uv units, a kernel may request.
pub const MAX_DISPLACEMENT: f32 = 0.5;

/// Output of one pattern evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternResult {
    /// Offset in uv units (y up); the previous frame is sampled at `uv - displacement`.
    pub displacement: Vec2,
    /// Scalar pattern value in [0, 1].
    pub pattern: f32,
    /// Generated colour, each channel in [0, 1].
    pub color: Vec3,
}

/// One sample position in the two coordinate systems kernels use.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    /// Unit square, origin bottom-left.
    pub uv: Vec2,
    /// Centred on the origin, x scaled by the aspect ratio.
    pub p: Vec2,
}

/// Raw kernel output before clamping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shape {
    pub displacement: Vec2,
    pub pattern: f32,
    pub weight: f32,
}

impl Shape {
    fn new(displacement: Vec2, pattern: f32) -> Self {
        Self {
            displacement,
            pattern,
            weight: pattern,
        }
    }

    fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

type Kernel = fn(&PatternContext, Sample) -> Shape;

/// Kernels indexed by [`VisualMode::index`].
static KERNELS: [Kernel; VisualMode::COUNT] = [
    kernels::vapor,
    kernels::melt,
    kernels::liquefy,
    kernels::smudge,
    kernels::ripple,
    kernels::lattice,
    kernels::spiral,
    kernels::turbo,
    kernels::shard,
    kernels::plasma,
    kernels::echo,
    kernels::vortex,
    kernels::cyber,
    kernels::noise,
    kernels::flow_field,
    kernels::kaleido,
    kernels::datamosh,
    kernels::membrane,
    kernels::reaction,
    kernels::matrix,
    kernels::neon,
    kernels::circuit,
    kernels::jitter,
    kernels::void,
];

/// Per-frame inputs shared by every pixel.
#[derive(Debug, Clone, Copy)]
pub struct PatternContext {
    pub mode: VisualMode,
    pub time: f32,
    pub turbulence: f32,
    pub flow: f32,
    pub audio: AudioEnvelope,
    pub color_a: Vec3,
    pub color_b: Vec3,
    pub motion: bool,
    /// Common displacement strength, grows with turbulence and bass.
    pub drive: f32,
    /// Scales displacement by how much is audible; zero at silence.
    pub activity: f32,
}

impl PatternContext {
    pub fn new(params: &ParameterState, audio: AudioEnvelope, time: f32) -> Self {
        let params = params.clamped();
        let audio = audio.clamped();
        let time = if time.is_finite() { time } else { 0.0 };
        Self {
            mode: params.mode,
            time,
            turbulence: params.turbulence,
            flow: params.flow,
            audio,
            color_a: params.color_a.to_vec3(),
            color_b: params.color_b.to_vec3(),
            motion: params.motion,
            drive: (0.01 + params.turbulence * 0.02) * (1.0 + audio.bass * 4.0),
            activity: noise::smoothstep(0.001, 0.02, audio.total_energy()),
        }
    }

    /// Evaluates the selected mode at `uv` (unit square, y up). `aspect` is
    /// width over height of the target surface.
    pub fn generate(&self, uv: Vec2, aspect: f32) -> PatternResult {
        let centred = uv * 2.0 - Vec2::ONE;
        let sample = Sample {
            uv,
            p: Vec2::new(centred.x * aspect, centred.y),
        };
        let shape = KERNELS[self.mode.index()](self, sample);

        let displacement = if self.motion {
            bound_displacement(shape.displacement) * self.activity
        } else {
            Vec2::ZERO
        };
        let weight = clamp_unit(shape.weight);
        PatternResult {
            displacement,
            pattern: clamp_unit(shape.pattern),
            color: self.color_a.lerp(self.color_b, weight).clamp(Vec3::ZERO, Vec3::ONE),
        }
    }
}

fn bound_displacement(d: Vec2) -> Vec2 {
    let component = |v: f32| {
        if v.is_finite() {
            v.clamp(-MAX_DISPLACEMENT, MAX_DISPLACEMENT)
        } else {
            0.0
        }
    };
    Vec2::new(component(d.x), component(d.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Rgb;

    fn context(mode: VisualMode, audio: AudioEnvelope, time: f32) -> PatternContext {
        let params = ParameterState {
            mode,
            turbulence: 0.7,
            ..ParameterState::default()
        };
        PatternContext::new(&params, audio, time)
    }

    #[test]
    fn drive_follows_turbulence_and_bass() {
        let params = ParameterState {
            turbulence: 1.0,
            ..ParameterState::default()
        };
        let ctx = PatternContext::new(&params, AudioEnvelope::new(0.5, 0.0, 0.0, 0.0), 0.0);
        assert!((ctx.drive - 0.03 * 3.0).abs() < 1e-6);
    }

    #[test]
    fn silence_means_no_activity() {
        let ctx = context(VisualMode::Ripple, AudioEnvelope::SILENT, 3.0);
        assert_eq!(ctx.activity, 0.0);
        for mode in VisualMode::ALL {
            let ctx = context(mode, AudioEnvelope::SILENT, 3.0);
            let result = ctx.generate(Vec2::new(0.3, 0.8), 1.0);
            assert_eq!(result.displacement, Vec2::ZERO, "{mode} moved at silence");
        }
    }

    #[test]
    fn motion_off_zeroes_displacement() {
        let loud = AudioEnvelope::new(1.0, 1.0, 1.0, 1.0);
        for mode in VisualMode::ALL {
            let mut ctx = context(mode, loud, 12.5);
            ctx.motion = false;
            assert_eq!(ctx.generate(Vec2::new(0.9, 0.1), 1.0).displacement, Vec2::ZERO);
        }
    }

    #[test]
    fn centre_pixel_is_finite_for_radial_modes() {
        let loud = AudioEnvelope::new(1.0, 1.0, 1.0, 1.0);
        for mode in [VisualMode::Ripple, VisualMode::Void, VisualMode::Vortex] {
            let result = context(mode, loud, 1.0).generate(Vec2::splat(0.5), 1.0);
            assert!(result.displacement.is_finite());
        }
        let void = context(VisualMode::Void, loud, 1.0).generate(Vec2::splat(0.5), 1.0);
        assert_eq!(void.displacement, Vec2::ZERO);
    }

    #[test]
    fn echo_colour_tracks_the_high_band() {
        let mut params = ParameterState {
            mode: VisualMode::Echo,
            ..ParameterState::default()
        };
        params.color_a = Rgb([0, 0, 0]);
        params.color_b = Rgb([255, 255, 255]);
        let quiet = PatternContext::new(&params, AudioEnvelope::SILENT, 0.0);
        let bright = PatternContext::new(&params, AudioEnvelope::new(0.0, 0.0, 1.0, 0.0), 0.0);

        assert_eq!(quiet.generate(Vec2::splat(0.2), 1.0).color, Vec3::ZERO);
        assert_eq!(bright.generate(Vec2::splat(0.2), 1.0).color, Vec3::ONE);
    }

    #[test]
    fn every_mode_stays_bounded() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..400 {
            let mut params = ParameterState::randomized(&mut rng);
            params.motion = rng.bool();
            let audio = AudioEnvelope::new(rng.f32(), rng.f32(), rng.f32(), rng.f32());
            let time = rng.f32() * 1_000.0;
            let uv = Vec2::new(rng.f32(), rng.f32());
            for mode in VisualMode::ALL {
                params.mode = mode;
                let ctx = PatternContext::new(&params, audio, time);
                let result = ctx.generate(uv, 1.0 + rng.f32());
                assert!((0.0..=1.0).contains(&result.pattern), "{mode}: {result:?}");
                assert!(
                    result.color.cmpge(Vec3::ZERO).all() && result.color.cmple(Vec3::ONE).all(),
                    "{mode}: {result:?}"
                );
                assert!(result.displacement.abs().max_element() <= MAX_DISPLACEMENT);
                assert_eq!(ctx.generate(uv, 1.5), ctx.generate(uv, 1.5));
            }
        }
    }
}
