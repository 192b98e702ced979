//! Feedback compositing over the ping-pong surfaces.

mod post;

pub use post::{present_black, PostProcessor};

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use crate::{
    assets::ReferenceImage,
    audio::AudioEnvelope,
    pattern::{noise::hue_shift, PatternContext},
    surface::{DoubleBuffer, FrameBuffer},
    ParameterState, Result,
};

/// Completed frames after a reset that are forced to black.
pub const WARM_UP_FRAMES: u64 = 2;

/// Hue rotation per frame, in radians, at full colour shift.
pub const HUE_STEP: f32 = 0.002;

/// Fraction of freshly generated colour painted into the accumulation.
///
/// Always within `[0, 0.3]`; zero whenever `feedback` is zero.
pub fn paint_amount(feedback: f32, bass: f32, mid: f32) -> f32 {
    let sensitivity = (0.1 + bass * 2.0 + mid * 1.5).clamp(0.0, 1.0);
    let amount = sensitivity * feedback.clamp(0.0, 1.0) * 0.3;
    if amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// What one composite pass did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOutcome {
    pub paint_amount: f32,
    pub warming_up: bool,
}

/// Owns both accumulation surfaces and the optional reference image.
#[derive(Debug)]
pub struct FeedbackCompositor {
    buffers: DoubleBuffer,
    reference: Option<ReferenceImage>,
    frames_since_reset: u64,
}

impl FeedbackCompositor {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            buffers: DoubleBuffer::new(width, height)?,
            reference: None,
            frames_since_reset: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.buffers.read().width()
    }

    pub fn height(&self) -> u32 {
        self.buffers.read().height()
    }

    /// Sends the next [`WARM_UP_FRAMES`] frames down the black path. The
    /// surfaces themselves are kept.
    pub fn reset(&mut self) {
        self.frames_since_reset = 0;
    }

    /// Binds or unbinds the reference image and resets.
    pub fn bind_reference(&mut self, image: Option<ReferenceImage>) {
        self.reference = image;
        self.reset();
    }

    pub fn reference(&self) -> Option<&ReferenceImage> {
        self.reference.as_ref()
    }

    pub fn is_warming_up(&self) -> bool {
        self.frames_since_reset < WARM_UP_FRAMES
    }

    pub fn read_index(&self) -> usize {
        self.buffers.read_index()
    }

    /// The most recently completed composite. Valid after [`Self::swap`].
    pub fn latest(&self) -> &FrameBuffer {
        self.buffers.read()
    }

    /// Renders one frame from the read surface into the write surface.
    pub fn composite(
        &mut self,
        params: &ParameterState,
        audio: AudioEnvelope,
        time: f32,
    ) -> CompositeOutcome {
        let params = params.clamped();
        let audio = audio.clamped();

        if self.is_warming_up() {
            let (_, write) = self.buffers.split();
            write.fill(Vec3::ZERO);
            return CompositeOutcome {
                paint_amount: 0.0,
                warming_up: true,
            };
        }

        let paint = paint_amount(params.feedback, audio.bass, audio.mid);
        let (read, write) = self.buffers.split();
        if paint <= 0.0 {
            write.pixels_mut().copy_from_slice(read.pixels());
            return CompositeOutcome {
                paint_amount: 0.0,
                warming_up: false,
            };
        }

        let ctx = PatternContext::new(&params, audio, time);
        let reference = self.reference.as_ref();
        let image_mix = params.color_shift * audio.bass;
        let hue_angle = params.color_shift * HUE_STEP;
        let width = write.width() as usize;
        let w = write.width() as f32;
        let h = write.height() as f32;
        let aspect = write.aspect();

        write
            .pixels_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let py = y as f32;
                let v = 1.0 - (py + 0.5) / h;
                for (x, out) in row.iter_mut().enumerate() {
                    let px = x as f32;
                    let uv = Vec2::new((px + 0.5) / w, v);
                    let pattern = ctx.generate(uv, aspect);

                    // uv y points up while rows run down
                    let previous = read.sample_wrapped(
                        px - pattern.displacement.x * w,
                        py + pattern.displacement.y * h,
                    );
                    let generated = match reference {
                        Some(image) => image.sample(uv).lerp(pattern.color, image_mix),
                        None => pattern.color,
                    };

                    let mut color = previous.lerp(generated, paint);
                    if hue_angle > 0.0 {
                        color = hue_shift(color, hue_angle);
                    }
                    *out = color.clamp(Vec3::ZERO, Vec3::ONE).extend(1.0);
                }
            });

        CompositeOutcome {
            paint_amount: paint,
            warming_up: false,
        }
    }

    /// Completes the frame: the surface just written becomes the read surface.
    pub fn swap(&mut self) {
        self.buffers.swap();
        self.frames_since_reset = self.frames_since_reset.saturating_add(1);
    }
}
