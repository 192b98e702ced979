use glam::{Vec2, Vec3, Vec4};
use image::RgbaImage;
use rayon::prelude::*;

use crate::{pattern::noise::hash, surface::to_rgba8, surface::FrameBuffer, ParameterState};

/// Contrast and grain applied to the presented copy of a frame. The
/// accumulation surfaces never see these adjustments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessor {
    pub sharpness: f32,
    pub grain: f32,
}

impl PostProcessor {
    pub fn from_params(params: &ParameterState) -> Self {
        let params = params.clamped();
        Self {
            sharpness: params.sharpness,
            grain: params.grain,
        }
    }

    /// Adjusts a single colour at `uv` for simulated time `time`.
    pub fn shade(&self, color: Vec3, uv: Vec2, time: f32) -> Vec3 {
        let contrasted = (color - Vec3::splat(0.5)) * (1.0 + self.sharpness) + Vec3::splat(0.5);
        let noise = hash(uv * time * 100.0) - 0.5;
        (contrasted + Vec3::splat(noise * self.grain)).clamp(Vec3::ZERO, Vec3::ONE)
    }

    /// Writes the processed `frame` into `out`, resizing it when needed.
    pub fn apply(&self, frame: &FrameBuffer, time: f32, out: &mut RgbaImage) {
        let (width, height) = (frame.width(), frame.height());
        if out.dimensions() != (width, height) {
            *out = RgbaImage::new(width, height);
        }
        let w = width as f32;
        let h = height as f32;
        let row_len = width as usize;

        out.par_chunks_mut(row_len * 4)
            .zip(frame.pixels().par_chunks(row_len))
            .enumerate()
            .for_each(|(y, (dst, src))| {
                let v = 1.0 - (y as f32 + 0.5) / h;
                for (x, (out_px, px)) in dst.chunks_exact_mut(4).zip(src).enumerate() {
                    let uv = Vec2::new((x as f32 + 0.5) / w, v);
                    let color = self.shade(px.truncate(), uv, time);
                    out_px.copy_from_slice(&to_rgba8(color.extend(1.0)));
                }
            });
    }
}

/// Fills `out` with opaque black at the given size.
pub fn present_black(width: u32, height: u32, out: &mut RgbaImage) {
    if out.dimensions() != (width, height) {
        *out = RgbaImage::new(width, height);
    }
    out.pixels_mut()
        .for_each(|px| px.0 = to_rgba8(Vec4::W));
}
