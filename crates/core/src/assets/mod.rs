use std::path::Path;

use glam::{Vec2, Vec3};

use crate::{ChromaError, Result};

/// A decoded reference image bound behind the generated pattern.
///
/// Pixels are stored top row first as linear floats in [0, 1]. Sampling uses
/// uv coordinates with y pointing up, so the image shows upright on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl ReferenceImage {
    /// Builds an image from raw RGBA8 bytes. Alpha is ignored.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChromaError::InvalidInput("reference image has no pixels"));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(ChromaError::msg(format!(
                "reference image expects {expected} bytes, got {}",
                rgba.len()
            )));
        }
        let pixels = rgba
            .chunks_exact(4)
            .map(|px| Vec3::new(px[0] as f32, px[1] as f32, px[2] as f32) / 255.0)
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes a PNG or JPEG held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Self::from_rgba(rgba.width(), rgba.height(), rgba.as_raw())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rgba = image::open(path)?.to_rgba8();
        let image = Self::from_rgba(rgba.width(), rgba.height(), rgba.as_raw())?;
        tracing::debug!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            "decoded reference image"
        );
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bilinear sample with repeat wrapping. Texel centres sit at half-texel
    /// offsets, as on a GPU.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        let w = self.width as i64;
        let h = self.height as i64;
        let x = uv.x * self.width as f32 - 0.5;
        let y = (1.0 - uv.y) * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let xi = (x0 as i64).rem_euclid(w);
        let yi = (y0 as i64).rem_euclid(h);
        let xj = (xi + 1) % w;
        let yj = (yi + 1) % h;

        let at = |px: i64, py: i64| self.pixels[(py * w + px) as usize];
        let top = at(xi, yi).lerp(at(xj, yi), tx);
        let bottom = at(xi, yj).lerp(at(xj, yj), tx);
        top.lerp(bottom, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> ReferenceImage {
        // top-left red, top-right green, bottom-left blue, bottom-right white
        let rgba = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 255, 255,
        ];
        ReferenceImage::from_rgba(2, 2, &rgba).unwrap()
    }

    #[test]
    fn texel_centres_sample_exactly_and_upright() {
        let image = checker();
        assert!(image.sample(Vec2::new(0.25, 0.75)).abs_diff_eq(Vec3::X, 1e-6));
        assert!(image.sample(Vec2::new(0.75, 0.75)).abs_diff_eq(Vec3::Y, 1e-6));
        assert!(image.sample(Vec2::new(0.25, 0.25)).abs_diff_eq(Vec3::Z, 1e-6));
        assert!(image.sample(Vec2::new(0.75, 0.25)).abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn sampling_repeats_outside_the_unit_square() {
        let image = checker();
        let inside = image.sample(Vec2::new(0.25, 0.75));
        assert!(image.sample(Vec2::new(1.25, -0.25)).abs_diff_eq(inside, 1e-5));
    }

    #[test]
    fn rejects_mismatched_buffers() {
        assert!(ReferenceImage::from_rgba(2, 2, &[0; 15]).is_err());
        assert!(ReferenceImage::from_rgba(0, 2, &[]).is_err());
    }

    #[test]
    fn decodes_encoded_png() {
        let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        source
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let image = ReferenceImage::decode(&png).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        let expected = Vec3::new(10.0, 20.0, 30.0) / 255.0;
        assert!(image.sample(Vec2::splat(0.5)).abs_diff_eq(expected, 1e-6));
    }
}
