//! Accumulation surfaces and the ping-pong pair that owns them.

use glam::{Vec3, Vec4};

use crate::{ChromaError, Result};

/// A fixed-size RGBA surface of linear float pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl FrameBuffer {
    /// Allocates an opaque black surface.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChromaError::Surface(format!(
                "cannot allocate a {width}x{height} surface"
            )));
        }
        let too_large = || ChromaError::Surface(format!("{width}x{height} surface is too large"));
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(too_large)?;
        len.checked_mul(std::mem::size_of::<Vec4>())
            .ok_or_else(too_large)?;

        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|err| {
            ChromaError::Surface(format!("cannot allocate a {width}x{height} surface: {err}"))
        })?;
        pixels.resize(len, Vec4::W);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Vec4] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn fill(&mut self, color: Vec3) {
        let value = color.extend(1.0);
        self.pixels.iter_mut().for_each(|p| *p = value);
    }

    /// Bilinear sample at a pixel-space position with toroidal wrapping.
    /// Integer positions return the stored pixel exactly.
    pub fn sample_wrapped(&self, x: f32, y: f32) -> Vec3 {
        let w = self.width as i64;
        let h = self.height as i64;
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let xi = (x0 as i64).rem_euclid(w);
        let yi = (y0 as i64).rem_euclid(h);
        let xj = (xi + 1) % w;
        let yj = (yi + 1) % h;

        let at = |px: i64, py: i64| self.pixels[(py * w + px) as usize].truncate();
        let top = lerp(at(xi, yi), at(xj, yi), tx);
        let bottom = lerp(at(xi, yj), at(xj, yj), tx);
        lerp(top, bottom, ty)
    }
}

/// Exact at `t == 0`, which keeps an unmoved sample bit-identical.
#[inline]
fn lerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    if t == 0.0 {
        a
    } else {
        a + (b - a) * t
    }
}

pub(crate) fn to_rgba8(color: Vec4) -> [u8; 4] {
    let scaled = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [scaled.x as u8, scaled.y as u8, scaled.z as u8, scaled.w as u8]
}

/// Two equally sized surfaces with alternating read and write roles.
#[derive(Debug, Clone)]
pub struct DoubleBuffer {
    surfaces: [FrameBuffer; 2],
    read_index: usize,
}

impl DoubleBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let first = FrameBuffer::new(width, height)?;
        let second = first.clone();
        Ok(Self {
            surfaces: [first, second],
            read_index: 0,
        })
    }

    /// Index of the surface holding the previous composite.
    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn read(&self) -> &FrameBuffer {
        &self.surfaces[self.read_index]
    }

    pub fn write(&self) -> &FrameBuffer {
        &self.surfaces[self.read_index ^ 1]
    }

    /// Borrows the read surface shared and the write surface mutably.
    pub fn split(&mut self) -> (&FrameBuffer, &mut FrameBuffer) {
        let (first, second) = self.surfaces.split_at_mut(1);
        if self.read_index == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Flips the roles. Contents are never copied.
    pub fn swap(&mut self) {
        self.read_index ^= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> FrameBuffer {
        let mut surface = FrameBuffer::new(width, height).unwrap();
        for (i, px) in surface.pixels_mut().iter_mut().enumerate() {
            let v = i as f32 / (width * height) as f32;
            *px = Vec4::new(v, 1.0 - v, v * 0.5, 1.0);
        }
        surface
    }

    #[test]
    fn rejects_empty_surfaces() {
        assert!(FrameBuffer::new(0, 4).is_err());
        assert!(FrameBuffer::new(4, 0).is_err());
    }

    #[test]
    fn oversized_surfaces_are_errors_not_panics() {
        let err = FrameBuffer::new(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, ChromaError::Surface(_)), "{err:?}");
    }

    #[test]
    fn integer_samples_are_exact() {
        let surface = gradient(5, 3);
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(
                    surface.sample_wrapped(x as f32, y as f32),
                    surface.pixel(x, y).truncate()
                );
            }
        }
    }

    #[test]
    fn sampling_wraps_around_both_edges() {
        let surface = gradient(4, 4);
        assert_eq!(surface.sample_wrapped(-1.0, 0.0), surface.pixel(3, 0).truncate());
        assert_eq!(surface.sample_wrapped(0.0, 4.0), surface.pixel(0, 0).truncate());
        assert_eq!(surface.sample_wrapped(-4.0, -8.0), surface.pixel(0, 0).truncate());

        let between = surface.sample_wrapped(3.5, 0.0);
        let expected = (surface.pixel(3, 0).truncate() + surface.pixel(0, 0).truncate()) * 0.5;
        assert!(between.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn swapping_flips_roles_without_copying() {
        let mut buffers = DoubleBuffer::new(2, 2).unwrap();
        {
            let (_, write) = buffers.split();
            write.fill(Vec3::ONE);
        }
        assert_eq!(buffers.read().pixel(0, 0), Vec4::W);
        buffers.swap();
        assert_eq!(buffers.read_index(), 1);
        assert_eq!(buffers.read().pixel(0, 0), Vec4::ONE);
        assert_eq!(buffers.write().pixel(0, 0), Vec4::W);
    }

    #[test]
    fn rgba_conversion_clamps() {
        assert_eq!(to_rgba8(Vec4::new(-1.0, 0.5, 2.0, 1.0)), [0, 128, 255, 255]);
    }
}
