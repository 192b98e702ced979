use std::{f32::consts::PI, fmt, ops::Range, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::BandLayout, AudioConfig, Result};

/// Un-gated band averages of the normalised spectrum, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub vol: f32,
}

/// Sliding-window spectrum analyser.
///
/// Samples are pushed in arbitrary block sizes. Once `fft_size` samples have
/// been seen, every `hop_size` further samples trigger an analysis of the
/// most recent window: Blackman window, real FFT, per-bin temporal smoothing,
/// decibel normalisation and band averaging.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    hop_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    bands: BandLayout,
    window: Vec<f32>,
    ring: Vec<f32>,
    write_pos: usize,
    filled: usize,
    since_last: usize,
    smoothed: Vec<f32>,
    normalized: Vec<f32>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SpectrumAnalyzer {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        let n = config.fft_size;
        Ok(Self {
            fft_size: n,
            hop_size: config.hop_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            bands: config.bands.clone(),
            window: (0..n).map(|i| blackman_value(i, n)).collect(),
            ring: vec![0.0; n],
            write_pos: 0,
            filled: 0,
            since_last: 0,
            smoothed: vec![0.0; n / 2],
            normalized: vec![0.0; n / 2],
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    /// Normalised magnitude of every bin below Nyquist as of the last window.
    pub fn spectrum(&self) -> &[f32] {
        &self.normalized
    }

    /// Clears the sample history and the smoothing state.
    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.normalized.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.since_last = 0;
    }

    /// Consumes mono samples. Returns the levels of the most recent window
    /// analysed during this call, if any.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Option<BandLevels>> {
        let mut latest = None;
        for &sample in samples {
            self.ring[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % self.fft_size;
            if self.filled < self.fft_size {
                self.filled += 1;
            }
            self.since_last += 1;

            if self.filled == self.fft_size && self.since_last >= self.hop_size {
                self.since_last = 0;
                latest = Some(self.analyze_window()?);
            }
        }
        Ok(latest)
    }

    /// Analyses the current window regardless of the hop position.
    pub fn analyze_window(&mut self) -> Result<BandLevels> {
        let n = self.fft_size;
        let planner = &mut self.fft_planner;
        let fft = self
            .fft
            .get_or_insert_with(|| FftResources::plan(planner, n));

        for (i, slot) in fft.input.iter_mut().enumerate() {
            *slot = self.ring[(self.write_pos + i) % n] * self.window[i];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = 1.0 / n as f32;
        let range = self.max_decibels - self.min_decibels;
        for (k, bin) in fft.spectrum.iter().take(n / 2).enumerate() {
            let magnitude = bin.norm() * scale;
            let smoothed = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = smoothed;

            self.normalized[k] = if smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                ((db - self.min_decibels) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        Ok(BandLevels {
            bass: band_average(&self.normalized, &self.bands.bass),
            mid: band_average(&self.normalized, &self.bands.mid),
            high: band_average(&self.normalized, &self.bands.high),
            vol: band_average(&self.normalized, &(0..self.normalized.len())),
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("hop_size", &self.hop_size)
            .field("smoothing", &self.smoothing)
            .field("filled", &self.filled)
            .field("fft", &self.fft)
            .field("bands", &self.bands)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn band_average(bins: &[f32], range: &Range<usize>) -> f32 {
    let end = range.end.min(bins.len());
    let start = range.start.min(end);
    let slice = &bins[start..end];
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().sum::<f32>() / slice.len() as f32
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    let x = (2.0 * PI * index as f32) / len as f32;
    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}
