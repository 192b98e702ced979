use std::{ops::Range, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ChromaError, Result};

/// Largest accepted surface edge, in pixels.
pub const MAX_SURFACE_EDGE: u32 = 8192;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections and fields keep
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.audio.validate()
    }
}

/// Settings for the accumulation surfaces and the frame clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Working resolution of both accumulation surfaces.
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Simulated seconds per real second at silence.
    pub time_scale: f32,
    /// Extra simulated seconds per real second at full bass.
    pub bass_time_gain: f32,
    /// Upper bound for a single real-time step, in seconds.
    pub max_frame_delta: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            target_fps: 60,
            time_scale: 0.5,
            bass_time_gain: 2.0,
            max_frame_delta: 0.1,
        }
    }
}

impl RenderConfig {
    /// Convenience constructor used by tests and offline renders.
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ChromaError::InvalidInput(
                "render resolution must be non-zero",
            ));
        }
        if self.width > MAX_SURFACE_EDGE || self.height > MAX_SURFACE_EDGE {
            return Err(ChromaError::InvalidInput(
                "render resolution exceeds 8192 pixels per edge",
            ));
        }
        if self.target_fps == 0 {
            return Err(ChromaError::InvalidInput("target fps must be non-zero"));
        }
        let non_negative = |v: f32| v.is_finite() && v >= 0.0;
        if !non_negative(self.time_scale) || !non_negative(self.bass_time_gain) {
            return Err(ChromaError::InvalidInput(
                "time scale and bass time gain must be finite and non-negative",
            ));
        }
        if !(self.max_frame_delta.is_finite() && self.max_frame_delta > 0.0) {
            return Err(ChromaError::InvalidInput(
                "max frame delta must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub fft_size: usize,
    /// Number of new samples between two analysed windows.
    pub hop_size: usize,
    /// Weight of the previous spectrum when smoothing, in [0, 1).
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub bands: BandLayout,
    pub gates: GateSettings,
    /// Case-insensitive substring used to pick an input device.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 1024,
            smoothing: 0.6,
            min_decibels: -100.0,
            max_decibels: -30.0,
            bands: BandLayout::default(),
            gates: GateSettings::default(),
            device: None,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(ChromaError::InvalidInput(
                "fft size must be a power of two of at least 32",
            ));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(ChromaError::InvalidInput(
                "hop size must be between 1 and the fft size",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ChromaError::InvalidInput("smoothing must lie in [0, 1)"));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(ChromaError::InvalidInput(
                "min decibels must be below max decibels",
            ));
        }
        self.bands.validate()
    }
}

/// Half-open spectrum bin ranges averaged into each band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandLayout {
    pub bass: Range<usize>,
    pub mid: Range<usize>,
    pub high: Range<usize>,
}

impl Default for BandLayout {
    fn default() -> Self {
        Self {
            bass: 1..8,
            mid: 12..60,
            high: 61..255,
        }
    }
}

impl BandLayout {
    /// Bands must be non-empty and ordered bass, mid, high without overlap.
    pub fn validate(&self) -> Result<()> {
        if self.bass.is_empty() || self.mid.is_empty() || self.high.is_empty() {
            return Err(ChromaError::InvalidInput("band ranges must be non-empty"));
        }
        if self.bass.end > self.mid.start || self.mid.end > self.high.start {
            return Err(ChromaError::InvalidInput(
                "band ranges must be ordered and disjoint",
            ));
        }
        Ok(())
    }
}

/// Threshold and boost of one soft noise gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandGate {
    pub threshold: f32,
    pub boost: f32,
}

impl BandGate {
    pub const fn new(threshold: f32, boost: f32) -> Self {
        Self { threshold, boost }
    }

    pub fn apply(&self, value: f32) -> f32 {
        crate::audio::gate(value, self.threshold, self.boost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub bass: BandGate,
    pub mid: BandGate,
    pub high: BandGate,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            bass: BandGate::new(0.08, 2.5),
            mid: BandGate::new(0.08, 2.0),
            high: BandGate::new(0.2, 1.5),
        }
    }
}

/// Where and under which name snapshots are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "CHROMA_SYS_EXPORT".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "render": { "width": 256 }, "audio": { "smoothing": 0.5 } }"#)
                .unwrap();

        assert_eq!(config.render.width, 256);
        assert_eq!(config.render.height, 1024);
        assert_eq!(config.audio.smoothing, 0.5);
        assert_eq!(config.audio.bands, BandLayout::default());
        assert_eq!(config.export.file_prefix, "CHROMA_SYS_EXPORT");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_settings() {
        let mut config = AppConfig::default();
        config.render.width = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.fft_size = 1000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.hop_size = 4096;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.min_decibels = -10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_resolution() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "render": { "width": 4294967295, "height": 4294967295 } }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.render.width = MAX_SURFACE_EDGE;
        config.render.height = MAX_SURFACE_EDGE;
        assert!(config.validate().is_ok());
        config.render.height = MAX_SURFACE_EDGE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_broken_clock_settings() {
        for (scale, gain, delta) in [
            (f32::NAN, 2.0, 0.1),
            (-0.5, 2.0, 0.1),
            (0.5, f32::INFINITY, 0.1),
            (0.5, -1.0, 0.1),
            (0.5, 2.0, 0.0),
            (0.5, 2.0, f32::NAN),
        ] {
            let render = RenderConfig {
                time_scale: scale,
                bass_time_gain: gain,
                max_frame_delta: delta,
                ..RenderConfig::default()
            };
            assert!(render.validate().is_err(), "{scale} {gain} {delta}");
        }
    }

    #[test]
    fn band_ranges_must_be_ordered_and_disjoint() {
        assert!(BandLayout::default().validate().is_ok());

        let overlapping = BandLayout {
            bass: 1..20,
            mid: 12..60,
            high: 61..255,
        };
        assert!(overlapping.validate().is_err());

        let reversed = BandLayout {
            bass: 100..120,
            mid: 12..60,
            high: 61..255,
        };
        assert!(reversed.validate().is_err());

        let empty = BandLayout {
            bass: 1..8,
            mid: 30..30,
            high: 61..255,
        };
        assert!(empty.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.bands = overlapping;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_gates_match_recommended_tuning() {
        let gates = GateSettings::default();
        assert_eq!(gates.bass, BandGate::new(0.08, 2.5));
        assert_eq!(gates.mid, BandGate::new(0.08, 2.0));
        assert_eq!(gates.high, BandGate::new(0.2, 1.5));
    }
}
