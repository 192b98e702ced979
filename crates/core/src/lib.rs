//! Core library for the Chroma Synth feedback visualiser.
//!
//! Audio energy from a live input is reduced to a few band levels, a
//! selectable per-pixel pattern turns those levels into displacement and
//! colour, and a pair of accumulation surfaces blends each new frame into the
//! decayed previous one. Each module owns one stage of that pipeline.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod params;
pub mod pattern;
pub mod record;
pub mod render;
pub mod surface;
pub mod timeline;

pub use analysis::{BandLevels, SpectrumAnalyzer};
pub use assets::ReferenceImage;
pub use audio::{gate, AudioAnalyzer, AudioEnvelope, CaptureDevice, CaptureOutcome, CpalInput};
pub use config::{AppConfig, AudioConfig, ExportConfig, RenderConfig};
pub use error::{ChromaError, Result};
pub use params::{ParameterState, Rgb, SharedParameters, VisualMode};
pub use pattern::{PatternContext, PatternResult};
pub use record::{ExportFormat, ExportRequest, Exporter, Snapshot};
pub use render::{paint_amount, FeedbackCompositor, PostProcessor};
pub use surface::{DoubleBuffer, FrameBuffer};
pub use timeline::{CancelToken, FrameScheduler, FrameStats, SimulationClock};
