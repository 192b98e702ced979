use std::{
    fmt,
    io::Cursor,
    path::PathBuf,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{config::ExportConfig, ChromaError, Result};

/// Export presets offered to the user.
///
/// Only the label differs between presets: every snapshot is taken at the
/// working resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "4K")]
    UltraHd,
    #[serde(rename = "1080p")]
    Hd,
    #[serde(rename = "Square")]
    Square,
    #[serde(rename = "Mobile")]
    MobilePortrait,
}

impl ExportFormat {
    pub const ALL: [Self; 4] = [Self::UltraHd, Self::Hd, Self::Square, Self::MobilePortrait];

    pub fn label(self) -> &'static str {
        match self {
            Self::UltraHd => "4K",
            Self::Hd => "1080p",
            Self::Square => "Square",
            Self::MobilePortrait => "Mobile",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExportFormat {
    type Err = ChromaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|format| {
                format.label().eq_ignore_ascii_case(wanted)
                    || format!("{format:?}").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                ChromaError::msg(format!(
                    "unknown export format `{wanted}` (expected 4K, 1080p, Square or Mobile)"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
}

impl From<ExportFormat> for ExportRequest {
    fn from(format: ExportFormat) -> Self {
        Self { format }
    }
}

/// An encoded copy of the presented frame.
#[derive(Clone)]
pub struct Snapshot {
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    /// PNG-encoded RGBA pixels.
    pub png: Vec<u8>,
    pub taken_at: SystemTime,
}

impl Snapshot {
    pub fn capture(frame: &RgbaImage, request: ExportRequest) -> Result<Self> {
        Ok(Self {
            format: request.format,
            width: frame.width(),
            height: frame.height(),
            png: encode_png(frame)?,
            taken_at: SystemTime::now(),
        })
    }

    /// Milliseconds since the Unix epoch at capture time.
    pub fn timestamp_millis(&self) -> u128 {
        self.taken_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// `<prefix>_<label>_<millis>.png`
pub fn export_file_name(prefix: &str, format: ExportFormat, millis: u128) -> String {
    format!("{prefix}_{}_{millis}.png", format.label())
}

/// Writes snapshots into the configured output directory.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn file_name(&self, snapshot: &Snapshot) -> String {
        export_file_name(
            &self.config.file_prefix,
            snapshot.format,
            snapshot.timestamp_millis(),
        )
    }

    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join(self.file_name(snapshot));
        std::fs::write(&path, &snapshot.png)?;
        tracing::info!(
            path = %path.display(),
            format = %snapshot.format,
            width = snapshot.width,
            height = snapshot.height,
            "exported snapshot"
        );
        Ok(path)
    }
}
