use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};

use super::{FaultFlag, SampleSink};
use crate::{ChromaError, Result};

/// Keeps a running input stream alive until dropped.
pub trait CaptureStream {}

impl CaptureStream for cpal::Stream {}

impl CaptureStream for () {}

/// Source of live audio. Implementations open their input, feed every block
/// into the provided [`SampleSink`] from their own callback, and hand back a
/// guard that stops the input when dropped.
///
/// `open` runs on the dedicated capture thread and may block, e.g. while the
/// platform asks the user for microphone access.
pub trait CaptureDevice: Send + Sync + 'static {
    fn name(&self) -> String;

    fn open(&self, sink: SampleSink) -> Result<Box<dyn CaptureStream>>;
}

/// Microphone input through the default `cpal` host.
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device_query: Option<String>,
}

impl CpalInput {
    /// `device_query` is a case-insensitive substring of the device name;
    /// `None` selects the default input.
    pub fn new(device_query: Option<String>) -> Self {
        Self { device_query }
    }
}

impl CaptureDevice for CpalInput {
    fn name(&self) -> String {
        self.device_query
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn open(&self, sink: SampleSink) -> Result<Box<dyn CaptureStream>> {
        let host = cpal::default_host();
        let device = select_input_device(&host, self.device_query.as_deref())?;
        let supported = device.default_input_config().map_err(|err| match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                ChromaError::PermissionDenied("input device is not available".to_string())
            }
            other => ChromaError::Capture(format!("query input config: {other}")),
        })?;

        let channels = (supported.channels() as usize).max(1);
        let config: cpal::StreamConfig = supported.config();
        let fault = sink.fault_flag();
        let mut sink = sink;

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.push_interleaved(data, channels, |s| s)
                },
                stream_error(fault),
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    sink.push_interleaved(data, channels, |s| s.to_float_sample())
                },
                stream_error(fault),
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    sink.push_interleaved(data, channels, |s| s.to_float_sample())
                },
                stream_error(fault),
                None,
            ),
            other => {
                return Err(ChromaError::Capture(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                ChromaError::PermissionDenied("input device refused the stream".to_string())
            }
            other => ChromaError::Capture(format!("build input stream: {other}")),
        })?;

        stream
            .play()
            .map_err(|err| ChromaError::Capture(format!("start input stream: {err}")))?;

        tracing::debug!(
            sample_rate = config.sample_rate.0,
            channels,
            "opened input stream"
        );
        Ok(Box::new(stream))
    }
}

fn stream_error(fault: FaultFlag) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        tracing::warn!(%err, "audio stream error");
        fault.raise();
    }
}

fn select_input_device(host: &cpal::Host, device_query: Option<&str>) -> Result<cpal::Device> {
    let Some(want) = device_query.map(str::to_lowercase) else {
        return host
            .default_input_device()
            .ok_or_else(|| ChromaError::Capture("no default input device found".to_string()));
    };

    let devices = host
        .input_devices()
        .map_err(|err| ChromaError::Capture(format!("enumerate input devices: {err}")))?;

    for device in devices {
        let matches = device
            .name()
            .map(|name| name.to_lowercase().contains(&want))
            .unwrap_or(false);
        if matches {
            return Ok(device);
        }
    }

    Err(ChromaError::Capture(format!(
        "no input device matching `{want}`"
    )))
}

/// Names of every input device on the default host.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|err| ChromaError::Capture(format!("enumerate input devices: {err}")))?;

    Ok(devices
        .map(|device| device.name().unwrap_or_else(|_| "<unknown>".to_string()))
        .collect())
}
