mod device;

pub use device::{list_input_devices, CaptureDevice, CaptureStream, CpalInput};

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{BandLevels, SpectrumAnalyzer},
    params::clamp_unit,
    AudioConfig, ChromaError, Result,
};

/// Upper bound on retries when a read races the capture callback.
const LOAD_ATTEMPTS: usize = 64;

/// Reduced audio energy handed to the renderer once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioEnvelope {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub vol: f32,
}

impl AudioEnvelope {
    pub const SILENT: Self = Self {
        bass: 0.0,
        mid: 0.0,
        high: 0.0,
        vol: 0.0,
    };

    pub fn new(bass: f32, mid: f32, high: f32, vol: f32) -> Self {
        Self {
            bass,
            mid,
            high,
            vol,
        }
        .clamped()
    }

    /// Returns a copy with every band clamped to [0, 1] (NaN becomes 0).
    pub fn clamped(self) -> Self {
        Self {
            bass: clamp_unit(self.bass),
            mid: clamp_unit(self.mid),
            high: clamp_unit(self.high),
            vol: clamp_unit(self.vol),
        }
    }

    /// Combined band energy, excluding the overall volume.
    pub fn total_energy(&self) -> f32 {
        self.bass + self.mid + self.high
    }
}

/// Soft noise gate: values below `threshold` are squashed to a tenth, values
/// above it ramp up linearly with `boost`, capped at 1.
pub fn gate(value: f32, threshold: f32, boost: f32) -> f32 {
    if value < threshold {
        value * 0.1
    } else {
        ((value - threshold) * boost + threshold).min(1.0)
    }
}

/// Result of a [`AudioAnalyzer::start_capture`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Started,
    /// A capture session was already running; nothing changed.
    AlreadyRunning,
    /// The device opened after `stop_capture` was requested; the stream was
    /// torn down again and capture stays stopped.
    Discarded,
}

/// Live audio service: owns the capture thread, the spectrum analyser that
/// runs inside the capture callback, and the lock-free cell `poll` reads.
///
/// `start_capture` and `stop_capture` take `&self` so a stop issued from
/// another thread can cancel a start that is still waiting on the device.
pub struct AudioAnalyzer {
    config: AudioConfig,
    device: Arc<dyn CaptureDevice>,
    shared: Arc<CaptureShared>,
    generation: AtomicU64,
    session: Mutex<Option<CaptureSession>>,
}

impl AudioAnalyzer {
    /// Creates an analyser bound to the system microphone.
    pub fn new(config: AudioConfig) -> Result<Self> {
        let device = CpalInput::new(config.device.clone());
        Self::with_device(config, Arc::new(device))
    }

    /// Creates an analyser reading from an explicit capture device.
    pub fn with_device(config: AudioConfig, device: Arc<dyn CaptureDevice>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            shared: Arc::new(CaptureShared::default()),
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Opens the capture device and starts feeding the analyser.
    ///
    /// Blocks until the device either opens or fails. A refusal surfaces as
    /// [`ChromaError::PermissionDenied`] and leaves capture stopped.
    pub fn start_capture(&self) -> Result<CaptureOutcome> {
        let generation = {
            let slot = self.session();
            if slot.is_some() {
                return Ok(CaptureOutcome::AlreadyRunning);
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        self.shared.levels.clear();
        self.shared.faulted.store(false, Ordering::Release);

        let sink = SampleSink::new(SpectrumAnalyzer::new(&self.config)?, Arc::clone(&self.shared));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        let device = Arc::clone(&self.device);
        let thread = thread::Builder::new()
            .name("chroma-capture".to_string())
            .spawn(move || run_capture(device.as_ref(), sink, ready_tx, stop_rx))?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(ChromaError::Capture(
                "capture thread exited before opening the device".to_string(),
            ))
        });
        if let Err(err) = opened {
            let _ = thread.join();
            tracing::warn!(%err, "audio capture failed to start");
            return Err(err);
        }

        let session = CaptureSession { stop_tx, thread };
        let mut slot = self.session();
        if self.generation.load(Ordering::SeqCst) != generation || slot.is_some() {
            drop(slot);
            session.shutdown();
            tracing::debug!("discarding capture granted after cancellation");
            return Ok(CaptureOutcome::Discarded);
        }

        self.shared.active.store(true, Ordering::Release);
        *slot = Some(session);
        tracing::info!(device = %self.device.name(), "audio capture started");
        Ok(CaptureOutcome::Started)
    }

    /// Stops capture. Idempotent; also cancels a pending `start_capture`.
    pub fn stop_capture(&self) {
        let session = {
            let mut slot = self.session();
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.shared.active.store(false, Ordering::Release);
            slot.take()
        };
        self.shared.levels.clear();

        if let Some(session) = session {
            session.shutdown();
            tracing::info!("audio capture stopped");
        }
    }

    /// Returns the gated envelope of the most recent analysis window.
    ///
    /// Never blocks. Returns [`AudioEnvelope::SILENT`] while capture is
    /// inactive, after a stream fault, or when the read keeps racing the
    /// capture callback.
    pub fn poll(&self) -> AudioEnvelope {
        if !self.shared.active.load(Ordering::Acquire) || self.shared.faulted.load(Ordering::Acquire)
        {
            return AudioEnvelope::SILENT;
        }

        let Some(levels) = self.shared.levels.load() else {
            tracing::trace!("spectrum read kept racing the capture callback");
            return AudioEnvelope::SILENT;
        };

        let gates = &self.config.gates;
        AudioEnvelope {
            bass: gates.bass.apply(levels.bass),
            mid: gates.mid.apply(levels.mid),
            high: gates.high.apply(levels.high),
            vol: levels.vol,
        }
        .clamped()
    }

    // The slot only holds a join handle and a channel, so a poisoned guard
    // is still consistent.
    fn session(&self) -> MutexGuard<'_, Option<CaptureSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AudioAnalyzer {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

impl std::fmt::Debug for AudioAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAnalyzer")
            .field("device", &self.device.name())
            .field("capturing", &self.is_capturing())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

fn run_capture(
    device: &dyn CaptureDevice,
    sink: SampleSink,
    ready: mpsc::Sender<Result<()>>,
    stop: mpsc::Receiver<()>,
) {
    let stream = match device.open(sink) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // Returns once the analyser drops the sender.
    let _ = stop.recv();
    drop(stream);
}

struct CaptureSession {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl CaptureSession {
    fn shutdown(self) {
        drop(self.stop_tx);
        if self.thread.join().is_err() {
            tracing::warn!("capture thread panicked during shutdown");
        }
    }
}

#[derive(Debug, Default)]
struct CaptureShared {
    levels: AtomicBandLevels,
    active: AtomicBool,
    faulted: AtomicBool,
}

/// Sequence-counted cell: a single writer publishes, readers retry while a
/// write is in progress.
#[derive(Debug, Default)]
struct AtomicBandLevels {
    seq: AtomicU64,
    bass: AtomicU32,
    mid: AtomicU32,
    high: AtomicU32,
    vol: AtomicU32,
}

impl AtomicBandLevels {
    fn store(&self, levels: BandLevels) {
        self.seq.fetch_add(1, Ordering::AcqRel); // odd => write in progress
        fence(Ordering::Release);
        self.bass.store(levels.bass.to_bits(), Ordering::Relaxed);
        self.mid.store(levels.mid.to_bits(), Ordering::Relaxed);
        self.high.store(levels.high.to_bits(), Ordering::Relaxed);
        self.vol.store(levels.vol.to_bits(), Ordering::Relaxed);
        self.seq.fetch_add(1, Ordering::Release); // even => stable
    }

    fn clear(&self) {
        self.store(BandLevels::default());
    }

    fn load(&self) -> Option<BandLevels> {
        for _ in 0..LOAD_ATTEMPTS {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let levels = BandLevels {
                bass: f32::from_bits(self.bass.load(Ordering::Relaxed)),
                mid: f32::from_bits(self.mid.load(Ordering::Relaxed)),
                high: f32::from_bits(self.high.load(Ordering::Relaxed)),
                vol: f32::from_bits(self.vol.load(Ordering::Relaxed)),
            };

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return Some(levels);
            }
        }
        None
    }
}

/// Receiving end of a capture stream. Devices push raw blocks; the sink runs
/// the spectrum analysis and publishes the band levels.
pub struct SampleSink {
    analyzer: SpectrumAnalyzer,
    shared: Arc<CaptureShared>,
    mono: Vec<f32>,
}

impl SampleSink {
    fn new(analyzer: SpectrumAnalyzer, shared: Arc<CaptureShared>) -> Self {
        Self {
            analyzer,
            shared,
            mono: Vec::new(),
        }
    }

    /// Feeds mono samples in [-1, 1].
    pub fn push_mono(&mut self, samples: &[f32]) {
        match self.analyzer.push_samples(samples) {
            Ok(Some(levels)) => self.shared.levels.store(levels),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "spectrum analysis failed");
                self.shared.faulted.store(true, Ordering::Release);
            }
        }
    }

    /// Feeds interleaved frames, averaging the channels down to mono.
    pub fn push_interleaved<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: Fn(T) -> f32,
    {
        let channels = channels.max(1);
        let mut mono = std::mem::take(&mut self.mono);
        mono.clear();
        mono.extend(data.chunks(channels).map(|frame| {
            let sum: f32 = frame.iter().map(|s| convert(*s)).sum();
            sum / frame.len() as f32
        }));
        self.push_mono(&mono);
        self.mono = mono;
    }

    /// Handle the device can use to report a broken stream.
    pub fn fault_flag(&self) -> FaultFlag {
        FaultFlag(Arc::clone(&self.shared))
    }
}

impl std::fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSink")
            .field("analyzer", &self.analyzer)
            .finish()
    }
}

/// Marks the running capture session as faulted; `poll` then reports silence.
#[derive(Debug, Clone)]
pub struct FaultFlag(Arc<CaptureShared>);

impl FaultFlag {
    pub fn raise(&self) {
        self.0.faulted.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    struct ToneDevice;

    impl CaptureDevice for ToneDevice {
        fn name(&self) -> String {
            "tone".to_string()
        }

        fn open(&self, mut sink: SampleSink) -> Result<Box<dyn CaptureStream>> {
            let tone: Vec<f32> = (0..4096)
                .map(|i| 0.5 * (2.0 * PI * 100.0 * i as f32 / 48_000.0).sin())
                .collect();
            sink.push_mono(&tone);
            Ok(Box::new(()))
        }
    }

    struct RefusingDevice;

    impl CaptureDevice for RefusingDevice {
        fn name(&self) -> String {
            "refusing".to_string()
        }

        fn open(&self, _sink: SampleSink) -> Result<Box<dyn CaptureStream>> {
            Err(ChromaError::PermissionDenied("user said no".to_string()))
        }
    }

    fn analyzer(device: impl CaptureDevice) -> AudioAnalyzer {
        AudioAnalyzer::with_device(AudioConfig::default(), Arc::new(device)).unwrap()
    }

    #[test]
    fn gate_matches_reference_values() {
        assert!((gate(0.05, 0.08, 2.5) - 0.005).abs() < 1e-6);
        assert_eq!(gate(0.5, 0.08, 2.5), 1.0);
        assert!((gate(0.1, 0.08, 2.0) - 0.12).abs() < 1e-6);
        assert_eq!(gate(0.08, 0.08, 2.5), 0.08);
    }

    #[test]
    fn gate_is_monotonic_and_bounded() {
        let gates = [(0.08, 2.5), (0.08, 2.0), (0.2, 1.5), (0.5, 0.0), (0.0, 10.0)];
        for (threshold, boost) in gates {
            let mut previous = f32::NEG_INFINITY;
            for step in 0..=1000 {
                let v = step as f32 / 1000.0;
                let out = gate(v, threshold, boost);
                assert!((0.0..=1.0).contains(&out), "gate({v}) = {out}");
                assert!(out >= previous, "gate not monotonic at {v}");
                previous = out;
            }
        }
    }

    #[test]
    fn poll_is_silent_until_capture_starts() {
        let audio = analyzer(ToneDevice);
        assert_eq!(audio.poll(), AudioEnvelope::SILENT);

        assert_eq!(audio.start_capture().unwrap(), CaptureOutcome::Started);
        let envelope = audio.poll();
        assert!(envelope.bass > 0.5, "bass should pass the gate: {envelope:?}");
        assert!(envelope.high < 0.05);

        assert_eq!(audio.start_capture().unwrap(), CaptureOutcome::AlreadyRunning);
    }

    #[test]
    fn stop_is_idempotent_and_silences_poll() {
        let audio = analyzer(ToneDevice);
        audio.start_capture().unwrap();
        audio.stop_capture();
        audio.stop_capture();

        assert!(!audio.is_capturing());
        assert_eq!(audio.poll(), AudioEnvelope::SILENT);
    }

    #[test]
    fn refusal_is_reported_and_leaves_capture_stopped() {
        let audio = analyzer(RefusingDevice);
        let err = audio.start_capture().unwrap_err();

        assert!(err.is_permission_denied());
        assert!(!audio.is_capturing());
        assert_eq!(audio.poll(), AudioEnvelope::SILENT);
    }

    #[test]
    fn fault_flag_silences_poll() {
        let audio = analyzer(ToneDevice);
        audio.start_capture().unwrap();
        FaultFlag(Arc::clone(&audio.shared)).raise();

        assert_eq!(audio.poll(), AudioEnvelope::SILENT);
    }

    #[test]
    fn interleaved_frames_are_averaged() {
        let shared = Arc::new(CaptureShared::default());
        let config = AudioConfig {
            fft_size: 32,
            hop_size: 32,
            ..AudioConfig::default()
        };
        let mut sink = SampleSink::new(SpectrumAnalyzer::new(&config).unwrap(), shared);
        sink.push_interleaved(&[1.0_f32, -1.0, 0.5, 0.5], 2, |s| s);

        assert_eq!(sink.mono, vec![0.0, 0.5]);
    }

    #[test]
    fn envelope_clamps_out_of_range_values() {
        let envelope = AudioEnvelope::new(1.5, -0.2, f32::NAN, 0.5);
        assert_eq!(envelope, AudioEnvelope::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(envelope.total_energy(), 1.0);
    }
}
