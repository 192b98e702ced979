use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use image::RgbaImage;

use crate::{
    assets::ReferenceImage,
    audio::{AudioAnalyzer, AudioEnvelope},
    config::RenderConfig,
    params::SharedParameters,
    record::{ExportRequest, Snapshot},
    render::{present_black, FeedbackCompositor, PostProcessor},
    ParameterState, Result,
};

/// Simulated time that runs faster with bass and stops while motion is off.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    seconds: f64,
    time_scale: f64,
    bass_time_gain: f64,
    max_delta: f64,
}

impl SimulationClock {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            seconds: 0.0,
            time_scale: config.time_scale as f64,
            bass_time_gain: config.bass_time_gain as f64,
            max_delta: config.max_frame_delta.max(0.0) as f64,
        }
    }

    pub fn time(&self) -> f32 {
        self.seconds as f32
    }

    /// Advances by `delta` real seconds and returns the new simulated time.
    pub fn advance(&mut self, delta: f32, bass: f32, motion: bool) -> f32 {
        if motion && delta.is_finite() {
            let delta = (delta as f64).clamp(0.0, self.max_delta);
            let bass = bass.clamp(0.0, 1.0) as f64;
            self.seconds += delta * self.time_scale + bass * delta * self.bass_time_gain;
        }
        self.time()
    }
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Zero-based frame counter since the scheduler was created.
    pub index: u64,
    pub time: f32,
    pub paint_amount: f32,
    pub warming_up: bool,
    /// Read surface after the swap.
    pub read_index: usize,
    /// Clamped envelope the frame was rendered with.
    pub audio: AudioEnvelope,
}

/// Cooperative stop signal for [`FrameScheduler::run`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drives generate, composite, post-process and swap once per tick.
#[derive(Debug)]
pub struct FrameScheduler {
    config: RenderConfig,
    compositor: FeedbackCompositor,
    clock: SimulationClock,
    presented: RgbaImage,
    frames: u64,
}

impl FrameScheduler {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        config.validate()?;
        let compositor = FeedbackCompositor::new(config.width, config.height)?;
        let mut presented = RgbaImage::new(config.width, config.height);
        present_black(config.width, config.height, &mut presented);
        Ok(Self {
            config: config.clone(),
            compositor,
            clock: SimulationClock::new(config),
            presented,
            frames: 0,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn compositor(&self) -> &FeedbackCompositor {
        &self.compositor
    }

    /// Post-processed copy of the latest frame.
    pub fn presented(&self) -> &RgbaImage {
        &self.presented
    }

    pub fn time(&self) -> f32 {
        self.clock.time()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Forces the next two frames to black. Surfaces and time are kept.
    pub fn reset(&mut self) {
        tracing::debug!(frame = self.frames, "feedback reset");
        self.compositor.reset();
    }

    pub fn bind_reference(&mut self, image: ReferenceImage) {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "binding reference image"
        );
        self.compositor.bind_reference(Some(image));
    }

    pub fn clear_reference(&mut self) {
        self.compositor.bind_reference(None);
    }

    /// Runs one complete frame with `delta` of elapsed real time.
    pub fn tick(
        &mut self,
        delta: Duration,
        params: &ParameterState,
        audio: AudioEnvelope,
    ) -> FrameStats {
        let params = params.clamped();
        let audio = audio.clamped();
        let time = self
            .clock
            .advance(delta.as_secs_f32(), audio.bass, params.motion);

        let outcome = self.compositor.composite(&params, audio, time);
        self.compositor.swap();

        if outcome.warming_up {
            present_black(self.config.width, self.config.height, &mut self.presented);
        } else {
            PostProcessor::from_params(&params).apply(
                self.compositor.latest(),
                time,
                &mut self.presented,
            );
        }

        let stats = FrameStats {
            index: self.frames,
            time,
            paint_amount: outcome.paint_amount,
            warming_up: outcome.warming_up,
            read_index: self.compositor.read_index(),
            audio,
        };
        self.frames += 1;
        tracing::trace!(?stats, "frame");
        stats
    }

    /// Encodes the presented frame at the working resolution.
    pub fn snapshot(&self, request: ExportRequest) -> Result<Snapshot> {
        Snapshot::capture(&self.presented, request)
    }

    /// Ticks at the configured frame rate until `cancel` fires or `on_frame`
    /// breaks. Returns the number of frames rendered.
    pub fn run<F>(
        &mut self,
        analyzer: &AudioAnalyzer,
        params: &SharedParameters,
        cancel: &CancelToken,
        mut on_frame: F,
    ) -> u64
    where
        F: FnMut(&mut Self, FrameStats) -> ControlFlow<()>,
    {
        let budget = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
        let mut rendered = 0;
        let mut last = Instant::now();
        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            fps = self.config.target_fps,
            "render loop started"
        );

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let delta = started.duration_since(last);
            last = started;

            let stats = self.tick(delta, &params.snapshot(), analyzer.poll());
            rendered += 1;
            if on_frame(self, stats).is_break() {
                break;
            }

            if let Some(remaining) = budget.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        tracing::info!(frames = rendered, "render loop stopped");
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{CaptureDevice, CaptureStream, SampleSink},
        AudioConfig,
    };

    struct IdleDevice;

    impl CaptureDevice for IdleDevice {
        fn name(&self) -> String {
            "idle".to_string()
        }

        fn open(&self, _sink: SampleSink) -> Result<Box<dyn CaptureStream>> {
            Ok(Box::new(()))
        }
    }

    fn idle_analyzer() -> AudioAnalyzer {
        AudioAnalyzer::with_device(AudioConfig::default(), Arc::new(IdleDevice)).unwrap()
    }

    fn clock() -> SimulationClock {
        SimulationClock::new(&RenderConfig::default())
    }

    #[test]
    fn clock_runs_at_half_speed_in_silence() {
        let mut clock = clock();
        assert!((clock.advance(0.1, 0.0, true) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn bass_dilates_simulated_time() {
        let mut clock = clock();
        // 0.1 * 0.5 + 1.0 * 0.1 * 2.0
        assert!((clock.advance(0.1, 1.0, true) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn clock_freezes_without_motion_and_ignores_bad_deltas() {
        let mut clock = clock();
        clock.advance(0.1, 0.0, true);
        let frozen = clock.time();
        assert_eq!(clock.advance(0.1, 1.0, false), frozen);
        assert_eq!(clock.advance(-1.0, 0.0, true), frozen);
        assert_eq!(clock.advance(f32::NAN, 0.0, true), frozen);

        // long stalls are capped
        let before = clock.time();
        let after = clock.advance(30.0, 0.0, true);
        assert!((after - before - 0.05).abs() < 1e-6);
    }

    #[test]
    fn oversized_resolution_is_rejected_before_allocating() {
        let config: crate::AppConfig = serde_json::from_str(
            r#"{ "render": { "width": 4294967295, "height": 4294967295 } }"#,
        )
        .unwrap();
        assert!(FrameScheduler::new(&config.render).is_err());
    }

    #[test]
    fn stats_carry_the_rendered_envelope() {
        let mut scheduler = FrameScheduler::new(&RenderConfig::with_resolution(4, 4)).unwrap();
        let stats = scheduler.tick(
            Duration::from_millis(16),
            &ParameterState::default(),
            AudioEnvelope::new(0.4, 2.0, 0.1, 0.3),
        );
        assert_eq!(stats.audio, AudioEnvelope::new(0.4, 1.0, 0.1, 0.3));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let remote = token.clone();
        assert!(!token.is_cancelled());
        remote.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn run_stops_when_cancelled_up_front() {
        let analyzer = idle_analyzer();
        let mut scheduler = FrameScheduler::new(&RenderConfig::with_resolution(4, 4)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let frames = scheduler.run(&analyzer, &SharedParameters::default(), &cancel, |_, _| {
            ControlFlow::Continue(())
        });
        assert_eq!(frames, 0);
    }

    #[test]
    fn run_stops_when_the_callback_breaks() {
        let analyzer = idle_analyzer();
        let config = RenderConfig {
            target_fps: 1_000,
            ..RenderConfig::with_resolution(4, 4)
        };
        let mut scheduler = FrameScheduler::new(&config).unwrap();

        let frames = scheduler.run(
            &analyzer,
            &SharedParameters::default(),
            &CancelToken::new(),
            |scheduler, stats| {
                if stats.index == 4 {
                    assert_eq!(scheduler.frames(), 5);
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        assert_eq!(frames, 5);
    }
}
