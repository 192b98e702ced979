use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chroma_synth_core::{
    audio::list_input_devices, AppConfig, AudioAnalyzer, AudioEnvelope, CancelToken,
    CaptureOutcome, ExportFormat, Exporter, FrameScheduler, ParameterState, ReferenceImage,
    SharedParameters,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> chroma_synth_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Live {
            params,
            image,
            seconds,
            export,
            device,
        } => run_live(config, params.as_deref(), image.as_deref(), seconds, export, device),
        Commands::Render {
            params,
            image,
            frames,
            fps,
            export,
            synthetic,
        } => run_render(
            config,
            params.as_deref(),
            image.as_deref(),
            frames,
            fps,
            export,
            synthetic,
        ),
        Commands::Params { random, seed } => print_params(random, seed),
        Commands::Devices => print_devices(),
    }
}

fn run_live(
    mut config: AppConfig,
    params: Option<&Path>,
    image: Option<&Path>,
    seconds: Option<f32>,
    export: Option<ExportFormat>,
    device: Option<String>,
) -> chroma_synth_core::Result<()> {
    if device.is_some() {
        config.audio.device = device;
    }
    tracing::info!(device = ?config.audio.device, ?seconds, "starting live mode");

    let shared = SharedParameters::new(load_params(params)?);
    let mut scheduler = build_scheduler(&config, image)?;
    let analyzer = AudioAnalyzer::new(config.audio.clone())?;

    match analyzer.start_capture() {
        Ok(CaptureOutcome::Started) | Ok(CaptureOutcome::AlreadyRunning) => {}
        Ok(CaptureOutcome::Discarded) => {
            tracing::warn!("capture request was cancelled before it resolved");
        }
        Err(err) if err.is_permission_denied() => {
            tracing::error!(%err, "microphone access was refused");
            return Err(err);
        }
        Err(err) => return Err(err),
    }

    let cancel = CancelToken::new();
    let started = Instant::now();
    let limit = seconds.map(Duration::from_secs_f32);
    let report_every = u64::from(config.render.target_fps.max(1));

    scheduler.run(&analyzer, &shared, &cancel, |scheduler, stats| {
        if stats.index % report_every == 0 {
            tracing::info!(
                frame = stats.index,
                time = stats.time,
                paint = stats.paint_amount,
                audio = ?stats.audio,
                "live"
            );
        }
        match limit {
            Some(limit) if started.elapsed() >= limit => {
                tracing::debug!(frames = scheduler.frames(), "live duration reached");
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    });
    analyzer.stop_capture();

    if let Some(format) = export {
        export_frame(&config, &scheduler, format)?;
    }
    Ok(())
}

fn run_render(
    config: AppConfig,
    params: Option<&Path>,
    image: Option<&Path>,
    frames: u64,
    fps: Option<u32>,
    export: ExportFormat,
    synthetic: bool,
) -> chroma_synth_core::Result<()> {
    let params = load_params(params)?;
    let mut scheduler = build_scheduler(&config, image)?;
    let fps = fps.unwrap_or(config.render.target_fps).max(1);
    let delta = Duration::from_secs_f64(1.0 / f64::from(fps));
    tracing::info!(frames, fps, synthetic, mode = %params.mode, "rendering offline");

    for step in 0..frames {
        let audio = if synthetic {
            synthetic_envelope(step as f32 / fps as f32)
        } else {
            AudioEnvelope::SILENT
        };
        let stats = scheduler.tick(delta, &params, audio);
        tracing::trace!(?stats, "rendered");
    }

    export_frame(&config, &scheduler, export)
}

fn print_params(random: bool, seed: Option<u64>) -> chroma_synth_core::Result<()> {
    let state = if random {
        let mut rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        ParameterState::randomized(&mut rng)
    } else {
        ParameterState::default()
    };
    println!("{}", state.to_snapshot()?);
    Ok(())
}

fn print_devices() -> chroma_synth_core::Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        tracing::warn!("no audio input devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

fn load_params(path: Option<&Path>) -> chroma_synth_core::Result<ParameterState> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(ParameterState::from_snapshot(&raw))
        }
        None => Ok(ParameterState::default()),
    }
}

fn build_scheduler(
    config: &AppConfig,
    image: Option<&Path>,
) -> chroma_synth_core::Result<FrameScheduler> {
    let mut scheduler = FrameScheduler::new(&config.render)?;
    if let Some(path) = image {
        scheduler.bind_reference(ReferenceImage::open(path)?);
    }
    Ok(scheduler)
}

fn export_frame(
    config: &AppConfig,
    scheduler: &FrameScheduler,
    format: ExportFormat,
) -> chroma_synth_core::Result<()> {
    let snapshot = scheduler.snapshot(format.into())?;
    let path = Exporter::new(config.export.clone()).write(&snapshot)?;
    println!("{}", path.display());
    Ok(())
}

/// Slow overlapping sines standing in for a live envelope.
fn synthetic_envelope(t: f32) -> AudioEnvelope {
    let bass = ((t * 1.9).sin() * 0.5 + 0.5).powf(1.15);
    let mid = ((t * 2.8 + 0.7).sin() * 0.5 + 0.5).powf(1.08);
    let high = ((t * 5.2 + 1.3).sin() * 0.5 + 0.5).powf(1.02);
    AudioEnvelope::new(bass, mid, high, (bass + mid + high) / 3.0)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive feedback image synthesizer", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render continuously from the microphone.
    Live {
        /// Parameter snapshot (JSON) to start from.
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Reference image shown behind the pattern.
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Stop after this many seconds instead of running until killed.
        #[arg(short, long)]
        seconds: Option<f32>,
        /// Export the last frame in this format when stopping.
        #[arg(short, long)]
        export: Option<ExportFormat>,
        /// Substring of the input device name to use.
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Render a fixed number of frames without audio hardware, then export.
    Render {
        #[arg(short, long)]
        params: Option<PathBuf>,
        #[arg(short, long)]
        image: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 240)]
        frames: u64,
        /// Simulated frame rate; defaults to the configured target.
        #[arg(long)]
        fps: Option<u32>,
        #[arg(short, long, default_value = "4K")]
        export: ExportFormat,
        /// Drive the pipeline with a synthetic envelope instead of silence.
        #[arg(long)]
        synthetic: bool,
    },
    /// Print a parameter snapshot as JSON.
    Params {
        /// Randomize instead of printing the defaults.
        #[arg(short, long)]
        random: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List audio input devices.
    Devices,
}
