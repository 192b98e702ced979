use std::{
    fmt,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{ChromaError, Result};

/// Clamps to [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Pattern-generation algorithm, serialized as its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum VisualMode {
    /// Noise-driven upward drift (flow-field advection).
    #[default]
    Vapor = 0,
    Melt,
    Liquefy,
    Smudge,
    Ripple,
    Lattice,
    Spiral,
    Turbo,
    Shard,
    Plasma,
    Echo,
    Vortex,
    Cyber,
    Noise,
    FlowField,
    Kaleido,
    Datamosh,
    Membrane,
    Reaction,
    Matrix,
    Neon,
    Circuit,
    Jitter,
    Void,
}

impl VisualMode {
    pub const COUNT: usize = 24;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Vapor,
        Self::Melt,
        Self::Liquefy,
        Self::Smudge,
        Self::Ripple,
        Self::Lattice,
        Self::Spiral,
        Self::Turbo,
        Self::Shard,
        Self::Plasma,
        Self::Echo,
        Self::Vortex,
        Self::Cyber,
        Self::Noise,
        Self::FlowField,
        Self::Kaleido,
        Self::Datamosh,
        Self::Membrane,
        Self::Reaction,
        Self::Matrix,
        Self::Neon,
        Self::Circuit,
        Self::Jitter,
        Self::Void,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short panel label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Vapor => "VAPOR",
            Self::Melt => "MELT",
            Self::Liquefy => "LIQFY",
            Self::Smudge => "SMDGE",
            Self::Ripple => "RIPPLE",
            Self::Lattice => "LATICE",
            Self::Spiral => "SPIRAL",
            Self::Turbo => "TURBO",
            Self::Shard => "SHARD",
            Self::Plasma => "PLASMA",
            Self::Echo => "ECHO",
            Self::Vortex => "VORTEX",
            Self::Cyber => "CYBER",
            Self::Noise => "NOISE",
            Self::FlowField => "FLOW",
            Self::Kaleido => "KALDO",
            Self::Datamosh => "DMOSH",
            Self::Membrane => "MBRNE",
            Self::Reaction => "REACT",
            Self::Matrix => "MTRX",
            Self::Neon => "NEON",
            Self::Circuit => "CIRC",
            Self::Jitter => "JITTR",
            Self::Void => "VOID",
        }
    }
}

impl TryFrom<u8> for VisualMode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("unknown visual mode {value}"))
    }
}

impl From<VisualMode> for u8 {
    fn from(mode: VisualMode) -> Self {
        mode as u8
    }
}

impl FromStr for VisualMode {
    type Err = ChromaError;

    /// Accepts the numeric index or the panel label, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Self::from_index(index)
                .ok_or_else(|| ChromaError::msg(format!("mode index {index} is out of range")));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ChromaError::msg(format!("unknown mode `{trimmed}`")))
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 8-bit RGB color stop, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |at: usize| u8::from_str_radix(&digits[at..at + 2], 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Channels scaled to [0, 1].
    pub fn to_vec3(self) -> Vec3 {
        let [r, g, b] = self.0;
        Vec3::new(r as f32, g as f32, b as f32) / 255.0
    }

    pub fn random(rng: &mut fastrand::Rng) -> Self {
        Self([rng.u8(..), rng.u8(..), rng.u8(..)])
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("`{value}` is not a #rrggbb color"))
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Control vector read by the renderer once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterState {
    pub mode: VisualMode,
    pub turbulence: f32,
    pub flow: f32,
    pub color_shift: f32,
    pub grain: f32,
    pub sharpness: f32,
    pub feedback: f32,
    pub color_a: Rgb,
    pub color_b: Rgb,
    pub motion: bool,
}

impl Default for ParameterState {
    fn default() -> Self {
        Self {
            mode: VisualMode::Vapor,
            turbulence: 0.0,
            flow: 0.1,
            color_shift: 0.5,
            grain: 0.15,
            sharpness: 0.5,
            feedback: 0.0,
            color_a: Rgb([0xff, 0x00, 0x55]),
            color_b: Rgb([0x00, 0xff, 0xff]),
            motion: true,
        }
    }
}

impl ParameterState {
    /// Returns a copy with every numeric field clamped to [0, 1].
    pub fn clamped(self) -> Self {
        Self {
            turbulence: clamp_unit(self.turbulence),
            flow: clamp_unit(self.flow),
            color_shift: clamp_unit(self.color_shift),
            grain: clamp_unit(self.grain),
            sharpness: clamp_unit(self.sharpness),
            feedback: clamp_unit(self.feedback),
            ..self
        }
    }

    /// A random patch tuned for static captures: motion off, feedback high
    /// enough to paint, grain kept low.
    pub fn randomized(rng: &mut fastrand::Rng) -> Self {
        Self {
            mode: VisualMode::ALL[rng.usize(..VisualMode::COUNT)],
            turbulence: rng.f32(),
            flow: rng.f32(),
            color_shift: rng.f32(),
            grain: rng.f32() * 0.4,
            sharpness: rng.f32(),
            feedback: rng.f32() * 0.5 + 0.3,
            color_a: Rgb::random(rng),
            color_b: Rgb::random(rng),
            motion: false,
        }
    }

    /// Serializes the state as a flat JSON object.
    pub fn to_snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Merges a snapshot over the defaults. Unknown fields are ignored and
    /// any parse failure silently yields the defaults.
    pub fn from_snapshot(raw: &str) -> Self {
        match serde_json::from_str::<ParameterPatch>(raw) {
            Ok(patch) => patch.apply(Self::default()).clamped(),
            Err(err) => {
                tracing::debug!(%err, "discarding unreadable parameter snapshot");
                Self::default()
            }
        }
    }
}

/// Every field optional so partial snapshots merge over the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParameterPatch {
    mode: Option<VisualMode>,
    turbulence: Option<f32>,
    flow: Option<f32>,
    color_shift: Option<f32>,
    grain: Option<f32>,
    sharpness: Option<f32>,
    feedback: Option<f32>,
    color_a: Option<Rgb>,
    color_b: Option<Rgb>,
    motion: Option<bool>,
}

impl ParameterPatch {
    fn apply(self, base: ParameterState) -> ParameterState {
        ParameterState {
            mode: self.mode.unwrap_or(base.mode),
            turbulence: self.turbulence.unwrap_or(base.turbulence),
            flow: self.flow.unwrap_or(base.flow),
            color_shift: self.color_shift.unwrap_or(base.color_shift),
            grain: self.grain.unwrap_or(base.grain),
            sharpness: self.sharpness.unwrap_or(base.sharpness),
            feedback: self.feedback.unwrap_or(base.feedback),
            color_a: self.color_a.unwrap_or(base.color_a),
            color_b: self.color_b.unwrap_or(base.color_b),
            motion: self.motion.unwrap_or(base.motion),
        }
    }
}

/// Shared slot the application replaces wholesale while the render loop
/// copies the latest snapshot once per tick.
#[derive(Debug, Clone, Default)]
pub struct SharedParameters {
    inner: Arc<RwLock<ParameterState>>,
}

impl SharedParameters {
    pub fn new(initial: ParameterState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.clamped())),
        }
    }

    pub fn replace(&self, state: ParameterState) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = state.clamped();
    }

    pub fn snapshot(&self) -> ParameterState {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_round_trip_through_index_and_label() {
        for (index, mode) in VisualMode::ALL.into_iter().enumerate() {
            assert_eq!(mode.index(), index);
            assert_eq!(VisualMode::from_index(index), Some(mode));
            assert_eq!(mode.label().to_lowercase().parse::<VisualMode>().unwrap(), mode);
        }
        assert_eq!("14".parse::<VisualMode>().unwrap(), VisualMode::FlowField);
        assert!("24".parse::<VisualMode>().is_err());
    }

    #[test]
    fn hex_colors_parse_and_format() {
        assert_eq!(Rgb::from_hex("#FF0055"), Some(Rgb([255, 0, 85])));
        assert_eq!(Rgb::from_hex("00ffff"), Some(Rgb([0, 255, 255])));
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
        assert_eq!(Rgb([255, 0, 85]).to_hex(), "#ff0055");
        assert_eq!(Rgb([255, 255, 255]).to_vec3(), Vec3::ONE);
    }

    #[test]
    fn snapshot_merges_over_defaults() {
        let state = ParameterState::from_snapshot(
            r##"{ "mode": 9, "feedback": 0.7, "colorA": "#102030", "extra": [1, 2, 3] }"##,
        );

        assert_eq!(state.mode, VisualMode::Plasma);
        assert_eq!(state.feedback, 0.7);
        assert_eq!(state.color_a, Rgb([0x10, 0x20, 0x30]));
        assert_eq!(state.flow, ParameterState::default().flow);
        assert!(state.motion);
    }

    #[test]
    fn malformed_snapshots_fall_back_to_defaults() {
        for raw in ["not json", r#"{ "mode": 99 }"#, r#"{ "colorB": "blue" }"#, "[]"] {
            assert_eq!(ParameterState::from_snapshot(raw), ParameterState::default(), "{raw}");
        }
    }

    #[test]
    fn snapshot_values_are_clamped() {
        let state = ParameterState::from_snapshot(r#"{ "turbulence": 4.0, "grain": -1.0 }"#);
        assert_eq!(state.turbulence, 1.0);
        assert_eq!(state.grain, 0.0);
    }

    #[test]
    fn snapshot_round_trips() {
        let mut rng = fastrand::Rng::with_seed(7);
        let state = ParameterState::randomized(&mut rng);
        let raw = state.to_snapshot().unwrap();

        assert!(raw.contains("\"colorShift\""));
        let restored = ParameterState::from_snapshot(&raw);
        assert_eq!(restored.mode, state.mode);
        assert_eq!((restored.color_a, restored.color_b), (state.color_a, state.color_b));
        assert_eq!(restored.motion, state.motion);
        assert!((restored.feedback - state.feedback).abs() < 1e-6);
        assert!((restored.turbulence - state.turbulence).abs() < 1e-6);
    }

    #[test]
    fn randomized_states_stay_in_their_ranges() {
        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..200 {
            let state = ParameterState::randomized(&mut rng);
            assert!(!state.motion);
            assert!((0.0..=0.4).contains(&state.grain));
            assert!((0.3..=0.8).contains(&state.feedback));
            assert_eq!(state, state.clamped());
        }
    }

    #[test]
    fn shared_parameters_hand_out_clamped_copies() {
        let shared = SharedParameters::default();
        let other = shared.clone();
        other.replace(ParameterState {
            feedback: 2.0,
            ..ParameterState::default()
        });

        assert_eq!(shared.snapshot().feedback, 1.0);
    }
}
