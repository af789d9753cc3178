// Performance configuration
// Loaded from JSON or RON; `resolve` turns it into clamped runtime values

use crate::chord::articulation::{ArticulationContext, Dynamics};
use crate::chord::definition::{InstrumentPreset, Key};
use crate::error::{EngineError, EngineResult};
use crate::midi::event::CHANNEL_MAX;
use crate::sequencer::quantize::QuantizationMode;
use crate::sequencer::timeline::{Tempo, TimeSignature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const MAX_CAPO: u8 = 12;
pub const MAX_TRANSPOSE: i8 = 24;
pub const HEARTBEAT_RANGE_MS: (u64, u64) = (1, 100);

/// User-facing settings, every field optional in the serialized form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub tempo_bpm: f64,
    /// "n/d", e.g. "3/4"
    pub time_signature: String,
    /// Key name, e.g. "G" or "Bb"
    pub key: String,
    pub quantization: QuantizationMode,
    pub capo: u8,
    /// Semitones, may be negative
    pub transpose: i8,
    pub velocity: u8,
    /// Seconds a chord string rings
    pub note_duration: f64,
    /// Zero-based MIDI channel for the loop and count-in
    pub percussion_channel: u8,
    /// Click through the count-in measure
    pub count_in: bool,
    pub heartbeat_interval_ms: u64,
    pub preset: InstrumentPreset,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: Tempo::DEFAULT_BPM,
            time_signature: "4/4".to_string(),
            key: "C".to_string(),
            quantization: QuantizationMode::None,
            capo: 0,
            transpose: 0,
            velocity: 100,
            note_duration: 1.0,
            percussion_channel: 9,
            count_in: true,
            heartbeat_interval_ms: 10,
            preset: InstrumentPreset::default(),
        }
    }
}

/// Sanitized configuration used by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub key: Key,
    pub quantization: QuantizationMode,
    pub capo: u8,
    pub transpose: i8,
    pub dynamics: Dynamics,
    pub percussion_channel: u8,
    pub count_in: bool,
    pub heartbeat_interval: Duration,
    pub preset: InstrumentPreset,
}

impl ResolvedConfig {
    pub fn context(&self) -> ArticulationContext {
        ArticulationContext {
            tempo: self.tempo,
            key: self.key,
            capo: self.capo,
            transpose: self.transpose,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        PerformanceConfig::default().resolve()
    }
}

impl PerformanceConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_ron_str(ron: &str) -> EngineResult<Self> {
        Ok(ron::from_str(ron)?)
    }

    /// Load a `.json` or `.ron` file
    pub fn from_path(path: &Path) -> EngineResult<Self> {
        read_document(path)
    }

    pub fn to_json_string(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp every value into range; problems are logged, never fatal
    pub fn resolve(&self) -> ResolvedConfig {
        let tempo = Tempo::new(self.tempo_bpm);
        let time_signature = TimeSignature::parse_or_default(&self.time_signature);
        let key = Key::parse_or_default(&self.key);

        let capo = clamp_logged("capo", self.capo, 0, MAX_CAPO);
        let transpose = clamp_logged("transpose", self.transpose, -MAX_TRANSPOSE, MAX_TRANSPOSE);
        let velocity = clamp_logged("velocity", self.velocity, 1, 127);
        let note_duration = if self.note_duration.is_finite() && self.note_duration > 0.0 {
            self.note_duration
        } else {
            warn!(value = self.note_duration, "invalid note duration, using default");
            Dynamics::default().note_duration
        };
        let percussion_channel =
            clamp_logged("percussion_channel", self.percussion_channel, 0, CHANNEL_MAX);
        let heartbeat_ms = clamp_logged(
            "heartbeat_interval_ms",
            self.heartbeat_interval_ms,
            HEARTBEAT_RANGE_MS.0,
            HEARTBEAT_RANGE_MS.1,
        );

        let mut preset = self.preset.clone();
        preset.channel = clamp_logged("preset.channel", preset.channel, 0, CHANNEL_MAX);
        if preset.tuning.is_empty() {
            warn!(preset = %preset.name, "preset has no strings, using guitar tuning");
            preset.tuning = InstrumentPreset::guitar().tuning;
        }

        ResolvedConfig {
            tempo,
            time_signature,
            key,
            quantization: self.quantization,
            capo,
            transpose,
            dynamics: Dynamics {
                velocity,
                note_duration,
            },
            percussion_channel,
            count_in: self.count_in,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            preset,
        }
    }
}

/// Read a JSON or RON document, picking the format from the extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> EngineResult<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_str(&text)?),
        Some("ron") => Ok(ron::from_str(&text)?),
        _ => Err(EngineError::Config(format!(
            "{}: expected a .json or .ron file",
            path.display()
        ))),
    }
}

fn clamp_logged<T>(field: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        warn!(field, %value, %clamped, "config value out of range");
    }
    clamped
}
