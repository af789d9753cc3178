// Timeline - Musical time representation
// Tempo and time signature, and the durations derived from them

use crate::error::EngineError;
use std::fmt;
use std::str::FromStr;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per measure
    pub denominator: u8, // Beat unit (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature, `None` if malformed
    pub fn try_new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0 || !denominator.is_power_of_two() || denominator > 64 {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
        }
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self {
            numerator: 6,
            denominator: 8,
        }
    }

    /// Number of beats per measure
    pub fn beats_per_measure(&self) -> u32 {
        self.numerator as u32
    }

    /// Parse "n/d", falling back to 4/4 on malformed input
    pub fn parse_or_default(text: &str) -> Self {
        text.parse().unwrap_or_else(|e: EngineError| {
            tracing::warn!(error = %e, "falling back to 4/4");
            Self::default()
        })
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl FromStr for TimeSignature {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidTimeSignature(s.to_string());
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = num.trim().parse::<u8>().map_err(|_| invalid())?;
        let denominator = den.trim().parse::<u8>().map_err(|_| invalid())?;
        Self::try_new(numerator, denominator).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute), always within [40, 240]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 40.0;
    pub const MAX_BPM: f64 = 240.0;
    pub const DEFAULT_BPM: f64 = 120.0;

    /// Creates a new tempo, clamped into range
    /// Non-finite input falls back to the default tempo
    pub fn new(bpm: f64) -> Self {
        Self::sanitize(bpm, Self::default())
    }

    /// Clamp `bpm` into range; non-finite or non-positive values keep
    /// `last_good` instead
    pub fn sanitize(bpm: f64, last_good: Tempo) -> Self {
        if !bpm.is_finite() || bpm <= 0.0 {
            tracing::warn!(bpm, fallback = last_good.bpm, "invalid tempo");
            return last_good;
        }
        let clamped = bpm.clamp(Self::MIN_BPM, Self::MAX_BPM);
        if clamped != bpm {
            tracing::warn!(bpm, clamped, "tempo out of range");
        }
        Self { bpm: clamped }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one measure in seconds
    pub fn measure_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_seconds() * time_signature.beats_per_measure() as f64
    }

    /// Duration of one grid step for a pattern with `resolution` steps per beat
    /// (60/tempo)*4 / stepsPerWholeNote, with stepsPerWholeNote = resolution * 4
    pub fn step_duration_seconds(&self, resolution: u32) -> f64 {
        let steps_per_whole_note = (resolution.max(1) * 4) as f64;
        self.beat_duration_seconds() * 4.0 / steps_per_whole_note
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: Self::DEFAULT_BPM,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.numerator, 4);
        assert_eq!(ts.denominator, 4);
        assert_eq!(ts.beats_per_measure(), 4);
        assert_eq!(ts.to_string(), "4/4");
    }

    #[test]
    fn test_time_signature_parsing() {
        assert_eq!("3/4".parse::<TimeSignature>().unwrap(), TimeSignature::three_four());
        assert_eq!(" 6 / 8 ".parse::<TimeSignature>().unwrap(), TimeSignature::six_eight());
        assert!("4-4".parse::<TimeSignature>().is_err());
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("4/3".parse::<TimeSignature>().is_err());
        assert!("x/4".parse::<TimeSignature>().is_err());

        assert_eq!(TimeSignature::parse_or_default("garbage"), TimeSignature::four_four());
    }

    #[test]
    fn test_tempo() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);

        // 4/4 at 120 BPM = 2 seconds per measure
        assert_eq!(tempo.measure_duration_seconds(&TimeSignature::four_four()), 2.0);
        // 3/4 at 120 BPM = 1.5 seconds per measure
        assert_eq!(tempo.measure_duration_seconds(&TimeSignature::three_four()), 1.5);
    }

    #[test]
    fn test_tempo_clamping() {
        assert_eq!(Tempo::new(10.0).bpm(), 40.0);
        assert_eq!(Tempo::new(400.0).bpm(), 240.0);
        assert_eq!(Tempo::new(-5.0).bpm(), 120.0);
        assert_eq!(Tempo::new(f64::NAN).bpm(), 120.0);

        let last_good = Tempo::new(90.0);
        assert_eq!(Tempo::sanitize(0.0, last_good).bpm(), 90.0);
        assert_eq!(Tempo::sanitize(100.0, last_good).bpm(), 100.0);
    }

    #[test]
    fn test_step_duration() {
        let tempo = Tempo::new(120.0);
        // Sixteenth notes (4 steps per beat) at 120 BPM = 0.125s
        assert_eq!(tempo.step_duration_seconds(4), 0.125);
        // Eighth notes
        assert_eq!(tempo.step_duration_seconds(2), 0.25);
        // Resolution 0 treated as one step per beat
        assert_eq!(tempo.step_duration_seconds(0), 0.5);
    }
}
