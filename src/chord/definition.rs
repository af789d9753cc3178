// Chord definitions, keys and instrument presets
// Turns a voicing into MIDI notes per string

use crate::error::EngineError;
use crate::midi::event::clamp_data;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Semitone offsets of the major scale
const MAJOR_SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Degree voicings are built upward from this octave (C3)
const DEGREE_BASE_NOTE: i32 = 48;

/// Note name with octave, MIDI 60 = "C4"
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Musical key, stored as the pitch class of its tonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Key {
    root: u8,
}

impl Key {
    pub fn from_pitch_class(pitch_class: u8) -> Self {
        Self {
            root: pitch_class % 12,
        }
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    /// Parse a key name, falling back to C on malformed input
    pub fn parse_or_default(text: &str) -> Self {
        text.parse().unwrap_or_else(|e: EngineError| {
            tracing::warn!(error = %e, "falling back to key of C");
            Self::default()
        })
    }
}

impl FromStr for Key {
    type Err = EngineError;

    /// "C", "F#", "Bb"; a trailing "m" or "maj" is accepted and ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidKey(s.to_string());
        let text = s.trim();
        let mut chars = text.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (shift, suffix) = if let Some(rest) = rest.strip_prefix('#') {
            (1, rest)
        } else if let Some(rest) = rest.strip_prefix('b') {
            (11, rest)
        } else {
            (0, rest)
        };
        if !matches!(suffix, "" | "m" | "maj") {
            return Err(invalid());
        }
        Ok(Self::from_pitch_class((base + shift) % 12))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NOTE_NAMES[self.root as usize])
    }
}

/// A scale degree of the configured key, 1-based
/// Degrees above 7 continue into the next octave (9 = the ninth)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleDegree {
    pub degree: u8,
    #[serde(default)]
    pub octave: i8,
    /// Chromatic alteration in semitones (-1 = flat, 1 = sharp)
    #[serde(default)]
    pub accidental: i8,
}

impl ScaleDegree {
    pub fn new(degree: u8) -> Self {
        Self {
            degree,
            octave: 0,
            accidental: 0,
        }
    }

    pub fn flat(degree: u8) -> Self {
        Self {
            accidental: -1,
            ..Self::new(degree)
        }
    }

    /// Semitones above the key's tonic
    pub fn semitones(&self) -> i32 {
        let index = self.degree.max(1) as i32 - 1;
        MAJOR_SCALE[(index % 7) as usize]
            + 12 * (index / 7)
            + 12 * self.octave as i32
            + self.accidental as i32
    }
}

/// How a chord is fingered, one entry per string (lowest first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordVoicing {
    /// Fret numbers; `None` = muted string
    Frets(Vec<Option<u8>>),
    /// Scale degrees of the key; `None` = muted string
    Degrees(Vec<Option<ScaleDegree>>),
}

/// A named chord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordDefinition {
    pub name: String,
    pub voicing: ChordVoicing,
}

impl ChordDefinition {
    pub fn frets(name: impl Into<String>, frets: &[Option<u8>]) -> Self {
        Self {
            name: name.into(),
            voicing: ChordVoicing::Frets(frets.to_vec()),
        }
    }

    pub fn degrees(name: impl Into<String>, degrees: &[Option<ScaleDegree>]) -> Self {
        Self {
            name: name.into(),
            voicing: ChordVoicing::Degrees(degrees.to_vec()),
        }
    }

    pub fn string_count(&self) -> usize {
        match &self.voicing {
            ChordVoicing::Frets(frets) => frets.len(),
            ChordVoicing::Degrees(degrees) => degrees.len(),
        }
    }

    /// MIDI note per string; `None` for muted strings
    ///
    /// Fret voicings need an open-string tuning and ignore the key; degree
    /// voicings follow the key. Capo and transposition shift both kinds.
    pub fn notes(&self, tuning: &[u8], key: Key, capo: u8, transpose: i8) -> Vec<Option<u8>> {
        let shift = capo as i32 + transpose as i32;
        match &self.voicing {
            ChordVoicing::Frets(frets) => frets
                .iter()
                .enumerate()
                .map(|(string, fret)| {
                    let open = *tuning.get(string)? as i32;
                    fret.map(|fret| clamp_data(open + fret as i32 + shift))
                })
                .collect(),
            ChordVoicing::Degrees(degrees) => degrees
                .iter()
                .map(|degree| {
                    degree.map(|degree| {
                        clamp_data(
                            DEGREE_BASE_NOTE + key.root() as i32 + degree.semitones() + shift,
                        )
                    })
                })
                .collect(),
        }
    }
}

/// Instrument the chords are voiced for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentPreset {
    pub name: String,
    /// Output MIDI channel, zero-based
    pub channel: u8,
    /// Open-string notes, lowest string first
    pub tuning: Vec<u8>,
}

impl InstrumentPreset {
    /// Standard-tuned six string guitar (E2 A2 D3 G3 B3 E4)
    pub fn guitar() -> Self {
        Self {
            name: "Guitar".to_string(),
            channel: 0,
            tuning: vec![40, 45, 50, 55, 59, 64],
        }
    }

    /// Standard-tuned ukulele (G4 C4 E4 A4)
    pub fn ukulele() -> Self {
        Self {
            name: "Ukulele".to_string(),
            channel: 0,
            tuning: vec![67, 60, 64, 69],
        }
    }
}

impl Default for InstrumentPreset {
    fn default() -> Self {
        Self::guitar()
    }
}
