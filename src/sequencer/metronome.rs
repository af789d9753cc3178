// Metronome - Count-in click generator
// Clicks are ordinary note events on the percussion channel

use super::timeline::{Tempo, TimeSignature};

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of the measure (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

/// A click to be scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub time: f64,
    pub click_type: ClickType,
    pub note: u8,
    pub velocity: u8,
}

/// Count-in click generator
#[derive(Debug, Clone)]
pub struct Metronome {
    enabled: bool,
    /// GM hi wood block
    accent_note: u8,
    /// GM low wood block
    regular_note: u8,
    accent_velocity: u8,
    regular_velocity: u8,
}

impl Metronome {
    pub fn new() -> Self {
        Self {
            enabled: true,
            accent_note: 76,
            regular_note: 77,
            accent_velocity: 110,
            regular_velocity: 80,
        }
    }

    /// Enable/disable clicks
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Accent on the first beat of a measure
    pub fn click_type(beat_in_measure: u32) -> ClickType {
        if beat_in_measure == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    /// One click per beat of the measure starting at `measure_start`
    pub fn clicks_for_measure(
        &self,
        measure_start: f64,
        tempo: &Tempo,
        time_signature: &TimeSignature,
    ) -> Vec<Click> {
        if !self.enabled {
            return Vec::new();
        }

        let beat = tempo.beat_duration_seconds();
        (0..time_signature.beats_per_measure())
            .map(|index| {
                let click_type = Self::click_type(index);
                let (note, velocity) = match click_type {
                    ClickType::Accent => (self.accent_note, self.accent_velocity),
                    ClickType::Regular => (self.regular_note, self.regular_velocity),
                };
                Click {
                    time: measure_start + index as f64 * beat,
                    click_type,
                    note,
                    velocity,
                }
            })
            .collect()
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}
