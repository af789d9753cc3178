// Progress snapshots for the UI

use crate::sequencer::transport::ClockPhase;

/// Where playback is, as seen by a UI
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub phase: ClockPhase,
    /// -1 during the count-in
    pub measure: i64,
    /// Negative during the count-in
    pub beat: i64,
    pub beat_fraction: f64,
    /// Progress through the current loop iteration, 0.0..=1.0
    pub pattern_progress: f64,
    /// Progress through the last played chord, 0.0..=1.0
    pub chord_progress: f64,
    pub last_chord: Option<String>,
    pub active_pattern: Option<String>,
    pub queued_pattern: Option<String>,
    pub tempo_bpm: f64,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            phase: ClockPhase::Stopped,
            measure: -1,
            beat: -4,
            beat_fraction: 0.0,
            pattern_progress: 0.0,
            chord_progress: 0.0,
            last_chord: None,
            active_pattern: None,
            queued_pattern: None,
            tempo_bpm: 120.0,
        }
    }
}

impl ProgressSnapshot {
    pub fn is_playing(&self) -> bool {
        self.phase.is_active()
    }

    /// Short position text; measures and beats are one-based while running
    pub fn label(&self) -> String {
        match self.phase {
            ClockPhase::Stopped => "Stopped".to_string(),
            ClockPhase::CountIn => format!("Count-in {}", self.beat),
            ClockPhase::Running => format!("{}.{}", self.measure + 1, self.beat + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let mut snapshot = ProgressSnapshot::default();
        assert_eq!(snapshot.label(), "Stopped");
        assert!(!snapshot.is_playing());

        snapshot.phase = ClockPhase::CountIn;
        snapshot.beat = -3;
        assert_eq!(snapshot.label(), "Count-in -3");

        snapshot.phase = ClockPhase::Running;
        snapshot.measure = 0;
        snapshot.beat = 2;
        assert_eq!(snapshot.label(), "1.3");
        assert!(snapshot.is_playing());
    }
}
