// Transport - Virtual clock for a playback session
// Measure/beat positions are derived from elapsed wall-clock time, never accumulated

use super::timeline::{Tempo, TimeSignature};
use tracing::{info, warn};

/// Tolerance absorbing float error when a time lands exactly on a beat
const BEAT_EPSILON: f64 = 1e-9;

/// Missed-tick gaps longer than this are collapsed to the latest measure
const MAX_CATCH_UP_MEASURES: i64 = 4;

/// Transport phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPhase {
    #[default]
    Stopped,
    /// One lead-in measure with negative beat numbers
    CountIn,
    Running,
}

impl ClockPhase {
    /// Count-in and running both count as an active clock
    pub fn is_active(&self) -> bool {
        !matches!(self, ClockPhase::Stopped)
    }
}

/// Clock state for one playback session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub start_time: f64,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub is_running: bool,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            is_running: false,
        }
    }
}

/// Read-only view of the clock used for quantization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub start_time: f64,
    pub is_running: bool,
    pub tempo_bpm: f64,
    pub beats_per_measure: u32,
}

impl ClockSnapshot {
    /// Snapshot of a clock that is not running
    pub fn stopped() -> Self {
        Self {
            start_time: 0.0,
            is_running: false,
            tempo_bpm: Tempo::DEFAULT_BPM,
            beats_per_measure: 4,
        }
    }

    pub fn measure_duration(&self) -> f64 {
        self.beats_per_measure.max(1) as f64 * 60.0 / self.tempo_bpm
    }
}

/// Musical position at an instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockPosition {
    pub phase: ClockPhase,
    /// -1 during count-in, then 0, 1, 2...
    pub measure: i64,
    /// -beatsPerMeasure..=-1 during count-in, then 0..beatsPerMeasure
    pub beat: i64,
    /// Progress within the current beat, 0.0..1.0
    pub beat_fraction: f64,
}

impl ClockPosition {
    /// Position reported while stopped: the start of the count-in
    pub fn initial(time_signature: &TimeSignature) -> Self {
        Self {
            phase: ClockPhase::Stopped,
            measure: -1,
            beat: -(time_signature.beats_per_measure() as i64),
            beat_fraction: 0.0,
        }
    }

    /// Progress within the current measure, 0.0..1.0
    pub fn measure_fraction(&self, time_signature: &TimeSignature) -> f64 {
        let bpm = time_signature.beats_per_measure() as i64;
        let beat_in_measure = self.beat.rem_euclid(bpm);
        (beat_in_measure as f64 + self.beat_fraction) / bpm as f64
    }
}

/// Boundary crossings reported by `TransportClock::poll`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    MeasureStart { measure: i64, time: f64 },
    Beat { measure: i64, beat: i64, time: f64 },
}

/// Transport clock
/// Stopped -> CountIn -> Running -> Stopped
#[derive(Debug, Clone, Default)]
pub struct TransportClock {
    state: ClockState,
    /// Absolute beat index last reported by poll (count-in beats are negative)
    last_beat_index: Option<i64>,
}

impl TransportClock {
    pub fn new(tempo: Tempo, time_signature: TimeSignature) -> Self {
        Self {
            state: ClockState {
                tempo,
                time_signature,
                ..ClockState::default()
            },
            last_beat_index: None,
        }
    }

    /// Start a new session at `now`; restarts if already running
    pub fn start(&mut self, now: f64, tempo: Tempo, time_signature: TimeSignature) {
        self.state = ClockState {
            start_time: now,
            tempo,
            time_signature,
            is_running: true,
        };
        self.last_beat_index = None;
        info!(%tempo, %time_signature, start = now, "transport started (count-in)");
    }

    /// Stop from any state; derived counters go back to the count-in start
    pub fn stop(&mut self) {
        if self.state.is_running {
            info!("transport stopped");
        }
        self.state.is_running = false;
        self.last_beat_index = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn tempo(&self) -> Tempo {
        self.state.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.state.time_signature
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            start_time: self.state.start_time,
            is_running: self.state.is_running,
            tempo_bpm: self.state.tempo.bpm(),
            beats_per_measure: self.beats_per_measure() as u32,
        }
    }

    pub fn beat_duration(&self) -> f64 {
        self.state.tempo.beat_duration_seconds()
    }

    pub fn measure_duration(&self) -> f64 {
        self.state
            .tempo
            .measure_duration_seconds(&self.state.time_signature)
    }

    /// Absolute start time of `measure` (count-in is measure -1)
    pub fn measure_start(&self, measure: i64) -> f64 {
        self.state.start_time + (measure + 1) as f64 * self.measure_duration()
    }

    /// Change tempo; while running the start time is rebased so the
    /// current musical position stays continuous
    pub fn set_tempo(&mut self, now: f64, tempo: Tempo) {
        if self.state.is_running {
            let elapsed_beats = (now - self.state.start_time).max(0.0) / self.beat_duration();
            self.state.start_time = now - elapsed_beats * tempo.beat_duration_seconds();
        }
        info!(from = %self.state.tempo, to = %tempo, "tempo changed");
        self.state.tempo = tempo;
    }

    pub fn phase(&self, now: f64) -> ClockPhase {
        self.position(now).phase
    }

    /// Current position as a pure function of elapsed time
    pub fn position(&self, now: f64) -> ClockPosition {
        if !self.state.is_running {
            return ClockPosition::initial(&self.state.time_signature);
        }

        let bpm = self.beats_per_measure();
        let total = (now - self.state.start_time).max(0.0) / self.beat_duration();
        let whole = (total + BEAT_EPSILON).floor();
        let beat_fraction = (total - whole).clamp(0.0, 1.0);
        let index = whole as i64 - bpm;

        if index < 0 {
            ClockPosition {
                phase: ClockPhase::CountIn,
                measure: -1,
                beat: index,
                beat_fraction,
            }
        } else {
            ClockPosition {
                phase: ClockPhase::Running,
                measure: index.div_euclid(bpm),
                beat: index.rem_euclid(bpm),
                beat_fraction,
            }
        }
    }

    /// Report every beat and measure boundary crossed since the last poll
    pub fn poll(&mut self, now: f64) -> Vec<ClockEvent> {
        if !self.state.is_running {
            return Vec::new();
        }

        let bpm = self.beats_per_measure();
        let current = self.beat_index(now);
        let mut from = self.last_beat_index.map_or(-bpm, |last| last + 1);
        if current < from {
            return Vec::new();
        }

        if current - from >= bpm * MAX_CATCH_UP_MEASURES {
            let skipped_to = current.div_euclid(bpm) * bpm;
            warn!(
                missed_beats = skipped_to - from,
                "heartbeat overrun, skipping to current measure"
            );
            from = skipped_to;
        }

        let mut events = Vec::new();
        for index in from..=current {
            let time = self.beat_time(index);
            let measure = index.div_euclid(bpm);
            if index.rem_euclid(bpm) == 0 {
                events.push(ClockEvent::MeasureStart { measure, time });
            }
            let beat = if index < 0 { index } else { index.rem_euclid(bpm) };
            events.push(ClockEvent::Beat {
                measure,
                beat,
                time,
            });
        }

        self.last_beat_index = Some(current);
        events
    }

    fn beats_per_measure(&self) -> i64 {
        self.state.time_signature.beats_per_measure().max(1) as i64
    }

    /// Absolute beat index at `now`; count-in beats are negative
    fn beat_index(&self, now: f64) -> i64 {
        let total = (now - self.state.start_time).max(0.0) / self.beat_duration();
        (total + BEAT_EPSILON).floor() as i64 - self.beats_per_measure()
    }

    fn beat_time(&self, index: i64) -> f64 {
        self.state.start_time + (index + self.beats_per_measure()) as f64 * self.beat_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(bpm: f64, ts: TimeSignature, at: f64) -> TransportClock {
        let mut clock = TransportClock::default();
        clock.start(at, Tempo::new(bpm), ts);
        clock
    }

    #[test]
    fn test_stopped_position_is_count_in_start() {
        let clock = TransportClock::new(Tempo::default(), TimeSignature::three_four());
        let position = clock.position(12.0);
        assert_eq!(position.phase, ClockPhase::Stopped);
        assert_eq!(position.measure, -1);
        assert_eq!(position.beat, -3);
        assert!(!clock.snapshot().is_running);
    }

    #[test]
    fn test_count_in_then_running() {
        let clock = started(120.0, TimeSignature::four_four(), 10.0);

        let p = clock.position(10.0);
        assert_eq!(p.phase, ClockPhase::CountIn);
        assert_eq!(p.beat, -4);

        let p = clock.position(11.6);
        assert_eq!(p.phase, ClockPhase::CountIn);
        assert_eq!(p.beat, -1);
        assert!((p.beat_fraction - 0.2).abs() < 1e-9);

        let p = clock.position(12.0);
        assert_eq!(p.phase, ClockPhase::Running);
        assert_eq!(p.measure, 0);
        assert_eq!(p.beat, 0);

        let p = clock.position(14.75);
        assert_eq!(p.measure, 1);
        assert_eq!(p.beat, 1);
    }

    #[test]
    fn test_stop_resets_counters() {
        let mut clock = started(100.0, TimeSignature::six_eight(), 0.0);
        assert_eq!(clock.phase(5.0), ClockPhase::Running);

        clock.stop();
        let p = clock.position(5.0);
        assert_eq!(p.phase, ClockPhase::Stopped);
        assert_eq!(p.beat, -6);
        assert!(clock.poll(6.0).is_empty());
    }

    #[test]
    fn test_poll_reports_every_crossing() {
        let mut clock = started(120.0, TimeSignature::four_four(), 0.0);

        let events = clock.poll(0.0);
        assert_eq!(
            events,
            vec![
                ClockEvent::MeasureStart { measure: -1, time: 0.0 },
                ClockEvent::Beat { measure: -1, beat: -4, time: 0.0 },
            ]
        );

        // Nothing new inside the same beat
        assert!(clock.poll(0.3).is_empty());

        // Missed ticks: 0.5, 1.0, 1.5, 2.0 all reported
        let events = clock.poll(2.1);
        let measure_starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ClockEvent::MeasureStart { .. }))
            .collect();
        assert_eq!(events.len(), 5);
        assert_eq!(
            measure_starts,
            vec![&ClockEvent::MeasureStart { measure: 0, time: 2.0 }]
        );
    }

    #[test]
    fn test_poll_collapses_long_gaps() {
        let mut clock = started(120.0, TimeSignature::four_four(), 0.0);
        clock.poll(0.0);

        // 20 seconds late: ten measures
        let events = clock.poll(20.2);
        let starts: Vec<i64> = events
            .iter()
            .filter_map(|e| match e {
                ClockEvent::MeasureStart { measure, .. } => Some(*measure),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![9]);
    }

    #[test]
    fn test_measure_start_times() {
        let clock = started(120.0, TimeSignature::three_four(), 4.0);
        assert_eq!(clock.measure_start(-1), 4.0);
        assert_eq!(clock.measure_start(0), 5.5);
        assert_eq!(clock.measure_start(2), 8.5);
    }

    #[test]
    fn test_tempo_change_keeps_position_continuous() {
        let mut clock = started(120.0, TimeSignature::four_four(), 0.0);
        // 3 seconds in = 6 beats elapsed = measure 0, beat 2
        let before = clock.position(3.0);
        clock.set_tempo(3.0, Tempo::new(60.0));
        let after = clock.position(3.0);
        assert_eq!(before.measure, after.measure);
        assert_eq!(before.beat, after.beat);

        // One beat later at the new tempo
        let later = clock.position(4.0);
        assert_eq!(later.beat, 3);
    }

    #[test]
    fn test_measure_fraction() {
        let clock = started(120.0, TimeSignature::four_four(), 0.0);
        let p = clock.position(3.0);
        assert!((p.measure_fraction(&TimeSignature::four_four()) - 0.5).abs() < 1e-9);
    }
}
