// Performance engine - One session, one clock, one scheduler
// Every public operation reads the time source once and works from that instant

pub mod heartbeat;

pub use heartbeat::Heartbeat;

use crate::chord::articulation::{
    ArticulationContext, ChordArticulator, ChordRequest, ChordTrigger, Dynamics, Placement,
};
use crate::chord::definition::{ChordDefinition, InstrumentPreset};
use crate::config::ResolvedConfig;
use crate::error::{EngineError, EngineResult};
use crate::library::{ChordLibrary, PatternLibrary};
use crate::messaging::channels::{NotificationProducer, ProgressProducer};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::messaging::progress::ProgressSnapshot;
use crate::midi::output::NoteSink;
use crate::sequencer::loop_player::{PatternLoop, PlayOutcome};
use crate::sequencer::pattern::Pattern;
use crate::sequencer::quantize::QuantizationMode;
use crate::sequencer::scheduler::{EventId, NoteScheduler};
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::ClockSnapshot;
use crate::timing::TimeSource;
use ringbuf::traits::Producer;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The performance engine
pub struct PerformanceEngine {
    time: Arc<dyn TimeSource>,
    scheduler: Arc<NoteScheduler>,
    looper: PatternLoop,
    chords: ChordArticulator,
    patterns: Arc<dyn PatternLibrary>,
    config: ResolvedConfig,
    progress_tx: Option<ProgressProducer>,
    notification_tx: Option<NotificationProducer>,
    /// Late-event count already reported
    reported_late: u64,
}

impl PerformanceEngine {
    pub fn new(
        sink: Box<dyn NoteSink>,
        time: Arc<dyn TimeSource>,
        patterns: Arc<dyn PatternLibrary>,
        chords: Arc<dyn ChordLibrary>,
        config: ResolvedConfig,
    ) -> Self {
        let scheduler = Arc::new(NoteScheduler::new(sink));

        let mut looper = PatternLoop::new(scheduler.clone(), config.time_signature);
        looper.set_channel(config.percussion_channel);
        looper.set_velocity(config.dynamics.velocity);
        looper.metronome_mut().set_enabled(config.count_in);

        let chords = ChordArticulator::new(
            scheduler.clone(),
            chords,
            patterns.clone(),
            config.preset.clone(),
        );

        info!(
            tempo = %config.tempo,
            time_signature = %config.time_signature,
            key = %config.key,
            preset = %config.preset.name,
            "performance engine ready"
        );

        Self {
            time,
            scheduler,
            looper,
            chords,
            patterns,
            config,
            progress_tx: None,
            notification_tx: None,
            reported_late: 0,
        }
    }

    /// Receive progress snapshots on every clock crossing and state change
    pub fn attach_progress(&mut self, tx: ProgressProducer) {
        self.progress_tx = Some(tx);
    }

    pub fn attach_notifications(&mut self, tx: NotificationProducer) {
        self.notification_tx = Some(tx);
    }

    pub fn now(&self) -> f64 {
        self.time.now()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<NoteScheduler> {
        &self.scheduler
    }

    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.looper.snapshot()
    }

    /// Start the named pattern, or queue it for the next measure
    pub fn play(&mut self, pattern_id: &str) -> EngineResult<PlayOutcome> {
        let pattern = self.resolve_pattern(pattern_id)?;
        Ok(self.play_pattern(pattern))
    }

    pub fn play_pattern(&mut self, pattern: Arc<Pattern>) -> PlayOutcome {
        let now = self.now();
        let outcome = self.looper.play(pattern, self.config.tempo, now);
        self.publish_progress(now);
        outcome
    }

    /// Stop playback; nothing of the session sounds afterwards
    pub fn stop(&mut self) {
        let now = self.now();
        self.looper.stop();
        self.chords.reset();
        self.publish_progress(now);
    }

    /// Play one pass of the named pattern now, outside the session
    /// Returns when the preview ends
    pub fn preview(&mut self, pattern_id: &str) -> EngineResult<f64> {
        let pattern = self.resolve_pattern(pattern_id)?;
        let now = self.now();
        Ok(self.looper.preview(&pattern, self.config.tempo, now))
    }

    /// Play a chord with the configured key, dynamics and quantization
    pub fn play_chord(&mut self, chord: &str, pattern: &str) -> EngineResult<ChordTrigger> {
        let request = ChordRequest {
            chord: chord.to_string(),
            pattern: pattern.to_string(),
            quantization: self.config.quantization,
            context: self.config.context(),
            dynamics: self.config.dynamics,
        };
        self.play_chord_with(&request)
    }

    pub fn play_chord_with(&mut self, request: &ChordRequest) -> EngineResult<ChordTrigger> {
        let now = self.now();
        let clock = self.looper.snapshot();
        match self.chords.play_chord(request, &clock, now) {
            Ok(trigger) => {
                self.publish_progress(now);
                Ok(trigger)
            }
            Err(error) => {
                self.report(&error);
                Err(error)
            }
        }
    }

    /// Schedule a chord over an explicit placement, voiced for `preset`
    pub fn schedule_pattern(
        &mut self,
        chord: &ChordDefinition,
        pattern: &Pattern,
        preset: &InstrumentPreset,
        placement: Placement,
        dynamics: Dynamics,
        context: ArticulationContext,
    ) -> Vec<EventId> {
        self.chords
            .schedule_pattern(chord, pattern, preset, placement, dynamics, context)
    }

    /// Sound every string of the named chord right now
    pub fn audition_chord(&mut self, chord: &str) -> EngineResult<Vec<EventId>> {
        let definition = match self.chords.resolve_chord(chord) {
            Ok(definition) => definition,
            Err(error) => {
                self.report(&error);
                return Err(error);
            }
        };
        let now = self.now();
        Ok(self
            .chords
            .audition(&definition, self.config.context(), self.config.dynamics, now))
    }

    /// Change tempo; a running loop picks it up at the next measure
    pub fn set_tempo(&mut self, bpm: f64) -> Tempo {
        let tempo = Tempo::sanitize(bpm, self.config.tempo);
        if tempo.bpm() != bpm {
            self.notify(Notification::warning(
                NotificationCategory::Configuration,
                format!("Tempo {} adjusted to {}", bpm, tempo),
            ));
        }
        let now = self.now();
        if self.looper.is_playing() {
            self.notify(Notification::info(
                NotificationCategory::Timing,
                format!("Tempo {} from the next measure", tempo),
            ));
        }
        self.config.tempo = tempo;
        self.looper.set_tempo(tempo, now);
        self.publish_progress(now);
        tempo
    }

    pub fn set_quantization(&mut self, mode: QuantizationMode) {
        debug!(?mode, "quantization changed");
        self.config.quantization = mode;
    }

    pub fn set_preset(&mut self, preset: InstrumentPreset) {
        info!(preset = %preset.name, "instrument preset changed");
        self.config.preset = preset.clone();
        self.chords.set_preset(preset);
    }

    /// Heartbeat step: advance the loop, then fire what is due
    /// Returns the number of events sent
    pub fn tick(&mut self) -> usize {
        let now = self.now();
        let crossings = self.looper.tick(now);
        let fired = self.scheduler.process_due(now);

        let late = self.scheduler.stats().late;
        if late > self.reported_late {
            self.notify(Notification::warning(
                NotificationCategory::Timing,
                format!("{} event(s) fired late", late - self.reported_late),
            ));
            self.reported_late = late;
        }
        if !crossings.is_empty() {
            self.publish_progress(now);
        }
        fired
    }

    /// Current position and playback state
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress_at(self.now())
    }

    pub fn is_playing(&self) -> bool {
        self.looper.is_playing()
    }

    fn progress_at(&self, now: f64) -> ProgressSnapshot {
        let position = self.looper.position(now);
        ProgressSnapshot {
            phase: position.phase,
            measure: position.measure,
            beat: position.beat,
            beat_fraction: position.beat_fraction,
            pattern_progress: self.looper.pattern_progress(now),
            chord_progress: self.chords.chord_progress(now),
            last_chord: self.chords.last_chord().map(|c| c.chord_name.clone()),
            active_pattern: self.looper.active_pattern().map(|p| p.name.clone()),
            queued_pattern: self.looper.queued_pattern().map(|p| p.name.clone()),
            tempo_bpm: self.config.tempo.bpm(),
        }
    }

    fn resolve_pattern(&mut self, pattern_id: &str) -> EngineResult<Arc<Pattern>> {
        match self.patterns.pattern(pattern_id) {
            Some(pattern) => Ok(pattern),
            None => {
                let error = EngineError::UnknownPattern(pattern_id.to_string());
                self.report(&error);
                Err(error)
            }
        }
    }

    fn report(&mut self, error: &EngineError) {
        let notification = if error.is_resolution() {
            warn!(%error, "request ignored");
            Notification::warning(NotificationCategory::Resolution, error.to_string())
        } else {
            tracing::error!(%error, "request failed");
            let category = match error {
                EngineError::Midi(_) | EngineError::Io(_) => NotificationCategory::Output,
                _ => NotificationCategory::Configuration,
            };
            Notification::error(category, error.to_string())
        };
        self.notify(notification);
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(tx) = self.notification_tx.as_mut() {
            if tx.try_push(notification).is_err() {
                debug!("notification channel full, dropping");
            }
        }
    }

    fn publish_progress(&mut self, now: f64) {
        if self.progress_tx.is_none() {
            return;
        }
        let snapshot = self.progress_at(now);
        if let Some(tx) = self.progress_tx.as_mut() {
            if tx.try_push(snapshot).is_err() {
                debug!("progress channel full, dropping");
            }
        }
    }
}
