// Loop Player - Percussion pattern looping on the transport clock
// Keeps the scheduler armed one measure ahead of real time and applies
// pattern swaps only at measure boundaries

use super::metronome::Metronome;
use super::pattern::Pattern;
use super::scheduler::{EventSource, NoteKind, NoteScheduler};
use super::timeline::{Tempo, TimeSignature};
use super::transport::{ClockEvent, ClockPhase, ClockPosition, ClockSnapshot, TransportClock};
use std::sync::Arc;
use tracing::{debug, info};

/// Percussion notes sound for this share of one step
pub const PERCUSSION_GATE: f64 = 0.9;

/// GM percussion channel (10, zero-based)
pub const DEFAULT_PERCUSSION_CHANNEL: u8 = 9;

/// What `PatternLoop::play` did with the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Transport was stopped; a new session started with a count-in
    Started,
    /// Transport was running; the pattern takes over at the next measure
    Queued,
}

/// State of one running session
#[derive(Debug, Clone)]
struct PlaybackSession {
    active: Arc<Pattern>,
    queued: Option<Arc<Pattern>>,
    /// Tempo to apply at the next measure boundary
    pending_tempo: Option<Tempo>,
    /// Last measure whose loop events are in the scheduler
    armed_through: i64,
}

/// Pattern playback loop
pub struct PatternLoop {
    scheduler: Arc<NoteScheduler>,
    clock: TransportClock,
    metronome: Metronome,
    session: Option<PlaybackSession>,
    time_signature: TimeSignature,
    channel: u8,
    velocity: u8,
}

impl PatternLoop {
    pub fn new(scheduler: Arc<NoteScheduler>, time_signature: TimeSignature) -> Self {
        Self {
            scheduler,
            clock: TransportClock::new(Tempo::default(), time_signature),
            metronome: Metronome::new(),
            session: None,
            time_signature,
            channel: DEFAULT_PERCUSSION_CHANNEL,
            velocity: 100,
        }
    }

    /// MIDI channel used for loop, preview and count-in notes
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.min(15);
    }

    /// Velocity of a full-level hit; softer levels scale it down
    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity = velocity.clamp(1, 127);
    }

    pub fn metronome_mut(&mut self) -> &mut Metronome {
        &mut self.metronome
    }

    /// Start playing `pattern`, or queue it when already playing
    pub fn play(&mut self, pattern: Arc<Pattern>, tempo: Tempo, now: f64) -> PlayOutcome {
        if let Some(session) = self.session.as_mut().filter(|_| self.clock.is_running()) {
            if let Some(replaced) = session.queued.replace(pattern.clone()) {
                debug!(replaced = %replaced.name, "queued pattern replaced");
            }
            if tempo != self.clock.tempo() {
                session.pending_tempo = Some(tempo);
            }
            info!(pattern = %pattern.name, "pattern queued for next measure");
            return PlayOutcome::Queued;
        }

        self.start(pattern, tempo, now);
        PlayOutcome::Started
    }

    fn start(&mut self, pattern: Arc<Pattern>, tempo: Tempo, now: f64) {
        // Leftovers from an earlier session must not leak into this one
        self.scheduler.cancel_source(EventSource::Loop, f64::NEG_INFINITY);
        self.scheduler
            .cancel_source(EventSource::CountIn, f64::NEG_INFINITY);

        self.clock.start(now, tempo, self.time_signature);
        self.arm_count_in();
        self.arm_measure(&pattern, 0);

        info!(pattern = %pattern.name, %tempo, "loop started");
        self.session = Some(PlaybackSession {
            active: pattern,
            queued: None,
            pending_tempo: None,
            armed_through: 0,
        });
    }

    /// Stop playback and silence everything
    pub fn stop(&mut self) {
        self.clock.stop();
        self.scheduler.cancel_all();
        if let Some(session) = self.session.take() {
            info!(pattern = %session.active.name, "loop stopped");
        }
    }

    /// Play one iteration of `pattern` from `now`, outside any session
    ///
    /// A new preview replaces whatever is left of the previous one.
    /// Returns the time the preview ends.
    pub fn preview(&mut self, pattern: &Pattern, tempo: Tempo, now: f64) -> f64 {
        self.scheduler
            .cancel_source(EventSource::Preview, f64::NEG_INFINITY);
        let measure = tempo.measure_duration_seconds(&self.time_signature);
        let count = self.arm_iteration(pattern, now, measure, EventSource::Preview);
        debug!(pattern = %pattern.name, events = count, "preview scheduled");
        now + measure
    }

    /// Change tempo; while playing it applies from the next measure
    pub fn set_tempo(&mut self, tempo: Tempo, now: f64) {
        match self.session.as_mut() {
            Some(session) if self.clock.is_running() => session.pending_tempo = Some(tempo),
            _ => self.clock.set_tempo(now, tempo),
        }
    }

    /// Advance the loop to `now`; returns the clock crossings handled
    pub fn tick(&mut self, now: f64) -> Vec<ClockEvent> {
        let events = self.clock.poll(now);
        for event in &events {
            if let ClockEvent::MeasureStart { measure, time } = *event {
                self.on_measure_start(measure, time);
            }
        }
        events
    }

    fn on_measure_start(&mut self, measure: i64, time: f64) {
        if measure < 0 {
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };

        let mut rearm = false;
        if let Some(tempo) = session.pending_tempo.take() {
            self.clock.set_tempo(time, tempo);
            rearm = true;
        }
        if let Some(next) = session.queued.take() {
            info!(from = %session.active.name, to = %next.name, measure, "pattern swapped");
            session.active = next;
            rearm = true;
        }
        if rearm {
            self.scheduler.cancel_source(EventSource::Loop, time);
            self.arm_measure(&session.active, measure);
            session.armed_through = measure;
        }

        // Stay one measure ahead; after a collapsed overrun only look forward
        let target = measure + 1;
        if session.armed_through < target {
            self.arm_measure(&session.active, target);
            session.armed_through = target;
        }
        self.session = Some(session);
    }

    fn arm_count_in(&self) {
        let start = self.clock.measure_start(-1);
        let clicks = self.metronome.clicks_for_measure(
            start,
            &self.clock.tempo(),
            &self.clock.time_signature(),
        );
        let gate = self.clock.beat_duration() * 0.5;
        debug!(
            clicks = clicks.len(),
            audible = self.metronome.is_enabled(),
            "count-in armed"
        );
        for click in clicks {
            self.scheduler.schedule(
                NoteKind::NoteOn,
                click.note,
                click.velocity,
                self.channel,
                click.time,
                EventSource::CountIn,
            );
            self.scheduler.schedule(
                NoteKind::NoteOff,
                click.note,
                0,
                self.channel,
                click.time + gate,
                EventSource::CountIn,
            );
        }
    }

    fn arm_measure(&self, pattern: &Pattern, measure: i64) {
        let start = self.clock.measure_start(measure);
        let count = self.arm_iteration(pattern, start, self.clock.measure_duration(), EventSource::Loop);
        debug!(pattern = %pattern.name, measure, events = count, "measure armed");
    }

    /// Schedule one pass over `pattern` spread across `duration` seconds
    fn arm_iteration(
        &self,
        pattern: &Pattern,
        start: f64,
        duration: f64,
        source: EventSource,
    ) -> usize {
        let step = duration / pattern.length.max(1) as f64;
        let hits = pattern.hits();
        for hit in &hits {
            let on = start + hit.step as f64 * step;
            let velocity = (self.velocity as f32 * hit.level).round().clamp(1.0, 127.0) as u8;
            self.scheduler
                .schedule(NoteKind::NoteOn, hit.target, velocity, self.channel, on, source);
            self.scheduler.schedule(
                NoteKind::NoteOff,
                hit.target,
                0,
                self.channel,
                on + step * PERCUSSION_GATE,
                source,
            );
        }
        hits.len() * 2
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running() && self.session.is_some()
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    pub fn position(&self, now: f64) -> ClockPosition {
        self.clock.position(now)
    }

    pub fn active_pattern(&self) -> Option<&Arc<Pattern>> {
        self.session.as_ref().map(|s| &s.active)
    }

    pub fn queued_pattern(&self) -> Option<&Arc<Pattern>> {
        self.session.as_ref().and_then(|s| s.queued.as_ref())
    }

    /// Progress through the current iteration, 0.0 outside Running
    pub fn pattern_progress(&self, now: f64) -> f64 {
        let position = self.clock.position(now);
        if position.phase != ClockPhase::Running {
            return 0.0;
        }
        position.measure_fraction(&self.clock.time_signature())
    }
}
