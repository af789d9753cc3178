// Chord articulation - Strum/pick patterns into timed note events
// `articulate` is pure; `ChordArticulator` feeds its output to the scheduler

use super::definition::{ChordDefinition, InstrumentPreset, Key, note_name};
use crate::error::{EngineError, EngineResult};
use crate::library::{ChordLibrary, PatternLibrary};
use crate::sequencer::pattern::Pattern;
use crate::sequencer::quantize::{QuantizationMode, next_quantization_time};
use crate::sequencer::scheduler::{EventId, EventSource, NoteKind, NoteScheduler};
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::ClockSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest stretch a single placement may fill
pub const MAX_PLACEMENT_SECONDS: f64 = 600.0;

/// How hard and how long strings sound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dynamics {
    /// Velocity of a full-level step
    pub velocity: u8,
    /// Seconds a string rings unless cut earlier
    pub note_duration: f64,
}

impl Default for Dynamics {
    fn default() -> Self {
        Self {
            velocity: 100,
            note_duration: 1.0,
        }
    }
}

/// Where on the timeline a chord goes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scheduled_time: f64,
    /// Seconds to fill; the pattern repeats until then.
    /// Zero or less plays one pass of the pattern, anything above
    /// `MAX_PLACEMENT_SECONDS` is cut to it
    pub total_duration: f64,
}

impl Placement {
    /// Seconds actually filled for a pattern pass of `pass` seconds
    pub fn effective_duration(&self, pass: f64) -> f64 {
        if self.total_duration.is_finite() && self.total_duration > 0.0 {
            self.total_duration.min(MAX_PLACEMENT_SECONDS)
        } else {
            pass
        }
    }
}

/// Musical context the chord is voiced in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArticulationContext {
    pub tempo: Tempo,
    pub key: Key,
    pub capo: u8,
    pub transpose: i8,
}

impl Default for ArticulationContext {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            key: Key::default(),
            capo: 0,
            transpose: 0,
        }
    }
}

/// One string sounding once
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArticulatedNote {
    pub string: u8,
    pub note: u8,
    pub velocity: u8,
    pub on: f64,
    pub off: f64,
}

/// A chord request from the player
#[derive(Debug, Clone, PartialEq)]
pub struct ChordRequest {
    pub chord: String,
    pub pattern: String,
    pub quantization: QuantizationMode,
    pub context: ArticulationContext,
    pub dynamics: Dynamics,
}

/// The most recent chord, for flashing it in a UI
#[derive(Debug, Clone, PartialEq)]
pub struct ChordTrigger {
    pub chord_name: String,
    pub start: f64,
    pub end: f64,
    pub event_ids: Vec<EventId>,
}

impl ChordTrigger {
    /// Share of the chord elapsed at `now`, within 0.0..=1.0
    pub fn progress(&self, now: f64) -> f64 {
        let length = self.end - self.start;
        if length <= 0.0 {
            return if now >= self.end { 1.0 } else { 0.0 };
        }
        ((now - self.start) / length).clamp(0.0, 1.0)
    }
}

/// Seconds covered by one pass of `pattern` at `tempo`
pub fn pattern_duration(pattern: &Pattern, tempo: Tempo) -> f64 {
    tempo.step_duration_seconds(pattern.resolution) * pattern.length.max(1) as f64
}

/// Expand a chord and a strum pattern into per-string notes
///
/// Pattern rows address strings (0 = lowest). A note ends at the earliest
/// of its ring time, the next onset on the same string and the end of the
/// placement. The result is ordered by onset, then string.
pub fn articulate(
    chord: &ChordDefinition,
    pattern: &Pattern,
    preset: &InstrumentPreset,
    placement: Placement,
    dynamics: Dynamics,
    context: ArticulationContext,
) -> Vec<ArticulatedNote> {
    let step = context.tempo.step_duration_seconds(pattern.resolution);
    let pass = pattern_duration(pattern, context.tempo);
    if !(pass.is_finite() && pass > 0.0) {
        return Vec::new();
    }
    let total = placement.effective_duration(pass);
    let start = placement.scheduled_time;
    let end = start + total;
    let ring = if dynamics.note_duration.is_finite() && dynamics.note_duration > 0.0 {
        dynamics.note_duration
    } else {
        step
    };

    let notes = chord.notes(&preset.tuning, context.key, context.capo, context.transpose);
    let hits = pattern.hits();

    // Onsets per string, in time order
    let mut onsets: Vec<Vec<(f64, u8)>> = vec![Vec::new(); notes.len()];
    let passes = (total / pass).ceil() as usize;
    for index in 0..passes {
        let pass_start = start + index as f64 * pass;
        for hit in &hits {
            let on = pass_start + hit.step as f64 * step;
            if on >= end {
                continue;
            }
            let Some(string_onsets) = onsets.get_mut(hit.target as usize) else {
                continue;
            };
            if notes[hit.target as usize].is_none() {
                continue;
            }
            let velocity = (dynamics.velocity as f32 * hit.level).round().clamp(1.0, 127.0) as u8;
            string_onsets.push((on, velocity));
        }
    }

    let mut result = Vec::new();
    for (string, string_onsets) in onsets.iter().enumerate() {
        let Some(note) = notes[string] else {
            continue;
        };
        for (index, &(on, velocity)) in string_onsets.iter().enumerate() {
            let next = string_onsets.get(index + 1).map_or(f64::INFINITY, |n| n.0);
            result.push(ArticulatedNote {
                string: string as u8,
                note,
                velocity,
                on,
                off: (on + ring).min(next).min(end),
            });
        }
    }
    result.sort_by(|a, b| a.on.total_cmp(&b.on).then(a.string.cmp(&b.string)));
    result
}

/// A note the articulator has put on a string
#[derive(Debug, Clone, Copy, PartialEq)]
struct StringVoice {
    note: u8,
    channel: u8,
    on: f64,
    off: f64,
    /// `None` when the note-on was sent immediately
    on_id: Option<EventId>,
    off_id: EventId,
}

/// Schedules chords on the shared note scheduler
///
/// A string sounds one note at a time: a new chord chokes whatever an
/// earlier one still has ringing on the strings it plays.
pub struct ChordArticulator {
    scheduler: Arc<NoteScheduler>,
    chords: Arc<dyn ChordLibrary>,
    patterns: Arc<dyn PatternLibrary>,
    preset: InstrumentPreset,
    last_chord: Option<ChordTrigger>,
    voices: HashMap<u8, Vec<StringVoice>>,
}

impl ChordArticulator {
    pub fn new(
        scheduler: Arc<NoteScheduler>,
        chords: Arc<dyn ChordLibrary>,
        patterns: Arc<dyn PatternLibrary>,
        preset: InstrumentPreset,
    ) -> Self {
        Self {
            scheduler,
            chords,
            patterns,
            preset,
            last_chord: None,
            voices: HashMap::new(),
        }
    }

    pub fn preset(&self) -> &InstrumentPreset {
        &self.preset
    }

    pub fn set_preset(&mut self, preset: InstrumentPreset) {
        self.preset = preset;
    }

    /// Resolve, quantize and schedule one pass of a chord pattern
    ///
    /// Unknown names schedule nothing.
    pub fn play_chord(
        &mut self,
        request: &ChordRequest,
        clock: &ClockSnapshot,
        now: f64,
    ) -> EngineResult<ChordTrigger> {
        let chord = self
            .chords
            .chord(&request.chord)
            .ok_or_else(|| EngineError::UnknownChord(request.chord.clone()))?;
        let pattern = self
            .patterns
            .pattern(&request.pattern)
            .ok_or_else(|| EngineError::UnknownPattern(request.pattern.clone()))?;

        let start = next_quantization_time(request.quantization, clock, now);
        let placement = Placement {
            scheduled_time: start,
            total_duration: pattern_duration(&pattern, request.context.tempo),
        };
        let preset = self.preset.clone();
        let event_ids = self.schedule_pattern(
            &chord,
            &pattern,
            &preset,
            placement,
            request.dynamics,
            request.context,
        );

        let trigger = ChordTrigger {
            chord_name: chord.name.clone(),
            start,
            end: start + placement.total_duration,
            event_ids,
        };
        info!(
            chord = %trigger.chord_name,
            pattern = %pattern.name,
            start,
            quantization = ?request.quantization,
            "chord scheduled"
        );
        self.last_chord = Some(trigger.clone());
        Ok(trigger)
    }

    /// Schedule `chord` voiced by `pattern` over a placement
    ///
    /// Each string the chord plays is first cut at its first new onset.
    pub fn schedule_pattern(
        &mut self,
        chord: &ChordDefinition,
        pattern: &Pattern,
        preset: &InstrumentPreset,
        placement: Placement,
        dynamics: Dynamics,
        context: ArticulationContext,
    ) -> Vec<EventId> {
        if placement.total_duration.is_finite() && placement.total_duration > MAX_PLACEMENT_SECONDS {
            warn!(
                chord = %chord.name,
                requested = placement.total_duration,
                limit = MAX_PLACEMENT_SECONDS,
                "placement too long, truncated"
            );
        }
        if chord.string_count() > preset.tuning.len() {
            debug!(
                chord = %chord.name,
                chord_strings = chord.string_count(),
                tuning_strings = preset.tuning.len(),
                "chord has more strings than the instrument"
            );
        }

        let notes = articulate(chord, pattern, preset, placement, dynamics, context);
        if notes.is_empty() {
            warn!(chord = %chord.name, pattern = %pattern.name, "articulation produced no notes");
        }

        self.voices
            .retain(|_, voices| voices.iter().any(|v| v.off > placement.scheduled_time));
        let mut first_onsets: Vec<(u8, f64)> = Vec::new();
        for note in &notes {
            if !first_onsets.iter().any(|&(string, _)| string == note.string) {
                first_onsets.push((note.string, note.on));
            }
        }
        for &(string, at) in &first_onsets {
            self.choke_string(string, at);
        }

        let mut ids = Vec::with_capacity(notes.len() * 2);
        for note in &notes {
            let on_id = self.scheduler.schedule(
                NoteKind::NoteOn,
                note.note,
                note.velocity,
                preset.channel,
                note.on,
                EventSource::Chord,
            );
            let off_id = self.scheduler.schedule(
                NoteKind::NoteOff,
                note.note,
                0,
                preset.channel,
                note.off,
                EventSource::Chord,
            );
            self.voices.entry(note.string).or_default().push(StringVoice {
                note: note.note,
                channel: preset.channel,
                on: note.on,
                off: note.off,
                on_id: Some(on_id),
                off_id,
            });
            ids.push(on_id);
            ids.push(off_id);
        }
        debug!(chord = %chord.name, events = ids.len(), "chord pattern scheduled");
        ids
    }

    /// Cut everything on `string` that would still sound at `at`
    ///
    /// Notes not yet started are dropped; notes already ringing get
    /// their note-off moved to `at`.
    fn choke_string(&mut self, string: u8, at: f64) {
        let Some(voices) = self.voices.remove(&string) else {
            return;
        };
        let mut choked = 0;
        for voice in voices {
            if voice.off <= at {
                continue;
            }
            let dropped = voice.on >= at
                && voice.on_id.is_some_and(|id| self.scheduler.cancel(id));
            if dropped {
                self.scheduler.cancel(voice.off_id);
            } else if self.scheduler.cancel(voice.off_id) {
                self.scheduler.schedule(
                    NoteKind::NoteOff,
                    voice.note,
                    0,
                    voice.channel,
                    at,
                    EventSource::Chord,
                );
            }
            choked += 1;
        }
        if choked > 0 {
            debug!(string, at, choked, "string choked by new chord");
        }
    }

    /// Sound every string of a chord right now
    ///
    /// Returns the ids of the note-offs scheduled after the ring time.
    pub fn audition(
        &mut self,
        chord: &ChordDefinition,
        context: ArticulationContext,
        dynamics: Dynamics,
        now: f64,
    ) -> Vec<EventId> {
        let channel = self.preset.channel;
        let notes = chord.notes(&self.preset.tuning, context.key, context.capo, context.transpose);
        let ring = if dynamics.note_duration > 0.0 {
            dynamics.note_duration
        } else {
            Dynamics::default().note_duration
        };

        let mut ids = Vec::new();
        let mut names = Vec::new();
        for (string, note) in notes.into_iter().enumerate() {
            let Some(note) = note else {
                continue;
            };
            let string = string as u8;
            self.choke_string(string, now);
            self.scheduler
                .send_immediate(note, dynamics.velocity, channel, true);
            let off_id = self.scheduler.schedule(
                NoteKind::NoteOff,
                note,
                0,
                channel,
                now + ring,
                EventSource::Chord,
            );
            self.voices.entry(string).or_default().push(StringVoice {
                note,
                channel,
                on: now,
                off: now + ring,
                on_id: None,
                off_id,
            });
            ids.push(off_id);
            names.push(note_name(note));
        }
        debug!(chord = %chord.name, notes = ?names, "chord auditioned");
        ids
    }

    /// Look up a chord by name
    pub fn resolve_chord(&self, name: &str) -> EngineResult<Arc<ChordDefinition>> {
        self.chords
            .chord(name)
            .ok_or_else(|| EngineError::UnknownChord(name.to_string()))
    }

    pub fn last_chord(&self) -> Option<&ChordTrigger> {
        self.last_chord.as_ref()
    }

    /// Progress through the last chord, 0.0 when none was played
    pub fn chord_progress(&self, now: f64) -> f64 {
        self.last_chord
            .as_ref()
            .map_or(0.0, |trigger| trigger.progress(now))
    }

    /// Forget the last chord and every tracked string
    ///
    /// Call after the scheduler was cleared.
    pub fn reset(&mut self) {
        self.last_chord = None;
        self.voices.clear();
    }
}
