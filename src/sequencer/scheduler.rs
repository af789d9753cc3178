// Note scheduler - Time-ordered pending set of note on/off events
// Shared between the heartbeat (draining) and trigger paths (inserting/cancelling)

use crate::midi::event::{MidiEvent, clamp_channel};
use crate::midi::output::NoteSink;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Unique identifier for scheduled events
pub type EventId = u64;

/// Lateness above which a fired event counts as a timing overrun
pub const LATE_TOLERANCE_SECONDS: f64 = 0.010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    NoteOn,
    NoteOff,
}

/// Which stream submitted an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Direct,
    CountIn,
    Loop,
    Preview,
    Chord,
}

/// A pending note message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub id: EventId,
    pub kind: NoteKind,
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    pub time: f64,
    pub source: EventSource,
}

impl ScheduledEvent {
    fn to_midi(&self) -> MidiEvent {
        match self.kind {
            NoteKind::NoteOn => MidiEvent::note_on(self.channel, self.note, self.velocity),
            NoteKind::NoteOff => MidiEvent::note_off(self.channel, self.note),
        }
    }
}

/// Ordering key: time, then note-offs before note-ons, then submission order
#[derive(Debug, Clone, Copy)]
struct EventKey {
    time: f64,
    rank: u8,
    id: EventId,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.rank.cmp(&other.rank))
            .then(self.id.cmp(&other.id))
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub fired: u64,
    pub cancelled: u64,
    pub late: u64,
    pub panics: u64,
}

struct SchedulerInner {
    pending: BTreeMap<EventKey, ScheduledEvent>,
    index: HashMap<EventId, EventKey>,
    /// (channel, note) pairs with a note-on sent and no note-off yet
    sounding: HashSet<(u8, u8)>,
    sink: Box<dyn NoteSink>,
    stats: SchedulerStats,
}

impl SchedulerInner {
    fn emit(&mut self, event: MidiEvent, scheduled_at: Option<f64>) {
        match event {
            MidiEvent::NoteOn { channel, note, .. } => {
                self.sounding.insert((channel, note));
            }
            MidiEvent::NoteOff { channel, note } => {
                self.sounding.remove(&(channel, note));
            }
            MidiEvent::ControlChange { .. } => {}
        }
        self.sink.send(event, scheduled_at);
    }

    fn remove(&mut self, id: EventId) -> Option<ScheduledEvent> {
        let key = self.index.remove(&id)?;
        let event = self.pending.remove(&key);
        if event.is_some() {
            self.stats.cancelled += 1;
        }
        event
    }
}

/// Note scheduler
///
/// All operations are total: out-of-range MIDI values are clamped, times
/// before the epoch fire on the next drain, and cancelling an unknown id is
/// a no-op. A single mutex guards the pending set.
pub struct NoteScheduler {
    inner: Mutex<SchedulerInner>,
    next_id: AtomicU64,
}

impl NoteScheduler {
    pub fn new(sink: Box<dyn NoteSink>) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                pending: BTreeMap::new(),
                index: HashMap::new(),
                sounding: HashSet::new(),
                sink,
                stats: SchedulerStats::default(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        // A panic while holding the lock leaves the set consistent enough to keep going
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedule a note-on at absolute time `at`
    pub fn schedule_note_on(&self, note: u8, velocity: u8, channel: u8, at: f64) -> EventId {
        self.schedule(NoteKind::NoteOn, note, velocity, channel, at, EventSource::Direct)
    }

    /// Schedule a note-off at absolute time `at`
    pub fn schedule_note_off(&self, note: u8, channel: u8, at: f64) -> EventId {
        self.schedule(NoteKind::NoteOff, note, 0, channel, at, EventSource::Direct)
    }

    /// Schedule an event tagged with the stream it belongs to
    pub fn schedule(
        &self,
        kind: NoteKind,
        note: u8,
        velocity: u8,
        channel: u8,
        at: f64,
        source: EventSource,
    ) -> EventId {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        // NaN or pre-epoch times fire on the next drain
        let time = if at.is_nan() { 0.0 } else { at.max(0.0) };
        let event = ScheduledEvent {
            id,
            kind,
            note: note.min(127),
            velocity: velocity.min(127),
            channel: clamp_channel(channel),
            time,
            source,
        };
        let key = EventKey {
            time,
            rank: match kind {
                NoteKind::NoteOff => 0,
                NoteKind::NoteOn => 1,
            },
            id,
        };

        let mut inner = self.lock();
        inner.pending.insert(key, event);
        inner.index.insert(id, key);
        id
    }

    /// Remove a pending event; returns whether anything was removed
    pub fn cancel(&self, id: EventId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Cancel pending events of `source` scheduled at or after `from`
    ///
    /// A cancelled note-off whose note is already sounding is sent right
    /// away instead of being dropped, so no note is left hanging.
    pub fn cancel_source(&self, source: EventSource, from: f64) -> usize {
        let mut inner = self.lock();
        let ids: Vec<EventId> = inner
            .pending
            .values()
            .filter(|e| e.source == source && e.time >= from)
            .map(|e| e.id)
            .collect();
        for id in &ids {
            let Some(event) = inner.remove(*id) else {
                continue;
            };
            if event.kind == NoteKind::NoteOff
                && inner.sounding.contains(&(event.channel, event.note))
            {
                inner.emit(event.to_midi(), None);
            }
        }
        if !ids.is_empty() {
            debug!(?source, from, count = ids.len(), "cancelled pending events");
        }
        ids.len()
    }

    /// Panic: drop everything pending and silence every sounding note
    ///
    /// Synchronous: once this returns no previously scheduled event can fire.
    pub fn cancel_all(&self) {
        let mut inner = self.lock();
        let dropped = inner.pending.len();
        inner.pending.clear();
        inner.index.clear();
        inner.stats.cancelled += dropped as u64;

        let mut sounding: Vec<(u8, u8)> = inner.sounding.iter().copied().collect();
        sounding.sort_unstable();
        for (channel, note) in sounding {
            inner.emit(MidiEvent::note_off(channel, note), None);
        }
        inner.sink.panic();
        inner.stats.panics += 1;
        info!(dropped, "panic: all notes off");
    }

    /// Send a message right away, bypassing the pending set
    pub fn send_immediate(&self, note: u8, velocity: u8, channel: u8, on: bool) {
        let event = if on {
            MidiEvent::note_on(channel, note, velocity)
        } else {
            MidiEvent::note_off(channel, note)
        };
        self.lock().emit(event, None);
    }

    /// Fire every event due at or before `now`, in time order
    /// Returns the number of events fired
    pub fn process_due(&self, now: f64) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let mut fired = 0;

        while let Some(entry) = inner.pending.first_entry() {
            if entry.key().time > now {
                break;
            }
            let event = entry.remove();
            inner.index.remove(&event.id);

            let lateness = now - event.time;
            if lateness > LATE_TOLERANCE_SECONDS {
                inner.stats.late += 1;
                warn!(
                    id = event.id,
                    lateness_ms = lateness * 1000.0,
                    "event fired late"
                );
            }

            inner.emit(event.to_midi(), Some(event.time));
            fired += 1;
        }

        inner.stats.fired += fired as u64;
        fired
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.lock().index.contains_key(&id)
    }

    /// Pending events in firing order
    pub fn pending_events(&self) -> Vec<ScheduledEvent> {
        self.lock().pending.values().copied().collect()
    }

    pub fn next_due_time(&self) -> Option<f64> {
        self.lock().pending.keys().next().map(|key| key.time)
    }

    pub fn is_sounding(&self, channel: u8, note: u8) -> bool {
        self.lock().sounding.contains(&(channel, note))
    }

    pub fn sounding_count(&self) -> usize {
        self.lock().sounding.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.lock().stats
    }
}
