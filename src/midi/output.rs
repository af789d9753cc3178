// Sound-output sinks
// The scheduler hands fired events to a NoteSink; the sink owns the transport to the synth

use crate::midi::device::MidiDeviceManager;
use crate::midi::event::{CHANNEL_MAX, MidiEvent, MidiEventTimed};
use crate::error::{EngineError, EngineResult};
use midir::MidiOutputConnection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Opaque collaborator receiving note messages
pub trait NoteSink: Send {
    /// Send an event now. `scheduled_at` is the absolute time the event was
    /// scheduled for, or `None` for immediate (unscheduled) sends.
    fn send(&mut self, event: MidiEvent, scheduled_at: Option<f64>);

    /// All notes off on every channel
    fn panic(&mut self);
}

/// Sink writing to a hardware or virtual MIDI output port
pub struct MidiOutputSink {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidiOutputSink {
    /// Connect to the first output port whose name contains `name_fragment`,
    /// or to the first available port when no fragment is given
    pub fn connect(name_fragment: Option<&str>) -> EngineResult<Self> {
        let manager = MidiDeviceManager::new();
        let (midi_out, port, port_name) = match name_fragment {
            Some(fragment) => manager.get_output_port_by_name(fragment),
            None => manager.get_default_output_port(),
        }
        .ok_or_else(|| {
            EngineError::Midi(format!(
                "no MIDI output port matching {:?}",
                name_fragment.unwrap_or("<default>")
            ))
        })?;

        let connection = midi_out
            .connect(&port, "backbeat-output")
            .map_err(|e| EngineError::Midi(e.to_string()))?;

        info!(port = %port_name, "MIDI output connected");
        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl NoteSink for MidiOutputSink {
    fn send(&mut self, event: MidiEvent, _scheduled_at: Option<f64>) {
        if let Err(e) = self.connection.send(&event.to_bytes()) {
            warn!(
                port = %self.port_name,
                channel = event.channel(),
                error = %e,
                "MIDI send failed"
            );
        }
    }

    fn panic(&mut self) {
        for channel in 0..=CHANNEL_MAX {
            self.send(MidiEvent::all_notes_off(channel), None);
        }
    }
}

/// Sink that only logs; used when no MIDI port is available
#[derive(Debug, Default)]
pub struct LogSink;

impl NoteSink for LogSink {
    fn send(&mut self, event: MidiEvent, scheduled_at: Option<f64>) {
        info!(?event, ?scheduled_at, "note");
    }

    fn panic(&mut self) {
        info!("all notes off");
    }
}

/// Entry captured by a RecordingSink
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkRecord {
    Scheduled(MidiEventTimed),
    Immediate(MidiEvent),
    Panic,
}

/// Sink that keeps every message in a shared log
///
/// Clones share the log, so one clone can go into the scheduler while
/// another is inspected.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<SinkRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Scheduled events only, in firing order
    pub fn scheduled(&self) -> Vec<MidiEventTimed> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                SinkRecord::Scheduled(timed) => Some(timed),
                _ => None,
            })
            .collect()
    }

    pub fn panic_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, SinkRecord::Panic))
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    fn push(&self, record: SinkRecord) {
        if let Ok(mut log) = self.log.lock() {
            log.push(record);
        }
    }
}

impl NoteSink for RecordingSink {
    fn send(&mut self, event: MidiEvent, scheduled_at: Option<f64>) {
        debug!(?event, ?scheduled_at, "recorded");
        let record = match scheduled_at {
            Some(time) => SinkRecord::Scheduled(MidiEventTimed { event, time }),
            None => SinkRecord::Immediate(event),
        };
        self.push(record);
    }

    fn panic(&mut self) {
        self.push(SinkRecord::Panic);
    }
}
