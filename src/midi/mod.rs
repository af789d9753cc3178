// MIDI message model and output sinks

pub mod device;
pub mod event;
pub mod output;

pub use device::{MidiDeviceInfo, MidiDeviceManager};
pub use event::{MidiEvent, MidiEventTimed};
pub use output::{LogSink, MidiOutputSink, NoteSink, RecordingSink, SinkRecord};
