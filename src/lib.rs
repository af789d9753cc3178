// Backbeat - Library exports for the binary, tests and benchmarks

pub mod chord;
pub mod config;
pub mod engine;
pub mod error;
pub mod library;
pub mod messaging;
pub mod midi;
pub mod sequencer;
pub mod timing;

// Re-export commonly used types for convenience
pub use chord::{
    ArticulationContext, ChordArticulator, ChordDefinition, ChordRequest, ChordTrigger, Dynamics,
    InstrumentPreset, Key, Placement,
};
pub use config::{PerformanceConfig, ResolvedConfig};
pub use engine::{Heartbeat, PerformanceEngine};
pub use error::{EngineError, EngineResult};
pub use library::{ChordLibrary, InMemoryLibrary, PatternLibrary};
pub use messaging::{
    Notification, NotificationCategory, ProgressSnapshot, create_notification_channel,
    create_progress_channel,
};
pub use midi::{LogSink, MidiEvent, MidiOutputSink, NoteSink, RecordingSink};
pub use sequencer::{
    ClockPhase, ClockSnapshot, EventSource, NoteScheduler, Pattern, PatternKind, PatternLoop,
    PatternRow, PlayOutcome, QuantizationMode, Tempo, TimeSignature, TransportClock,
    next_quantization_time,
};
pub use timing::{ManualTimeSource, SystemTimeSource, TimeSource};
