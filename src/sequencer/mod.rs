// Sequencer module
// Musical time, the transport clock, note scheduling and pattern playback

pub mod loop_player;
pub mod metronome;
pub mod pattern;
pub mod quantize;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use loop_player::{PatternLoop, PlayOutcome};
pub use metronome::{Click, ClickType, Metronome};
pub use pattern::{Pattern, PatternKind, PatternRow, StepHit};
pub use quantize::{QuantizationMode, next_quantization_time};
pub use scheduler::{EventId, EventSource, NoteKind, NoteScheduler, ScheduledEvent, SchedulerStats};
pub use timeline::{Tempo, TimeSignature};
pub use transport::{ClockEvent, ClockPhase, ClockPosition, ClockSnapshot, TransportClock};
