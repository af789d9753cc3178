// Chord module
// Chord voicings and their articulation through strum/pick patterns

pub mod articulation;
pub mod definition;

pub use articulation::{
    ArticulatedNote, ArticulationContext, ChordArticulator, ChordRequest, ChordTrigger, Dynamics,
    Placement, articulate,
};
pub use definition::{ChordDefinition, ChordVoicing, InstrumentPreset, Key, ScaleDegree, note_name};
