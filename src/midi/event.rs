// MIDI event types sent to the sound-output sink

/// Highest valid MIDI note / velocity / controller value
pub const MIDI_MAX: u8 = 127;
/// Highest valid MIDI channel (0-based)
pub const CHANNEL_MAX: u8 = 15;
/// Controller number for "All Notes Off"
pub const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

/// MIDI event tagged with the absolute time it was scheduled for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEventTimed {
    pub event: MidiEvent,
    pub time: f64,
}

/// Clamp a note or velocity into 0..=127
pub fn clamp_data(value: i32) -> u8 {
    value.clamp(0, MIDI_MAX as i32) as u8
}

/// Clamp a channel into 0..=15
pub fn clamp_channel(channel: u8) -> u8 {
    channel.min(CHANNEL_MAX)
}

impl MidiEvent {
    /// Note-on with every field clamped into MIDI range
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOn {
            channel: clamp_channel(channel),
            note: note.min(MIDI_MAX),
            velocity: velocity.min(MIDI_MAX),
        }
    }

    /// Note-off with every field clamped into MIDI range
    pub fn note_off(channel: u8, note: u8) -> Self {
        MidiEvent::NoteOff {
            channel: clamp_channel(channel),
            note: note.min(MIDI_MAX),
        }
    }

    pub fn all_notes_off(channel: u8) -> Self {
        MidiEvent::ControlChange {
            channel: clamp_channel(channel),
            controller: CC_ALL_NOTES_OFF,
            value: 0,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. } => channel,
        }
    }

    /// Encode as a raw 3-byte MIDI message
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }
}
