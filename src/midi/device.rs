// MIDI output device discovery

use midir::{MidiOutput, MidiOutputPort};

const CLIENT_NAME: &str = "backbeat";

#[derive(Clone, Debug)]
pub struct MidiDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub struct MidiDeviceManager;

impl MidiDeviceManager {
    pub fn new() -> Self {
        Self
    }

    /// List every available MIDI output port
    pub fn list_output_ports(&self) -> Vec<MidiDeviceInfo> {
        let mut devices = Vec::new();

        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            for (index, port) in midi_out.ports().iter().enumerate() {
                if let Ok(name) = midi_out.port_name(port) {
                    devices.push(MidiDeviceInfo {
                        id: format!("midi_out_{}", index),
                        name,
                        // First port is treated as the default
                        is_default: index == 0,
                    });
                }
            }
        }

        devices
    }

    /// First available output port
    pub fn get_default_output_port(&self) -> Option<(MidiOutput, MidiOutputPort, String)> {
        let midi_out = MidiOutput::new(CLIENT_NAME).ok()?;
        let port = midi_out.ports().into_iter().next()?;
        let name = midi_out.port_name(&port).ok()?;
        Some((midi_out, port, name))
    }

    /// First output port whose name contains `fragment` (case-insensitive)
    pub fn get_output_port_by_name(
        &self,
        fragment: &str,
    ) -> Option<(MidiOutput, MidiOutputPort, String)> {
        let midi_out = MidiOutput::new(CLIENT_NAME).ok()?;
        let needle = fragment.to_lowercase();

        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if name.to_lowercase().contains(&needle) {
                    return Some((midi_out, port, name));
                }
            }
        }

        None
    }
}

impl Default for MidiDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
