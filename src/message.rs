//! Wire messages
//!
//! A [`Message`] is either a three byte MIDI message or a sysex payload, both
//! addressed by a numeric port. Their canonical text forms are what
//! [`crate::pattern::MessagePattern`] matches against:
//! MIDI is `PPSSD1D2` (port first), sysex is its uppercase hex data.

use std::fmt;

use crate::error::{Error, Result};

/// A wire message addressed to or from a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Midi(MidiMessage),
    Sysex(SysexMessage),
}

impl Message {
    /// Parse raw bytes received on `port`
    ///
    /// Returns `None` for running status and truncated messages.
    pub fn from_raw(port: u8, data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        if status == 0xF0 {
            return Some(Message::Sysex(SysexMessage::from_bytes(port, data)));
        }

        // Running status would need the previous status byte
        if status < 0x80 {
            return None;
        }

        let expected = MidiMessage::wire_len(status);
        if data.len() < expected {
            return None;
        }

        let data1 = if expected > 1 { data[1] } else { 0 };
        let data2 = if expected > 2 { data[2] } else { 0 };
        Some(Message::Midi(MidiMessage::new(port, status, data1, data2)))
    }

    pub fn port(&self) -> u8 {
        match self {
            Message::Midi(midi) => midi.port,
            Message::Sysex(sysex) => sysex.port,
        }
    }

    pub fn is_urgent(&self) -> bool {
        match self {
            Message::Midi(midi) => midi.urgent,
            Message::Sysex(sysex) => sysex.urgent,
        }
    }

    /// Canonical text form used for pattern matching and caching
    pub fn hex(&self) -> String {
        match self {
            Message::Midi(midi) => midi.hex(),
            Message::Sysex(sysex) => sysex.data.clone(),
        }
    }

    /// Hex form without the port, as used in logs
    pub fn short_hex(&self) -> String {
        match self {
            Message::Midi(midi) => midi.short_hex(),
            Message::Sysex(sysex) => sysex.data.clone(),
        }
    }

    pub fn as_midi(&self) -> Option<&MidiMessage> {
        match self {
            Message::Midi(midi) => Some(midi),
            Message::Sysex(_) => None,
        }
    }
}

impl From<MidiMessage> for Message {
    fn from(midi: MidiMessage) -> Self {
        Message::Midi(midi)
    }
}

impl From<SysexMessage> for Message {
    fn from(sysex: SysexMessage) -> Self {
        Message::Sysex(sysex)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Midi(midi) => midi.fmt(f),
            Message::Sysex(sysex) => sysex.fmt(f),
        }
    }
}

/// Status/data triple on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiMessage {
    pub port: u8,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Bypass the output queue and send immediately
    pub urgent: bool,
}

impl MidiMessage {
    pub fn new(port: u8, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            port,
            status,
            data1,
            data2,
            urgent: false,
        }
    }

    pub fn note_on(port: u8, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(port, 0x90 | (channel & 0x0F), note, velocity)
    }

    pub fn note_off(port: u8, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(port, 0x80 | (channel & 0x0F), note, velocity)
    }

    pub fn key_pressure(port: u8, channel: u8, note: u8, pressure: u8) -> Self {
        Self::new(port, 0xA0 | (channel & 0x0F), note, pressure)
    }

    pub fn control_change(port: u8, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(port, 0xB0 | (channel & 0x0F), cc, value)
    }

    pub fn program_change(port: u8, channel: u8, program: u8) -> Self {
        Self::new(port, 0xC0 | (channel & 0x0F), program, 0)
    }

    pub fn channel_pressure(port: u8, channel: u8, pressure: u8) -> Self {
        Self::new(port, 0xD0 | (channel & 0x0F), pressure, 0)
    }

    /// Pitch bend with a 14-bit value (0-16383)
    pub fn pitch_bend(port: u8, channel: u8, value: u16) -> Self {
        let lsb = (value & 0x7F) as u8;
        let msb = ((value >> 7) & 0x7F) as u8;
        Self::new(port, 0xE0 | (channel & 0x0F), lsb, msb)
    }

    pub fn with_urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }

    /// Number of bytes this status occupies on the wire
    pub fn wire_len(status: u8) -> usize {
        match status {
            0xC0..=0xDF => 2,
            0xF1 | 0xF3 => 2,
            0xF2 => 3,
            0xF4..=0xFF => 1,
            _ => 3,
        }
    }

    /// Encode to the bytes sent on the wire
    pub fn encode(&self) -> Vec<u8> {
        let bytes = [self.status, self.data1, self.data2];
        bytes[..Self::wire_len(self.status)].to_vec()
    }

    /// `PPSSD1D2`
    pub fn hex(&self) -> String {
        format!(
            "{:02X}{:02X}{:02X}{:02X}",
            self.port, self.status, self.data1, self.data2
        )
    }

    /// `SSD1D2`
    pub fn short_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.status, self.data1, self.data2)
    }

    /// Channel (0-15) for channel messages
    pub fn channel(&self) -> Option<u8> {
        if self.is_channel_message() {
            Some(self.status & 0x0F)
        } else {
            None
        }
    }

    pub fn is_channel_message(&self) -> bool {
        (0x80..0xF0).contains(&self.status)
    }

    fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn is_note_on(&self) -> bool {
        self.kind() == 0x90 && self.data2 > 0
    }

    /// Note off, including note on with velocity 0
    pub fn is_note_off(&self) -> bool {
        self.kind() == 0x80 || (self.kind() == 0x90 && self.data2 == 0)
    }

    pub fn is_note(&self) -> bool {
        self.kind() == 0x80 || self.kind() == 0x90
    }

    pub fn is_key_pressure(&self) -> bool {
        self.kind() == 0xA0
    }

    pub fn is_control_change(&self) -> bool {
        self.kind() == 0xB0
    }

    pub fn is_program_change(&self) -> bool {
        self.kind() == 0xC0
    }

    pub fn is_channel_pressure(&self) -> bool {
        self.kind() == 0xD0
    }

    pub fn is_pitch_bend(&self) -> bool {
        self.kind() == 0xE0
    }

    /// 14-bit pitch bend value
    pub fn pitch_bend_value(&self) -> u16 {
        ((self.data2 as u16 & 0x7F) << 7) | (self.data1 as u16 & 0x7F)
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel = (self.status & 0x0F) + 1;
        match self.kind() {
            _ if self.is_note_on() => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel, self.data1, self.data2)
            }
            _ if self.is_note_off() => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel, self.data1, self.data2)
            }
            0xA0 => write!(
                f,
                "KeyPressure ch:{} n:{} p:{}",
                channel, self.data1, self.data2
            ),
            0xB0 => write!(f, "CC ch:{} cc:{} v:{}", channel, self.data1, self.data2),
            0xC0 => write!(f, "ProgramChange ch:{} p:{}", channel, self.data1),
            0xD0 => write!(f, "ChannelPressure ch:{} p:{}", channel, self.data1),
            0xE0 => write!(f, "PitchBend ch:{} v:{}", channel, self.pitch_bend_value()),
            _ => write!(f, "System {}", self.short_hex()),
        }
    }
}

/// System exclusive payload, stored as uppercase hex including `F0`/`F7`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexMessage {
    pub port: u8,
    pub data: String,
    pub urgent: bool,
}

impl SysexMessage {
    /// Build from a hex string (case-insensitive, whitespace ignored)
    pub fn new(port: u8, data: &str) -> Result<Self> {
        let compact: String = data.split_whitespace().collect();
        let invalid = |reason: &str| Error::InvalidSysex {
            data: data.to_string(),
            reason: reason.to_string(),
        };

        if compact.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits"));
        }
        hex::decode(&compact).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            port,
            data: compact.to_uppercase(),
            urgent: false,
        })
    }

    pub fn from_bytes(port: u8, bytes: &[u8]) -> Self {
        Self {
            port,
            data: hex::encode_upper(bytes),
            urgent: false,
        }
    }

    pub fn with_urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }

    /// Raw bytes for the wire
    pub fn encode(&self) -> Vec<u8> {
        // Validated on construction
        hex::decode(&self.data).unwrap_or_default()
    }
}

impl fmt::Display for SysexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SysEx {} bytes", self.data.len() / 2)
    }
}

/// Format bytes as spaced hex for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = Message::from_raw(1, &[0x90, 60, 100]).unwrap();
        let midi = msg.as_midi().unwrap();

        assert!(midi.is_note_on());
        assert_eq!(midi.channel(), Some(0));
        assert_eq!(msg.hex(), "01903C64");
        assert_eq!(msg.short_hex(), "903C64");
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let midi = MidiMessage::new(0, 0x90, 60, 0);
        assert!(midi.is_note_off());
        assert!(!midi.is_note_on());
    }

    #[test]
    fn test_two_byte_messages() {
        let msg = Message::from_raw(0, &[0xD2, 0x40]).unwrap();
        let midi = msg.as_midi().unwrap();

        assert!(midi.is_channel_pressure());
        assert_eq!(midi.data2, 0);
        assert_eq!(midi.encode(), vec![0xD2, 0x40]);
    }

    #[test]
    fn test_truncated_and_running_status() {
        assert!(Message::from_raw(0, &[0xB0, 7]).is_none());
        assert!(Message::from_raw(0, &[0x40, 0x10]).is_none());
        assert!(Message::from_raw(0, &[]).is_none());
    }

    #[test]
    fn test_pitch_bend() {
        let midi = MidiMessage::pitch_bend(0, 0, 8192);
        assert_eq!((midi.data1, midi.data2), (0x00, 0x40));
        assert_eq!(midi.pitch_bend_value(), 8192);
        assert_eq!(midi.to_string(), "PitchBend ch:1 v:8192");
    }

    #[test]
    fn test_sysex_from_raw() {
        let msg = Message::from_raw(2, &[0xF0, 0x00, 0x20, 0x6b, 0xF7]).unwrap();
        assert_eq!(msg.hex(), "F000206BF7");
        assert_eq!(msg.port(), 2);
    }

    #[test]
    fn test_sysex_validation() {
        let sysex = SysexMessage::new(0, "f0 7e 7f 06 01 f7").unwrap();
        assert_eq!(sysex.data, "F07E7F0601F7");
        assert_eq!(sysex.encode(), vec![0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]);

        assert!(SysexMessage::new(0, "F07").is_err());
        assert!(SysexMessage::new(0, "F0ZZF7").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x90, 0x3C, 0x7F]), "90 3C 7F");
    }
}
