//! Control codecs
//!
//! A codec turns inbound wire messages into control state and control state
//! back into wire messages. Controls own exactly one codec.

use crate::message::{Message, MidiMessage};

use super::ControlState;

/// Bytes common to every pattern of a control, `None` where they differ or
/// are wildcarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedBytes {
    pub port: Option<u8>,
    pub status: Option<u8>,
    pub data1: Option<u8>,
    pub data2: Option<u8>,
}

pub trait Codec {
    /// Decode an inbound message into the full state the component receives
    fn decode(&mut self, shared: &SharedBytes, state: &ControlState, message: &Message)
        -> ControlState;

    /// Messages representing `state`, or `None` when the control cannot be
    /// rendered at all
    fn encode(&self, shared: &SharedBytes, state: &ControlState) -> Option<Vec<Message>>;

    /// Sees every inbound message, mapped or not
    fn observe(&mut self, _message: &Message) {}
}

fn data_byte(value: i32) -> u8 {
    value.clamp(0, 0x7F) as u8
}

/// Single data byte controls (CC, key pressure, custom patterns)
///
/// Input is accepted when status and data1 equal the shared bytes; `data2`
/// becomes the value. Output needs a shared port, status and data1 with a
/// wildcard data2.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleCodec;

impl Codec for SimpleCodec {
    fn decode(&mut self, shared: &SharedBytes, state: &ControlState, message: &Message) -> ControlState {
        match message {
            Message::Midi(midi)
                if shared.status == Some(midi.status) && shared.data1 == Some(midi.data1) =>
            {
                ControlState {
                    value: midi.data2 as i32,
                    ..state.clone()
                }
            }
            _ => state.clone(),
        }
    }

    fn encode(&self, shared: &SharedBytes, state: &ControlState) -> Option<Vec<Message>> {
        match (shared.port, shared.status, shared.data1) {
            (Some(port), Some(status), Some(data1)) => {
                if shared.data2.is_some() {
                    return Some(Vec::new());
                }
                let data2 = data_byte(state.value);
                Some(vec![MidiMessage::new(port, status, data1, data2).into()])
            }
            _ => None,
        }
    }
}

/// Note on/off pair for one key
///
/// Once the hardware has sent a real note off, value 0 is rendered as note off
/// instead of note on with velocity 0.
#[derive(Debug, Clone, Copy)]
pub struct NoteCodec {
    port: u8,
    channel: u8,
    key: u8,
    use_note_off: bool,
}

impl NoteCodec {
    pub fn new(port: u8, channel: u8, key: u8) -> Self {
        Self {
            port,
            channel,
            key,
            use_note_off: false,
        }
    }

    pub fn uses_note_off(&self) -> bool {
        self.use_note_off
    }
}

impl Codec for NoteCodec {
    fn decode(&mut self, _shared: &SharedBytes, state: &ControlState, message: &Message) -> ControlState {
        let Message::Midi(midi) = message else {
            return state.clone();
        };
        ControlState {
            value: if midi.is_note_on() { midi.data2 as i32 } else { 0 },
            ..state.clone()
        }
    }

    fn observe(&mut self, message: &Message) {
        if let Message::Midi(midi) = message {
            if midi.status & 0xF0 == 0x80 {
                self.use_note_off = true;
            }
        }
    }

    fn encode(&self, _shared: &SharedBytes, state: &ControlState) -> Option<Vec<Message>> {
        let message = if self.use_note_off && state.value == 0 {
            MidiMessage::note_off(self.port, self.channel, self.key, 0)
        } else {
            MidiMessage::note_on(self.port, self.channel, self.key, data_byte(state.value))
        };
        Some(vec![message.into()])
    }
}

/// Channel aftertouch, value carried in data1
#[derive(Debug, Clone, Copy)]
pub struct ChannelPressureCodec {
    port: u8,
    channel: u8,
}

impl ChannelPressureCodec {
    pub fn new(port: u8, channel: u8) -> Self {
        Self { port, channel }
    }
}

impl Codec for ChannelPressureCodec {
    fn decode(&mut self, _shared: &SharedBytes, state: &ControlState, message: &Message) -> ControlState {
        match message {
            Message::Midi(midi) => ControlState {
                value: midi.data1 as i32,
                ..state.clone()
            },
            Message::Sysex(_) => state.clone(),
        }
    }

    fn encode(&self, _shared: &SharedBytes, state: &ControlState) -> Option<Vec<Message>> {
        let message = MidiMessage::channel_pressure(self.port, self.channel, data_byte(state.value));
        Some(vec![message.into()])
    }
}

/// 14-bit pitch bend (faders on most surfaces)
#[derive(Debug, Clone, Copy)]
pub struct PitchBendCodec {
    port: u8,
    channel: u8,
}

impl PitchBendCodec {
    pub fn new(port: u8, channel: u8) -> Self {
        Self { port, channel }
    }
}

impl Codec for PitchBendCodec {
    fn decode(&mut self, _shared: &SharedBytes, state: &ControlState, message: &Message) -> ControlState {
        match message {
            Message::Midi(midi) => ControlState {
                value: midi.pitch_bend_value() as i32,
                ..state.clone()
            },
            Message::Sysex(_) => state.clone(),
        }
    }

    fn encode(&self, _shared: &SharedBytes, state: &ControlState) -> Option<Vec<Message>> {
        let value = state.value.clamp(0, 0x3FFF) as u16;
        Some(vec![MidiMessage::pitch_bend(self.port, self.channel, value).into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc_shared() -> SharedBytes {
        SharedBytes {
            port: Some(0),
            status: Some(0xB0),
            data1: Some(7),
            data2: None,
        }
    }

    #[test]
    fn test_simple_decode_and_encode() {
        let mut codec = SimpleCodec;
        let state = ControlState::default();

        let input = MidiMessage::control_change(0, 0, 7, 99).into();
        let decoded = codec.decode(&cc_shared(), &state, &input);
        assert_eq!(decoded.value, 99);

        let other = MidiMessage::control_change(0, 0, 8, 99).into();
        assert_eq!(codec.decode(&cc_shared(), &state, &other).value, 0);

        let out = codec.encode(&cc_shared(), &decoded).unwrap();
        assert_eq!(out[0].hex(), "00B00763");
    }

    #[test]
    fn test_simple_without_shared_address_has_no_encoder() {
        let shared = SharedBytes {
            status: Some(0xB0),
            ..SharedBytes::default()
        };
        assert!(SimpleCodec.encode(&shared, &ControlState::default()).is_none());
    }

    #[test]
    fn test_note_switches_to_note_off() {
        let mut codec = NoteCodec::new(0, 0, 60);
        let shared = SharedBytes::default();
        let off = ControlState::default();

        assert_eq!(codec.encode(&shared, &off).unwrap()[0].hex(), "00903C00");

        let soft_off = MidiMessage::note_on(0, 0, 60, 0).into();
        codec.observe(&soft_off);
        assert_eq!(codec.decode(&shared, &off, &soft_off).value, 0);
        assert!(!codec.uses_note_off());

        codec.observe(&MidiMessage::note_off(0, 0, 60, 64).into());
        assert!(codec.uses_note_off());
        assert_eq!(codec.encode(&shared, &off).unwrap()[0].hex(), "00803C00");
    }

    #[test]
    fn test_pitch_bend_round_trip_value() {
        let mut codec = PitchBendCodec::new(1, 2);
        let shared = SharedBytes::default();
        let state = codec.decode(
            &shared,
            &ControlState::default(),
            &MidiMessage::pitch_bend(1, 2, 12000).into(),
        );
        assert_eq!(state.value, 12000);
        assert_eq!(
            codec.encode(&shared, &state).unwrap()[0],
            Message::from(MidiMessage::pitch_bend(1, 2, 12000))
        );
    }
}
