//! Message patterns
//!
//! Wildcard templates over the canonical text form of a [`Message`]. Each hex
//! pair is either a fixed byte or `??`. MIDI templates are written as
//! `SSD1D2` (any port) or `PPSSD1D2`; sysex templates start with `F0` and end
//! with `F7`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Template {
    /// port, status, data1, data2
    Midi([Option<u8>; 4]),
    Sysex(Vec<Option<u8>>),
}

/// Compiled message template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessagePattern {
    template: Template,
}

impl MessagePattern {
    /// Parse a template string
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim().to_uppercase();
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: input.to_string(),
            reason: reason.to_string(),
        };

        if let Some(c) = text
            .chars()
            .find(|c| !(c.is_ascii_hexdigit() || *c == '?'))
        {
            return Err(invalid(&format!("unexpected character '{}'", c)));
        }
        if text.len() % 2 != 0 {
            return Err(invalid("odd number of characters"));
        }

        let bytes = text
            .as_bytes()
            .chunks(2)
            .map(|pair| match pair {
                [b'?', b'?'] => Ok(None),
                [b'?', _] | [_, b'?'] => Err(invalid("wildcards must cover a whole byte")),
                _ => {
                    let pair = std::str::from_utf8(pair).map_err(|e| invalid(&e.to_string()))?;
                    u8::from_str_radix(pair, 16)
                        .map(Some)
                        .map_err(|e| invalid(&e.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let is_sysex = bytes.len() >= 2
            && bytes.first() == Some(&Some(0xF0))
            && bytes.last() == Some(&Some(0xF7));

        let template = match bytes.len() {
            _ if is_sysex => Template::Sysex(bytes),
            3 => Template::Midi([None, bytes[0], bytes[1], bytes[2]]),
            4 => Template::Midi([bytes[0], bytes[1], bytes[2], bytes[3]]),
            _ => {
                return Err(invalid(
                    "expected 6 or 8 characters, or a sysex template from F0 to F7",
                ))
            }
        };

        Ok(Self { template })
    }

    /// Build a MIDI template from the bytes that are known, the rest match anything
    pub fn from_partial(
        port: Option<u8>,
        status: Option<u8>,
        data1: Option<u8>,
        data2: Option<u8>,
    ) -> Self {
        Self {
            template: Template::Midi([port, status, data1, data2]),
        }
    }

    /// True if the message's canonical form fits this template
    pub fn test(&self, message: &Message) -> bool {
        match (&self.template, message) {
            (Template::Midi(template), Message::Midi(midi)) => {
                let bytes = [midi.port, midi.status, midi.data1, midi.data2];
                template
                    .iter()
                    .zip(bytes.iter())
                    .all(|(t, b)| t.map_or(true, |t| t == *b))
            }
            (Template::Sysex(template), Message::Sysex(sysex)) => {
                let bytes = sysex.encode();
                bytes.len() == template.len()
                    && template
                        .iter()
                        .zip(bytes.iter())
                        .all(|(t, b)| t.map_or(true, |t| t == *b))
            }
            _ => false,
        }
    }

    /// True if some literal message would match both templates
    pub fn conflicts_with(&self, other: &MessagePattern) -> bool {
        fn overlap(a: &[Option<u8>], b: &[Option<u8>]) -> bool {
            a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => x == y,
                    _ => true,
                })
        }

        match (&self.template, &other.template) {
            (Template::Midi(a), Template::Midi(b)) => overlap(a, b),
            (Template::Sysex(a), Template::Sysex(b)) => overlap(a, b),
            _ => false,
        }
    }

    pub fn is_sysex(&self) -> bool {
        matches!(self.template, Template::Sysex(_))
    }

    fn midi_byte(&self, index: usize) -> Option<u8> {
        match &self.template {
            Template::Midi(bytes) => bytes[index],
            Template::Sysex(_) => None,
        }
    }

    pub fn port(&self) -> Option<u8> {
        self.midi_byte(0)
    }

    pub fn status(&self) -> Option<u8> {
        self.midi_byte(1)
    }

    pub fn data1(&self) -> Option<u8> {
        self.midi_byte(2)
    }

    pub fn data2(&self) -> Option<u8> {
        self.midi_byte(3)
    }
}

impl FromStr for MessagePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MessagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: &[Option<u8>] = match &self.template {
            Template::Midi(bytes) => bytes,
            Template::Sysex(bytes) => bytes,
        };
        for byte in bytes {
            match byte {
                Some(b) => write!(f, "{:02X}", b)?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MidiMessage, SysexMessage};
    use proptest::prelude::*;

    fn midi(port: u8, status: u8, data1: u8, data2: u8) -> Message {
        MidiMessage::new(port, status, data1, data2).into()
    }

    #[test]
    fn test_short_form_gets_any_port() {
        let pattern = MessagePattern::parse("b0107f").unwrap();
        assert_eq!(pattern.to_string(), "??B0107F");
        assert_eq!(pattern.port(), None);
        assert_eq!(pattern.status(), Some(0xB0));
        assert!(pattern.test(&midi(0, 0xB0, 0x10, 0x7F)));
        assert!(pattern.test(&midi(3, 0xB0, 0x10, 0x7F)));
        assert!(!pattern.test(&midi(0, 0xB0, 0x11, 0x7F)));
    }

    #[test]
    fn test_wildcards() {
        let pattern = MessagePattern::parse("01B0??7F").unwrap();
        assert!(pattern.test(&midi(1, 0xB0, 0x42, 0x7F)));
        assert!(!pattern.test(&midi(0, 0xB0, 0x42, 0x7F)));
        assert_eq!(pattern.data1(), None);
        assert_eq!(pattern.data2(), Some(0x7F));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "B010", "B0107F00FF", "B0107G", "B01?7F", "B0107"] {
            assert!(MessagePattern::parse(bad).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_sysex_pattern() {
        let pattern = MessagePattern::parse("F000206B??F7").unwrap();
        assert!(pattern.is_sysex());
        assert_eq!(pattern.status(), None);

        let hit = SysexMessage::new(0, "F000206B01F7").unwrap();
        let miss = SysexMessage::new(0, "F000206B0102F7").unwrap();
        assert!(pattern.test(&hit.into()));
        assert!(!pattern.test(&miss.into()));
        assert!(!pattern.test(&midi(0, 0xF0, 0x00, 0x20)));
    }

    #[test]
    fn test_conflicts() {
        let a = MessagePattern::parse("??B0??00").unwrap();
        let b = MessagePattern::parse("00B010??").unwrap();
        let c = MessagePattern::parse("00B011??").unwrap();
        let d = MessagePattern::parse("01B010??").unwrap();

        assert!(a.conflicts_with(&b));
        assert!(!b.conflicts_with(&c));
        assert!(!b.conflicts_with(&d));
        assert!(a.conflicts_with(&d));
    }

    #[test]
    fn test_midi_and_sysex_never_conflict() {
        let midi = MessagePattern::parse("????????").unwrap();
        let sysex = MessagePattern::parse("F0??F7").unwrap();
        assert!(!midi.conflicts_with(&sysex));
    }

    fn partial_pattern() -> impl Strategy<Value = MessagePattern> {
        (
            proptest::option::of(0u8..4),
            proptest::option::of(0x80u8..0x84),
            proptest::option::of(0u8..4),
            proptest::option::of(0u8..4),
        )
            .prop_map(|(p, s, d1, d2)| MessagePattern::from_partial(p, s, d1, d2))
    }

    proptest! {
        #[test]
        fn conflict_is_symmetric(a in partial_pattern(), b in partial_pattern()) {
            prop_assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));
        }

        #[test]
        fn conflict_is_reflexive(a in partial_pattern()) {
            prop_assert!(a.conflicts_with(&a));
        }

        #[test]
        fn canonical_form_round_trips(a in partial_pattern()) {
            let reparsed = MessagePattern::parse(&a.to_string()).unwrap();
            prop_assert_eq!(reparsed, a);
        }
    }
}
