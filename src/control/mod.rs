//! Controls
//!
//! A [`Control`] is the software stand-in for one physical element. It knows
//! which messages belong to it (its patterns), holds the state the hardware
//! should show, and remembers per pattern what was last sent so unchanged
//! output never reaches the wire twice.

pub mod codec;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::component::ComponentId;
use crate::error::{Error, Result};
use crate::message::{Message, MidiMessage};
use crate::output::OutputDispatcher;
use crate::pattern::MessagePattern;

pub use codec::{ChannelPressureCodec, Codec, NoteCodec, PitchBendCodec, SharedBytes, SimpleCodec};

/// Index of a registered control inside its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// What a control displays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub value: i32,
    pub color: Option<Color>,
    pub brightness: Option<u8>,
    pub flashing: Option<bool>,
}

impl ControlState {
    pub fn with_value(value: i32) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    fn merged(&self, patch: &StatePatch) -> Self {
        Self {
            value: patch.value.unwrap_or(self.value),
            color: patch.color.or(self.color),
            brightness: patch.brightness.or(self.brightness),
            flashing: patch.flashing.or(self.flashing),
        }
    }
}

/// Partial update of a [`ControlState`]; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub value: Option<i32>,
    pub color: Option<Color>,
    pub brightness: Option<u8>,
    pub flashing: Option<bool>,
}

impl StatePatch {
    pub fn value(value: i32) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Option<Color>) -> Self {
        self.color = color;
        self
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn with_flashing(mut self, flashing: bool) -> Self {
        self.flashing = Some(flashing);
        self
    }
}

impl From<ControlState> for StatePatch {
    fn from(state: ControlState) -> Self {
        Self {
            value: Some(state.value),
            color: state.color,
            brightness: state.brightness,
            flashing: state.flashing,
        }
    }
}

/// Result of feeding an inbound message to a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    /// Decoded input for the control's active component
    Forward {
        component: ComponentId,
        input: ControlState,
    },
    /// No component owns the control in the active view stack
    Unmapped,
}

pub struct Control {
    name: String,
    patterns: Vec<MessagePattern>,
    shared: SharedBytes,
    codec: Box<dyn Codec>,
    state: ControlState,
    default_state: OnceCell<ControlState>,
    cache: Vec<Option<String>>,
    min_value: i32,
    max_value: i32,
    enable_midi_out: bool,
    enable_cache: bool,
    cache_on_midi_in: bool,
    active_component: Option<ComponentId>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("name", &self.name)
            .field("patterns", &self.patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>())
            .field("state", &self.state)
            .field("active_component", &self.active_component)
            .finish()
    }
}

impl Control {
    /// Control over arbitrary patterns using the [`SimpleCodec`]
    pub fn new(patterns: Vec<MessagePattern>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::NoPatterns);
        }
        Ok(Self::with_fixed_patterns(patterns))
    }

    /// Parse each template and build a control from them
    pub fn from_patterns(patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| MessagePattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Self::new(patterns)
    }

    fn with_fixed_patterns(patterns: Vec<MessagePattern>) -> Self {
        let shared = shared_bytes(&patterns);
        Self {
            name: String::new(),
            cache: vec![None; patterns.len()],
            patterns,
            shared,
            codec: Box::new(SimpleCodec),
            state: ControlState::default(),
            default_state: OnceCell::new(),
            min_value: 0,
            max_value: 127,
            enable_midi_out: true,
            enable_cache: true,
            cache_on_midi_in: true,
            active_component: None,
        }
    }

    pub fn control_change(port: u8, channel: u8, cc: u8) -> Self {
        Self::with_fixed_patterns(vec![MessagePattern::from_partial(
            Some(port),
            Some(0xB0 | (channel & 0x0F)),
            Some(cc),
            None,
        )])
    }

    pub fn note(port: u8, channel: u8, key: u8) -> Self {
        let channel = channel & 0x0F;
        Self::with_fixed_patterns(vec![
            MessagePattern::from_partial(Some(port), Some(0x90 | channel), Some(key), None),
            MessagePattern::from_partial(Some(port), Some(0x80 | channel), Some(key), None),
        ])
        .with_codec(Box::new(NoteCodec::new(port, channel, key)))
    }

    /// Channel aftertouch, input only unless output is enabled
    pub fn channel_pressure(port: u8, channel: u8) -> Self {
        let channel = channel & 0x0F;
        Self::with_fixed_patterns(vec![MessagePattern::from_partial(
            Some(port),
            Some(0xD0 | channel),
            None,
            None,
        )])
        .with_codec(Box::new(ChannelPressureCodec::new(port, channel)))
        .with_midi_out(false)
    }

    /// Polyphonic aftertouch, input only unless output is enabled
    pub fn key_pressure(port: u8, channel: u8, key: u8) -> Self {
        Self::with_fixed_patterns(vec![MessagePattern::from_partial(
            Some(port),
            Some(0xA0 | (channel & 0x0F)),
            Some(key),
            None,
        )])
        .with_midi_out(false)
    }

    pub fn pitch_bend(port: u8, channel: u8) -> Self {
        let channel = channel & 0x0F;
        Self::with_fixed_patterns(vec![MessagePattern::from_partial(
            Some(port),
            Some(0xE0 | channel),
            None,
            None,
        )])
        .with_codec(Box::new(PitchBendCodec::new(port, channel)))
        .with_range(0, 0x3FFF)
    }

    pub fn with_codec(mut self, codec: Box<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_range(mut self, min: i32, max: i32) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_midi_out(mut self, enabled: bool) -> Self {
        self.enable_midi_out = enabled;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn with_cache_on_midi_in(mut self, enabled: bool) -> Self {
        self.cache_on_midi_in = enabled;
        self
    }

    /// Initial state, which also becomes the default state
    pub fn with_state(mut self, state: ControlState) -> Self {
        self.state = state;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn patterns(&self) -> &[MessagePattern] {
        &self.patterns
    }

    pub fn shared_bytes(&self) -> &SharedBytes {
        &self.shared
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn min_value(&self) -> i32 {
        self.min_value
    }

    pub fn max_value(&self) -> i32 {
        self.max_value
    }

    pub fn active_component(&self) -> Option<ComponentId> {
        self.active_component
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.patterns.iter().any(|p| p.test(message))
    }

    /// State as constructed, captured before the first change
    pub fn default_state(&self) -> &ControlState {
        self.default_state.get_or_init(|| self.state.clone())
    }

    /// Merge `patch` into the current state, optionally rendering afterwards
    ///
    /// Fails without touching anything when the merged value is out of range.
    pub fn set_state(
        &mut self,
        patch: StatePatch,
        render: bool,
        out: &mut OutputDispatcher,
    ) -> Result<()> {
        self.default_state();

        let next = self.state.merged(&patch);
        self.check_range(next.value)?;

        self.state = next;
        if render {
            self.render(out)?;
        }
        Ok(())
    }

    /// Put the default state back on the hardware
    pub fn reset(&mut self, out: &mut OutputDispatcher) -> Result<()> {
        self.restore_default()?;
        self.render(out)?;
        Ok(())
    }

    /// Replace the whole state with the default, clearing optional fields
    fn restore_default(&mut self) -> Result<()> {
        let default = self.default_state().clone();
        self.check_range(default.value)?;
        self.state = default;
        Ok(())
    }

    fn check_range(&self, value: i32) -> Result<()> {
        if value < self.min_value || value > self.max_value {
            return Err(Error::ValueOutOfRange {
                control: self.name.clone(),
                value,
                min: self.min_value,
                max: self.max_value,
            });
        }
        Ok(())
    }

    /// Hand the control to a new owner
    ///
    /// The state falls back to the default first. Without a new owner the
    /// control renders itself; otherwise the caller renders the component onto
    /// it. Returns false when the owner did not change.
    pub fn set_active_component(
        &mut self,
        component: Option<ComponentId>,
        out: &mut OutputDispatcher,
    ) -> Result<bool> {
        if component == self.active_component {
            return Ok(false);
        }

        self.active_component = component;
        self.restore_default()?;

        if component.is_none() {
            self.render(out)?;
        }
        Ok(true)
    }

    /// Record `message` as what the hardware currently shows
    ///
    /// Returns false when these exact bytes are already cached.
    pub fn cache_message(&mut self, message: &MidiMessage) -> Result<bool> {
        let hex = message.hex();
        if self.cache.iter().flatten().any(|cached| *cached == hex) {
            return Ok(false);
        }

        let wrapped = Message::Midi(*message);
        match self.patterns.iter().position(|p| p.test(&wrapped)) {
            Some(index) => {
                self.cache[index] = Some(hex);
                Ok(true)
            }
            None => Err(Error::PatternMismatch {
                control: self.name.clone(),
                message: hex,
            }),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn on_midi_input(
        &mut self,
        message: &Message,
        out: &mut OutputDispatcher,
    ) -> Result<InputOutcome> {
        if let (true, Message::Midi(midi)) = (self.cache_on_midi_in, message) {
            self.cache_message(midi)?;
        }
        self.codec.observe(message);

        match self.active_component {
            Some(component) => {
                let input = self.codec.decode(&self.shared, &self.state, message);
                Ok(InputOutcome::Forward { component, input })
            }
            None => {
                // Correct whatever the hardware did on its own
                self.render(out)?;
                info!(
                    "Control \"{}\" is not mapped in the active view stack (not implemented)",
                    self.name
                );
                Ok(InputOutcome::Unmapped)
            }
        }
    }

    /// Render with the default force setting (forced when caching is off)
    pub fn render(&mut self, out: &mut OutputDispatcher) -> Result<bool> {
        self.render_with(!self.enable_cache, out)
    }

    /// Send the current state, skipping MIDI messages already on the hardware
    /// unless `force` is set. Sysex is always sent.
    pub fn render_with(&mut self, force: bool, out: &mut OutputDispatcher) -> Result<bool> {
        if !self.enable_midi_out {
            return Ok(false);
        }
        let Some(messages) = self.codec.encode(&self.shared, &self.state) else {
            return Ok(false);
        };

        for message in messages {
            let keep = match &message {
                Message::Midi(midi) => self.cache_message(midi)? || force,
                Message::Sysex(_) => true,
            };
            if keep {
                out.send(message, Some(&self.name))?;
            } else {
                trace!("Cache hit for \"{}\": {}", self.name, message.short_hex());
            }
        }
        Ok(true)
    }
}

/// Bytes equal across all patterns
fn shared_bytes(patterns: &[MessagePattern]) -> SharedBytes {
    fn common(patterns: &[MessagePattern], byte: impl Fn(&MessagePattern) -> Option<u8>) -> Option<u8> {
        let first = byte(patterns.first()?);
        patterns.iter().all(|p| byte(p) == first).then_some(first).flatten()
    }

    SharedBytes {
        port: common(patterns, MessagePattern::port),
        status: common(patterns, MessagePattern::status),
        data1: common(patterns, MessagePattern::data1),
        data2: common(patterns, MessagePattern::data2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SysexMessage;
    use crate::output::MemorySink;

    fn dispatcher() -> (OutputDispatcher, MemorySink) {
        let sink = MemorySink::new();
        (OutputDispatcher::new(Box::new(sink.clone())), sink)
    }

    fn flushed(out: &mut OutputDispatcher, sink: &MemorySink) -> Vec<String> {
        out.flush().unwrap();
        let sent = sink.sent_hex();
        sink.clear();
        sent
    }

    #[test]
    fn test_requires_patterns() {
        assert!(matches!(Control::new(Vec::new()), Err(Error::NoPatterns)));
    }

    #[test]
    fn test_value_range_is_enforced() {
        let (mut out, _sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);

        let err = control.set_state(StatePatch::value(128), true, &mut out);
        assert!(matches!(err, Err(Error::ValueOutOfRange { value: 128, .. })));
        assert_eq!(control.state().value, 0);

        control.set_state(StatePatch::value(127), true, &mut out).unwrap();
        assert_eq!(control.state().value, 127);

        assert!(control.set_state(StatePatch::value(-1), false, &mut out).is_err());
    }

    #[test]
    fn test_second_identical_render_sends_nothing() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);

        control.set_state(StatePatch::value(64), true, &mut out).unwrap();
        assert_eq!(flushed(&mut out, &sink), vec!["00B00740"]);

        assert!(control.render(&mut out).unwrap());
        assert!(flushed(&mut out, &sink).is_empty());

        assert!(control.render_with(true, &mut out).unwrap());
        assert_eq!(flushed(&mut out, &sink), vec!["00B00740"]);
    }

    #[test]
    fn test_cache_disabled_always_sends() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7).with_cache(false);

        control.render(&mut out).unwrap();
        control.render(&mut out).unwrap();
        assert_eq!(flushed(&mut out, &sink).len(), 2);
    }

    #[test]
    fn test_render_without_output() {
        let (mut out, sink) = dispatcher();
        let mut pressure = Control::channel_pressure(0, 0);
        assert!(!pressure.render(&mut out).unwrap());

        let mut wildcard = Control::from_patterns(&["B0????"]).unwrap();
        assert!(!wildcard.render(&mut out).unwrap());
        assert!(flushed(&mut out, &sink).is_empty());
    }

    #[test]
    fn test_cache_message() {
        let mut control = Control::note(0, 0, 60);

        assert!(control.cache_message(&MidiMessage::note_on(0, 0, 60, 127)).unwrap());
        assert!(!control.cache_message(&MidiMessage::note_on(0, 0, 60, 127)).unwrap());
        assert!(control.cache_message(&MidiMessage::note_off(0, 0, 60, 0)).unwrap());

        let err = control.cache_message(&MidiMessage::note_on(0, 0, 61, 127));
        assert!(matches!(err, Err(Error::PatternMismatch { .. })));
    }

    #[test]
    fn test_input_echo_is_not_resent() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);

        let input = MidiMessage::control_change(0, 0, 7, 100).into();
        assert_eq!(
            control.on_midi_input(&input, &mut out).unwrap(),
            InputOutcome::Unmapped
        );
        // Unmapped input re-renders the stored value over the hardware's
        assert_eq!(flushed(&mut out, &sink), vec!["00B00700"]);

        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);
        control.set_active_component(Some(ComponentId(0)), &mut out).unwrap();
        control.on_midi_input(&input, &mut out).unwrap();
        control.set_state(StatePatch::value(100), true, &mut out).unwrap();
        assert!(flushed(&mut out, &sink).is_empty());
    }

    #[test]
    fn test_input_is_forwarded_to_owner() {
        let (mut out, _sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);
        control.set_active_component(Some(ComponentId(4)), &mut out).unwrap();

        let input = MidiMessage::control_change(0, 0, 7, 33).into();
        match control.on_midi_input(&input, &mut out).unwrap() {
            InputOutcome::Forward { component, input } => {
                assert_eq!(component, ComponentId(4));
                assert_eq!(input.value, 33);
            }
            InputOutcome::Unmapped => panic!("expected forward"),
        }
    }

    #[test]
    fn test_owner_change_resets_to_default() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7).with_state(ControlState::with_value(5));

        control.set_active_component(Some(ComponentId(0)), &mut out).unwrap();
        let red = Color { r: 255, g: 0, b: 0 };
        let patch = StatePatch::value(90)
            .with_color(Some(red))
            .with_brightness(80)
            .with_flashing(true);
        control.set_state(patch, true, &mut out).unwrap();
        assert_eq!(control.state().color, Some(red));
        flushed(&mut out, &sink);

        assert!(!control.set_active_component(Some(ComponentId(0)), &mut out).unwrap());

        assert!(control.set_active_component(None, &mut out).unwrap());
        assert_eq!(control.state(), &ControlState::with_value(5));
        assert_eq!(flushed(&mut out, &sink), vec!["00B00705"]);
    }

    #[test]
    fn test_reset_clears_color_and_flashing() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::control_change(0, 0, 7);

        let patch = StatePatch::value(64)
            .with_color(Some(Color { r: 0, g: 0, b: 255 }))
            .with_flashing(true);
        control.set_state(patch, true, &mut out).unwrap();
        flushed(&mut out, &sink);

        control.reset(&mut out).unwrap();
        assert_eq!(control.state(), &ControlState::default());
        assert_eq!(flushed(&mut out, &sink), vec!["00B00700"]);
    }

    #[test]
    fn test_unmapped_note_off_is_learned() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::note(0, 0, 60);

        let press = MidiMessage::note_on(0, 0, 60, 127).into();
        let release = MidiMessage::note_off(0, 0, 60, 0).into();
        control.on_midi_input(&press, &mut out).unwrap();
        control.on_midi_input(&release, &mut out).unwrap();
        flushed(&mut out, &sink);

        // Owned from here on: zero goes out as a note off
        control.set_active_component(Some(ComponentId(0)), &mut out).unwrap();
        control.set_state(StatePatch::value(127), true, &mut out).unwrap();
        control.set_state(StatePatch::value(0), false, &mut out).unwrap();
        control.render_with(true, &mut out).unwrap();
        assert_eq!(flushed(&mut out, &sink), vec!["00903C7F", "00803C00"]);
    }

    #[test]
    fn test_shared_bytes() {
        let control = Control::note(2, 1, 60);
        let shared = control.shared_bytes();
        assert_eq!(shared.port, Some(2));
        assert_eq!(shared.status, None);
        assert_eq!(shared.data1, Some(60));
        assert_eq!(shared.data2, None);
    }

    struct DisplayCodec;

    impl Codec for DisplayCodec {
        fn decode(&mut self, _: &SharedBytes, state: &ControlState, _: &Message) -> ControlState {
            state.clone()
        }

        fn encode(&self, _: &SharedBytes, state: &ControlState) -> Option<Vec<Message>> {
            let data = format!("F0000066{:02X}F7", state.value);
            Some(vec![SysexMessage::new(0, &data).ok()?.into()])
        }
    }

    #[test]
    fn test_sysex_output_is_never_cached() {
        let (mut out, sink) = dispatcher();
        let mut control = Control::from_patterns(&["F0000066??F7"])
            .unwrap()
            .with_codec(Box::new(DisplayCodec));

        control.render(&mut out).unwrap();
        control.render(&mut out).unwrap();
        assert_eq!(flushed(&mut out, &sink), vec!["F000006600F7", "F000006600F7"]);
    }
}
