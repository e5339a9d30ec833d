//! Output dispatcher
//!
//! Queues outbound messages until the host's flush boundary and delivers them
//! to a [`MidiSink`] in enqueue order. Urgent messages skip the queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::message::{Message, MidiMessage, SysexMessage};

/// Where messages end up when flushed
pub trait MidiSink {
    fn send_midi(&mut self, message: &MidiMessage) -> Result<()>;
    fn send_sysex(&mut self, message: &SysexMessage) -> Result<()>;
}

/// Sink that records everything it is given
///
/// Clones share the same record, so a test can keep one handle and give the
/// other to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sent: Rc<RefCell<Vec<Message>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.borrow().clone()
    }

    /// Canonical hex of everything sent so far
    pub fn sent_hex(&self) -> Vec<String> {
        self.sent.borrow().iter().map(Message::hex).collect()
    }

    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl MidiSink for MemorySink {
    fn send_midi(&mut self, message: &MidiMessage) -> Result<()> {
        self.sent.borrow_mut().push(Message::Midi(*message));
        Ok(())
    }

    fn send_sysex(&mut self, message: &SysexMessage) -> Result<()> {
        self.sent.borrow_mut().push(Message::Sysex(message.clone()));
        Ok(())
    }
}

#[derive(Debug)]
struct Queued {
    message: Message,
    label: Option<String>,
}

/// Batches outbound traffic between flushes
pub struct OutputDispatcher {
    sink: Box<dyn MidiSink>,
    queue: VecDeque<Queued>,
    sent_count: u64,
}

impl OutputDispatcher {
    pub fn new(sink: Box<dyn MidiSink>) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            sent_count: 0,
        }
    }

    /// Queue a message, or send it right away when urgent
    pub fn send(&mut self, message: Message, label: Option<&str>) -> Result<()> {
        let queued = Queued {
            message,
            label: label.map(str::to_string),
        };
        if queued.message.is_urgent() {
            self.deliver(&queued)
        } else {
            self.queue.push_back(queued);
            Ok(())
        }
    }

    pub fn send_midi(&mut self, message: MidiMessage, label: Option<&str>) -> Result<()> {
        self.send(Message::Midi(message), label)
    }

    pub fn send_sysex(&mut self, message: SysexMessage, label: Option<&str>) -> Result<()> {
        self.send(Message::Sysex(message), label)
    }

    pub fn send_note_on(&mut self, port: u8, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send_midi(MidiMessage::note_on(port, channel, note, velocity), None)
    }

    pub fn send_note_off(&mut self, port: u8, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send_midi(MidiMessage::note_off(port, channel, note, velocity), None)
    }

    pub fn send_key_pressure(&mut self, port: u8, channel: u8, note: u8, pressure: u8) -> Result<()> {
        self.send_midi(MidiMessage::key_pressure(port, channel, note, pressure), None)
    }

    pub fn send_control_change(&mut self, port: u8, channel: u8, cc: u8, value: u8) -> Result<()> {
        self.send_midi(MidiMessage::control_change(port, channel, cc, value), None)
    }

    pub fn send_program_change(&mut self, port: u8, channel: u8, program: u8) -> Result<()> {
        self.send_midi(MidiMessage::program_change(port, channel, program), None)
    }

    pub fn send_channel_pressure(&mut self, port: u8, channel: u8, pressure: u8) -> Result<()> {
        self.send_midi(MidiMessage::channel_pressure(port, channel, pressure), None)
    }

    pub fn send_pitch_bend(&mut self, port: u8, channel: u8, value: u16) -> Result<()> {
        self.send_midi(MidiMessage::pitch_bend(port, channel, value), None)
    }

    /// Messages waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total messages handed to the sink
    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    /// Drain the queue to the sink in enqueue order
    ///
    /// Every queued message is attempted; the first failure is returned once
    /// the queue is empty.
    pub fn flush(&mut self) -> Result<usize> {
        let mut delivered = 0;
        let mut first_error = None;

        while let Some(queued) = self.queue.pop_front() {
            match self.deliver(&queued) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("⚠️  Failed to send {}: {}", queued.message.short_hex(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    fn deliver(&mut self, queued: &Queued) -> Result<()> {
        match &queued.message {
            Message::Midi(midi) => self.sink.send_midi(midi)?,
            Message::Sysex(sysex) => self.sink.send_sysex(sysex)?,
        }
        self.sent_count += 1;

        debug!(
            "[MIDI] OUT {} <== {} \"{}\"",
            queued.message.port(),
            queued.message.short_hex(),
            queued.label.as_deref().unwrap_or("")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> (OutputDispatcher, MemorySink) {
        let sink = MemorySink::new();
        (OutputDispatcher::new(Box::new(sink.clone())), sink)
    }

    #[test]
    fn test_queue_until_flush() {
        let (mut out, sink) = dispatcher();

        out.send_control_change(0, 0, 7, 100).unwrap();
        out.send_note_on(0, 1, 60, 127).unwrap();
        assert_eq!(out.pending(), 2);
        assert!(sink.sent().is_empty());

        assert_eq!(out.flush().unwrap(), 2);
        assert_eq!(sink.sent_hex(), vec!["00B00764", "00913C7F"]);
        assert_eq!(out.pending(), 0);
        assert_eq!(out.sent_count(), 2);
    }

    #[test]
    fn test_urgent_bypasses_queue() {
        let (mut out, sink) = dispatcher();

        out.send_control_change(0, 0, 1, 1).unwrap();
        out.send_midi(MidiMessage::note_on(0, 0, 2, 2).with_urgent(true), None)
            .unwrap();

        assert_eq!(sink.sent_hex(), vec!["00900202"]);
        out.flush().unwrap();
        assert_eq!(sink.sent().len(), 2);
    }

    #[test]
    fn test_sysex_is_queued() {
        let (mut out, sink) = dispatcher();
        let sysex = SysexMessage::new(1, "F07E7F0601F7").unwrap();

        out.send_sysex(sysex, Some("display")).unwrap();
        out.flush().unwrap();
        assert_eq!(sink.sent_hex(), vec!["F07E7F0601F7"]);
    }
}
