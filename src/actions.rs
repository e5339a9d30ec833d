//! Console actions
//!
//! Component handlers used by configured surfaces. Every gesture, toggle or
//! fader move ends up as a named action on a [`ConsoleActions`] sink, which
//! logs it with a timestamp and keeps a record for inspection. Useful for
//! trying a mapping without any application attached.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::component::{ButtonHandler, ButtonState, ComponentContext, GateHandler, RangeHandler, ToggleHandler};
use crate::error::Result;

/// One triggered action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub exec: u64,
    pub at: DateTime<Local>,
    pub action: String,
    pub event: &'static str,
    pub value: Option<i32>,
}

#[derive(Default)]
struct Inner {
    execution_count: u64,
    records: Vec<ActionRecord>,
}

/// Shared action sink; clones log into the same record
#[derive(Clone, Default)]
pub struct ConsoleActions {
    inner: Rc<RefCell<Inner>>,
}

impl ConsoleActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self, action: &str, event: &'static str, value: Option<i32>) {
        let mut inner = self.inner.borrow_mut();
        inner.execution_count += 1;
        let exec = inner.execution_count;
        let at = Local::now();

        let value_str = value.map(|v| format!(" = {}", v)).unwrap_or_default();
        info!(
            "🎮 [{}] {} → {}{} [exec #{}]",
            at.format("%H:%M:%S%.3f"),
            action,
            event,
            value_str,
            exec
        );
        debug!(action = action, event = event, value = ?value, exec_count = exec, "Console action");

        inner.records.push(ActionRecord {
            exec,
            at,
            action: action.to_string(),
            event,
            value,
        });
    }

    pub fn execution_count(&self) -> u64 {
        self.inner.borrow().execution_count
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        self.inner.borrow().records.clone()
    }

    /// `(action, event, value)` of every record, oldest first
    pub fn summary(&self) -> Vec<(String, &'static str, Option<i32>)> {
        self.inner
            .borrow()
            .records
            .iter()
            .map(|r| (r.action.clone(), r.event, r.value))
            .collect()
    }
}

/// Lights while held and reports every gesture
pub struct ActionButton {
    action: String,
    actions: ConsoleActions,
}

impl ActionButton {
    pub fn new(action: impl Into<String>, actions: ConsoleActions) -> Self {
        Self {
            action: action.into(),
            actions,
        }
    }
}

impl ButtonHandler for ActionButton {
    fn on_press(&mut self, button: &mut ButtonState, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        button.on = true;
        self.actions.trigger(&self.action, "press", None);
        Ok(())
    }

    fn on_long_press(&mut self, _button: &mut ButtonState, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "long_press", None);
        Ok(())
    }

    fn on_double_press(&mut self, button: &mut ButtonState, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        button.on = true;
        self.actions.trigger(&self.action, "double_press", None);
        Ok(())
    }

    fn on_release(&mut self, button: &mut ButtonState, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        button.on = false;
        self.actions.trigger(&self.action, "release", None);
        Ok(())
    }

    fn on_double_release(&mut self, button: &mut ButtonState, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        button.on = false;
        self.actions.trigger(&self.action, "double_release", None);
        Ok(())
    }
}

pub struct ActionToggle {
    action: String,
    actions: ConsoleActions,
}

impl ActionToggle {
    pub fn new(action: impl Into<String>, actions: ConsoleActions) -> Self {
        Self {
            action: action.into(),
            actions,
        }
    }
}

impl ToggleHandler for ActionToggle {
    fn on_toggle_on(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "on", None);
        Ok(())
    }

    fn on_toggle_off(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "off", None);
        Ok(())
    }
}

pub struct ActionGate {
    action: String,
    actions: ConsoleActions,
}

impl ActionGate {
    pub fn new(action: impl Into<String>, actions: ConsoleActions) -> Self {
        Self {
            action: action.into(),
            actions,
        }
    }
}

impl GateHandler for ActionGate {
    fn on_open(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "open", None);
        Ok(())
    }

    fn on_close(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "close", None);
        Ok(())
    }
}

pub struct ActionRange {
    action: String,
    actions: ConsoleActions,
}

impl ActionRange {
    pub fn new(action: impl Into<String>, actions: ConsoleActions) -> Self {
        Self {
            action: action.into(),
            actions,
        }
    }
}

impl RangeHandler for ActionRange {
    fn on_change(&mut self, value: i32, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.actions.trigger(&self.action, "change", Some(value));
        Ok(())
    }
}

/// Keeps a mode active while held
pub struct ModeGate {
    mode: String,
}

impl ModeGate {
    pub fn new(mode: impl Into<String>) -> Self {
        Self { mode: mode.into() }
    }
}

impl GateHandler for ModeGate {
    fn on_open(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        ctx.activate_mode(&self.mode);
        Ok(())
    }

    fn on_close(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        ctx.deactivate_mode(&self.mode);
        Ok(())
    }
}

/// Switches to a view on press
pub struct ViewSelect {
    view: String,
}

impl ViewSelect {
    pub fn new(view: impl Into<String>) -> Self {
        Self { view: view.into() }
    }
}

impl ButtonHandler for ViewSelect {
    fn on_press(&mut self, _button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        ctx.activate_view(&self.view);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Button, Range, Toggle};
    use crate::control::Control;
    use crate::message::{Message, MidiMessage};
    use crate::output::MemorySink;
    use crate::scheduler::ManualClock;
    use crate::session::Session;
    use crate::view::ViewDefinition;

    fn note(key: u8, velocity: u8) -> Message {
        MidiMessage::note_on(0, 0, key, velocity).into()
    }

    #[test]
    fn test_trigger_counts_and_records() {
        let actions = ConsoleActions::new();
        let shared = actions.clone();

        actions.trigger("transport.play", "press", None);
        shared.trigger("mixer.volume", "change", Some(64));

        assert_eq!(actions.execution_count(), 2);
        let records = actions.records();
        assert_eq!(records[1].exec, 2);
        assert_eq!(records[1].value, Some(64));
        assert!(records[0].at <= records[1].at);
    }

    #[test]
    fn test_handlers_report_through_session() {
        let actions = ConsoleActions::new();
        let sink = MemorySink::new();
        let mut session = Session::with_clock(Box::new(sink.clone()), Box::new(ManualClock::new()));

        session
            .register_controls(vec![
                ("PLAY", Control::note(0, 0, 0x5E)),
                ("REC", Control::note(0, 0, 0x5F)),
                ("FADER", Control::pitch_bend(0, 0)),
                ("NEXT", Control::note(0, 0, 0x30)),
            ])
            .unwrap();

        let handlers = actions.clone();
        session
            .register_views(vec![
                ViewDefinition::new("MIX").with_components(move |v| {
                    v.add("play", &["PLAY"], Button::new(ActionButton::new("transport.play", handlers.clone())))?;
                    v.add("rec", &["REC"], Toggle::new(ActionToggle::new("transport.rec", handlers.clone())))?;
                    v.add("volume", &["FADER"], Range::new(ActionRange::new("mixer.volume", handlers)))?;
                    v.add("next", &["NEXT"], Button::new(ViewSelect::new("DEVICE")))
                }),
                ViewDefinition::new("DEVICE"),
            ])
            .unwrap();
        session.init().unwrap();
        session.activate_view("MIX").unwrap();

        session.on_midi_input(&note(0x5E, 127)).unwrap();
        session.on_midi_input(&note(0x5E, 0)).unwrap();
        session.on_midi_input(&note(0x5F, 127)).unwrap();
        session
            .on_midi_input(&MidiMessage::pitch_bend(0, 0, 4096).into())
            .unwrap();
        session.on_midi_input(&note(0x30, 127)).unwrap();

        assert_eq!(
            actions.summary(),
            vec![
                ("transport.play".to_string(), "press", None),
                ("transport.play".to_string(), "release", None),
                ("transport.rec".to_string(), "on", None),
                ("mixer.volume".to_string(), "change", Some(4096)),
            ]
        );
        assert_eq!(session.active_view(), Some("DEVICE"));
    }

    #[test]
    fn test_action_button_lights_while_held() {
        let sink = MemorySink::new();
        let mut session = Session::with_clock(Box::new(sink.clone()), Box::new(ManualClock::new()));
        session
            .register_controls(vec![("PLAY", Control::note(0, 0, 0x5E))])
            .unwrap();
        session
            .register_views(vec![ViewDefinition::new("MIX").with_components(|v| {
                v.add("play", &["PLAY"], Button::new(ActionButton::new("play", ConsoleActions::new())))
            })])
            .unwrap();
        session.init().unwrap();
        session.activate_view("MIX").unwrap();

        session.on_midi_input(&note(0x5E, 127)).unwrap();
        assert_eq!(session.control("PLAY").unwrap().state().value, 127);
        session.on_midi_input(&note(0x5E, 0)).unwrap();
        assert_eq!(session.control("PLAY").unwrap().state().value, 0);
    }
}
