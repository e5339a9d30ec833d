//! Components
//!
//! A [`Component`] is the logical behaviour behind one or more controls. It
//! never touches wire bytes: it receives decoded control input, keeps its own
//! state, and says what each bound control should display through
//! [`Component::get_output`]. Everything else it may do (render, start timers,
//! switch views or modes) goes through the [`ComponentContext`] it is handed.

pub mod button;
pub mod gesture;
pub mod range;

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::control::{Control, ControlId, ControlState, StatePatch};
use crate::error::Result;
use crate::output::OutputDispatcher;
use crate::scheduler::{Scheduler, TimerKey};
use crate::session::modes::ModeStack;
use crate::view::ViewId;

pub use button::{Button, ButtonHandler, ButtonState, Gate, GateHandler, Toggle, ToggleHandler};
pub use gesture::{Gesture, GestureAction, GestureConfig, GestureDetector, GestureTimer};
pub use range::{Range, RangeHandler};

/// Index of a component inside its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

pub trait Component {
    /// What `control` should display given the current state
    fn get_output(&self, control: &Control) -> StatePatch;

    /// Decoded input from one of the bound controls
    fn on_input(
        &mut self,
        ctx: &mut ComponentContext<'_>,
        control: ControlId,
        input: ControlState,
    ) -> Result<()>;

    /// Runs once when the owning view initialises
    fn on_init(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// A control was just associated with this component
    fn on_activate(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// A control is about to be handed to another owner
    fn on_deactivate(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut ComponentContext<'_>, _key: TimerKey) -> Result<()> {
        Ok(())
    }

    /// A value posted through an [`UpdateSender`], delivered on flush
    fn on_update(&mut self, _ctx: &mut ComponentContext<'_>, _payload: Box<dyn Any>) -> Result<()> {
        Ok(())
    }
}

/// Requests a component makes of the session while it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    ActivateView(String),
    ActivateMode(String),
    DeactivateMode(String),
}

pub(crate) type UpdateQueue = Rc<RefCell<VecDeque<(ComponentId, Box<dyn Any>)>>>;

/// Posts values to a component from outside the session, e.g. a host
/// observer callback. Values are delivered on the next flush.
#[derive(Clone)]
pub struct UpdateSender {
    owner: ComponentId,
    queue: UpdateQueue,
}

impl UpdateSender {
    pub fn send<T: Any>(&self, value: T) {
        self.queue.borrow_mut().push_back((self.owner, Box::new(value)));
    }
}

/// A component as registered in a session
pub(crate) struct ComponentSlot {
    pub name: String,
    pub mode: String,
    pub view: ViewId,
    pub controls: Vec<ControlId>,
    /// Taken out while one of its hooks runs
    pub behaviour: Option<Box<dyn Component>>,
}

/// Session access handed to a component hook
pub struct ComponentContext<'a> {
    pub(crate) id: ComponentId,
    pub(crate) bound: &'a [ControlId],
    pub(crate) controls: &'a mut [Control],
    pub(crate) output: &'a mut OutputDispatcher,
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) modes: &'a ModeStack,
    pub(crate) commands: &'a mut Vec<SessionCommand>,
    pub(crate) updates: &'a UpdateQueue,
}

impl<'a> ComponentContext<'a> {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Controls bound to this component
    pub fn controls(&self) -> &[ControlId] {
        self.bound
    }

    pub fn control(&self, id: ControlId) -> &Control {
        &self.controls[id.0]
    }

    /// True if the control is currently associated with this component
    pub fn owns(&self, id: ControlId) -> bool {
        self.controls[id.0].active_component() == Some(self.id)
    }

    /// Push `component`'s output onto every bound control it currently owns
    pub fn render(&mut self, component: &dyn Component) -> Result<()> {
        for &id in self.bound {
            let control = &mut self.controls[id.0];
            if control.active_component() != Some(self.id) {
                continue;
            }
            let patch = component.get_output(control);
            control.set_state(patch, true, self.output)?;
        }
        Ok(())
    }

    /// Take `input` as the control's state without sending anything, for
    /// input the hardware is already showing
    pub fn adopt_input(&mut self, id: ControlId, input: &ControlState) -> Result<()> {
        let control = &mut self.controls[id.0];
        if control.active_component() != Some(self.id) {
            return Ok(());
        }
        let value = input.value.clamp(control.min_value(), control.max_value());
        control.set_state(StatePatch::value(value), false, self.output)
    }

    pub fn output(&mut self) -> &mut OutputDispatcher {
        self.output
    }

    pub fn now(&self) -> Instant {
        self.scheduler.now()
    }

    /// Start or restart this component's timer `key`
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.scheduler.schedule(self.id, key, delay);
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.scheduler.cancel(self.id, key)
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.scheduler.is_pending(self.id, key)
    }

    pub fn mode_is_active(&self, mode: &str) -> bool {
        self.modes.contains(mode)
    }

    /// Applied once the current hook returns
    pub fn activate_view(&mut self, name: &str) {
        self.commands.push(SessionCommand::ActivateView(name.to_string()));
    }

    pub fn activate_mode(&mut self, mode: &str) {
        self.commands.push(SessionCommand::ActivateMode(mode.to_string()));
    }

    pub fn deactivate_mode(&mut self, mode: &str) {
        self.commands.push(SessionCommand::DeactivateMode(mode.to_string()));
    }

    /// Handle for posting values back to this component
    pub fn updater(&self) -> UpdateSender {
        UpdateSender {
            owner: self.id,
            queue: Rc::clone(self.updates),
        }
    }
}
