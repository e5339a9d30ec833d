//! Button behaviours
//!
//! [`Button`] reports gestures, [`Toggle`] flips on every press and [`Gate`]
//! is on while held. All three light their controls at the control's maximum
//! value when on and at its minimum when off.

use std::any::Any;

use crate::control::{Color, Control, ControlId, ControlState, StatePatch};
use crate::error::Result;
use crate::scheduler::TimerKey;

use super::gesture::{Gesture, GestureAction, GestureConfig, GestureDetector, GestureTimer};
use super::{Component, ComponentContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub on: bool,
    pub color: Option<Color>,
}

impl ButtonState {
    fn output(&self, control: &Control) -> StatePatch {
        let value = if self.on {
            control.max_value()
        } else {
            control.min_value()
        };
        StatePatch::value(value).with_color(self.color)
    }
}

/// Gesture callbacks for a [`Button`]. Every method is optional.
#[allow(unused_variables)]
pub trait ButtonHandler {
    fn on_init(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_press(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_long_press(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_double_press(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_release(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_double_release(&mut self, button: &mut ButtonState, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// A value posted from outside, e.g. a host observer
    fn on_update(
        &mut self,
        button: &mut ButtonState,
        ctx: &mut ComponentContext<'_>,
        payload: Box<dyn Any>,
    ) -> Result<()> {
        Ok(())
    }
}

pub struct Button<H> {
    handler: H,
    state: ButtonState,
    detector: GestureDetector,
}

impl<H: ButtonHandler> Button<H> {
    pub fn new(handler: H) -> Self {
        Self::with_gestures(handler, GestureConfig::default())
    }

    pub fn with_gestures(handler: H, config: GestureConfig) -> Self {
        Self {
            handler,
            state: ButtonState::default(),
            detector: GestureDetector::new(config),
        }
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn apply(&mut self, ctx: &mut ComponentContext<'_>, actions: Vec<GestureAction>) -> Result<()> {
        let before = self.state;

        for action in actions {
            match action {
                GestureAction::Schedule(timer, delay) => ctx.schedule(timer.key(), delay),
                GestureAction::Cancel(timer) => {
                    ctx.cancel(timer.key());
                }
                GestureAction::Emit(gesture) => {
                    let state = &mut self.state;
                    match gesture {
                        Gesture::Press => self.handler.on_press(state, ctx)?,
                        Gesture::Release => self.handler.on_release(state, ctx)?,
                        Gesture::LongPress => self.handler.on_long_press(state, ctx)?,
                        Gesture::DoublePress => self.handler.on_double_press(state, ctx)?,
                        Gesture::DoubleRelease => self.handler.on_double_release(state, ctx)?,
                    }
                }
            }
        }

        if self.state != before {
            ctx.render(&*self)?;
        }
        Ok(())
    }
}

impl<H: ButtonHandler> Component for Button<H> {
    fn get_output(&self, control: &Control) -> StatePatch {
        self.state.output(control)
    }

    fn on_input(&mut self, ctx: &mut ComponentContext<'_>, _control: ControlId, input: ControlState) -> Result<()> {
        let actions = self.detector.input(input.value);
        self.apply(ctx, actions)
    }

    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.handler.on_init(&mut self.state, ctx)
    }

    fn on_timer(&mut self, ctx: &mut ComponentContext<'_>, key: TimerKey) -> Result<()> {
        match GestureTimer::from_key(key) {
            Some(timer) => {
                let actions = self.detector.timeout(timer);
                self.apply(ctx, actions)
            }
            None => Ok(()),
        }
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, payload: Box<dyn Any>) -> Result<()> {
        let before = self.state;
        self.handler.on_update(&mut self.state, ctx, payload)?;
        if self.state != before {
            ctx.render(&*self)?;
        }
        Ok(())
    }
}

/// Callbacks for a [`Toggle`]
#[allow(unused_variables)]
pub trait ToggleHandler {
    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_toggle_on(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_toggle_off(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// External value for the toggle; `Some` overrides the on state
    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, payload: Box<dyn Any>) -> Result<Option<bool>> {
        Ok(None)
    }
}

/// Flips on each press
pub struct Toggle<H> {
    handler: H,
    state: ButtonState,
}

impl<H: ToggleHandler> Toggle<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            state: ButtonState::default(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.state.color = Some(color);
        self
    }

    pub fn is_on(&self) -> bool {
        self.state.on
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: ToggleHandler> Component for Toggle<H> {
    fn get_output(&self, control: &Control) -> StatePatch {
        self.state.output(control)
    }

    fn on_input(&mut self, ctx: &mut ComponentContext<'_>, _control: ControlId, input: ControlState) -> Result<()> {
        if input.value <= 0 {
            return Ok(());
        }

        self.state.on = !self.state.on;
        if self.state.on {
            self.handler.on_toggle_on(ctx)?;
        } else {
            self.handler.on_toggle_off(ctx)?;
        }
        ctx.render(&*self)
    }

    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.handler.on_init(ctx)
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, payload: Box<dyn Any>) -> Result<()> {
        if let Some(on) = self.handler.on_update(ctx, payload)? {
            if on != self.state.on {
                self.state.on = on;
                ctx.render(&*self)?;
            }
        }
        Ok(())
    }
}

/// Callbacks for a [`Gate`]
#[allow(unused_variables)]
pub trait GateHandler {
    fn on_open(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_close(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// On while held
pub struct Gate<H> {
    handler: H,
    state: ButtonState,
}

impl<H: GateHandler> Gate<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            state: ButtonState::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.on
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: GateHandler> Component for Gate<H> {
    fn get_output(&self, control: &Control) -> StatePatch {
        self.state.output(control)
    }

    fn on_input(&mut self, ctx: &mut ComponentContext<'_>, _control: ControlId, input: ControlState) -> Result<()> {
        let open = input.value > 0;
        if open == self.state.on {
            return Ok(());
        }

        self.state.on = open;
        if open {
            self.handler.on_open(ctx)?;
        } else {
            self.handler.on_close(ctx)?;
        }
        ctx.render(&*self)
    }
}
