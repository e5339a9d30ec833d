//! Continuous controls (faders, knobs)
//!
//! While the hardware is sending input, rendering is held back so a moving
//! fader is not pulled back to a stale value. The hold lasts for the input
//! delay after the last input; when it expires the current value is rendered.

use std::any::Any;
use std::time::Duration;

use crate::control::{Control, ControlId, ControlState, StatePatch};
use crate::error::Result;
use crate::scheduler::TimerKey;

use super::{Component, ComponentContext};

pub const DEFAULT_INPUT_DELAY: Duration = Duration::from_millis(350);

const INPUT_TIMER: TimerKey = "input";

#[allow(unused_variables)]
pub trait RangeHandler {
    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// The hardware moved to `value`
    fn on_change(&mut self, value: i32, ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// External value for the range; `Some` becomes the displayed value
    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, payload: Box<dyn Any>) -> Result<Option<i32>> {
        Ok(None)
    }
}

pub struct Range<H> {
    handler: H,
    value: i32,
    input_delay: Duration,
}

impl<H: RangeHandler> Range<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            value: 0,
            input_delay: DEFAULT_INPUT_DELAY,
        }
    }

    pub fn with_input_delay(mut self, delay: Duration) -> Self {
        self.input_delay = delay;
        self
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn render(&self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        if ctx.is_pending(INPUT_TIMER) {
            return Ok(());
        }
        ctx.render(self)
    }
}

impl<H: RangeHandler> Component for Range<H> {
    fn get_output(&self, control: &Control) -> StatePatch {
        StatePatch::value(self.value.clamp(control.min_value(), control.max_value()))
    }

    fn on_input(&mut self, ctx: &mut ComponentContext<'_>, control: ControlId, input: ControlState) -> Result<()> {
        ctx.schedule(INPUT_TIMER, self.input_delay);
        ctx.adopt_input(control, &input)?;
        self.value = input.value;
        self.handler.on_change(input.value, ctx)
    }

    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.handler.on_init(ctx)
    }

    fn on_timer(&mut self, ctx: &mut ComponentContext<'_>, key: TimerKey) -> Result<()> {
        if key == INPUT_TIMER {
            self.render(ctx)?;
        }
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, payload: Box<dyn Any>) -> Result<()> {
        if let Some(value) = self.handler.on_update(ctx, payload)? {
            self.value = value;
            self.render(ctx)?;
        }
        Ok(())
    }
}
