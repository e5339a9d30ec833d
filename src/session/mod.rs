//! Session
//!
//! The one context object that owns every control, view and component, the
//! active view, the mode stack, timers and the output queue. The host drives
//! it through [`Session::init`], [`Session::on_midi_input`],
//! [`Session::run_due_timers`], [`Session::flush`] and [`Session::exit`].

pub mod events;
pub mod modes;


use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::component::{
    Component, ComponentContext, ComponentId, ComponentSlot, SessionCommand, UpdateQueue,
};
use crate::control::{Control, ControlId, InputOutcome};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::output::{MidiSink, OutputDispatcher};
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::view::{self, View, ViewBuilder, ViewDefinition, ViewId};

use events::{EventKind, EventTable, SessionEvent};
use modes::ModeStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before `init`; registrations are deferred
    Loading,
    /// Inside `init`
    Init,
    Running,
    Exited,
}

pub struct Session {
    phase: Phase,

    controls: Vec<Control>,
    control_index: HashMap<String, ControlId>,
    controls_requested: bool,
    pending_controls: Option<Vec<(String, Control)>>,

    views: Vec<View>,
    view_index: HashMap<String, ViewId>,
    views_requested: bool,
    pending_views: Option<Vec<ViewDefinition>>,

    components: Vec<ComponentSlot>,
    active_view: Option<ViewId>,
    modes: ModeStack,

    events: EventTable,
    scheduler: Scheduler,
    output: OutputDispatcher,
    commands: Vec<SessionCommand>,
    updates: UpdateQueue,
}

impl Session {
    pub fn new(sink: Box<dyn MidiSink>) -> Self {
        Self::with_clock(sink, Box::new(SystemClock))
    }

    pub fn with_clock(sink: Box<dyn MidiSink>, clock: Box<dyn Clock>) -> Self {
        Self {
            phase: Phase::Loading,
            controls: Vec::new(),
            control_index: HashMap::new(),
            controls_requested: false,
            pending_controls: None,
            views: Vec::new(),
            view_index: HashMap::new(),
            views_requested: false,
            pending_views: None,
            components: Vec::new(),
            active_view: None,
            modes: ModeStack::new(),
            events: EventTable::default(),
            scheduler: Scheduler::new(clock),
            output: OutputDispatcher::new(sink),
            commands: Vec::new(),
            updates: UpdateQueue::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    // registration

    /// Register every control of the surface; allowed once
    ///
    /// Committed right away once `init` has started, otherwise held until
    /// then. Duplicate names or any pair of conflicting patterns fail the
    /// whole registration.
    pub fn register_controls<I, N>(&mut self, controls: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, Control)>,
        N: Into<String>,
    {
        if self.controls_requested {
            return Err(Error::ControlsAlreadyRegistered);
        }
        self.controls_requested = true;

        let controls: Vec<(String, Control)> = controls
            .into_iter()
            .map(|(name, control)| (name.into(), control))
            .collect();

        if self.phase == Phase::Loading {
            debug!("Deferring registration of {} controls until init", controls.len());
            self.pending_controls = Some(controls);
            return Ok(());
        }
        self.commit_controls(controls)?;
        self.apply_commands()
    }

    /// Register every view; allowed once, committed after the controls
    pub fn register_views(&mut self, views: Vec<ViewDefinition>) -> Result<()> {
        if self.views_requested {
            return Err(Error::ViewsAlreadyRegistered);
        }
        self.views_requested = true;

        if self.phase == Phase::Loading || !self.controls_committed() {
            debug!("Deferring registration of {} views", views.len());
            self.pending_views = Some(views);
            return Ok(());
        }
        self.commit_views(views)?;
        self.apply_commands()
    }

    fn controls_committed(&self) -> bool {
        self.controls_requested && self.pending_controls.is_none()
    }

    fn commit_controls(&mut self, controls: Vec<(String, Control)>) -> Result<()> {
        let mut names = HashSet::new();
        for (name, _) in &controls {
            if !names.insert(name.as_str()) || self.control_index.contains_key(name) {
                return Err(Error::DuplicateControl(name.clone()));
            }
        }

        for (index, (first, a)) in controls.iter().enumerate() {
            for (second, b) in &controls[index + 1..] {
                for pa in a.patterns() {
                    if let Some(pb) = b.patterns().iter().find(|pb| pa.conflicts_with(pb)) {
                        return Err(Error::PatternConflict {
                            first: first.clone(),
                            second: second.clone(),
                            first_pattern: pa.to_string(),
                            second_pattern: pb.to_string(),
                        });
                    }
                }
            }
        }

        let count = controls.len();
        for (name, mut control) in controls {
            control.set_name(&name);
            self.control_index.insert(name, ControlId(self.controls.len()));
            self.controls.push(control);
        }
        info!("✅ Registered {} controls", count);

        if let Some(views) = self.pending_views.take() {
            self.commit_views(views)?;
        }
        Ok(())
    }

    fn commit_views(&mut self, mut definitions: Vec<ViewDefinition>) -> Result<()> {
        let existing: HashSet<String> = self.view_index.keys().cloned().collect();
        let order = view::resolution_order(&definitions, &existing)?;

        for index in order {
            let definition = &mut definitions[index];
            let view_id = ViewId(self.views.len());

            let parents = definition
                .parents()
                .iter()
                .map(|parent| {
                    self.view_index
                        .get(parent)
                        .copied()
                        .ok_or_else(|| Error::UnknownView(parent.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            let mut view = View::new(definition.name(), parents);

            let declared = match definition.take_init() {
                Some(init) => {
                    let mut builder = ViewBuilder::new(definition.name(), &self.control_index);
                    init(&mut builder)?;
                    builder.finish()
                }
                None => Vec::new(),
            };

            let mut created = Vec::with_capacity(declared.len());
            for component in declared {
                let id = ComponentId(self.components.len());
                for &control in &component.controls {
                    view.bind(&component.mode, control, id, self.controls[control.0].name())?;
                }
                self.components.push(ComponentSlot {
                    name: component.name,
                    mode: component.mode,
                    view: view_id,
                    controls: component.controls,
                    behaviour: Some(component.behaviour),
                });
                created.push(id);
            }

            debug!(
                "View \"{}\" initialised with {} components",
                definition.name(),
                created.len()
            );
            self.view_index.insert(definition.name().to_string(), view_id);
            self.views.push(view);

            for id in created {
                self.with_component(id, |component, ctx| component.on_init(ctx))?;
            }
        }

        info!("✅ Registered {} views", self.views.len());
        Ok(())
    }

    // lifecycle

    /// Host init hook: commit deferred registrations and notify listeners
    pub fn init(&mut self) -> Result<()> {
        if self.phase != Phase::Loading {
            warn!("⚠️  Session already initialised");
            return Ok(());
        }

        info!("🚀 Initialising session");
        self.phase = Phase::Init;

        if let Some(controls) = self.pending_controls.take() {
            self.commit_controls(controls)?;
        }
        self.emit(SessionEvent::Init)?;

        if self.controls_committed() {
            if let Some(views) = self.pending_views.take() {
                self.commit_views(views)?;
            }
        }
        if self.pending_views.is_some() {
            warn!("⚠️  Views are still waiting for controls to be registered");
        }

        self.phase = Phase::Running;
        self.apply_commands()
    }

    /// Host flush hook: deliver posted updates, notify listeners, then send
    /// everything queued in enqueue order
    pub fn flush(&mut self) -> Result<()> {
        loop {
            let next = self.updates.borrow_mut().pop_front();
            let Some((id, payload)) = next else {
                break;
            };
            self.with_component(id, |component, ctx| component.on_update(ctx, payload))?;
        }
        self.apply_commands()?;

        self.emit(SessionEvent::Flush)?;
        self.output.flush()?;
        Ok(())
    }

    /// Host exit hook: put every control back to its default state
    pub fn exit(&mut self) -> Result<()> {
        info!("Resetting {} controls", self.controls.len());
        for control in self.controls.iter_mut() {
            control.reset(&mut self.output)?;
        }

        self.emit(SessionEvent::Exit)?;
        self.output.flush()?;
        self.phase = Phase::Exited;
        Ok(())
    }

    /// Subscribe to a lifecycle event
    pub fn on<F>(&mut self, kind: EventKind, listener: F)
    where
        F: FnMut(&mut Session, &SessionEvent) -> Result<()> + 'static,
    {
        self.events.add(kind, Box::new(listener));
    }

    fn emit(&mut self, event: SessionEvent) -> Result<()> {
        let kind = event.kind();
        let mut listeners = self.events.take(kind);
        let result = listeners
            .iter_mut()
            .try_for_each(|listener| listener(self, &event));
        self.events.restore(kind, listeners);
        result
    }

    // input

    /// Route an inbound message to the control whose pattern matches first
    pub fn on_midi_input(&mut self, message: &Message) -> Result<()> {
        let index = self.controls.iter().position(|c| c.matches(message));

        debug!(
            "[MIDI] IN  {} ==> {} \"{}\"",
            message.port(),
            message.short_hex(),
            index.map_or("", |i| self.controls[i].name())
        );

        let Some(index) = index else {
            return Err(Error::UnmatchedMessage(message.hex()));
        };

        match self.controls[index].on_midi_input(message, &mut self.output)? {
            InputOutcome::Forward { component, input } => {
                let control = ControlId(index);
                self.with_component(component, |c, ctx| c.on_input(ctx, control, input))?;
                // Correct the hardware if the component left it out of sync
                self.controls[index].render(&mut self.output)?;
            }
            InputOutcome::Unmapped => {}
        }
        self.apply_commands()
    }

    /// Fire every timer whose deadline has passed
    pub fn run_due_timers(&mut self) -> Result<usize> {
        let due = self.scheduler.take_due();
        for &(owner, key) in &due {
            self.with_component(owner, |c, ctx| c.on_timer(ctx, key))?;
        }
        self.apply_commands()?;
        Ok(due.len())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    // views and modes

    pub fn activate_view(&mut self, name: &str) -> Result<()> {
        self.switch_view(name)?;
        self.apply_commands()
    }

    pub fn activate_mode(&mut self, mode: &str) -> Result<()> {
        self.push_mode(mode)?;
        self.apply_commands()
    }

    pub fn deactivate_mode(&mut self, mode: &str) -> Result<()> {
        self.pop_mode(mode)?;
        self.apply_commands()
    }

    fn switch_view(&mut self, name: &str) -> Result<()> {
        let id = *self
            .view_index
            .get(name)
            .ok_or_else(|| Error::UnknownView(name.to_string()))?;

        self.active_view = Some(id);
        info!("📄 Active view: {}", name);
        self.emit(SessionEvent::ActivateView(name.to_string()))?;
        self.associate_all()
    }

    fn push_mode(&mut self, mode: &str) -> Result<()> {
        self.modes.activate(mode)?;
        info!("Mode activated: {} (active: {:?})", mode, self.modes.active());
        self.emit(SessionEvent::ActivateMode(mode.to_string()))?;
        self.associate_all()
    }

    fn pop_mode(&mut self, mode: &str) -> Result<()> {
        if !self.modes.deactivate(mode)? {
            return Ok(());
        }
        info!("Mode deactivated: {} (active: {:?})", mode, self.modes.active());
        self.emit(SessionEvent::DeactivateMode(mode.to_string()))?;
        self.associate_all()
    }

    /// Run requests made by components until none are left
    fn apply_commands(&mut self) -> Result<()> {
        while !self.commands.is_empty() {
            for command in std::mem::take(&mut self.commands) {
                match command {
                    SessionCommand::ActivateView(name) => self.switch_view(&name)?,
                    SessionCommand::ActivateMode(mode) => self.push_mode(&mode)?,
                    SessionCommand::DeactivateMode(mode) => self.pop_mode(&mode)?,
                }
            }
        }
        Ok(())
    }

    pub fn active_view(&self) -> Option<&str> {
        self.active_view.map(|id| self.views[id.0].name())
    }

    /// `[most recent, ..., __BASE__]`
    pub fn active_modes(&self) -> Vec<&str> {
        self.modes.active()
    }

    pub fn mode_is_active(&self, mode: &str) -> bool {
        self.modes.contains(mode)
    }

    // association

    fn associate_all(&mut self) -> Result<()> {
        for index in 0..self.controls.len() {
            self.associate_control(ControlId(index))?;
        }
        Ok(())
    }

    fn associate_control(&mut self, control: ControlId) -> Result<()> {
        let target = self.active_view.and_then(|view| {
            let modes = self.modes.active();
            view::resolve_component(&self.views, view, control, &modes)
        });

        let previous = self.controls[control.0].active_component();
        if previous == target {
            return Ok(());
        }

        if let Some(previous) = previous {
            self.with_component(previous, |c, ctx| c.on_deactivate(ctx))?;
        }
        self.controls[control.0].set_active_component(target, &mut self.output)?;
        debug!(
            "Control \"{}\" now owned by {}",
            self.controls[control.0].name(),
            target
                .map(|id| self.components[id.0].name.as_str())
                .unwrap_or("nothing")
        );

        if let Some(target) = target {
            self.with_component(target, |c, ctx| c.on_activate(ctx))?;
            self.render_onto(target, control)?;
        }
        Ok(())
    }

    fn render_onto(&mut self, component: ComponentId, control: ControlId) -> Result<()> {
        let Some(behaviour) = self.components[component.0].behaviour.as_ref() else {
            return Ok(());
        };
        let patch = behaviour.get_output(&self.controls[control.0]);
        self.controls[control.0].set_state(patch, true, &mut self.output)
    }

    /// Run a component hook with access to the rest of the session
    fn with_component<F>(&mut self, id: ComponentId, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Component, &mut ComponentContext<'_>) -> Result<()>,
    {
        let slot = &mut self.components[id.0];
        let Some(mut behaviour) = slot.behaviour.take() else {
            warn!("⚠️  Component \"{}\" is already running, skipping", slot.name);
            return Ok(());
        };
        let bound = std::mem::take(&mut slot.controls);

        let result = {
            let mut ctx = ComponentContext {
                id,
                bound: &bound,
                controls: self.controls.as_mut_slice(),
                output: &mut self.output,
                scheduler: &mut self.scheduler,
                modes: &self.modes,
                commands: &mut self.commands,
                updates: &self.updates,
            };
            f(behaviour.as_mut(), &mut ctx)
        };

        let slot = &mut self.components[id.0];
        slot.behaviour = Some(behaviour);
        slot.controls = bound;
        result
    }

    // accessors

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.control_index.get(name).map(|id| &self.controls[id.0])
    }

    pub fn control_id(&self, name: &str) -> Option<ControlId> {
        self.control_index.get(name).copied()
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.view_index.get(name).map(|id| &self.views[id.0])
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component_name(&self, id: ComponentId) -> Option<&str> {
        self.components.get(id.0).map(|slot| slot.name.as_str())
    }

    /// Mode and view a component was declared in
    pub fn component_binding(&self, id: ComponentId) -> Option<(&str, &str)> {
        self.components
            .get(id.0)
            .map(|slot| (slot.mode.as_str(), self.views[slot.view.0].name()))
    }

    /// Name of the component currently owning the named control
    pub fn owner_of(&self, control: &str) -> Option<&str> {
        let id = self.control(control)?.active_component()?;
        self.component_name(id)
    }

    pub fn output(&self) -> &OutputDispatcher {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputDispatcher {
        &mut self.output
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.count(kind)
    }
}
