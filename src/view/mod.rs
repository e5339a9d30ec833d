//! Views
//!
//! A view binds components to controls, per mode. Views may extend other
//! views; the extension graph must be acyclic and is resolved parents first.
//! A view is declared with a [`ViewDefinition`], validated once all of its
//! parents are, and initialised exactly once by the session.

use std::collections::{HashMap, HashSet};

use crate::component::{Component, ComponentId};
use crate::control::ControlId;
use crate::error::{Error, Result};
use crate::BASE_MODE;

/// Index of a registered view inside its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub usize);

type ViewInit = Box<dyn FnOnce(&mut ViewBuilder<'_>) -> Result<()>>;

/// Declaration of a view before registration
pub struct ViewDefinition {
    name: String,
    extends: Vec<String>,
    init: Option<ViewInit>,
}

impl ViewDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
            init: None,
        }
    }

    /// Add a parent, consulted after this view in declaration order
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }

    /// Closure run once at initialisation to create the view's components
    pub fn with_components<F>(mut self, init: F) -> Self
    where
        F: FnOnce(&mut ViewBuilder<'_>) -> Result<()> + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[String] {
        &self.extends
    }

    pub(crate) fn take_init(&mut self) -> Option<ViewInit> {
        self.init.take()
    }
}

/// A component waiting to be registered by the session
pub(crate) struct DeclaredComponent {
    pub name: String,
    pub mode: String,
    pub controls: Vec<ControlId>,
    pub behaviour: Box<dyn Component>,
}

/// Collects a view's components during initialisation
pub struct ViewBuilder<'a> {
    view: &'a str,
    control_index: &'a HashMap<String, ControlId>,
    declared: Vec<DeclaredComponent>,
}

impl<'a> ViewBuilder<'a> {
    pub(crate) fn new(view: &'a str, control_index: &'a HashMap<String, ControlId>) -> Self {
        Self {
            view,
            control_index,
            declared: Vec::new(),
        }
    }

    pub fn view_name(&self) -> &str {
        self.view
    }

    pub fn control(&self, name: &str) -> Result<ControlId> {
        self.control_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownControl(name.to_string()))
    }

    /// Bind `component` to `controls` in the base mode
    pub fn add<C: Component + 'static>(&mut self, name: &str, controls: &[&str], component: C) -> Result<()> {
        self.add_in_mode(BASE_MODE, name, controls, component)
    }

    pub fn add_in_mode<C: Component + 'static>(
        &mut self,
        mode: &str,
        name: &str,
        controls: &[&str],
        component: C,
    ) -> Result<()> {
        self.add_boxed(mode, name, controls, Box::new(component))
    }

    pub fn add_boxed(
        &mut self,
        mode: &str,
        name: &str,
        controls: &[&str],
        component: Box<dyn Component>,
    ) -> Result<()> {
        let controls = controls
            .iter()
            .map(|c| self.control(c))
            .collect::<Result<Vec<_>>>()?;

        self.declared.push(DeclaredComponent {
            name: name.to_string(),
            mode: mode.to_string(),
            controls,
            behaviour: component,
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<DeclaredComponent> {
        self.declared
    }
}

/// An initialised view
#[derive(Debug)]
pub struct View {
    name: String,
    parents: Vec<ViewId>,
    /// mode -> control -> component
    associations: HashMap<String, HashMap<ControlId, ComponentId>>,
}

impl View {
    pub(crate) fn new(name: &str, parents: Vec<ViewId>) -> Self {
        Self {
            name: name.to_string(),
            parents,
            associations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[ViewId] {
        &self.parents
    }

    /// Record a binding; a control can only be bound once per mode
    pub(crate) fn bind(&mut self, mode: &str, control: ControlId, component: ComponentId, control_name: &str) -> Result<()> {
        let bindings = self.associations.entry(mode.to_string()).or_default();
        if bindings.contains_key(&control) {
            return Err(Error::DuplicateRegistration {
                view: self.name.clone(),
                mode: mode.to_string(),
                control: control_name.to_string(),
            });
        }
        bindings.insert(control, component);
        Ok(())
    }

    /// Component bound to `control` in `mode` in this view only
    pub fn component_for(&self, control: ControlId, mode: &str) -> Option<ComponentId> {
        self.associations.get(mode)?.get(&control).copied()
    }

    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }
}

/// Find the owner of `control`: the first active mode with a binding in
/// `view`, otherwise the first parent (depth first) that has one
pub fn resolve_component(
    views: &[View],
    view: ViewId,
    control: ControlId,
    active_modes: &[&str],
) -> Option<ComponentId> {
    let current = &views[view.0];

    active_modes
        .iter()
        .find_map(|mode| current.component_for(control, mode))
        .or_else(|| {
            current
                .parents
                .iter()
                .find_map(|parent| resolve_component(views, *parent, control, active_modes))
        })
}

/// Check a single view against the set of already validated names
pub fn validate(definition: &ViewDefinition, validated: &HashSet<String>) -> Result<()> {
    match definition
        .extends
        .iter()
        .find(|parent| !validated.contains(*parent))
    {
        Some(parent) => Err(Error::ParentNotValidated {
            view: definition.name.clone(),
            parent: parent.clone(),
        }),
        None => Ok(()),
    }
}

/// Order in which `definitions` can be initialised, parents first
///
/// Views whose parents are pending are deferred to the next pass. When a pass
/// makes no progress the remaining views either extend an unknown view or
/// form a cycle.
pub fn resolution_order(definitions: &[ViewDefinition], existing: &HashSet<String>) -> Result<Vec<usize>> {
    let mut names = HashSet::new();
    for definition in definitions {
        if existing.contains(&definition.name) || !names.insert(definition.name.as_str()) {
            return Err(Error::DuplicateView(definition.name.clone()));
        }
    }

    let mut validated = existing.clone();
    let mut order = Vec::with_capacity(definitions.len());
    let mut remaining: Vec<usize> = (0..definitions.len()).collect();

    while !remaining.is_empty() {
        let before = remaining.len();

        remaining.retain(|&index| {
            let definition = &definitions[index];
            match validate(definition, &validated) {
                Ok(()) => {
                    validated.insert(definition.name.clone());
                    order.push(index);
                    false
                }
                Err(_) => true,
            }
        });

        if remaining.len() == before {
            for &index in &remaining {
                let definition = &definitions[index];
                if let Some(parent) = definition
                    .extends
                    .iter()
                    .find(|p| !validated.contains(*p) && !names.contains(p.as_str()))
                {
                    return Err(Error::UnknownView(parent.clone()));
                }
            }
            return Err(Error::CircularViewDependency {
                views: remaining
                    .iter()
                    .map(|&index| definitions[index].name.clone())
                    .collect(),
            });
        }
    }

    Ok(order)
}
