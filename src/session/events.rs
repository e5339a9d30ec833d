//! Lifecycle events and their listeners

use std::collections::HashMap;

use crate::error::Result;

use super::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    Flush,
    Exit,
    ActivateView,
    ActivateMode,
    DeactivateMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Init,
    Flush,
    Exit,
    ActivateView(String),
    ActivateMode(String),
    DeactivateMode(String),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Init => EventKind::Init,
            SessionEvent::Flush => EventKind::Flush,
            SessionEvent::Exit => EventKind::Exit,
            SessionEvent::ActivateView(_) => EventKind::ActivateView,
            SessionEvent::ActivateMode(_) => EventKind::ActivateMode,
            SessionEvent::DeactivateMode(_) => EventKind::DeactivateMode,
        }
    }
}

pub type Listener = Box<dyn FnMut(&mut Session, &SessionEvent) -> Result<()>>;

#[derive(Default)]
pub(crate) struct EventTable {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl EventTable {
    pub fn add(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Remove the listeners for `kind` so they can run against the session
    pub fn take(&mut self, kind: EventKind) -> Vec<Listener> {
        self.listeners.remove(&kind).unwrap_or_default()
    }

    /// Put listeners back ahead of any added while they ran
    pub fn restore(&mut self, kind: EventKind, mut listeners: Vec<Listener>) {
        let added = self.listeners.remove(&kind).unwrap_or_default();
        listeners.extend(added);
        self.listeners.insert(kind, listeners);
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}
