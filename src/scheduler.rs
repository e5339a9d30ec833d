//! Keyed timers
//!
//! Components never block. Anything that has to happen later (gesture windows,
//! input buffering) is a timer owned by a component and identified by a key.
//! Scheduling a key that is already pending replaces the old timer.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::component::ComponentId;

pub type TimerKey = &'static str;

/// Time source
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so tests keep a handle while the scheduler owns
/// another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Debug)]
struct Timer {
    owner: ComponentId,
    key: TimerKey,
    deadline: Instant,
    seq: u64,
}

pub struct Scheduler {
    clock: Box<dyn Clock>,
    timers: Vec<Timer>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Start (or restart) the timer `key` for `owner`
    pub fn schedule(&mut self, owner: ComponentId, key: TimerKey, delay: Duration) {
        self.cancel(owner, key);
        self.timers.push(Timer {
            owner,
            key,
            deadline: self.clock.now() + delay,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Returns true if a timer was pending
    pub fn cancel(&mut self, owner: ComponentId, key: TimerKey) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| !(t.owner == owner && t.key == key));
        self.timers.len() != before
    }

    pub fn is_pending(&self, owner: ComponentId, key: TimerKey) -> bool {
        self.timers.iter().any(|t| t.owner == owner && t.key == key)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Earliest deadline among pending timers
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Remove and return every timer whose deadline has passed,
    /// earliest first (ties in scheduling order)
    pub fn take_due(&mut self) -> Vec<(ComponentId, TimerKey)> {
        let now = self.clock.now();
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|t| t.deadline <= now);
        self.timers = pending;

        due.sort_by_key(|t| (t.deadline, t.seq));
        due.into_iter().map(|t| (t.owner, t.key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (Scheduler, ManualClock) {
        let clock = ManualClock::new();
        (Scheduler::new(Box::new(clock.clone())), clock)
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let (mut s, clock) = scheduler();
        let a = ComponentId(0);
        let b = ComponentId(1);

        s.schedule(a, "slow", Duration::from_millis(300));
        s.schedule(b, "fast", Duration::from_millis(100));
        assert!(s.take_due().is_empty());

        clock.advance(Duration::from_millis(100));
        assert_eq!(s.take_due(), vec![(b, "fast")]);

        clock.advance(Duration::from_millis(250));
        assert_eq!(s.take_due(), vec![(a, "slow")]);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_same_key_replaces() {
        let (mut s, clock) = scheduler();
        let owner = ComponentId(3);

        s.schedule(owner, "input", Duration::from_millis(100));
        clock.advance(Duration::from_millis(80));
        s.schedule(owner, "input", Duration::from_millis(100));
        assert_eq!(s.pending(), 1);

        clock.advance(Duration::from_millis(50));
        assert!(s.take_due().is_empty());
        clock.advance(Duration::from_millis(50));
        assert_eq!(s.take_due(), vec![(owner, "input")]);
    }

    #[test]
    fn test_cancel() {
        let (mut s, _clock) = scheduler();
        let owner = ComponentId(0);

        s.schedule(owner, "long-press", Duration::from_millis(350));
        assert!(s.is_pending(owner, "long-press"));
        assert!(s.cancel(owner, "long-press"));
        assert!(!s.cancel(owner, "long-press"));
        assert!(!s.is_pending(owner, "long-press"));
    }

    #[test]
    fn test_ties_keep_scheduling_order() {
        let (mut s, clock) = scheduler();
        let owner = ComponentId(0);

        s.schedule(owner, "long-press", Duration::from_millis(350));
        s.schedule(owner, "double-press", Duration::from_millis(350));
        clock.advance(Duration::from_millis(350));
        assert_eq!(
            s.take_due(),
            vec![(owner, "long-press"), (owner, "double-press")]
        );
    }
}
