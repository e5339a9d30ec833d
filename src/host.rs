//! Host collaborators
//!
//! Components talk to the application they control through values that can be
//! observed, read and written. Nothing else of the host's object graph is
//! visible to the core.

use std::cell::RefCell;
use std::rc::Rc;

pub trait Observable<T> {
    fn add_observer(&self, callback: Box<dyn FnMut(&T)>);
    fn get(&self) -> T;
    fn set(&self, value: T);
}

struct Inner<T> {
    value: T,
    observers: Vec<Box<dyn FnMut(&T)>>,
}

/// In-process observable value
///
/// Clones share the same value and observers.
pub struct HostValue<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for HostValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone> HostValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                observers: Vec::new(),
            })),
        }
    }

    fn notify(&self, value: &T) {
        // Observers may read the value, so they run outside the borrow
        let mut observers = std::mem::take(&mut self.inner.borrow_mut().observers);
        for observer in observers.iter_mut() {
            observer(value);
        }

        let mut inner = self.inner.borrow_mut();
        observers.append(&mut inner.observers);
        inner.observers = observers;
    }
}

impl<T: Clone> Observable<T> for HostValue<T> {
    fn add_observer(&self, callback: Box<dyn FnMut(&T)>) {
        self.inner.borrow_mut().observers.push(callback);
    }

    fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    fn set(&self, value: T) {
        self.inner.borrow_mut().value = value.clone();
        self.notify(&value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observers_see_every_set() {
        let volume = HostValue::new(0.5f64);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let record = Rc::clone(&seen);
        volume.add_observer(Box::new(move |v| record.borrow_mut().push(*v)));

        volume.set(0.25);
        volume.set(1.0);
        assert_eq!(*seen.borrow(), vec![0.25, 1.0]);
        assert_eq!(volume.get(), 1.0);
    }

    #[test]
    fn test_observer_can_read_value() {
        let playing = HostValue::new(false);
        let reader = playing.clone();
        let seen = Rc::new(RefCell::new(None));

        let record = Rc::clone(&seen);
        playing.add_observer(Box::new(move |_| *record.borrow_mut() = Some(reader.get())));

        playing.set(true);
        assert_eq!(*seen.borrow(), Some(true));
    }
}
