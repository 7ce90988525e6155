// crates/kinoline-core/src/observer.rs
//
// Value/list subject with synchronous subscriber notification. No teacher
// file implements this exact pattern — velocut pushes state changes through
// egui's immediate-mode redraw loop instead of an observer — so this follows
// the teacher's general idiom (plain owned state, explicit methods, no
// framework) rather than any one source file.
//
// Single-threaded by design: the player serializes all state transitions
// onto whichever thread calls `set_if_changed` (its own tick thread, or the
// caller's thread for direct setters). Subscribers must not mutate the
// subject they're subscribed to from inside their callback.

use std::cell::RefCell;
use std::rc::Rc;

struct Subscriber<T> {
    id: u64,
    callback: Box<dyn Fn(&T)>,
}

/// A handle whose destruction removes the subscriber it was issued for.
pub struct Subscription<T> {
    id: u64,
    subscribers: Rc<RefCell<Vec<Subscriber<T>>>>,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.subscribers.borrow_mut().retain(|s| s.id != self.id);
    }
}

/// Holds a current value of `T`; notifies subscribers synchronously whenever
/// `set_if_changed` observes a change.
pub struct ValueSubject<T> {
    value: RefCell<T>,
    subscribers: Rc<RefCell<Vec<Subscriber<T>>>>,
    next_id: RefCell<u64>,
}

impl<T: PartialEq + Clone> ValueSubject<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            subscribers: Rc::new(RefCell::new(Vec::new())),
            next_id: RefCell::new(0),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Update the value and notify subscribers iff `v != current`.
    pub fn set_if_changed(&self, v: T) -> bool {
        let changed = *self.value.borrow() != v;
        if changed {
            *self.value.borrow_mut() = v;
            let current = self.value.borrow().clone();
            for s in self.subscribers.borrow().iter() {
                (s.callback)(&current);
            }
        }
        changed
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription<T> {
        let id = {
            let mut n = self.next_id.borrow_mut();
            let id = *n;
            *n += 1;
            id
        };
        self.subscribers.borrow_mut().push(Subscriber { id, callback: Box::new(callback) });
        Subscription { id, subscribers: Rc::clone(&self.subscribers) }
    }
}

/// Same contract as `ValueSubject`, specialized for list-shaped state
/// (`cached_frames`) where equality is list equality.
pub struct ListSubject<T> {
    inner: ValueSubject<Vec<T>>,
}

impl<T: PartialEq + Clone> ListSubject<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { inner: ValueSubject::new(items) }
    }

    pub fn get(&self) -> Vec<T> {
        self.inner.get()
    }

    pub fn set_if_changed(&self, items: Vec<T>) -> bool {
        self.inner.set_if_changed(items)
    }

    pub fn subscribe(&self, callback: impl Fn(&Vec<T>) + 'static) -> Subscription<Vec<T>> {
        self.inner.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn notifies_only_on_change() {
        let subject = ValueSubject::new(1);
        let calls = Rc::new(Cell::new(0));
        let calls2 = Rc::clone(&calls);
        let _sub = subject.subscribe(move |_| calls2.set(calls2.get() + 1));

        assert!(!subject.set_if_changed(1));
        assert_eq!(calls.get(), 0);

        assert!(subject.set_if_changed(2));
        assert_eq!(calls.get(), 1);

        assert!(!subject.set_if_changed(2));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn dropping_subscription_stops_notifications() {
        let subject = ValueSubject::new(0);
        let calls = Rc::new(Cell::new(0));
        let calls2 = Rc::clone(&calls);
        let sub = subject.subscribe(move |_| calls2.set(calls2.get() + 1));
        subject.set_if_changed(1);
        assert_eq!(calls.get(), 1);
        drop(sub);
        subject.set_if_changed(2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn list_subject_equality_is_list_equality() {
        let list = ListSubject::new(vec![1, 2, 3]);
        assert!(!list.set_if_changed(vec![1, 2, 3]));
        assert!(list.set_if_changed(vec![1, 2]));
    }
}
