// Kbstate Signals
// In-process multi-subscriber notification feeds

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// Handle returned by [`Signal::subscribe`], used to cancel the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;

/// A typed broadcast feed.
///
/// Listeners are called synchronously, in subscription order. Listeners may
/// subscribe or unsubscribe (themselves or others) while the signal is being
/// emitted: a listener removed mid-emission is not called afterwards, and a
/// listener added mid-emission first sees the next emission.
pub struct Signal<T> {
    listeners: RefCell<IndexMap<SubscriptionId, Listener<T>>>,
    next_id: Cell<u64>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(IndexMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register a listener
    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(Box::new(listener))));
        id
    }

    /// Cancel a subscription
    ///
    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Deliver `value` to every listener
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(SubscriptionId, Listener<T>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if !self.listeners.borrow().contains_key(&id) {
                continue;
            }
            // A listener that re-emits its own signal is not re-entered
            if let Ok(mut callback) = listener.try_borrow_mut() {
                callback(value);
            }
        }
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listeners() {
        let signal: Signal<u32> = Signal::new();
        signal.emit(&1);
        assert!(signal.is_empty());
    }

    #[test]
    fn test_emit_in_subscription_order() {
        let signal: Signal<u32> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            signal.subscribe(move |value| log.borrow_mut().push(format!("{}{}", name, value)));
        }
        signal.emit(&7);

        assert_eq!(*log.borrow(), ["a7", "b7", "c7"]);
    }

    #[test]
    fn test_unsubscribe() {
        let signal: Signal<u32> = Signal::new();
        let count = Rc::new(Cell::new(0));

        let counter = Rc::clone(&count);
        let id = signal.subscribe(move |_| counter.set(counter.get() + 1));
        signal.emit(&0);
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(&0);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_unsubscribe_keeps_order_of_others() {
        let signal: Signal<u32> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            ids.push(signal.subscribe(move |_| log.borrow_mut().push(name)));
        }
        signal.unsubscribe(ids[0]);
        let log_d = Rc::clone(&log);
        signal.subscribe(move |_| log_d.borrow_mut().push("d"));
        signal.emit(&0);

        assert_eq!(*log.borrow(), ["b", "c", "d"]);
    }

    #[test]
    fn test_listener_removed_during_emit_is_skipped() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

        {
            let signal_ref = Rc::downgrade(&signal);
            let victim = Rc::clone(&victim);
            let log = Rc::clone(&log);
            signal.subscribe(move |_| {
                log.borrow_mut().push("first");
                if let (Some(signal), Some(id)) = (signal_ref.upgrade(), victim.get()) {
                    signal.unsubscribe(id);
                }
            });
        }
        let log_second = Rc::clone(&log);
        victim.set(Some(signal.subscribe(move |_| log_second.borrow_mut().push("second"))));

        signal.emit(&0);
        assert_eq!(*log.borrow(), ["first"]);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next_emit() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let count = Rc::new(Cell::new(0));

        {
            let signal_ref = Rc::downgrade(&signal);
            let count = Rc::clone(&count);
            let mut added = false;
            signal.subscribe(move |_| {
                if added {
                    return;
                }
                added = true;
                if let Some(signal) = signal_ref.upgrade() {
                    let count = Rc::clone(&count);
                    signal.subscribe(move |_| count.set(count.get() + 1));
                }
            });
        }

        signal.emit(&0);
        assert_eq!(count.get(), 0);
        signal.emit(&0);
        assert_eq!(count.get(), 1);
    }
}
