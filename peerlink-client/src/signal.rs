//! Typed observer lists
//!
//! A [`Signal`] is a FIFO list of subscriptions that lifecycle events are
//! published through. Subscriptions are persistent or one-shot, and a
//! one-shot can also be consumed through [`OnceListener`], the poll-side
//! form used when the caller wants to wait for the first emission instead
//! of installing a callback.
//!
//! Emission is reentrancy-safe: a callback may disconnect any subscription
//! (including itself) or add new ones. Subscriptions added during an emit
//! do not fire in that same emit, and removals during an emit are
//! tombstoned and swept once the outermost emit unwinds.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T)>;

struct Slot<T> {
    id: u64,
    once: bool,
    dead: bool,
    callback: Option<Callback<T>>,
}

struct Inner<T> {
    slots: Vec<Slot<T>>,
    next_id: u64,
    emit_depth: u32,
}

impl<T> Inner<T> {
    fn sweep(&mut self) {
        if self.emit_depth == 0 {
            self.slots.retain(|slot| !slot.dead);
        }
    }
}

/// FIFO observer list.
pub struct Signal<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Signal {
            inner: Rc::new(RefCell::new(Inner {
                slots: Vec::new(),
                next_id: 0,
                emit_depth: 0,
            })),
        }
    }

    fn register(&self, callback: Callback<T>, once: bool) -> Connection<T> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.push(Slot {
            id,
            once,
            dead: false,
            callback: Some(callback),
        });
        Connection {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Subscribe persistently. Subscribers fire in connect order.
    pub fn connect(&self, callback: impl FnMut(&T) + 'static) -> Connection<T> {
        self.register(Box::new(callback), false)
    }

    /// Subscribe for exactly one emission.
    pub fn once(&self, callback: impl FnMut(&T) + 'static) -> Connection<T> {
        self.register(Box::new(callback), true)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|slot| !slot.dead)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish a value to every subscriber in FIFO order.
    pub fn emit(&self, value: &T) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            inner.emit_depth += 1;
            inner.slots.len()
        };

        for index in 0..snapshot {
            // Take the callback out of its slot so the borrow is released
            // while user code runs; the slot keeps its identity meanwhile.
            let taken = {
                let mut inner = self.inner.borrow_mut();
                let slot = &mut inner.slots[index];
                if slot.dead {
                    None
                } else {
                    slot.callback.take().map(|cb| (cb, slot.id, slot.once))
                }
            };

            let Some((mut callback, id, once)) = taken else {
                continue;
            };
            callback(value);

            let mut inner = self.inner.borrow_mut();
            let slot = &mut inner.slots[index];
            debug_assert_eq!(slot.id, id);
            if once {
                slot.dead = true;
            } else if !slot.dead {
                slot.callback = Some(callback);
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.emit_depth -= 1;
        inner.sweep();
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.emit_depth == 0 {
            inner.slots.clear();
        } else {
            for slot in &mut inner.slots {
                slot.dead = true;
                slot.callback = None;
            }
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// One-shot subscription in poll form: the returned listener captures
    /// the first value emitted after this call.
    pub fn listen(&self) -> OnceListener<T> {
        let captured: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&captured);
        let connection = self.once(move |value: &T| {
            *sink.borrow_mut() = Some(value.clone());
        });
        OnceListener {
            captured,
            connection,
        }
    }
}

/// Handle to one subscription.
pub struct Connection<T> {
    inner: Weak<RefCell<Inner<T>>>,
    id: u64,
}

impl<T> Connection<T> {
    /// Remove the subscription. Safe during an emit; idempotent. Returns
    /// whether a live subscription was removed.
    pub fn disconnect(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = inner.borrow_mut();
        let Some(slot) = inner.slots.iter_mut().find(|slot| slot.id == self.id) else {
            return false;
        };
        if slot.dead {
            return false;
        }
        slot.dead = true;
        slot.callback = None;
        inner.sweep();
        true
    }
}

/// Poll-side handle for the first emission of a signal.
pub struct OnceListener<T> {
    captured: Rc<RefCell<Option<T>>>,
    connection: Connection<T>,
}

impl<T> OnceListener<T> {
    /// Whether a value has arrived.
    pub fn ready(&self) -> bool {
        self.captured.borrow().is_some()
    }

    /// Take the captured value, if any.
    pub fn take(&mut self) -> Option<T> {
        self.captured.borrow_mut().take()
    }

    /// Stop listening without consuming a value.
    pub fn cancel(self) {
        self.connection.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fifo_order() {
        let signal: Signal<u32> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in 0..3 {
            let log = Rc::clone(&log);
            signal.connect(move |value: &u32| log.borrow_mut().push((tag, *value)));
        }

        signal.emit(&7);
        assert_eq!(*log.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_once_fires_once() {
        let signal: Signal<()> = Signal::new();
        let count = Rc::new(RefCell::new(0));
        {
            let count = Rc::clone(&count);
            signal.once(move |_| *count.borrow_mut() += 1);
        }

        signal.emit(&());
        signal.emit(&());
        assert_eq!(*count.borrow(), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn test_subscription_during_emit_does_not_fire_same_emit() {
        let signal: Signal<()> = Signal::new();
        let count = Rc::new(RefCell::new(0));

        {
            let signal2 = signal.clone();
            let count = Rc::clone(&count);
            signal.connect(move |_| {
                let count = Rc::clone(&count);
                signal2.once(move |_| *count.borrow_mut() += 1);
            });
        }

        signal.emit(&());
        assert_eq!(*count.borrow(), 0);
        signal.emit(&());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_disconnect_during_emit() {
        let signal: Signal<()> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let victim: Rc<RefCell<Option<Connection<()>>>> = Rc::new(RefCell::new(None));
        {
            let log = Rc::clone(&log);
            let victim = Rc::clone(&victim);
            signal.connect(move |_| {
                log.borrow_mut().push("first");
                if let Some(conn) = victim.borrow().as_ref() {
                    conn.disconnect();
                }
            });
        }
        {
            let log = Rc::clone(&log);
            *victim.borrow_mut() = Some(signal.connect(move |_| log.borrow_mut().push("second")));
        }

        signal.emit(&());
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn test_self_disconnect_during_emit() {
        let signal: Signal<()> = Signal::new();
        let count = Rc::new(RefCell::new(0));

        let conn: Rc<RefCell<Option<Connection<()>>>> = Rc::new(RefCell::new(None));
        {
            let count = Rc::clone(&count);
            let conn2 = Rc::clone(&conn);
            *conn.borrow_mut() = Some(signal.connect(move |_| {
                *count.borrow_mut() += 1;
                if let Some(c) = conn2.borrow().as_ref() {
                    c.disconnect();
                }
            }));
        }

        signal.emit(&());
        signal.emit(&());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let signal: Signal<()> = Signal::new();
        let conn = signal.connect(|_| {});
        assert!(conn.disconnect());
        assert!(!conn.disconnect());
    }

    #[test]
    fn test_listener_captures_first_value() {
        let signal: Signal<i32> = Signal::new();
        let mut listener = signal.listen();
        assert!(!listener.ready());

        signal.emit(&41);
        signal.emit(&99);

        assert!(listener.ready());
        assert_eq!(listener.take(), Some(41));
        assert_eq!(listener.take(), None);
    }

    #[test]
    fn test_listener_registered_after_emit_misses_it() {
        let signal: Signal<i32> = Signal::new();
        signal.emit(&1);
        let listener = signal.listen();
        assert!(!listener.ready());
    }
}
