// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered listener lists with scope-based cancellation.
//!
//! Listeners are called synchronously, in subscription order. Each listener
//! can be removed on its own through its [`Subscription`], in groups through a
//! [`CancellationScope`], or all at once with [`ListenerList::clear`].

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

type Callback<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: u64,
    scope: Option<CancellationScope>,
    callback: Callback<T>,
}

impl<T> Entry<T> {
    fn is_live(&self) -> bool {
        self.scope
            .as_ref()
            .is_none_or(|scope| !scope.is_cancelled())
    }
}

struct Slots<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// A group of subscriptions that are cancelled together.
///
/// Cancelling is permanent; create a fresh scope to subscribe again.
#[derive(Clone, Default)]
pub struct CancellationScope {
    cancelled: Rc<Cell<bool>>,
}

impl fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationScope")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationScope {
    /// Creates a live scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every subscription registered against this scope.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Handle to one registered listener.
///
/// Dropping a `Subscription` leaves the listener attached; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

impl Subscription {
    /// Removes the listener. Has no effect if the list is gone.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// An ordered list of listeners for values of type `T`.
///
/// Cloning the list yields another handle to the same listeners.
pub struct ListenerList<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T> Clone for ListenerList<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<T> Default for ListenerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ListenerList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.len())
            .finish()
    }
}

impl<T: 'static> ListenerList<T> {
    /// Registers a listener with no scope.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.insert(None, Rc::new(callback))
    }

    /// Registers a listener that is dropped when `scope` is cancelled.
    pub fn subscribe_scoped(
        &self,
        scope: &CancellationScope,
        callback: impl Fn(&T) + 'static,
    ) -> Subscription {
        self.insert(Some(scope.clone()), Rc::new(callback))
    }

    fn insert(&self, scope: Option<CancellationScope>, callback: Callback<T>) -> Subscription {
        let id = {
            let mut slots = self.slots.borrow_mut();
            slots.entries.retain(Entry::is_live);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push(Entry {
                id,
                scope,
                callback,
            });
            id
        };
        let weak: Weak<RefCell<Slots<T>>> = Rc::downgrade(&self.slots);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots.borrow_mut().entries.retain(|entry| entry.id != id);
                }
            })),
        }
    }
}

impl<T> ListenerList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.is_live())
            .count()
    }

    /// Returns `true` if no live listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every live listener with `value`, in subscription order.
    ///
    /// Listeners may subscribe or unsubscribe while being notified; changes
    /// take effect from the next notification. A listener cancelled by an
    /// earlier listener in the same pass is skipped.
    pub fn notify(&self, value: &T) {
        let pending: Vec<(Option<CancellationScope>, Callback<T>)> = {
            let mut slots = self.slots.borrow_mut();
            slots.entries.retain(Entry::is_live);
            slots
                .entries
                .iter()
                .map(|entry| (entry.scope.clone(), entry.callback.clone()))
                .collect()
        };
        for (scope, callback) in pending {
            if scope.as_ref().is_some_and(CancellationScope::is_cancelled) {
                continue;
            }
            callback(value);
        }
    }

    /// Removes every listener at once.
    pub fn clear(&self) {
        self.slots.borrow_mut().entries.clear();
    }
}
