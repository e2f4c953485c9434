//! Typed in-process publish/subscribe for view coordination.
//!
//! Delivery is synchronous, on the publishing thread, to every subscriber
//! registered at the moment of the publish, in subscription order. Nothing is
//! buffered: a subscriber added after a publish never sees it. Dropping the
//! [`Subscription`] handle unsubscribes, so a view's callbacks cannot outlive
//! the view.
//!
//! Callbacks may subscribe, unsubscribe, or publish again while being
//! delivered to; the subscriber list is snapshotted before delivery.

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::model::TimeRange;

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    name: &'static str,
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(u64, Callback<T>)>>,
}

/// One named channel carrying payloads of type `T`.
pub struct Channel<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T: 'static> Channel<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Rc::new(Inner { name, next_id: Cell::new(0), subscribers: RefCell::new(Vec::new()) }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Register `callback`; it stays registered while the handle lives.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.subscribers.borrow_mut().push((id, Rc::new(callback)));

        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Deliver `payload` to current subscribers. Returns how many were called.
    pub fn publish(&self, payload: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        trace!(channel = self.inner.name, subscribers = snapshot.len(), "publish");
        for cb in &snapshot {
            cb(payload);
        }
        snapshot.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

/// Handle that keeps a callback registered. Unsubscribes on drop.
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Channels shared by the dashboard views.
#[derive(Clone)]
pub struct EventBus {
    time_domain: Channel<TimeRange>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self { time_domain: Channel::new("time-domain-changed") }
    }

    /// Published when the timeline brush moves; payload is `[start, end]`.
    #[must_use]
    pub fn time_domain(&self) -> &Channel<TimeRange> {
        &self.time_domain
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
