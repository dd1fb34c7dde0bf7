//! Cairn Cell - Reactive State Cells
//!
//! A [`Cell`] is a single-writer, multi-reader state cell: it owns a
//! current value and republishes every new value to its subscribers, in
//! publish order. Subscribing yields the current value synchronously,
//! then every subsequent update; unsubscribing is idempotent and leaves
//! the cell and its other subscribers untouched.
//!
//! This is the explicit observable-cell replacement for event-driven
//! subscription chains: a broadcast node with a listener list and
//! explicit unsubscribe handles, rather than implicitly collected
//! listeners. Publishes may come from a different execution context than
//! reads (e.g. a background chain-sync task); the publish/subscribe
//! boundary is the only synchronized hand-off.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// A single-writer, multi-reader reactive value cell
pub struct Cell<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: RwLock<T>,
    subscribers: Mutex<Vec<SubscriberEntry<T>>>,
    next_id: AtomicU64,
}

struct SubscriberEntry<T> {
    id: u64,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    /// Create a cell holding `initial`
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Clone of the current value
    pub fn get(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the value and notify every subscriber
    ///
    /// The subscriber list is held across the value swap and the
    /// notifications, so concurrent publishers serialize and every
    /// subscriber sees updates in one global publish order — never a
    /// value older than one it has already received.
    pub fn publish(&self, value: T) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *self.inner.value.write().unwrap_or_else(|e| e.into_inner()) = value.clone();
        // Closed receivers are dropped on the way through.
        subscribers.retain(|entry| entry.tx.send(value.clone()).is_ok());
    }

    /// Register a subscriber
    ///
    /// The current value is already queued on the returned subscription,
    /// so the first [`Subscription::try_recv`] succeeds without awaiting.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            // Queue the current value inside the lock so no publish can
            // slip in between the snapshot and the registration.
            let _ = tx.send(self.inner.value.read().unwrap_or_else(|e| e.into_inner()).clone());
            subscribers.push(SubscriberEntry { id, tx });
        }
        Subscription {
            id,
            rx,
            cell: Arc::downgrade(&self.inner),
        }
    }

    /// Mutate the value in place and notify every subscriber
    ///
    /// The read-modify-write happens under the same locks as
    /// [`publish`](Cell::publish), so concurrent updaters serialize and
    /// no intermediate state is observable.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let value = {
            let mut value = self.inner.value.write().unwrap_or_else(|e| e.into_inner());
            f(&mut value);
            value.clone()
        };
        subscribers.retain(|entry| entry.tx.send(value.clone()).is_ok());
    }

    /// A non-owning handle to this cell
    ///
    /// Forwarding tasks hold these so a discarded cell can actually be
    /// dropped and its upstream subscription released.
    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell(Arc::downgrade(&self.inner))
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// A downstream cell that adopts every value published by `upstream`
    ///
    /// The downstream cell starts at the upstream's current value and
    /// republishes each later upstream value to its own subscribers. The
    /// forwarding task holds a non-owning subscription: it stops — and
    /// releases the upstream subscription slot — as soon as either end is
    /// discarded. Requires a tokio runtime.
    pub fn chain(upstream: &Cell<T>) -> Cell<T> {
        let mut sub = upstream.subscribe();
        // The initial value arrives via the constructor, not the channel.
        let initial = sub.try_recv().unwrap_or_else(|| upstream.get());
        let downstream = Cell::new(initial);
        let weak = downstream.downgrade();
        tokio::spawn(async move {
            while let Some(value) = sub.recv().await {
                let Some(cell) = weak.upgrade() else {
                    break;
                };
                cell.publish(value);
            }
            debug!("cell chain closed");
        });
        downstream
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.unsubscribe(id);
    }
}

impl<T> Inner<T> {
    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|entry| entry.id != id);
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("value", &*self.inner.value.read().unwrap_or_else(|e| e.into_inner()))
            .finish()
    }
}

/// Non-owning handle to a [`Cell`], in the manner of [`std::sync::Weak`]
pub struct WeakCell<T>(Weak<Inner<T>>);

impl<T> WeakCell<T> {
    /// The cell, if it is still alive
    pub fn upgrade(&self) -> Option<Cell<T>> {
        self.0.upgrade().map(|inner| Cell { inner })
    }
}

impl<T> Clone for WeakCell<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Handle to one subscriber registration
///
/// Dropping the handle unsubscribes. Explicit [`unsubscribe`] is
/// idempotent; values already queued remain readable afterwards.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    cell: Weak<Inner<T>>,
}

impl<T> Subscription<T> {
    /// Await the next value; `None` once unsubscribed and drained, or
    /// when the cell itself has been dropped
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value without awaiting, if one is queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving further notifications
    ///
    /// Safe to call any number of times; other subscribers and the
    /// upstream cell are unaffected.
    pub fn unsubscribe(&mut self) {
        if let Some(inner) = self.cell.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_yields_current_value_synchronously() {
        let cell = Cell::new(7u32);
        let mut sub = cell.subscribe();
        assert_eq!(sub.try_recv(), Some(7));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn updates_arrive_in_publish_order() {
        let cell = Cell::new(0u32);
        let mut sub = cell.subscribe();
        for v in 1..=5 {
            cell.publish(v);
        }
        let mut seen = Vec::new();
        while let Some(v) = sub.try_recv() {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_isolated() {
        let cell = Cell::new(0u32);
        let mut a = cell.subscribe();
        let mut b = cell.subscribe();
        assert_eq!(cell.subscriber_count(), 2);

        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(cell.subscriber_count(), 1);

        cell.publish(1);
        // a still drains what it had before unsubscribing, nothing newer.
        assert_eq!(a.try_recv(), Some(0));
        assert_eq!(a.try_recv(), None);
        // b is unaffected.
        assert_eq!(b.try_recv(), Some(0));
        assert_eq!(b.try_recv(), Some(1));
    }

    #[test]
    fn update_notifies_with_mutated_value() {
        let cell = Cell::new(vec![1u32, 2, 3]);
        let mut sub = cell.subscribe();
        cell.update(|v| v[1] = 9);
        assert_eq!(sub.try_recv(), Some(vec![1, 2, 3]));
        assert_eq!(sub.try_recv(), Some(vec![1, 9, 3]));
        assert_eq!(cell.get(), vec![1, 9, 3]);
    }

    #[test]
    fn dropping_subscription_releases_slot() {
        let cell = Cell::new(0u32);
        let sub = cell.subscribe();
        drop(sub);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn publish_from_another_thread_is_observed() {
        let cell = Cell::new(0u32);
        let mut sub = cell.subscribe();
        let writer = cell.clone();
        std::thread::spawn(move || writer.publish(42))
            .join()
            .unwrap();
        assert_eq!(sub.try_recv(), Some(0));
        assert_eq!(sub.try_recv(), Some(42));
    }

    #[tokio::test]
    async fn chained_cell_adopts_upstream_values() {
        let upstream = Cell::new(1u32);
        let downstream = Cell::chain(&upstream);
        assert_eq!(downstream.get(), 1);

        let mut sub = downstream.subscribe();
        assert_eq!(sub.try_recv(), Some(1));

        upstream.publish(2);
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(downstream.get(), 2);
    }

    #[tokio::test]
    async fn dropping_chained_cell_releases_upstream_capacity() {
        let upstream = Cell::new(0u32);
        let downstream = Cell::chain(&upstream);
        assert_eq!(upstream.subscriber_count(), 1);

        drop(downstream);
        upstream.publish(1);
        // The forwarding task notices the dead downstream on this wake-up
        // and drops its subscription.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(upstream.subscriber_count(), 0);
    }
}
