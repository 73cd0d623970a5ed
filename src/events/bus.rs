//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets process
//! engines and the daemon broadcast [`Event`]s to any number of subscribers.
//!
//! ## Key characteristics
//! - **Broadcast semantics**: all active subscribers receive a clone of each
//!   event.
//! - **Non-persistent**: events are lost if there are no active subscribers.
//!   This is intentional; the daemon operates fine unobserved.
//! - **Bounded capacity**: slow subscribers that lag more than the capacity
//!   receive `Lagged` and skip older items.

use tokio::sync::broadcast;

use super::event::Event;

/// Default ring-buffer capacity of the broadcast channel.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel for runtime events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at
    /// least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// Non-blocking; with no subscribers the event is dropped silently.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
