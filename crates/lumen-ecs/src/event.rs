//! Deferred messaging between systems.
//!
//! Producers push [`Event`]s at an entity through a transaction that declared
//! send-events access; the entity's [`EventInput`] component routes each event
//! name to the queues registered for it. The receiving system drains its queue
//! later, in its own transaction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::entity::Entity;

/// Payload carried by an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Bool(bool),
    Int(i64),
    Float(f64),
    Entity(Entity),
    Text(String),
}

impl From<bool> for EventData {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for EventData {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EventData {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for EventData {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Entity> for EventData {
    fn from(value: Entity) -> Self {
        Self::Entity(value)
    }
}

impl From<&str> for EventData {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EventData {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub source: Entity,
    pub data: EventData,
}

impl Event {
    pub fn new(name: impl Into<String>, source: Entity, data: impl Into<EventData>) -> Self {
        Self {
            name: name.into(),
            source,
            data: data.into(),
        }
    }
}

/// Shared handle to an [`EventQueue`].
pub type EventQueueRef = Arc<EventQueue>;

/// Bounded FIFO of undelivered events. Created with
/// [`World::new_event_queue`](crate::World::new_event_queue).
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> EventQueueRef {
        Arc::new(Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        })
    }

    /// Append an event. Returns `false` and drops it if the queue is full.
    pub(crate) fn push(&self, event: Event) -> bool {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            warn!(
                event = %event.name,
                capacity = self.capacity,
                "event queue full, dropping event"
            );
            return false;
        }
        events.push_back(event);
        true
    }

    pub(crate) fn poll(&self) -> Option<Event> {
        self.events.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Component routing incoming events, by name, to the queues registered for them.
#[derive(Debug, Default, Clone)]
pub struct EventInput {
    queues: HashMap<String, Vec<EventQueueRef>>,
}

impl EventInput {
    /// Deliver events named `event` to `queue`. Registering the same queue twice is a no-op.
    pub fn register(&mut self, event: impl Into<String>, queue: &EventQueueRef) {
        let queues = self.queues.entry(event.into()).or_default();
        if !queues.iter().any(|q| Arc::ptr_eq(q, queue)) {
            queues.push(Arc::clone(queue));
        }
    }

    pub fn unregister(&mut self, event: &str, queue: &EventQueueRef) {
        if let Some(queues) = self.queues.get_mut(event) {
            queues.retain(|q| !Arc::ptr_eq(q, queue));
            if queues.is_empty() {
                self.queues.remove(event);
            }
        }
    }

    pub fn is_registered(&self, event: &str) -> bool {
        self.queues.contains_key(event)
    }

    /// Push `event` to every queue registered for its name. Returns the number of queues reached.
    pub(crate) fn deliver(&self, event: &Event) -> usize {
        let Some(queues) = self.queues.get(&event.name) else {
            return 0;
        };
        queues
            .iter()
            .filter(|queue| queue.push(event.clone()))
            .count()
    }
}

/// Component exposing named analog signals (button states, axis values, ...).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SignalOutput {
    signals: HashMap<String, f64>,
}

impl SignalOutput {
    pub fn set_signal(&mut self, name: impl Into<String>, value: f64) {
        self.signals.insert(name.into(), value);
    }

    pub fn clear_signal(&mut self, name: &str) {
        self.signals.remove(name);
    }

    pub fn signal(&self, name: &str) -> Option<f64> {
        self.signals.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
