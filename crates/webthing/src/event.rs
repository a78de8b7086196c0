use std::borrow::Cow;
use std::collections::VecDeque;

use serde::Serialize;

use crate::schema::DataSchema;
use crate::thing::Link;
use crate::value::PropertyValue;

// Default number of events retained by a thing.
pub(crate) const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 16;

/// Returns the current UTC time formatted as `YYYY-mm-ddTHH:MM:SS+00:00`.
#[must_use]
pub fn timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S+00:00")
        .to_string()
}

/// The data of an occurred event, without its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDescription {
    /// Event data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PropertyValue>,
    /// Time of the occurrence.
    pub timestamp: String,
}

/// An event which occurred on a thing.
///
/// Events are immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: Cow<'static, str>,
    data: Option<PropertyValue>,
    timestamp: String,
}

impl Event {
    /// Creates an [`Event`] timestamped now.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, data: Option<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp: timestamp(),
        }
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the event data.
    #[must_use]
    pub const fn data(&self) -> Option<&PropertyValue> {
        self.data.as_ref()
    }

    /// Returns the event timestamp.
    #[must_use]
    pub fn time(&self) -> &str {
        &self.timestamp
    }

    /// Returns the [`EventDescription`].
    #[must_use]
    pub fn as_event_description(&self) -> EventDescription {
        EventDescription {
            data: self.data.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// An event made available by a thing, as it appears in the thing
/// description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableEventDescription {
    /// Event data schema.
    #[serde(flatten)]
    pub schema: DataSchema,
    /// Event links.
    pub links: Vec<Link>,
}

/// A bounded queue of events.
///
/// When full, the oldest event is dropped to make room for the new one.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_QUEUE_CAPACITY)
    }
}

impl EventQueue {
    /// Creates an [`EventQueue`] retaining at most `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the maximum number of retained events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Checks whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Pushes an event to the tail, returning the evicted event if the
    /// queue was full.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.events.len() == self.capacity {
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Iterates over queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}
