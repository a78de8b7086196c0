use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::action::ActionDescription;
use crate::error::Result;
use crate::event::EventDescription;
use crate::value::PropertyValue;

/// A datum keyed by its name.
///
/// Serialized as a single-entry object, i.e. `{"brightness": 42}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Named<T> {
    /// Name.
    pub name: String,
    /// Datum.
    pub data: T,
}

impl<T> Named<T> {
    /// Creates a [`Named`] datum.
    #[inline]
    pub fn new(name: impl Into<String>, data: T) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl<T: Serialize> Serialize for Named<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.data)?;
        map.end()
    }
}

/// A message pushed by a thing to its subscribers.
///
/// Serialized as `{"messageType": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "messageType", content = "data", rename_all = "camelCase")]
pub enum ThingMessage {
    /// A property changed its value.
    PropertyStatus(Named<PropertyValue>),
    /// An event occurred.
    Event(Named<EventDescription>),
    /// An action changed its status.
    ActionStatus(Named<ActionDescription>),
}

impl ThingMessage {
    /// Serializes the message into a JSON text.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::error::ErrorKind::Serialization`] error on
    /// failure.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}
