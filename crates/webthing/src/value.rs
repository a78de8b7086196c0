use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::observer::{ObserverToken, Observers};

/// All supported property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A [`bool`] value.
    Bool(bool),
    /// An integer value.
    Integer(i64),
    /// A floating point value.
    Number(f64),
    /// A characters sequence.
    String(String),
}

impl PropertyValue {
    /// Returns the schema type name associated with a [`PropertyValue`].
    #[must_use]
    pub const fn as_type(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Returns the value as a [`f64`], if numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Number(v) => Some(*v),
            Self::Bool(_) | Self::String(_) => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => v.fmt(f),
            Self::Integer(v) => v.fmt(f),
            Self::Number(v) => v.fmt(f),
            Self::String(v) => v.fmt(f),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

type Setter = Box<dyn Fn(&PropertyValue) -> Result<()> + Send + Sync>;

struct ValueInner {
    current: RwLock<PropertyValue>,
    setter: Option<Setter>,
    // Serializes every mutation, so listeners of a value never run
    // concurrently with themselves.
    update: Mutex<()>,
    listeners: Observers<PropertyValue>,
}

/// An observable property value.
///
/// Cloning a [`Value`] returns another handle to the same value, so a device
/// driver can keep a handle to push its own readings.
#[derive(Clone)]
pub struct Value(Arc<ValueInner>);

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("current", &self.get())
            .field("setter", &self.0.setter.is_some())
            .field("listeners", &self.0.listeners)
            .finish()
    }
}

impl Value {
    /// Creates a [`Value`] without a setter.
    #[must_use]
    #[inline]
    pub fn new(initial: impl Into<PropertyValue>) -> Self {
        Self::init(initial.into(), None)
    }

    /// Creates a [`Value`] which forwards every external write to the
    /// given setter before storing it.
    ///
    /// The setter rejects a value by returning an error, in that case the
    /// value is left unchanged.
    #[must_use]
    #[inline]
    pub fn with_setter<F>(initial: impl Into<PropertyValue>, setter: F) -> Self
    where
        F: Fn(&PropertyValue) -> Result<()> + Send + Sync + 'static,
    {
        Self::init(initial.into(), Some(Box::new(setter)))
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> PropertyValue {
        self.0
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets a new value.
    ///
    /// The setter runs first, then the value is stored and all listeners
    /// are notified in registration order before returning.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ValidationFailed`] error if the setter
    /// rejects the value, leaving it unchanged, or the first listener error
    /// once the value has been stored.
    pub fn set(&self, value: PropertyValue) -> Result<()> {
        let _update = self.0.update.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(setter) = &self.0.setter {
            setter(&value).map_err(|e| match e.kind() {
                ErrorKind::ValidationFailed => e,
                _ => Error::validation(e.info().to_owned()),
            })?;
        }
        self.store_and_notify(value)
    }

    /// Stores a value coming from the device itself, bypassing the setter.
    ///
    /// Listeners are notified as for [`Value::set`].
    ///
    /// # Errors
    ///
    /// Returns the first listener error.
    pub fn notify_of_external_update(&self, value: impl Into<PropertyValue>) -> Result<()> {
        let _update = self.0.update.lock().unwrap_or_else(PoisonError::into_inner);
        self.store_and_notify(value.into())
    }

    /// Registers a listener, called with every new value.
    ///
    /// Listeners must not write to the same value.
    pub fn observe<F>(&self, listener: F) -> ObserverToken
    where
        F: Fn(&PropertyValue) -> Result<()> + Send + Sync + 'static,
    {
        self.0.listeners.register(listener)
    }

    /// Removes a listener.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        self.0.listeners.unregister(token)
    }

    fn init(initial: PropertyValue, setter: Option<Setter>) -> Self {
        Self(Arc::new(ValueInner {
            current: RwLock::new(initial),
            setter,
            update: Mutex::new(()),
            listeners: Observers::new(),
        }))
    }

    fn store_and_notify(&self, value: PropertyValue) -> Result<()> {
        *self
            .0
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value.clone();
        self.0.listeners.notify(&value)
    }
}
