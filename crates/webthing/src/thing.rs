use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use log::{debug, info};

use serde::Serialize;

use crate::action::{
    Action, ActionHandler, ActionLog, ActionSchema, ActionStatus, AvailableActionDescription,
    run_handler,
};
use crate::error::{Error, ErrorKind, Result};
use crate::event::{AvailableEventDescription, Event, EventQueue};
use crate::message::{Named, ThingMessage};
use crate::observer::{ObserverToken, Observers};
use crate::property::{Property, PropertyDescription};
use crate::schema::DataSchema;
use crate::value::PropertyValue;

/// The context of every thing description.
pub const THING_CONTEXT: &str = "https://iot.mozilla.org/schemas";

/// The name of the security scheme used when no authentication is required.
pub const NO_SECURITY_SCHEME: &str = "nosec_sc";

/// Current property values, keyed by property name.
pub type PropertyValues = IndexMap<String, PropertyValue, DefaultHashBuilder>;

/// A link to a thing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Relation type.
    pub rel: Cow<'static, str>,
    /// Resource path or URL.
    pub href: String,
}

impl Link {
    /// Creates a [`Link`].
    #[must_use]
    #[inline]
    pub fn new(rel: impl Into<Cow<'static, str>>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }
}

/// A security scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityScheme {
    /// Scheme name.
    pub scheme: Cow<'static, str>,
}

/// A thing description.
///
/// A snapshot of a thing, including the current value of its properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingDescription {
    /// Description context.
    #[serde(rename = "@context")]
    pub context: Cow<'static, str>,
    /// Thing identifier.
    pub id: String,
    /// Thing title.
    pub title: String,
    /// Semantic type tags.
    #[serde(rename = "@type")]
    pub types: Vec<Cow<'static, str>>,
    /// Thing description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Properties.
    pub properties: IndexMap<String, PropertyDescription, DefaultHashBuilder>,
    /// Available actions.
    pub actions: IndexMap<String, AvailableActionDescription, DefaultHashBuilder>,
    /// Available events.
    pub events: IndexMap<String, AvailableEventDescription, DefaultHashBuilder>,
    /// Links to the thing resources.
    pub links: Vec<Link>,
    /// Thing path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Security schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_definitions: Option<IndexMap<Cow<'static, str>, SecurityScheme, DefaultHashBuilder>>,
    /// Active security scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Cow<'static, str>>,
}

impl ThingDescription {
    /// Sets the base URL.
    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the thing path.
    #[must_use]
    pub fn href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Appends a link.
    #[must_use]
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Marks the thing as accessible without authentication.
    #[must_use]
    pub fn no_security(mut self) -> Self {
        let mut definitions = IndexMap::with_hasher(DefaultHashBuilder::default());
        definitions.insert(
            Cow::Borrowed(NO_SECURITY_SCHEME),
            SecurityScheme {
                scheme: Cow::Borrowed("nosec"),
            },
        );
        self.security_definitions = Some(definitions);
        self.security = Some(Cow::Borrowed(NO_SECURITY_SCHEME));
        self
    }
}

struct AvailableAction {
    schema: ActionSchema,
    handler: ActionHandler,
}

/// A thing.
///
/// A device or service exposing properties, actions and events.
pub struct Thing {
    id: Cow<'static, str>,
    title: Cow<'static, str>,
    types: Vec<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    href_prefix: String,
    properties: IndexMap<String, (Property, ObserverToken), DefaultHashBuilder>,
    available_actions: IndexMap<String, AvailableAction, DefaultHashBuilder>,
    available_events: IndexMap<String, DataSchema, DefaultHashBuilder>,
    actions: Mutex<ActionLog>,
    events: Mutex<EventQueue>,
    observers: Arc<Observers<ThingMessage>>,
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("href_prefix", &self.href_prefix)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("actions", &self.available_actions.keys().collect::<Vec<_>>())
            .field("events", &self.available_events.keys().collect::<Vec<_>>())
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl Drop for Thing {
    fn drop(&mut self) {
        for (property, token) in self.properties.values() {
            property.value().remove_observer(*token);
        }
    }
}

impl Thing {
    /// Creates a [`Thing`] with the given identifier and title.
    #[must_use]
    pub fn new(id: impl Into<Cow<'static, str>>, title: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            types: Vec::new(),
            description: None,
            href_prefix: String::new(),
            properties: IndexMap::with_hasher(DefaultHashBuilder::default()),
            available_actions: IndexMap::with_hasher(DefaultHashBuilder::default()),
            available_events: IndexMap::with_hasher(DefaultHashBuilder::default()),
            actions: Mutex::new(ActionLog::default()),
            events: Mutex::new(EventQueue::default()),
            observers: Arc::new(Observers::new()),
        }
    }

    /// Sets the semantic type tags. i.e. `["OnOffSwitch", "Light"]`
    #[must_use]
    pub fn types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the maximum number of retained events.
    #[must_use]
    pub fn event_queue_capacity(self, capacity: usize) -> Self {
        *self.events() = EventQueue::with_capacity(capacity);
        self
    }

    /// Sets how long a terminated action is retained.
    #[must_use]
    pub fn action_retention(self, retention: Duration) -> Self {
        self.actions().set_retention(retention);
        self
    }

    /// Sets the maximum number of retained actions.
    #[must_use]
    pub fn action_log_capacity(self, capacity: usize) -> Self {
        self.actions().set_capacity(capacity);
        self
    }

    /// Returns the thing identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the thing title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the prefix of every thing resource path.
    ///
    /// Empty when the thing is served alone.
    #[must_use]
    pub fn href_prefix(&self) -> &str {
        &self.href_prefix
    }

    /// Returns the thing path.
    #[must_use]
    pub fn href(&self) -> &str {
        if self.href_prefix.is_empty() {
            "/"
        } else {
            &self.href_prefix
        }
    }

    /// Adds a property.
    ///
    /// Every change of the property value is pushed to the thing observers.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::DuplicateName`] error if a property with the
    /// same name already exists.
    pub fn add_property(&mut self, mut property: Property) -> Result<()> {
        if self.properties.contains_key(property.name()) {
            return Err(duplicate("property", property.name()));
        }

        property.set_href_prefix(&self.href_prefix);

        let name = property.name().to_owned();
        let observers = Arc::clone(&self.observers);
        let notified = name.clone();
        let token = property.value().observe(move |value: &PropertyValue| {
            observers.notify(&ThingMessage::PropertyStatus(Named::new(
                notified.clone(),
                value.clone(),
            )))
        });

        debug!("Thing `{}`: property `{name}` added", self.id);
        self.properties.insert(name, (property, token));
        Ok(())
    }

    /// Adds an available action, run by the given handler.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::DuplicateName`] error if an action with the
    /// same name already exists.
    pub fn add_available_action<F>(
        &mut self,
        name: impl Into<String>,
        schema: ActionSchema,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&Self, &Action) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.available_actions.contains_key(&name) {
            return Err(duplicate("action", &name));
        }

        debug!("Thing `{}`: action `{name}` added", self.id);
        self.available_actions.insert(
            name,
            AvailableAction {
                schema,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Adds an available event, whose data follow the given schema.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::DuplicateName`] error if an event with the
    /// same name already exists.
    pub fn add_available_event(&mut self, name: impl Into<String>, schema: DataSchema) -> Result<()> {
        let name = name.into();
        if self.available_events.contains_key(&name) {
            return Err(duplicate("event", &name));
        }

        debug!("Thing `{}`: event `{name}` added", self.id);
        self.available_events.insert(name, schema);
        Ok(())
    }

    /// Checks whether a property exists.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Retrieves a property by name.
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name).map(|(property, _)| property)
    }

    /// Returns the current value of a property.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<PropertyValue> {
        self.find_property(name).map(Property::get_value)
    }

    /// Returns the current value of every property.
    #[must_use]
    pub fn get_properties(&self) -> PropertyValues {
        self.properties
            .iter()
            .map(|(name, (property, _))| (name.clone(), property.get_value()))
            .collect()
    }

    /// Validates and sets a property value written by a client.
    ///
    /// On success the new value has already been pushed to every observer.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::NotFound`] error if the property does not
    /// exist, or the error raised by [`Property::set_value`].
    pub fn set_property(&self, name: &str, value: PropertyValue) -> Result<()> {
        let property = self
            .find_property(name)
            .ok_or_else(|| Error::not_found(format!("Property `{name}` not found")))?;
        property.set_value(value)
    }

    /// Requests an action.
    ///
    /// The input is validated and the action is recorded in the
    /// [`ActionStatus::Created`] status. It is run by
    /// [`Thing::perform_action`].
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::NotFound`] error if the action is not
    /// available, or an [`ErrorKind::ValidationFailed`] error if the input
    /// does not satisfy the action schema.
    pub fn request_action(
        &self,
        name: &str,
        input: Option<&serde_json::Value>,
    ) -> Result<Arc<Action>> {
        let available = self
            .available_actions
            .get(name)
            .ok_or_else(|| Error::not_found(format!("Action `{name}` not found")))?;

        let input = available.schema.validate(input)?;
        let action = Arc::new(Action::new(name, input, &self.href_prefix));
        info!(
            "Thing `{}`: action `{name}` ({}) requested",
            self.id,
            action.id()
        );

        self.actions().insert(Arc::clone(&action));
        self.notify_action(&action);
        Ok(action)
    }

    /// Marks an action as handed to an execution context.
    pub fn start_action(&self, action: &Action) {
        if action.transition(ActionStatus::Pending, None) {
            self.notify_action(action);
        }
    }

    /// Runs the handler of an action, blocking until it returns.
    ///
    /// The action is started first if needed, then moved to a terminal
    /// status according to the handler outcome.
    pub fn perform_action(&self, action: &Action) -> ActionStatus {
        if action.status() == ActionStatus::Created {
            self.start_action(action);
        }

        let Some(available) = self.available_actions.get(action.name()) else {
            self.fail_action(action, "The action is no longer available");
            return action.status();
        };

        let status = run_handler(&available.handler, self, action);
        info!(
            "Thing `{}`: action `{}` ({}) {status}",
            self.id,
            action.name(),
            action.id()
        );
        self.notify_action(action);
        status
    }

    /// Moves an action to the [`ActionStatus::Error`] status.
    ///
    /// Used when the execution context fails before the handler returns.
    pub fn fail_action(&self, action: &Action, cause: impl Into<String>) {
        if action.transition(ActionStatus::Error, Some(cause.into())) {
            self.notify_action(action);
        }
    }

    /// Retrieves a requested action.
    #[must_use]
    pub fn get_action(&self, name: &str, id: &str) -> Option<Arc<Action>> {
        self.actions().get(name, id)
    }

    /// Returns the requested actions, in request order.
    ///
    /// When a name is given, only the actions with that name are returned.
    #[must_use]
    pub fn get_actions(&self, name: Option<&str>) -> Vec<Arc<Action>> {
        self.actions().list(name)
    }

    /// Removes a requested action.
    ///
    /// A running action is not interrupted, it is only forgotten.
    pub fn remove_action(&self, name: &str, id: &str) -> bool {
        let removed = self.actions().remove(name, id).is_some();
        if removed {
            debug!("Thing `{}`: action `{name}` ({id}) removed", self.id);
        }
        removed
    }

    /// Checks whether an action is available.
    #[must_use]
    pub fn has_available_action(&self, name: &str) -> bool {
        self.available_actions.contains_key(name)
    }

    /// Checks whether an event is available.
    #[must_use]
    pub fn has_available_event(&self, name: &str) -> bool {
        self.available_events.contains_key(name)
    }

    /// Adds an occurred event and pushes it to every observer.
    ///
    /// When the event queue is full, the oldest event is dropped.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::NotFound`] error if the event is not
    /// available, an [`ErrorKind::ValidationFailed`] error if its data do
    /// not satisfy the event schema, or an [`ErrorKind::Listener`] error if
    /// an observer failed.
    pub fn add_event(&self, event: Event) -> Result<()> {
        let schema = self
            .available_events
            .get(event.name())
            .ok_or_else(|| Error::not_found(format!("Event `{}` not found", event.name())))?;

        if let Some(data) = event.data() {
            schema.validate(data.clone()).map_err(|e| {
                Error::validation(format!("Invalid data for `{}`: {}", event.name(), e.info()))
            })?;
        }

        let message = ThingMessage::Event(Named::new(event.name(), event.as_event_description()));
        if let Some(evicted) = self.events().push(event) {
            debug!(
                "Thing `{}`: event `{}` dropped from the queue",
                self.id,
                evicted.name()
            );
        }
        self.observers.notify(&message)
    }

    /// Returns the queued events, oldest first.
    ///
    /// When a name is given, only the events with that name are returned.
    #[must_use]
    pub fn get_events(&self, name: Option<&str>) -> Vec<Event> {
        self.events()
            .iter()
            .filter(|event| name.is_none_or(|name| event.name() == name))
            .cloned()
            .collect()
    }

    /// Registers an observer of every message produced by the thing.
    pub fn subscribe<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&ThingMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.observers.register(observer)
    }

    /// Removes an observer.
    pub fn unsubscribe(&self, token: ObserverToken) -> bool {
        self.observers.unregister(token)
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.observers.len()
    }

    /// Returns the [`ThingDescription`].
    ///
    /// It is built on every call, so it always carries the current
    /// property values.
    #[must_use]
    pub fn as_thing_description(&self) -> ThingDescription {
        let prefix = &self.href_prefix;

        let properties = self
            .properties
            .iter()
            .map(|(name, (property, _))| (name.clone(), property.as_property_description()))
            .collect();

        let actions = self
            .available_actions
            .iter()
            .map(|(name, available)| {
                (
                    name.clone(),
                    AvailableActionDescription {
                        schema: available.schema.clone(),
                        links: vec![Link::new("action", format!("{prefix}/actions/{name}"))],
                    },
                )
            })
            .collect();

        let events = self
            .available_events
            .iter()
            .map(|(name, schema)| {
                (
                    name.clone(),
                    AvailableEventDescription {
                        schema: schema.clone(),
                        links: vec![Link::new("event", format!("{prefix}/events/{name}"))],
                    },
                )
            })
            .collect();

        ThingDescription {
            context: Cow::Borrowed(THING_CONTEXT),
            id: self.id.to_string(),
            title: self.title.to_string(),
            types: self.types.clone(),
            description: self.description.as_ref().map(ToString::to_string),
            properties,
            actions,
            events,
            links: vec![
                Link::new("properties", format!("{prefix}/properties")),
                Link::new("actions", format!("{prefix}/actions")),
                Link::new("events", format!("{prefix}/events")),
            ],
            href: None,
            base: None,
            security_definitions: None,
            security: None,
        }
    }

    pub(crate) fn set_href_prefix(&mut self, prefix: String) {
        for (property, _) in self.properties.values_mut() {
            property.set_href_prefix(&prefix);
        }
        self.href_prefix = prefix;
    }

    fn notify_action(&self, action: &Action) {
        let message =
            ThingMessage::ActionStatus(Named::new(action.name(), action.as_action_description()));
        // Observers failures are logged when notified and never abort an
        // action.
        let _ = self.observers.notify(&message);
    }

    fn actions(&self) -> MutexGuard<'_, ActionLog> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn events(&self) -> MutexGuard<'_, EventQueue> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duplicate(what: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::DuplicateName,
        format!("A {what} named `{name}` already exists"),
    )
}
