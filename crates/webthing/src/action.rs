use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use log::{debug, warn};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::event::timestamp;
use crate::schema::DataSchema;
use crate::thing::{Link, Thing};
use crate::value::PropertyValue;

// Default time a terminated action is retained in the action log.
pub(crate) const DEFAULT_ACTION_RETENTION: Duration = Duration::from_secs(300);

// Default maximum number of actions retained in the action log.
pub(crate) const DEFAULT_ACTION_LOG_CAPACITY: usize = 16;

/// The unit of work run when an action is performed.
///
/// It receives the owning [`Thing`] and the requested [`Action`].
pub type ActionHandler = Arc<dyn Fn(&Thing, &Action) -> Result<()> + Send + Sync>;

/// Action status.
///
/// An action moves from [`ActionStatus::Created`] to
/// [`ActionStatus::Pending`], then to either [`ActionStatus::Completed`] or
/// [`ActionStatus::Error`]. The status never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// The action input has been validated.
    Created,
    /// The action has been handed to an execution context.
    Pending,
    /// The action completed successfully.
    Completed,
    /// The action failed.
    Error,
}

impl ActionStatus {
    /// Checks whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    const fn can_move_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Pending | Self::Error) | (Self::Pending, Self::Completed | Self::Error)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
        .fmt(f)
    }
}

/// Validated action input values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionInput(IndexMap<String, PropertyValue, DefaultHashBuilder>);

impl ActionInput {
    /// Creates an empty [`ActionInput`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self(IndexMap::with_hasher(DefaultHashBuilder::default()))
    }

    /// Retrieves an input value by name.
    #[must_use]
    #[inline]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    /// Checks whether the input is empty.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, name: String, value: PropertyValue) {
        self.0.insert(name, value);
    }
}

/// The input schema of an action.
///
/// An object whose fields are each described by a [`DataSchema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "object")]
pub struct ActionInputSchema {
    /// Input fields.
    pub properties: IndexMap<Cow<'static, str>, DataSchema, DefaultHashBuilder>,
    /// Names of the mandatory fields.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<Cow<'static, str>>,
}

impl Default for ActionInputSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionInputSchema {
    /// Creates an [`ActionInputSchema`] without fields.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            properties: IndexMap::with_hasher(DefaultHashBuilder::default()),
            required: Vec::new(),
        }
    }

    /// Adds an optional field.
    #[must_use]
    #[inline]
    pub fn property(mut self, name: impl Into<Cow<'static, str>>, schema: DataSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Adds a mandatory field.
    #[must_use]
    #[inline]
    pub fn required_property(
        mut self,
        name: impl Into<Cow<'static, str>>,
        schema: DataSchema,
    ) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Validates a raw input against the schema.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::error::ErrorKind::ValidationFailed`] error if the
    /// input is not an object, misses a mandatory field, contains an unknown
    /// field or a field value does not satisfy its schema.
    pub fn validate(&self, input: &serde_json::Value) -> Result<ActionInput> {
        let serde_json::Value::Object(fields) = input else {
            return Err(Error::validation("The action input must be an object"));
        };

        if let Some(missing) = self
            .required
            .iter()
            .find(|name| !fields.contains_key(name.as_ref()))
        {
            return Err(Error::validation(format!(
                "Missing mandatory input `{missing}`"
            )));
        }

        let mut validated = ActionInput::new();
        for (name, raw) in fields {
            let Some(schema) = self.properties.get(name.as_str()) else {
                return Err(Error::validation(format!("Unknown input `{name}`")));
            };
            let value = serde_json::from_value::<PropertyValue>(raw.clone()).map_err(|_| {
                Error::validation(format!("Input `{name}` is not a scalar value"))
            })?;
            let value = schema.validate(value).map_err(|e| {
                Error::validation(format!("Invalid input `{name}`: {}", e.info()))
            })?;
            validated.insert(name.clone(), value);
        }

        Ok(validated)
    }
}

/// The metadata of an action made available by a thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionSchema {
    /// Semantic type tag.
    #[serde(rename = "@type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_type: Option<Cow<'static, str>>,
    /// Human readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Cow<'static, str>>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Cow<'static, str>>,
    /// Input schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<ActionInputSchema>,
}

impl ActionSchema {
    /// Creates an [`ActionSchema`] without input.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the semantic type tag. i.e. `FadeAction`
    #[must_use]
    pub fn at_type(mut self, at_type: impl Into<Cow<'static, str>>) -> Self {
        self.at_type = Some(at_type.into());
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<Cow<'static, str>>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn input(mut self, input: ActionInputSchema) -> Self {
        self.input = Some(input);
        self
    }

    pub(crate) fn validate(&self, input: Option<&serde_json::Value>) -> Result<ActionInput> {
        match (&self.input, input) {
            (Some(schema), Some(input)) => schema.validate(input),
            (Some(schema), None) => schema.validate(&serde_json::Value::Object(
                serde_json::Map::new(),
            )),
            (None, None | Some(serde_json::Value::Null)) => Ok(ActionInput::new()),
            (None, Some(serde_json::Value::Object(fields))) if fields.is_empty() => {
                Ok(ActionInput::new())
            }
            (None, Some(_)) => Err(Error::validation("The action does not accept an input")),
        }
    }
}

/// An action made available by a thing, as it appears in the thing
/// description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableActionDescription {
    /// Action metadata.
    #[serde(flatten)]
    pub schema: ActionSchema,
    /// Action links.
    pub links: Vec<Link>,
}

/// The description of a requested action, without its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescription {
    /// Action identifier.
    pub id: String,
    /// Validated input.
    pub input: ActionInput,
    /// Action instance path.
    pub href: String,
    /// Current status.
    pub status: ActionStatus,
    /// Time of the request.
    pub time_requested: String,
    /// Time of the termination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_completed: Option<String>,
    /// Failure cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
struct ActionState {
    status: ActionStatus,
    time_completed: Option<String>,
    terminated_at: Option<Instant>,
    error: Option<String>,
}

/// A requested action.
#[derive(Debug)]
pub struct Action {
    id: String,
    name: String,
    input: ActionInput,
    href: String,
    time_requested: String,
    state: Mutex<ActionState>,
}

impl Action {
    pub(crate) fn new(name: &str, input: ActionInput, href_prefix: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let href = format!("{href_prefix}/actions/{name}/{id}");
        Self {
            id,
            name: name.to_owned(),
            input,
            href,
            time_requested: timestamp(),
            state: Mutex::new(ActionState {
                status: ActionStatus::Created,
                time_completed: None,
                terminated_at: None,
                error: None,
            }),
        }
    }

    /// Returns the action identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the validated input.
    #[must_use]
    pub const fn input(&self) -> &ActionInput {
        &self.input
    }

    /// Returns the action instance path.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.state().status
    }

    /// Returns the failure cause, if the action failed.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    /// Returns the [`ActionDescription`].
    #[must_use]
    pub fn as_action_description(&self) -> ActionDescription {
        let state = self.state();
        ActionDescription {
            id: self.id.clone(),
            input: self.input.clone(),
            href: self.href.clone(),
            status: state.status,
            time_requested: self.time_requested.clone(),
            time_completed: state.time_completed.clone(),
            error: state.error.clone(),
        }
    }

    // Moves the action to the next status.
    //
    // Returns `false` and leaves the status untouched when the transition
    // would not be monotonic.
    pub(crate) fn transition(&self, next: ActionStatus, error: Option<String>) -> bool {
        let mut state = self.state();
        if !state.status.can_move_to(next) {
            warn!(
                "Action `{}` ({}) cannot move from `{}` to `{next}`",
                self.name, self.id, state.status
            );
            return false;
        }

        debug!(
            "Action `{}` ({}) moved from `{}` to `{next}`",
            self.name, self.id, state.status
        );
        state.status = next;
        if next.is_terminal() {
            state.time_completed = Some(timestamp());
            state.terminated_at = Some(Instant::now());
            state.error = error;
        }
        true
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.state()
            .terminated_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }

    fn state(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The log of actions requested on a thing.
#[derive(Debug)]
pub(crate) struct ActionLog {
    actions: IndexMap<String, Arc<Action>, DefaultHashBuilder>,
    retention: Duration,
    capacity: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_RETENTION, DEFAULT_ACTION_LOG_CAPACITY)
    }
}

impl ActionLog {
    pub(crate) fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            actions: IndexMap::with_hasher(DefaultHashBuilder::default()),
            retention,
            capacity: capacity.max(1),
        }
    }

    pub(crate) const fn set_retention(&mut self, retention: Duration) {
        self.retention = retention;
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    // Only terminated actions are evicted, so the log may outgrow its
    // capacity while every action is still running.
    pub(crate) fn insert(&mut self, action: Arc<Action>) {
        self.prune();
        while self.actions.len() >= self.capacity {
            let Some(oldest) = self
                .actions
                .values()
                .position(|action| action.status().is_terminal())
            else {
                debug!(
                    "Action log over capacity: {} running actions",
                    self.actions.len()
                );
                break;
            };
            if let Some((id, evicted)) = self.actions.shift_remove_index(oldest) {
                debug!("Action `{}` ({id}) evicted from the log", evicted.name());
            }
        }
        self.actions.insert(action.id().to_owned(), action);
    }

    pub(crate) fn get(&mut self, name: &str, id: &str) -> Option<Arc<Action>> {
        self.prune();
        self.actions
            .get(id)
            .filter(|action| action.name() == name)
            .cloned()
    }

    pub(crate) fn remove(&mut self, name: &str, id: &str) -> Option<Arc<Action>> {
        self.prune();
        if self.actions.get(id).is_some_and(|action| action.name() == name) {
            self.actions.shift_remove(id)
        } else {
            None
        }
    }

    pub(crate) fn list(&mut self, name: Option<&str>) -> Vec<Arc<Action>> {
        self.prune();
        self.actions
            .values()
            .filter(|action| name.is_none_or(|name| action.name() == name))
            .cloned()
            .collect()
    }

    fn prune(&mut self) {
        let now = Instant::now();
        let retention = self.retention;
        self.actions
            .retain(|_, action| !action.expired(now, retention));
    }
}

/// Runs a handler, turning its outcome into the terminal status of the
/// action.
pub(crate) fn run_handler(handler: &ActionHandler, thing: &Thing, action: &Action) -> ActionStatus {
    match handler(thing, action) {
        Ok(()) => {
            action.transition(ActionStatus::Completed, None);
        }
        Err(e) => {
            action.transition(ActionStatus::Error, Some(e.info().to_owned()));
        }
    }
    action.status()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::error::ErrorKind;
    use crate::schema::DataSchema;
    use crate::value::PropertyValue;

    use super::{Action, ActionInput, ActionInputSchema, ActionLog, ActionStatus};

    fn fade_input() -> ActionInputSchema {
        ActionInputSchema::new()
            .required_property(
                "brightness",
                DataSchema::integer_with_limits(0, 100).unit("percent"),
            )
            .required_property(
                "duration",
                DataSchema::integer_at_least(1).unit("milliseconds"),
            )
    }

    #[test]
    fn validate_input() {
        let input = fade_input()
            .validate(&json!({ "brightness": 42, "duration": 10 }))
            .unwrap();

        assert_eq!(input.get("brightness"), Some(&PropertyValue::Integer(42)));
        assert_eq!(input.get("duration"), Some(&PropertyValue::Integer(10)));
    }

    #[test]
    fn reject_invalid_input() {
        for invalid in [
            json!({ "brightness": 42 }),
            json!({ "brightness": 420, "duration": 10 }),
            json!({ "brightness": 42, "duration": 0 }),
            json!({ "brightness": 42, "duration": 10, "speed": 1 }),
            json!({ "brightness": [42], "duration": 10 }),
            json!(42),
        ] {
            assert_eq!(
                fade_input().validate(&invalid).unwrap_err().kind(),
                ErrorKind::ValidationFailed
            );
        }
    }

    #[test]
    fn status_is_monotonic() {
        let action = Action::new("fade", ActionInput::new(), "/0");

        assert!(!action.transition(ActionStatus::Completed, None));
        assert!(action.transition(ActionStatus::Pending, None));
        assert!(action.transition(ActionStatus::Completed, None));
        assert!(!action.transition(ActionStatus::Pending, None));
        assert!(!action.transition(ActionStatus::Error, Some("late".into())));

        let description = action.as_action_description();
        assert_eq!(description.status, ActionStatus::Completed);
        assert!(description.time_completed.is_some());
        assert!(description.error.is_none());
        assert_eq!(
            description.href,
            format!("/0/actions/fade/{}", action.id())
        );
    }

    #[test]
    fn log_prunes_expired_actions() {
        let mut log = ActionLog::new(Duration::ZERO, 8);
        let done = Arc::new(Action::new("fade", ActionInput::new(), ""));
        let running = Arc::new(Action::new("fade", ActionInput::new(), ""));
        log.insert(Arc::clone(&done));
        log.insert(Arc::clone(&running));

        done.transition(ActionStatus::Pending, None);
        done.transition(ActionStatus::Completed, None);
        running.transition(ActionStatus::Pending, None);

        let ids: Vec<String> = log
            .list(None)
            .iter()
            .map(|action| action.id().to_owned())
            .collect();
        assert_eq!(ids, vec![running.id().to_owned()]);
    }

    #[test]
    fn log_evicts_terminated_actions_first() {
        let mut log = ActionLog::new(Duration::from_secs(3600), 2);
        let running = Arc::new(Action::new("fade", ActionInput::new(), ""));
        let failed = Arc::new(Action::new("fade", ActionInput::new(), ""));
        log.insert(Arc::clone(&running));
        log.insert(Arc::clone(&failed));
        failed.transition(ActionStatus::Error, Some("stalled".into()));

        let newest = Arc::new(Action::new("fade", ActionInput::new(), ""));
        log.insert(Arc::clone(&newest));

        assert!(log.get("fade", running.id()).is_some());
        assert!(log.get("fade", failed.id()).is_none());
        assert!(log.get("fade", newest.id()).is_some());
        assert!(log.get("toggle", newest.id()).is_none());
    }

    #[test]
    fn log_keeps_running_actions_over_capacity() {
        let mut log = ActionLog::new(Duration::from_secs(3600), 2);
        let actions: Vec<Arc<Action>> = (0..3)
            .map(|_| Arc::new(Action::new("fade", ActionInput::new(), "")))
            .collect();

        log.insert(Arc::clone(&actions[0]));
        actions[0].transition(ActionStatus::Pending, None);
        log.insert(Arc::clone(&actions[1]));
        log.insert(Arc::clone(&actions[2]));

        assert_eq!(log.list(None).len(), 3);
        assert_eq!(
            log.get("fade", actions[0].id()).map(|action| action.status()),
            Some(ActionStatus::Pending)
        );

        actions[0].transition(ActionStatus::Completed, None);
        let newest = Arc::new(Action::new("fade", ActionInput::new(), ""));
        log.insert(Arc::clone(&newest));

        assert!(log.get("fade", actions[0].id()).is_none());
        assert!(log.get("fade", actions[1].id()).is_some());
        assert!(log.get("fade", newest.id()).is_some());
    }
}
