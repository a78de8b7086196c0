use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{
        FromRequestParts, Path, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::{HeaderMap, StatusCode, request::Parts},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use serde::Deserialize;

use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use tracing::{error, info};

use webthing::action::{Action, ActionDescription};
use webthing::event::EventDescription;
use webthing::message::Named;
use webthing::thing::{Link, PropertyValues, Thing, ThingDescription};
use webthing::thing_set::ThingSet;
use webthing::value::PropertyValue;

use crate::hosts::{AllowedHosts, host_middleware, request_host};
use crate::hub::{SubscriptionHub, handle_socket};
use crate::responses::ThingResponse;
use crate::responses::error::{ErrorKind, ErrorResponse};

// Host used to build links when a request carries no `Host` header.
const FALLBACK_HOST: &str = "localhost";

type Reply<T> = Result<ThingResponse<T>, ErrorResponse>;

// The state shared by every route.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) things: Arc<ThingSet>,
    pub(crate) hub: Arc<SubscriptionHub>,
}

impl ServerState {
    fn thing(&self, params: &RouteParams) -> Result<&Arc<Thing>, ErrorResponse> {
        self.things
            .get_thing(params.thing_id.as_deref())
            .ok_or_else(|| {
                ErrorResponse::not_found(format!(
                    "Thing `{}` not found",
                    params.thing_id.as_deref().unwrap_or_default()
                ))
            })
    }
}

// Path parameters of every route.
//
// Parameters absent from the matched route are left empty.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RouteParams {
    thing_id: Option<String>,
    property_name: Option<String>,
    action_name: Option<String>,
    action_id: Option<String>,
    event_name: Option<String>,
}

impl RouteParams {
    fn property_name(&self) -> &str {
        self.property_name.as_deref().unwrap_or_default()
    }

    fn action_name(&self) -> &str {
        self.action_name.as_deref().unwrap_or_default()
    }

    fn action_id(&self) -> &str {
        self.action_id.as_deref().unwrap_or_default()
    }

    fn event_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or_default()
    }
}

impl<S> FromRequestParts<S> for RouteParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Path::<Self>::from_request_parts(parts, state)
            .await
            .map(|Path(params)| params)
            .unwrap_or_default())
    }
}

// Builds the description of a thing as served to a client.
fn describe(thing: &Thing, host: &str, multiple: bool) -> ThingDescription {
    let href = thing.href();
    let description = thing
        .as_thing_description()
        .link(Link::new("alternate", format!("ws://{host}{href}")))
        .base(format!("http://{host}{href}"))
        .no_security();

    if multiple {
        description.href(href)
    } else {
        description
    }
}

// Extracts the value keyed by `name` from a body made of a single entry.
fn named_body(body: &[u8], name: &str) -> Result<serde_json::Value, ErrorResponse> {
    let (key, value) = single_entry(body)?;
    if key == name {
        Ok(value)
    } else {
        Err(ErrorResponse::malformed(format!(
            "The body must be keyed by `{name}`"
        )))
    }
}

fn single_entry(body: &[u8]) -> Result<(String, serde_json::Value), ErrorResponse> {
    let value = serde_json::from_slice::<serde_json::Value>(body)
        .map_err(|e| ErrorResponse::malformed(format!("Invalid JSON body: {e}")))?;

    let serde_json::Value::Object(fields) = value else {
        return Err(ErrorResponse::malformed("The body must be a JSON object"));
    };

    let mut fields = fields.into_iter();
    match (fields.next(), fields.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(ErrorResponse::malformed(
            "The body must contain exactly one entry",
        )),
    }
}

fn action_not_found(name: &str) -> ErrorResponse {
    ErrorResponse::not_found(format!("Action `{name}` not found"))
}

fn describe_actions(thing: &Thing, name: Option<&str>) -> Vec<Named<ActionDescription>> {
    thing
        .get_actions(name)
        .iter()
        .map(|action| Named::new(action.name(), action.as_action_description()))
        .collect()
}

fn describe_events(thing: &Thing, name: Option<&str>) -> Vec<Named<EventDescription>> {
    thing
        .get_events(name)
        .iter()
        .map(|event| Named::new(event.name(), event.as_event_description()))
        .collect()
}

// Runs a started action out-of-band.
//
// The handler runs on the blocking pool. A panicking handler moves the
// action to the error status.
fn spawn_action(thing: Arc<Thing>, action: Arc<Action>) {
    let worker_thing = Arc::clone(&thing);
    let worker_action = Arc::clone(&action);
    let worker =
        tokio::task::spawn_blocking(move || worker_thing.perform_action(&worker_action));

    tokio::spawn(async move {
        if let Err(e) = worker.await {
            error!(
                "Action `{}` ({}) aborted: {e}",
                action.name(),
                action.id()
            );
            thing.fail_action(&action, e.to_string());
        }
    });
}

fn request_action(
    thing: &Arc<Thing>,
    name: &str,
    request: serde_json::Value,
) -> Reply<Named<ActionDescription>> {
    let input = match request {
        serde_json::Value::Object(mut fields) => fields.remove("input"),
        serde_json::Value::Null => None,
        _ => {
            return Err(ErrorResponse::malformed(
                "An action request must be a JSON object",
            ));
        }
    };

    let action = thing.request_action(name, input.as_ref())?;
    thing.start_action(&action);
    let description = Named::new(name, action.as_action_description());
    spawn_action(Arc::clone(thing), action);

    Ok(ThingResponse::created(description))
}

async fn things_root(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ThingResponse<Vec<ThingDescription>> {
    let host = request_host(&headers).unwrap_or(FALLBACK_HOST);
    ThingResponse::ok(
        state
            .things
            .get_things()
            .iter()
            .map(|thing| describe(thing, host, true))
            .collect(),
    )
}

async fn thing_root(
    State(state): State<ServerState>,
    params: RouteParams,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ErrorResponse> {
    let thing = state.thing(&params)?;

    if let Ok(upgrade) = upgrade {
        let subscription = state
            .hub
            .subscribe(thing)
            .ok_or_else(|| ErrorResponse::not_found("Thing not observed"))?;
        return Ok(upgrade.on_upgrade(move |socket| handle_socket(socket, subscription)));
    }

    let host = request_host(&headers).unwrap_or(FALLBACK_HOST);
    Ok(ThingResponse::ok(describe(thing, host, state.things.is_multiple())).into_response())
}

async fn get_properties(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<PropertyValues> {
    let thing = state.thing(&params)?;
    Ok(ThingResponse::ok(thing.get_properties()))
}

async fn get_property(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Named<PropertyValue>> {
    let thing = state.thing(&params)?;
    let name = params.property_name();
    let value = thing
        .get_property(name)
        .ok_or_else(|| ErrorResponse::not_found(format!("Property `{name}` not found")))?;

    Ok(ThingResponse::ok(Named::new(name, value)))
}

async fn put_property(
    State(state): State<ServerState>,
    params: RouteParams,
    body: Bytes,
) -> Reply<Named<PropertyValue>> {
    let thing = state.thing(&params)?;
    let name = params.property_name();
    if !thing.has_property(name) {
        return Err(ErrorResponse::not_found(format!(
            "Property `{name}` not found"
        )));
    }

    let value = serde_json::from_value::<PropertyValue>(named_body(&body, name)?).map_err(|_| {
        ErrorResponse::new(
            ErrorKind::ValidationFailed,
            format!("`{name}` must be a boolean, a number or a string"),
        )
    })?;

    thing.set_property(name, value)?;

    let value = thing
        .get_property(name)
        .ok_or_else(|| ErrorResponse::not_found(format!("Property `{name}` not found")))?;
    Ok(ThingResponse::ok(Named::new(name, value)))
}

async fn get_actions(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Vec<Named<ActionDescription>>> {
    let thing = state.thing(&params)?;
    Ok(ThingResponse::ok(describe_actions(thing, None)))
}

async fn post_actions(
    State(state): State<ServerState>,
    params: RouteParams,
    body: Bytes,
) -> Reply<Named<ActionDescription>> {
    let thing = state.thing(&params)?;
    let (name, request) = single_entry(&body)?;
    request_action(thing, &name, request)
}

async fn get_action_list(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Vec<Named<ActionDescription>>> {
    let thing = state.thing(&params)?;
    let name = params.action_name();
    if !thing.has_available_action(name) {
        return Err(action_not_found(name));
    }

    Ok(ThingResponse::ok(describe_actions(thing, Some(name))))
}

async fn post_action(
    State(state): State<ServerState>,
    params: RouteParams,
    body: Bytes,
) -> Reply<Named<ActionDescription>> {
    let thing = state.thing(&params)?;
    let name = params.action_name();
    if !thing.has_available_action(name) {
        return Err(action_not_found(name));
    }

    request_action(thing, name, named_body(&body, name)?)
}

async fn get_action(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Named<ActionDescription>> {
    let thing = state.thing(&params)?;
    let (name, id) = (params.action_name(), params.action_id());
    let action = thing
        .get_action(name, id)
        .ok_or_else(|| ErrorResponse::not_found(format!("Action `{name}` ({id}) not found")))?;

    Ok(ThingResponse::ok(Named::new(
        name,
        action.as_action_description(),
    )))
}

async fn delete_action(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Result<StatusCode, ErrorResponse> {
    let thing = state.thing(&params)?;
    let (name, id) = (params.action_name(), params.action_id());
    if thing.remove_action(name, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ErrorResponse::not_found(format!(
            "Action `{name}` ({id}) not found"
        )))
    }
}

async fn get_events(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Vec<Named<EventDescription>>> {
    let thing = state.thing(&params)?;
    Ok(ThingResponse::ok(describe_events(thing, None)))
}

async fn get_event(
    State(state): State<ServerState>,
    params: RouteParams,
) -> Reply<Vec<Named<EventDescription>>> {
    let thing = state.thing(&params)?;
    let name = params.event_name();
    if !thing.has_available_event(name) {
        return Err(ErrorResponse::not_found(format!("Event `{name}` not found")));
    }

    Ok(ThingResponse::ok(describe_events(thing, Some(name))))
}

async fn not_found() -> ErrorResponse {
    ErrorResponse::not_found("Resource not found")
}

// Builds the router serving every thing of the set.
pub(crate) fn router(state: ServerState, hosts: Arc<AllowedHosts>) -> Router {
    let multiple = state.things.is_multiple();
    let prefix = if multiple { "/{thing_id}" } else { "" };
    let thing_root_path = if multiple { prefix } else { "/" };

    let paths = [
        thing_root_path.to_owned(),
        format!("{prefix}/properties"),
        format!("{prefix}/properties/{{property_name}}"),
        format!("{prefix}/actions"),
        format!("{prefix}/actions/{{action_name}}"),
        format!("{prefix}/actions/{{action_name}}/{{action_id}}"),
        format!("{prefix}/events"),
        format!("{prefix}/events/{{event_name}}"),
    ];
    for path in &paths {
        info!("Server route: \"{path}\"");
    }
    let [
        root,
        properties,
        property,
        actions,
        action_list,
        action,
        events,
        event,
    ] = paths;

    let mut router = Router::new()
        .route(&root, get(thing_root))
        .route(&properties, get(get_properties))
        .route(&property, get(get_property).put(put_property))
        .route(&actions, get(get_actions).post(post_actions))
        .route(&action_list, get(get_action_list).post(post_action))
        .route(&action, get(get_action).delete(delete_action))
        .route(&events, get(get_events))
        .route(&event, get(get_event));

    if multiple {
        info!("Server route: \"/\"");
        router = router.route("/", get(things_root));
    }

    router
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(hosts, host_middleware))
        .layer(TraceLayer::new_for_http())
}
