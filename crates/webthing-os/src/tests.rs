//! Router tests.
//!
//! Requests are driven through the [`Router`] with `tower::ServiceExt`, so no
//! TCP listener is needed. `WebSocket` tests serve the router on a local
//! port instead.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};

use futures_util::StreamExt;

use http_body_util::BodyExt;

use serde_json::{Value as Json, json};

use tokio::net::TcpListener;

use tokio_tungstenite::{connect_async, tungstenite};

use tower::ServiceExt;

use webthing::action::{ActionInputSchema, ActionSchema};
use webthing::error::Error;
use webthing::event::Event;
use webthing::message::ThingMessage;
use webthing::property::Property;
use webthing::schema::DataSchema;
use webthing::thing::Thing;
use webthing::thing_set::ThingSet;
use webthing::value::{PropertyValue, Value};

use crate::host::HostValidation;
use crate::network::StaticNetwork;
use crate::server::Server;

const HOST: &str = "localhost:8888";

fn lamp(id: &str) -> Thing {
    let mut thing = Thing::new(id.to_owned(), "My Lamp")
        .types(["OnOffSwitch", "Light"])
        .event_queue_capacity(2);

    thing
        .add_property(Property::new(
            "on",
            Value::new(true),
            DataSchema::boolean().at_type("OnOffProperty"),
        ))
        .unwrap();
    thing
        .add_property(Property::new(
            "brightness",
            Value::new(50),
            DataSchema::integer_with_limits(0, 100).unit("percent"),
        ))
        .unwrap();
    thing
        .add_property(Property::new(
            "firmware",
            Value::new("1.0.2"),
            DataSchema::string().read_only(),
        ))
        .unwrap();
    thing
        .add_available_action(
            "fade",
            ActionSchema::new().input(
                ActionInputSchema::new()
                    .required_property("brightness", DataSchema::integer_with_limits(0, 100)),
            ),
            |thing: &Thing, action| {
                let brightness = action
                    .input()
                    .get("brightness")
                    .cloned()
                    .ok_or_else(|| Error::validation("missing brightness"))?;
                thing.set_property("brightness", brightness)
            },
        )
        .unwrap();
    thing
        .add_available_event("overheated", DataSchema::number())
        .unwrap();
    thing
}

fn server(things: ThingSet) -> Server {
    Server::new(things).port(8888).network_info(StaticNetwork::new(
        [IpAddr::V4(Ipv4Addr::LOCALHOST)],
        "lamp",
    ))
}

// A single lamp, along with a handle to it.
fn single() -> (Router, Arc<Thing>) {
    let things = ThingSet::single(lamp("urn:dev:ops:my-lamp-1234"));
    let thing = Arc::clone(things.get_thing(None).unwrap());
    (server(things).router(), thing)
}

fn request(method: Method, uri: &str, body: Option<Json>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST);

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Json) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Json) {
    send(router, request(Method::GET, uri, None)).await
}

#[tokio::test]
async fn thing_description() {
    let (router, _) = single();

    let (status, body) = get(&router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "urn:dev:ops:my-lamp-1234");
    assert_eq!(body["@context"], "https://iot.mozilla.org/schemas");
    assert_eq!(body["base"], "http://localhost:8888/");
    assert_eq!(body["security"], "nosec_sc");
    assert_eq!(body["securityDefinitions"]["nosec_sc"]["scheme"], "nosec");
    assert_eq!(body["properties"]["brightness"]["value"], json!(50));
    assert!(body.get("href").is_none());

    let links = body["links"].as_array().unwrap();
    assert_eq!(links[0], json!({"rel": "properties", "href": "/properties"}));
    assert!(links.iter().any(|link| {
        link["rel"] == "alternate" && link["href"] == "ws://localhost:8888/"
    }));
}

#[tokio::test]
async fn property_update() {
    let (router, thing) = single();

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    thing.subscribe(move |message: &ThingMessage| {
        sink.lock().unwrap().push(message.clone());
        Ok(())
    });

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            "/properties/brightness",
            Some(json!({"brightness": 150})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validationFailed");
    assert!(messages.lock().unwrap().is_empty());

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            "/properties/brightness",
            Some(json!({"brightness": 42})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"brightness": 42}));

    let (status, body) = get(&router, "/properties/brightness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"brightness": 42}));

    let (status, body) = get(&router, "/properties").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"on": true, "brightness": 42, "firmware": "1.0.2"})
    );

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].to_json().unwrap(),
        r#"{"messageType":"propertyStatus","data":{"brightness":42}}"#
    );
}

#[tokio::test]
async fn read_only_property() {
    let (router, thing) = single();

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            "/properties/firmware",
            Some(json!({"firmware": "2.0.0"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "readOnly");
    assert_eq!(
        thing.get_property("firmware"),
        Some(PropertyValue::String("1.0.2".into()))
    );
}

#[tokio::test]
async fn malformed_bodies() {
    let (router, _) = single();

    let malformed = Request::builder()
        .method(Method::PUT)
        .uri("/properties/brightness")
        .header(header::HOST, HOST)
        .body(Body::from("{\"brightness\": "))
        .unwrap();
    let (status, body) = send(&router, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformedRequest");

    for body in [
        json!(42),
        json!({"on": true}),
        json!({"brightness": 42, "on": true}),
    ] {
        let (status, _) = send(
            &router,
            request(Method::PUT, "/properties/brightness", Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn unknown_resources() {
    let (router, _) = single();

    for uri in [
        "/properties/color",
        "/actions/explode",
        "/actions/fade/0123",
        "/events/melted",
        "/nowhere",
    ] {
        let (status, body) = get(&router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "notFound");
    }
}

#[tokio::test]
async fn action_lifecycle() {
    let (router, thing) = single();

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/actions",
            Some(json!({"fade": {"input": {"brightness": 10}}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["fade"]["status"], "pending");
    assert_eq!(body["fade"]["input"], json!({"brightness": 10}));

    let href = body["fade"]["href"].as_str().unwrap().to_owned();
    let id = body["fade"]["id"].as_str().unwrap().to_owned();
    assert_eq!(href, format!("/actions/fade/{id}"));

    // The handler runs on the blocking pool.
    let mut completed = false;
    for _ in 0..100 {
        let (status, body) = get(&router, &href).await;
        assert_eq!(status, StatusCode::OK);
        if body["fade"]["status"] == "completed" {
            assert!(body["fade"]["timeCompleted"].is_string());
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed);
    assert_eq!(
        thing.get_property("brightness"),
        Some(PropertyValue::Integer(10))
    );

    let (status, body) = get(&router, "/actions/fade").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&router, request(Method::DELETE, &href, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(&router, &href).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, request(Method::DELETE, &href, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_action_requests() {
    let (router, thing) = single();

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            "/actions/fade",
            Some(json!({"fade": {"input": {"brightness": 500}}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            "/actions",
            Some(json!({"explode": {"input": {}}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(thing.get_actions(None).is_empty());
}

#[tokio::test]
async fn event_queue_is_bounded() {
    let (router, thing) = single();

    for temperature in [90.0, 95.0, 99.5] {
        thing
            .add_event(Event::new(
                "overheated",
                Some(PropertyValue::Number(temperature)),
            ))
            .unwrap();
    }

    let (status, body) = get(&router, "/events").await;
    assert_eq!(status, StatusCode::OK);
    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["overheated"]["data"], json!(95.0));
    assert_eq!(events[1]["overheated"]["data"], json!(99.5));

    let (status, body) = get(&router, "/events/overheated").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn multiple_things() {
    let things = ThingSet::multiple(
        [lamp("urn:dev:ops:lamp-0"), lamp("urn:dev:ops:lamp-1")],
        "Lamps",
    );
    let router = server(things).router();

    let (status, body) = get(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    let descriptions = body.as_array().unwrap();
    assert_eq!(descriptions.len(), 2);
    assert_eq!(descriptions[1]["id"], "urn:dev:ops:lamp-1");
    assert_eq!(descriptions[1]["href"], "/1");
    assert_eq!(descriptions[1]["base"], "http://localhost:8888/1");

    let (status, body) = get(&router, "/1/properties/brightness").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"brightness": 50}));

    for uri in ["/5", "/abc", "/-1", "/5/properties"] {
        let (status, _) = get(&router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn host_validation() {
    let (router, _) = single();

    for host in ["localhost", "LOCALHOST:8888", "127.0.0.1:8888", "lamp.local"] {
        let request = Request::builder()
            .uri("/properties")
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK, "{host}");
    }

    let rejected = Request::builder()
        .method(Method::OPTIONS)
        .uri("/properties")
        .header(header::HOST, "evil.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, rejected).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "hostRejected");

    let preflight = request(Method::OPTIONS, "/properties", None);
    let response = router.clone().oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, HEAD, PUT, POST, DELETE"
    );
}

#[tokio::test]
async fn disabled_host_validation() {
    let router = server(ThingSet::single(lamp("urn:dev:ops:my-lamp-1234")))
        .host_validation(HostValidation::Disabled)
        .router();

    let request = Request::builder()
        .uri("/")
        .header(header::HOST, "evil.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base"], "http://evil.example.com/");
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let (router, _) = single();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/properties/on", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS)
    );
}

#[tokio::test]
async fn rejecting_setter_is_a_bad_request() {
    let mut relay = Thing::new("urn:dev:ops:relay-1", "Relay");
    relay
        .add_property(Property::new(
            "on",
            Value::with_setter(false, |_: &PropertyValue| {
                Err(Error::not_found("relay offline"))
            }),
            DataSchema::boolean(),
        ))
        .unwrap();
    let router = server(ThingSet::single(relay)).router();

    let (status, body) = send(
        &router,
        request(Method::PUT, "/properties/on", Some(json!({"on": true}))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validationFailed");

    let (_, body) = get(&router, "/properties/on").await;
    assert_eq!(body, json!({"on": false}));
}

// Serves the things on a local port, returning the router sharing the
// server state along with the bound address.
async fn serve(things: ThingSet) -> (Router, SocketAddr) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let address = listener.local_addr().unwrap();

    let router = Server::new(things)
        .port(address.port())
        .network_info(StaticNetwork::new(
            [IpAddr::V4(Ipv4Addr::LOCALHOST)],
            "lamp",
        ))
        .router();

    let served = router.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, served).await;
    });

    (router, address)
}

#[tokio::test]
async fn websocket_receives_each_property_change_once() {
    let (router, address) = serve(ThingSet::single(lamp("urn:dev:ops:my-lamp-1234"))).await;

    let (mut socket, _) = connect_async(format!("ws://{address}/")).await.unwrap();

    let put = Request::builder()
        .method(Method::PUT)
        .uri("/properties/brightness")
        .header(header::HOST, address.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"brightness": 42}).to_string()))
        .unwrap();
    let (status, body) = send(&router, put).await;
    assert_eq!(status, StatusCode::OK);

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = message.to_text().unwrap();
    assert_eq!(
        text,
        r#"{"messageType":"propertyStatus","data":{"brightness":42}}"#
    );
    let pushed: Json = serde_json::from_str(text).unwrap();
    assert_eq!(pushed["data"], body);

    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err());
}

#[tokio::test]
async fn websocket_to_unknown_thing_is_refused() {
    let things = ThingSet::multiple(
        [lamp("urn:dev:ops:lamp-0"), lamp("urn:dev:ops:lamp-1")],
        "Lamps",
    );
    let (_, address) = serve(things).await;

    match connect_async(format!("ws://{address}/5")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("the upgrade to `/5` was accepted"),
    }

    let (_, _) = connect_async(format!("ws://{address}/1")).await.unwrap();
}
