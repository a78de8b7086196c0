/// A response providing details about an error encountered while serving
/// a request.
pub mod error;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use serde::Serialize;

/// A response containing a serialized thing resource.
///
/// The status code defaults to `200 OK`.
#[derive(Debug)]
pub struct ThingResponse<T: Serialize> {
    status: StatusCode,
    body: T,
}

impl<T: Serialize> ThingResponse<T> {
    /// Creates a `200 OK` [`ThingResponse`].
    pub const fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// Creates a `201 Created` [`ThingResponse`].
    pub const fn created(body: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for ThingResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
