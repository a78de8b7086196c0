use std::borrow::Cow;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use serde::Serialize;

use tracing::error;

use webthing::error::{Error as ThingError, ErrorKind as ThingErrorKind};

/// All kinds of error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A value or an input does not satisfy its schema.
    ValidationFailed,
    /// A write was attempted on a read-only property.
    ReadOnly,
    /// A thing, a property, an action or an event does not exist.
    NotFound,
    /// The request body cannot be parsed.
    MalformedRequest,
    /// The `Host` header is not among the allowed hosts.
    HostRejected,
    /// An unexpected failure.
    Internal,
}

impl ErrorKind {
    const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed | Self::MalformedRequest => StatusCode::BAD_REQUEST,
            Self::ReadOnly | Self::HostRejected => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorKind,
    description: Cow<'static, str>,
}

/// A response describing why a request failed.
#[derive(Debug)]
pub struct ErrorResponse {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl ErrorResponse {
    /// Creates an [`ErrorResponse`].
    #[must_use]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates an [`ErrorKind::NotFound`] response.
    #[must_use]
    pub fn not_found(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, description)
    }

    /// Creates an [`ErrorKind::MalformedRequest`] response.
    #[must_use]
    pub fn malformed(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::MalformedRequest, description)
    }

    /// Creates an [`ErrorKind::HostRejected`] response.
    #[must_use]
    pub fn host_rejected(host: &str) -> Self {
        Self::new(ErrorKind::HostRejected, format!("Host `{host}` is not allowed"))
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the response status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl From<ThingError> for ErrorResponse {
    fn from(e: ThingError) -> Self {
        let kind = match e.kind() {
            ThingErrorKind::ValidationFailed => ErrorKind::ValidationFailed,
            ThingErrorKind::ReadOnly => ErrorKind::ReadOnly,
            ThingErrorKind::NotFound => ErrorKind::NotFound,
            ThingErrorKind::MalformedRequest => ErrorKind::MalformedRequest,
            ThingErrorKind::DuplicateName
            | ThingErrorKind::Listener
            | ThingErrorKind::Serialization => ErrorKind::Internal,
        };
        Self::new(kind, e.info().to_owned())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.description);
        }

        (
            status,
            Json(ErrorBody {
                error: self.kind,
                description: self.description,
            }),
        )
            .into_response()
    }
}
