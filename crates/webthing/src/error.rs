use std::borrow::Cow;

use log::warn;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A value does not satisfy its schema: wrong type, out of range or
    /// not among the allowed values. Also raised by a rejecting setter.
    ValidationFailed,
    /// A write was attempted on a read-only property.
    ReadOnly,
    /// A property, action, event or action instance does not exist.
    NotFound,
    /// A property, action or event name is registered twice on a thing.
    DuplicateName,
    /// A request body does not have the expected shape.
    MalformedRequest,
    /// A value listener failed while being notified.
    Listener,
    /// Errors encountered while serializing or deserializing data.
    Serialization,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Validation Failed",
            Self::ReadOnly => "Read Only",
            Self::NotFound => "Not Found",
            Self::DuplicateName => "Duplicate Name",
            Self::MalformedRequest => "Malformed Request",
            Self::Listener => "Listener",
            Self::Serialization => "Serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A thing model error.
#[derive(Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        let description = description.into();
        warn!("{kind}: {}", description.as_ref());
        Self { kind, description }
    }

    /// Creates a [`ErrorKind::ValidationFailed`] error.
    ///
    /// Device drivers return this from a setter to reject a value.
    #[inline]
    pub fn validation(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ValidationFailed, description)
    }

    /// Creates a [`ErrorKind::NotFound`] error.
    #[inline]
    pub fn not_found(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn info(&self) -> &str {
        self.description.as_ref()
    }

    fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serialization, e.to_string())
    }
}

impl std::error::Error for Error {}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn thing_error() {
        let error = Error::new(ErrorKind::ReadOnly, "`level` cannot be written.");

        assert_eq!(error.kind(), ErrorKind::ReadOnly);
        assert_eq!(error.to_string(), r"Read Only: `level` cannot be written.");
    }
}
