use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::PropertyValue;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// All supported kinds of data schemas.
///
/// The kind is serialized as the `type` field of a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaKind {
    /// A [`bool`] value.
    Boolean,
    /// An integer value.
    Integer {
        /// The minimum value allowed.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[serde(default)]
        minimum: Option<i64>,
        /// The maximum value allowed.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[serde(default)]
        maximum: Option<i64>,
    },
    /// A floating point value.
    Number {
        /// The minimum value allowed.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[serde(default)]
        minimum: Option<f64>,
        /// The maximum value allowed.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[serde(default)]
        maximum: Option<f64>,
    },
    /// A characters sequence.
    String {
        /// The allowed values. When empty, any string is allowed.
        #[serde(rename = "enum")]
        #[serde(skip_serializing_if = "Vec::is_empty")]
        #[serde(default)]
        allowed: Vec<Cow<'static, str>>,
    },
}

impl SchemaKind {
    /// Returns the type name associated with a [`SchemaKind`].
    #[must_use]
    pub const fn as_type(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer { .. } => "integer",
            Self::Number { .. } => "number",
            Self::String { .. } => "string",
        }
    }

    /// Validates a value against this schema kind, returning the value
    /// converted to the schema type.
    ///
    /// Integral numbers are accepted by integer schemas and integers are
    /// accepted by number schemas.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ErrorKind::ValidationFailed`] error when the
    /// type does not match, the value is out of range or it is not among
    /// the allowed values.
    pub fn validate(&self, value: PropertyValue) -> Result<PropertyValue> {
        match self {
            Self::Boolean => Self::validate_boolean(value),
            Self::Integer { minimum, maximum } => {
                Self::validate_integer(value, *minimum, *maximum)
            }
            Self::Number { minimum, maximum } => Self::validate_number(value, *minimum, *maximum),
            Self::String { allowed } => Self::validate_string(value, allowed),
        }
    }

    fn validate_boolean(value: PropertyValue) -> Result<PropertyValue> {
        match value {
            PropertyValue::Bool(_) => Ok(value),
            other => Err(mismatch("boolean", &other)),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn validate_integer(
        value: PropertyValue,
        minimum: Option<i64>,
        maximum: Option<i64>,
    ) -> Result<PropertyValue> {
        let integer = match value {
            PropertyValue::Integer(v) => v,
            PropertyValue::Number(v)
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 =>
            {
                v as i64
            }
            other => return Err(mismatch("integer", &other)),
        };

        if let Some(minimum) = minimum
            && integer < minimum
        {
            return Err(Error::validation(format!(
                "{integer} is lower than the minimum {minimum}"
            )));
        }
        if let Some(maximum) = maximum
            && integer > maximum
        {
            return Err(Error::validation(format!(
                "{integer} is greater than the maximum {maximum}"
            )));
        }

        Ok(PropertyValue::Integer(integer))
    }

    fn validate_number(
        value: PropertyValue,
        minimum: Option<f64>,
        maximum: Option<f64>,
    ) -> Result<PropertyValue> {
        let Some(number) = value.as_f64() else {
            return Err(mismatch("number", &value));
        };

        if let Some(minimum) = minimum
            && number < minimum
        {
            return Err(Error::validation(format!(
                "{number} is lower than the minimum {minimum}"
            )));
        }
        if let Some(maximum) = maximum
            && number > maximum
        {
            return Err(Error::validation(format!(
                "{number} is greater than the maximum {maximum}"
            )));
        }

        Ok(PropertyValue::Number(number))
    }

    fn validate_string(
        value: PropertyValue,
        allowed: &[Cow<'static, str>],
    ) -> Result<PropertyValue> {
        let PropertyValue::String(string) = value else {
            return Err(mismatch("string", &value));
        };

        if !allowed.is_empty() && !allowed.iter().any(|v| v.as_ref() == string) {
            return Err(Error::validation(format!(
                "`{string}` is not one of the allowed values"
            )));
        }

        Ok(PropertyValue::String(string))
    }
}

fn mismatch(expected: &str, found: &PropertyValue) -> Error {
    Error::validation(format!(
        "expected a value of type `{expected}`, found `{}` ({found})",
        found.as_type()
    ))
}

/// A data schema.
///
/// Describes and validates the values of properties, action inputs and
/// event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    /// Semantic type tag.
    #[serde(rename = "@type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub at_type: Option<Cow<'static, str>>,
    /// Human readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub title: Option<Cow<'static, str>>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub description: Option<Cow<'static, str>>,
    /// Schema kind.
    #[serde(flatten)]
    pub kind: SchemaKind,
    /// Unit of measure.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub unit: Option<Cow<'static, str>>,
    /// Whether clients are allowed to write the value.
    #[serde(rename = "readOnly")]
    #[serde(skip_serializing_if = "is_false")]
    #[serde(default)]
    pub read_only: bool,
}

impl DataSchema {
    /// Creates a [`bool`] schema.
    #[must_use]
    #[inline]
    pub fn boolean() -> Self {
        Self::init(SchemaKind::Boolean)
    }

    /// Creates an unbounded integer schema.
    #[must_use]
    #[inline]
    pub fn integer() -> Self {
        Self::init(SchemaKind::Integer {
            minimum: None,
            maximum: None,
        })
    }

    /// Creates an integer schema with limits.
    #[must_use]
    #[inline]
    pub fn integer_with_limits(minimum: i64, maximum: i64) -> Self {
        Self::init(SchemaKind::Integer {
            minimum: Some(minimum),
            maximum: Some(maximum),
        })
    }

    /// Creates an integer schema with a lower limit only.
    #[must_use]
    #[inline]
    pub fn integer_at_least(minimum: i64) -> Self {
        Self::init(SchemaKind::Integer {
            minimum: Some(minimum),
            maximum: None,
        })
    }

    /// Creates an unbounded number schema.
    #[must_use]
    #[inline]
    pub fn number() -> Self {
        Self::init(SchemaKind::Number {
            minimum: None,
            maximum: None,
        })
    }

    /// Creates a number schema with limits.
    #[must_use]
    #[inline]
    pub fn number_with_limits(minimum: f64, maximum: f64) -> Self {
        Self::init(SchemaKind::Number {
            minimum: Some(minimum),
            maximum: Some(maximum),
        })
    }

    /// Creates a number schema with a lower limit only.
    #[must_use]
    #[inline]
    pub fn number_at_least(minimum: f64) -> Self {
        Self::init(SchemaKind::Number {
            minimum: Some(minimum),
            maximum: None,
        })
    }

    /// Creates a string schema accepting any value.
    #[must_use]
    #[inline]
    pub fn string() -> Self {
        Self::init(SchemaKind::String {
            allowed: Vec::new(),
        })
    }

    /// Creates a string schema accepting only the given values.
    #[must_use]
    #[inline]
    pub fn string_enum<I, V>(allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Cow<'static, str>>,
    {
        Self::init(SchemaKind::String {
            allowed: allowed.into_iter().map(Into::into).collect(),
        })
    }

    /// Sets the semantic type tag. i.e. `BrightnessProperty`
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

    /// Sets the unit of measure. i.e. `percent`
    #[must_use]
    pub fn unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Marks the value as read-only for clients.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Validates a value against the schema kind.
    ///
    /// The read-only flag is not considered here, see
    /// [`crate::property::Property::set_value`].
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ErrorKind::ValidationFailed`] error if the
    /// value does not satisfy the schema.
    #[inline]
    pub fn validate(&self, value: PropertyValue) -> Result<PropertyValue> {
        self.kind.validate(value)
    }

    const fn init(kind: SchemaKind) -> Self {
        Self {
            at_type: None,
            title: None,
            description: None,
            kind,
            unit: None,
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::ErrorKind;
    use crate::value::PropertyValue;

    use super::DataSchema;

    #[test]
    fn integer_range() {
        let schema = DataSchema::integer_with_limits(0, 100);

        assert_eq!(
            schema.validate(PropertyValue::Integer(42)),
            Ok(PropertyValue::Integer(42))
        );
        assert_eq!(
            schema.validate(PropertyValue::Number(42.0)),
            Ok(PropertyValue::Integer(42))
        );
        for invalid in [
            PropertyValue::Integer(150),
            PropertyValue::Integer(-1),
            PropertyValue::Number(4.2),
            PropertyValue::Bool(true),
            PropertyValue::String("42".into()),
        ] {
            assert_eq!(
                schema.validate(invalid).unwrap_err().kind(),
                ErrorKind::ValidationFailed
            );
        }
    }

    #[test]
    fn number_accepts_integers() {
        let schema = DataSchema::number_with_limits(0., 100.);

        assert_eq!(
            schema.validate(PropertyValue::Integer(7)),
            Ok(PropertyValue::Number(7.0))
        );
        assert!(schema.validate(PropertyValue::Number(100.5)).is_err());
    }

    #[test]
    fn string_enumeration() {
        let schema = DataSchema::string_enum(["red", "green"]);

        assert!(schema.validate("red".into()).is_ok());
        assert!(schema.validate("blue".into()).is_err());
        assert!(DataSchema::string().validate("blue".into()).is_ok());
    }

    #[test]
    fn boolean_rejects_numbers() {
        assert!(DataSchema::boolean().validate(PropertyValue::Bool(false)).is_ok());
        assert!(DataSchema::boolean().validate(PropertyValue::Integer(0)).is_err());
    }

    #[test]
    fn describe_schema() {
        let schema = DataSchema::integer_with_limits(0, 100)
            .at_type("BrightnessProperty")
            .title("Brightness")
            .unit("percent");

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "@type": "BrightnessProperty",
                "title": "Brightness",
                "type": "integer",
                "minimum": 0,
                "maximum": 100,
                "unit": "percent",
            })
        );

        assert_eq!(
            serde_json::to_value(DataSchema::number().read_only()).unwrap(),
            json!({ "type": "number", "readOnly": true })
        );
    }
}
