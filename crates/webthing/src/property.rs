use std::borrow::Cow;

use serde::Serialize;

use crate::error::{Error, ErrorKind, Result};
use crate::schema::DataSchema;
use crate::thing::Link;
use crate::value::{PropertyValue, Value};

/// A property description.
///
/// The declarative schema of a property merged with its current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescription {
    /// Property schema.
    #[serde(flatten)]
    pub schema: DataSchema,
    /// Current value.
    pub value: PropertyValue,
    /// Property links.
    pub links: Vec<Link>,
}

/// A property of a thing.
///
/// Wraps a [`Value`] and validates every write coming from a client against
/// its [`DataSchema`].
#[derive(Debug)]
pub struct Property {
    // Name.
    name: Cow<'static, str>,
    // Observable value.
    value: Value,
    // Schema.
    schema: DataSchema,
    // Prefix of the owning thing path.
    href_prefix: String,
}

impl Property {
    /// Creates a [`Property`].
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<Cow<'static, str>>, value: Value, schema: DataSchema) -> Self {
        Self {
            name: name.into(),
            value,
            schema,
            href_prefix: String::new(),
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the property schema.
    #[must_use]
    pub const fn schema(&self) -> &DataSchema {
        &self.schema
    }

    /// Returns the underlying [`Value`].
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the property path, relative to the server root.
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}/properties/{}", self.href_prefix, self.name)
    }

    /// Returns the current value.
    #[must_use]
    #[inline]
    pub fn get_value(&self) -> PropertyValue {
        self.value.get()
    }

    /// Validates and sets a value written by a client.
    ///
    /// Nothing is written if the validation fails.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ReadOnly`] error for read-only properties,
    /// an [`ErrorKind::ValidationFailed`] error when the value does not
    /// satisfy the schema or the setter rejects it, and an
    /// [`ErrorKind::Listener`] error when a listener fails.
    pub fn set_value(&self, value: PropertyValue) -> Result<()> {
        if self.schema.read_only {
            return Err(Error::new(
                ErrorKind::ReadOnly,
                format!("`{}` is a read-only property", self.name),
            ));
        }

        let value = self.schema.validate(value).map_err(|e| {
            Error::new(
                ErrorKind::ValidationFailed,
                format!("Invalid value for `{}`: {}", self.name, e.info()),
            )
        })?;

        self.value.set(value)
    }

    /// Returns the [`PropertyDescription`].
    #[must_use]
    pub fn as_property_description(&self) -> PropertyDescription {
        PropertyDescription {
            schema: self.schema.clone(),
            value: self.get_value(),
            links: vec![Link::new("property", self.href())],
        }
    }

    pub(crate) fn set_href_prefix(&mut self, prefix: &str) {
        prefix.clone_into(&mut self.href_prefix);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::ErrorKind;
    use crate::schema::DataSchema;
    use crate::value::{PropertyValue, Value};

    use super::Property;

    fn brightness() -> Property {
        Property::new(
            "brightness",
            Value::new(50),
            DataSchema::integer_with_limits(0, 100)
                .at_type("BrightnessProperty")
                .title("Brightness")
                .unit("percent"),
        )
    }

    #[test]
    fn write_then_read() {
        let property = brightness();

        property.set_value(PropertyValue::Integer(42)).unwrap();

        assert_eq!(property.get_value(), PropertyValue::Integer(42));
    }

    #[test]
    fn invalid_write_is_not_applied() {
        let property = brightness();

        let error = property.set_value(PropertyValue::Integer(150)).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ValidationFailed);
        assert_eq!(property.get_value(), PropertyValue::Integer(50));
    }

    #[test]
    fn read_only_rejects_writes() {
        let level = Value::new(0.0);
        let property = Property::new(
            "level",
            level.clone(),
            DataSchema::number_with_limits(0., 100.).read_only(),
        );

        let error = property.set_value(PropertyValue::Number(10.0)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ReadOnly);
        assert_eq!(property.get_value(), PropertyValue::Number(0.0));

        // The driver is still able to update the reading.
        level.notify_of_external_update(12.5).unwrap();
        assert_eq!(property.get_value(), PropertyValue::Number(12.5));
    }

    #[test]
    fn property_description() {
        let mut property = brightness();
        property.set_href_prefix("/0");

        assert_eq!(
            serde_json::to_value(property.as_property_description()).unwrap(),
            json!({
                "@type": "BrightnessProperty",
                "title": "Brightness",
                "type": "integer",
                "minimum": 0,
                "maximum": 100,
                "unit": "percent",
                "value": 50,
                "links": [{ "rel": "property", "href": "/0/properties/brightness" }],
            })
        );
    }
}
