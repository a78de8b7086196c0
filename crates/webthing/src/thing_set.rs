use std::sync::Arc;

use crate::thing::Thing;

/// The things served by a gateway.
///
/// A single thing is addressed at the root path, while each thing of a
/// collection is addressed by its index, i.e. `/0`, `/1`.
#[derive(Debug, Clone)]
pub enum ThingSet {
    /// A single thing.
    Single(Arc<Thing>),
    /// A collection of things.
    Multiple {
        /// The things, in index order.
        things: Vec<Arc<Thing>>,
        /// The collection name.
        name: String,
    },
}

impl ThingSet {
    /// Creates a [`ThingSet`] serving a single thing.
    #[must_use]
    pub fn single(mut thing: Thing) -> Self {
        thing.set_href_prefix(String::new());
        Self::Single(Arc::new(thing))
    }

    /// Creates a [`ThingSet`] serving a collection of things.
    ///
    /// The resources of every thing are prefixed by its index.
    #[must_use]
    pub fn multiple<I>(things: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = Thing>,
    {
        let things = things
            .into_iter()
            .enumerate()
            .map(|(index, mut thing)| {
                thing.set_href_prefix(format!("/{index}"));
                Arc::new(thing)
            })
            .collect();

        Self::Multiple {
            things,
            name: name.into(),
        }
    }

    /// Resolves a thing from its path identifier.
    ///
    /// A single thing is returned whatever the identifier. A thing of a
    /// collection is returned only when the identifier is a valid index.
    #[must_use]
    pub fn get_thing(&self, id: Option<&str>) -> Option<&Arc<Thing>> {
        match self {
            Self::Single(thing) => Some(thing),
            Self::Multiple { things, .. } => {
                let index = id?.parse::<usize>().ok()?;
                things.get(index)
            }
        }
    }

    /// Returns all things.
    #[must_use]
    pub fn get_things(&self) -> &[Arc<Thing>] {
        match self {
            Self::Single(thing) => std::slice::from_ref(thing),
            Self::Multiple { things, .. } => things,
        }
    }

    /// Returns the name under which the things are announced.
    ///
    /// The thing title for a single thing, the collection name otherwise.
    #[must_use]
    pub fn get_name(&self) -> &str {
        match self {
            Self::Single(thing) => thing.title(),
            Self::Multiple { name, .. } => name,
        }
    }

    /// Checks whether the set is a collection.
    #[must_use]
    pub const fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple { .. })
    }
}

#[cfg(test)]
mod tests {
    use crate::property::Property;
    use crate::schema::DataSchema;
    use crate::thing::Thing;
    use crate::value::Value;

    use super::ThingSet;

    fn sensor(id: &'static str, title: &'static str) -> Thing {
        let mut thing = Thing::new(id, title);
        thing
            .add_property(Property::new(
                "level",
                Value::new(0.0),
                DataSchema::number().read_only(),
            ))
            .unwrap();
        thing
    }

    #[test]
    fn single_ignores_identifier() {
        let set = ThingSet::single(sensor("urn:dev:ops:sensor", "Sensor"));

        for id in [None, Some("0"), Some("12"), Some("lamp")] {
            assert_eq!(set.get_thing(id).unwrap().id(), "urn:dev:ops:sensor");
        }
        assert_eq!(set.get_name(), "Sensor");
        assert_eq!(set.get_things()[0].href(), "/");
    }

    #[test]
    fn multiple_resolves_indices() {
        let set = ThingSet::multiple(
            [
                sensor("urn:dev:ops:sensor-1", "Sensor 1"),
                sensor("urn:dev:ops:sensor-2", "Sensor 2"),
            ],
            "Sensors",
        );

        assert_eq!(set.get_thing(Some("1")).unwrap().id(), "urn:dev:ops:sensor-2");
        for id in [None, Some("2"), Some("-1"), Some("one"), Some("")] {
            assert!(set.get_thing(id).is_none());
        }
        assert_eq!(set.get_name(), "Sensors");
        assert_eq!(set.get_things()[1].href(), "/1");
        assert_eq!(
            set.get_things()[1].find_property("level").unwrap().href(),
            "/1/properties/level"
        );
    }
}
