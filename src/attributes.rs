use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::{Map, Value};

/// Attribute key under which a geolocation lookup result is stored.
pub const GEO_IP_RECORD: &str = "geoIpRecord";

/// A City-level geolocation lookup result able to render itself as plain data.
///
/// Implement this for the record type of whatever geolocation database is in
/// use; the normalizer never names that type directly.
pub trait CityRecord {
    fn to_serializable(&self) -> Map<String, Value>;
}

/// A non-primitive request attribute.
///
/// `to_value` is the generic rendering used for any attribute. Types that are
/// also a City geolocation record advertise it through `as_city_record`.
pub trait AttributeObject: fmt::Debug + Send + Sync {
    fn to_value(&self) -> Value;

    fn as_city_record(&self) -> Option<&dyn CityRecord> {
        None
    }
}

/// Value of a single request attribute.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// Plain data, copied into the record as-is.
    Value(Value),
    /// A shared object rendered through [`AttributeObject`].
    Object(Arc<dyn AttributeObject>),
}

impl AttributeValue {
    pub fn object<T: AttributeObject + 'static>(object: T) -> Self {
        AttributeValue::Object(Arc::new(object))
    }

    fn to_value(&self) -> Value {
        match self {
            AttributeValue::Value(value) => value.clone(),
            AttributeValue::Object(object) => object.to_value(),
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        AttributeValue::Value(value)
    }
}

/// Request attributes set by upstream code.
///
/// Insert into the request extensions before the logging middleware runs and
/// they end up under `attributes` in the request record.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes(HashMap<String, AttributeValue>);

impl RequestAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

/// Turn request attributes into plain data.
///
/// `geoIpRecord` is replaced with its City record serialization when the
/// value offers that capability. Every other attribute passes through.
pub fn normalize_attributes(attributes: &RequestAttributes) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(key, value)| {
            let value = match value {
                AttributeValue::Object(object) if key == GEO_IP_RECORD => {
                    match object.as_city_record() {
                        Some(record) => Value::Object(record.to_serializable()),
                        None => object.to_value(),
                    }
                }
                other => other.to_value(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct City {
        name: &'static str,
        iso_code: &'static str,
    }

    impl CityRecord for City {
        fn to_serializable(&self) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("city".into(), json!({ "names": { "en": self.name } }));
            map.insert("country".into(), json!({ "iso_code": self.iso_code }));
            map
        }
    }

    impl AttributeObject for City {
        fn to_value(&self) -> Value {
            json!("<city record>")
        }

        fn as_city_record(&self) -> Option<&dyn CityRecord> {
            Some(self)
        }
    }

    #[derive(Debug)]
    struct Session(u32);

    impl AttributeObject for Session {
        fn to_value(&self) -> Value {
            json!({ "session": self.0 })
        }
    }

    #[test]
    fn test_geo_ip_record_is_serialized() {
        let attributes = RequestAttributes::new()
            .with(GEO_IP_RECORD, AttributeValue::object(City { name: "Kyiv", iso_code: "UA" }))
            .with("route", json!("home"));

        let normalized = normalize_attributes(&attributes);

        assert_eq!(
            normalized[GEO_IP_RECORD],
            json!({ "city": { "names": { "en": "Kyiv" } }, "country": { "iso_code": "UA" } })
        );
        assert_eq!(normalized["route"], json!("home"));
    }

    #[test]
    fn test_geo_ip_record_without_capability_passes_through() {
        let attributes = RequestAttributes::new()
            .with(GEO_IP_RECORD, AttributeValue::object(Session(7)))
            .with("plain", json!({ "a": 1 }));

        let normalized = normalize_attributes(&attributes);

        assert_eq!(normalized[GEO_IP_RECORD], json!({ "session": 7 }));
        assert_eq!(normalized["plain"], json!({ "a": 1 }));

        let attributes = RequestAttributes::new().with(GEO_IP_RECORD, json!("8.8.8.8"));
        assert_eq!(normalize_attributes(&attributes)[GEO_IP_RECORD], json!("8.8.8.8"));
    }

    #[test]
    fn test_city_record_under_other_key_is_not_special() {
        let attributes = RequestAttributes::new()
            .with("origin", AttributeValue::object(City { name: "Lviv", iso_code: "UA" }));

        let normalized = normalize_attributes(&attributes);

        assert_eq!(normalized["origin"], json!("<city record>"));
    }

    #[test]
    fn test_empty_attributes() {
        assert!(normalize_attributes(&RequestAttributes::new()).is_empty());
    }
}
