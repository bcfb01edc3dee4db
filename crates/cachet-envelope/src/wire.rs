//! Conversion between [`Value`] and tagged JSON.
//!
//! Resources become `{"type_tag": ..., "data": {...}}`. So do the plain types
//! JSON has no native form for: bytes (hex), dates and UTC datetimes. Every
//! JSON object is key-sorted, so encoding the same value always yields the
//! same bytes.

use crate::registry::Registry;
use crate::value::Value;
use crate::EnvelopeError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value as Json};
use tracing::debug;

pub const TYPE_TAG_KEY: &str = "type_tag";
pub const DATA_KEY: &str = "data";

pub const BYTES_TAG: &str = "bytes";
pub const DATE_TAG: &str = "date";
pub const DATETIME_TAG: &str = "datetime";

fn tagged(tag: &str, data: Json) -> Json {
    let mut envelope = Map::new();
    envelope.insert(TYPE_TAG_KEY.to_owned(), Json::String(tag.to_owned()));
    envelope.insert(DATA_KEY.to_owned(), data);
    Json::Object(envelope)
}

/// Encode a value, persisting any targets it holds.
///
/// Targets are hashed, written if absent, and released on the way, exactly as
/// their own `serialize` does.
pub fn encode(value: &mut Value) -> Result<Json, EnvelopeError> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or(EnvelopeError::NonFiniteFloat(*f)),
        Value::Str(s) => Ok(Json::String(s.clone())),
        Value::Bytes(b) => Ok(tagged(BYTES_TAG, Json::String(hex::encode(b)))),
        Value::Date(d) => Ok(tagged(
            DATE_TAG,
            Json::String(d.format("%Y-%m-%d").to_string()),
        )),
        Value::DateTime(t) => Ok(tagged(
            DATETIME_TAG,
            Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        )),
        Value::List(items) => items
            .iter_mut()
            .map(encode)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map.iter_mut() {
                out.insert(key.clone(), encode(item)?);
            }
            Ok(Json::Object(out))
        }
        Value::Resource(handle) => {
            let tag = handle.type_tag();
            let data = handle.serialize()?;
            debug!("encoded {tag}");
            Ok(tagged(tag.as_str(), Json::Object(data)))
        }
    }
}

fn malformed(tag: &str, reason: impl Into<String>) -> EnvelopeError {
    EnvelopeError::MalformedEnvelope {
        tag: tag.to_owned(),
        reason: reason.into(),
    }
}

fn tagged_str<'a>(tag: &str, data: &'a Json) -> Result<&'a str, EnvelopeError> {
    data.as_str()
        .ok_or_else(|| malformed(tag, "payload is not a string"))
}

/// Decode tagged JSON, constructing resources through `registry`.
///
/// Objects whose tag is neither a plain-data tag nor registered are kept as
/// ordinary maps.
pub fn decode(json: Json, registry: &Registry) -> Result<Value, EnvelopeError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(b)),
        Json::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Json::String(s) => Ok(Value::Str(s)),
        Json::Array(items) => items
            .into_iter()
            .map(|item| decode(item, registry))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Json::Object(map) => decode_object(map, registry),
    }
}

fn decode_object(map: Map<String, Json>, registry: &Registry) -> Result<Value, EnvelopeError> {
    if map.len() == 2 {
        if let (Some(Json::String(tag)), Some(data)) = (map.get(TYPE_TAG_KEY), map.get(DATA_KEY))
        {
            if let Some(value) = decode_tagged(tag, data, registry)? {
                return Ok(value);
            }
        }
    }
    map.into_iter()
        .map(|(key, item)| Ok((key, decode(item, registry)?)))
        .collect::<Result<_, EnvelopeError>>()
        .map(Value::Map)
}

fn decode_tagged(
    tag: &str,
    data: &Json,
    registry: &Registry,
) -> Result<Option<Value>, EnvelopeError> {
    let value = match tag {
        BYTES_TAG => {
            let bytes =
                hex::decode(tagged_str(tag, data)?).map_err(|e| malformed(tag, e.to_string()))?;
            Value::Bytes(bytes)
        }
        DATE_TAG => {
            let date = NaiveDate::parse_from_str(tagged_str(tag, data)?, "%Y-%m-%d")
                .map_err(|e| malformed(tag, e.to_string()))?;
            Value::Date(date)
        }
        DATETIME_TAG => {
            let at = DateTime::parse_from_rfc3339(tagged_str(tag, data)?)
                .map_err(|e| malformed(tag, e.to_string()))?;
            Value::DateTime(at.with_timezone(&Utc))
        }
        _ => {
            let Some(factory) = registry.get(tag) else {
                return Ok(None);
            };
            let fields = data
                .as_object()
                .ok_or_else(|| malformed(tag, "data is not an object"))?;
            debug!("decoding {tag}");
            Value::Resource(factory(fields)?)
        }
    };
    Ok(Some(value))
}

/// Writes objects with their keys in byte order, whatever order the map
/// itself iterates in.
struct Sorted<'a>(&'a Json);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Json::Array(items) => serializer.collect_seq(items.iter().map(Sorted)),
            Json::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                serializer.collect_map(entries.into_iter().map(|(k, v)| (k, Sorted(v))))
            }
            scalar => scalar.serialize(serializer),
        }
    }
}

/// Compact JSON of an already encoded value. Keys are sorted at every level.
pub fn canonical_bytes(json: &Json) -> Result<Vec<u8>, EnvelopeError> {
    Ok(serde_json::to_vec(&Sorted(json))?)
}

pub fn to_string(value: &mut Value) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string(&encode(value)?)?)
}

pub fn to_string_pretty(value: &mut Value) -> Result<String, EnvelopeError> {
    Ok(serde_json::to_string_pretty(&encode(value)?)?)
}

pub fn from_str(text: &str, registry: &Registry) -> Result<Value, EnvelopeError> {
    decode(serde_json::from_str(text)?, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn roundtrip(mut value: Value) -> Value {
        let json = encode(&mut value).unwrap();
        decode(json, &Registry::builtin()).unwrap()
    }

    #[test]
    fn scalars_encode_natively() {
        let mut v = Value::from(vec![
            Value::Null,
            Value::from(true),
            Value::from(-7),
            Value::from(0.25),
            Value::from("s"),
        ]);
        assert_eq!(encode(&mut v).unwrap(), json!([null, true, -7, 0.25, "s"]));
    }

    #[test]
    fn plain_tags_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 13, 5, 0).unwrap();
        let values = || {
            vec![
                Value::bytes(vec![0u8, 0xab, 0xff]),
                Value::from(date),
                Value::from(at),
                Value::map([("nested", Value::from(vec![Value::bytes(b"x".to_vec())]))]),
            ]
        };
        for (value, expected) in values().into_iter().zip(values()) {
            assert_eq!(roundtrip(value), expected);
        }
    }

    #[test]
    fn plain_tag_layout() {
        let mut v = Value::from(NaiveDate::from_ymd_opt(2023, 1, 9).unwrap());
        assert_eq!(
            encode(&mut v).unwrap(),
            json!({"type_tag": "date", "data": "2023-01-09"})
        );
        let mut b = Value::bytes(vec![1u8, 2]);
        assert_eq!(
            encode(&mut b).unwrap(),
            json!({"type_tag": "bytes", "data": "0102"})
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut v = Value::from(f64::NAN);
        assert!(matches!(
            encode(&mut v),
            Err(EnvelopeError::NonFiniteFloat(_))
        ));
    }

    #[test]
    fn map_keys_are_sorted() {
        let mut v = Value::Map(BTreeMap::from([
            ("zeta".to_owned(), Value::from(1)),
            ("alpha".to_owned(), Value::from(2)),
        ]));
        let bytes = canonical_bytes(&encode(&mut v).unwrap()).unwrap();
        assert_eq!(bytes, br#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn canonical_bytes_sort_nested_objects() {
        let mut inner = Map::new();
        inner.insert("b".to_owned(), json!(1));
        inner.insert("a".to_owned(), json!([{"y": 1, "x": 2}]));
        let mut outer = Map::new();
        outer.insert("z".to_owned(), Json::Object(inner));
        outer.insert("m".to_owned(), Json::Null);
        let bytes = canonical_bytes(&Json::Object(outer)).unwrap();
        assert_eq!(bytes, br#"{"m":null,"z":{"a":[{"x":2,"y":1}],"b":1}}"#);
    }

    #[test]
    fn unknown_tags_pass_through() {
        let json = json!({"type_tag": "some.other.Kind", "data": {"x": 1}});
        let value = decode(json, &Registry::builtin()).unwrap();
        assert_eq!(
            value,
            Value::map([
                ("type_tag", Value::from("some.other.Kind")),
                ("data", Value::map([("x", Value::from(1))])),
            ])
        );
    }

    #[test]
    fn extra_keys_disable_tag_handling() {
        let json = json!({"type_tag": "date", "data": "2020-01-01", "note": "x"});
        assert!(matches!(
            decode(json, &Registry::builtin()).unwrap(),
            Value::Map(m) if m.len() == 3
        ));
    }

    #[test]
    fn malformed_plain_tags_fail() {
        let bad_hex = json!({"type_tag": "bytes", "data": "zz"});
        assert!(matches!(
            decode(bad_hex, &Registry::builtin()),
            Err(EnvelopeError::MalformedEnvelope { .. })
        ));
        let bad_date = json!({"type_tag": "date", "data": 20200101});
        assert!(decode(bad_date, &Registry::builtin()).is_err());
    }

    #[test]
    fn large_unsigned_numbers_become_floats() {
        let value = decode(json!(u64::MAX), &Registry::new()).unwrap();
        assert!(matches!(value, Value::Float(_)));
    }
}
