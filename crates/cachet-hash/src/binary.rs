//! Binary canonical form used when the JSON envelope cannot represent the
//! arguments.
//!
//! Nothing here has side effects: resources contribute their type tag and
//! their envelope fingerprint, so targets are neither written nor released.
//! Floats are hashed by bit pattern with every NaN folded into one.

use cachet_envelope::Value;
use chrono::SecondsFormat;
use serde::ser::{Error as _, Serialize, Serializer};
use std::collections::BTreeMap;

const NAME: &str = "Value";

pub(crate) struct Canonical<'a>(pub &'a Value);

struct Seq<'a>(&'a [Value]);

struct Entries<'a>(&'a BTreeMap<String, Value>);

impl Serialize for Seq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Canonical))
    }
}

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, Canonical(v))))
    }
}

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => s.serialize_unit_variant(NAME, 0, "Null"),
            Value::Bool(b) => s.serialize_newtype_variant(NAME, 1, "Bool", b),
            Value::Int(i) => s.serialize_newtype_variant(NAME, 2, "Int", i),
            Value::Float(f) => {
                let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                s.serialize_newtype_variant(NAME, 3, "Float", &bits)
            }
            Value::Str(v) => s.serialize_newtype_variant(NAME, 4, "Str", v),
            Value::Bytes(v) => s.serialize_newtype_variant(NAME, 5, "Bytes", v),
            Value::Date(d) => {
                s.serialize_newtype_variant(NAME, 6, "Date", &d.format("%Y-%m-%d").to_string())
            }
            Value::DateTime(t) => s.serialize_newtype_variant(
                NAME,
                7,
                "DateTime",
                &t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            Value::List(items) => s.serialize_newtype_variant(NAME, 8, "List", &Seq(items)),
            Value::Map(map) => s.serialize_newtype_variant(NAME, 9, "Map", &Entries(map)),
            Value::Resource(handle) => {
                let fields = handle.fingerprint().map_err(S::Error::custom)?;
                let fields = serde_json::to_string(&fields).map_err(S::Error::custom)?;
                s.serialize_newtype_variant(
                    NAME,
                    10,
                    "Resource",
                    &(handle.type_tag().as_str(), fields),
                )
            }
        }
    }
}

/// Binary form of `(positional, named)`.
pub(crate) fn encode(
    positional: &[Value],
    named: &BTreeMap<String, Value>,
) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(&(Seq(positional), Entries(named)))
}
