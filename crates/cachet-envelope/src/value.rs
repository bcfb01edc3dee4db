use cachet_resource::Handle;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// A pipeline argument: plain structured data, possibly holding resources.
///
/// Maps are ordered by key so that every encoding of a value is canonical.
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Resource(Box<dyn Handle>),
}

impl Value {
    pub fn resource(handle: impl Handle) -> Self {
        Value::Resource(Box::new(handle))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_handle(&self) -> Option<&(dyn Handle + 'static)> {
        match self {
            Value::Resource(h) => Some(&**h),
            _ => None,
        }
    }

    /// Borrow a held resource as its concrete type.
    pub fn downcast_ref<T: Handle>(&self) -> Option<&T> {
        self.as_handle()?.downcast_ref()
    }

    pub fn downcast_mut<T: Handle>(&mut self) -> Option<&mut T> {
        match self {
            Value::Resource(h) => h.downcast_mut(),
            _ => None,
        }
    }

    /// Every resource reachable from this value, depth first.
    pub fn handles(&self) -> Vec<&dyn Handle> {
        let mut out = Vec::new();
        self.collect_handles(&mut out);
        out
    }

    fn collect_handles<'a>(&'a self, out: &mut Vec<&'a dyn Handle>) {
        match self {
            Value::Resource(h) => out.push(&**h),
            Value::List(items) => items.iter().for_each(|v| v.collect_handles(out)),
            Value::Map(map) => map.values().for_each(|v| v.collect_handles(out)),
            _ => {}
        }
    }
}

/// Resources compare by type tag and side-effect-free envelope fields.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Resource(a), Value::Resource(b)) => {
                a.type_tag() == b.type_tag()
                    && matches!((a.fingerprint(), b.fingerprint()), (Ok(x), Ok(y)) if x == y)
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<Box<dyn Handle>> for Value {
    fn from(v: Box<dyn Handle>) -> Self {
        Value::Resource(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_codecs::{CsvSource, NumpySource};

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from("x"), Value::Str("x".to_owned()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::map([("a", Value::from(1))]),
            Value::Map(BTreeMap::from([("a".to_owned(), Value::Int(1))]))
        );
    }

    #[test]
    fn resources_compare_by_fields() {
        let a = Value::resource(CsvSource::from_path("/data/a.csv").unwrap());
        let same = Value::resource(CsvSource::from_path("/data/a.csv").unwrap());
        let other = Value::resource(CsvSource::from_path("/data/b.csv").unwrap());
        assert_eq!(a, same);
        assert_ne!(a, other);
        assert_ne!(a, Value::Str("/data/a.csv".to_owned()));
    }

    #[test]
    fn handles_are_found_depth_first() {
        let v = Value::from(vec![
            Value::resource(CsvSource::from_path("/d/a.csv").unwrap()),
            Value::map([(
                "inner",
                Value::resource(NumpySource::from_path("/d/b.npy").unwrap()),
            )]),
            Value::from(1),
        ]);
        let tags: Vec<String> = v.handles().iter().map(|h| h.type_tag().to_string()).collect();
        assert_eq!(tags, vec!["cachet.csv.Source", "cachet.numpy.Source"]);
        assert!(v.downcast_ref::<CsvSource>().is_none());
    }
}
