use crate::algorithm::DigestAlgorithm;
use crate::binary;
use cachet_envelope::{canonical_bytes, encode, EnvelopeError, Value};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn canonical_json(
    positional: &mut [Value],
    named: &mut BTreeMap<String, Value>,
) -> Result<Vec<u8>, EnvelopeError> {
    let positional = positional
        .iter_mut()
        .map(encode)
        .collect::<Result<Vec<_>, _>>()?;
    let mut object = Map::new();
    for (key, value) in named.iter_mut() {
        object.insert(key.clone(), encode(value)?);
    }
    canonical_bytes(&Json::Array(vec![Json::Array(positional), Json::Object(object)]))
}

/// Cache key for a call with the given arguments, using BLAKE3.
///
/// See [`hash_objects_with`].
pub fn hash_objects(
    positional: &mut [Value],
    named: &mut BTreeMap<String, Value>,
) -> Option<String> {
    hash_objects_with(DigestAlgorithm::default(), positional, named)
}

/// Cache key for a call with the given arguments.
///
/// The arguments are first encoded as canonical envelope JSON, which persists
/// and releases any staged targets they contain. If that fails, a binary
/// encoding that only fingerprints resources is tried instead. `None` means
/// neither worked and the call must not be cached.
pub fn hash_objects_with(
    algorithm: DigestAlgorithm,
    positional: &mut [Value],
    named: &mut BTreeMap<String, Value>,
) -> Option<String> {
    match canonical_json(positional, named) {
        Ok(bytes) => return Some(algorithm.digest(&bytes)),
        Err(e) => warn!("envelope encoding failed, trying binary encoding: {e}"),
    }
    match binary::encode(positional, named) {
        Ok(bytes) => {
            debug!("hashed arguments from binary encoding");
            Some(algorithm.digest(&bytes))
        }
        Err(e) => {
            warn!("arguments cannot be hashed, result will not be cached: {e}");
            None
        }
    }
}

/// Cache key for one pipeline step: its identifier, its code and its named
/// arguments.
///
/// `arguments` is left as it was found, apart from the side effects of
/// encoding any targets in it.
pub fn task_input_hash(
    task_key: &str,
    code: &[u8],
    arguments: &mut BTreeMap<String, Value>,
) -> Option<String> {
    task_input_hash_with(DigestAlgorithm::default(), task_key, code, arguments)
}

pub fn task_input_hash_with(
    algorithm: DigestAlgorithm,
    task_key: &str,
    code: &[u8],
    arguments: &mut BTreeMap<String, Value>,
) -> Option<String> {
    let mut positional = [
        Value::from(task_key),
        Value::Str(hex::encode(code)),
        Value::Map(std::mem::take(arguments)),
    ];
    let digest = hash_objects_with(algorithm, &mut positional, &mut BTreeMap::new());
    if let [_, _, Value::Map(args)] = &mut positional {
        *arguments = std::mem::take(args);
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn named(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn equal_arguments_hash_equal() {
        let a = hash_objects(
            &mut [Value::from(1), Value::from("x")],
            &mut named(vec![("k", Value::from(2.5))]),
        );
        let b = hash_objects(
            &mut [Value::from(1), Value::from("x")],
            &mut named(vec![("k", Value::from(2.5))]),
        );
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(a.unwrap().len(), 64);
    }

    #[test]
    fn any_change_changes_the_key() {
        let base = hash_objects(&mut [Value::from(1)], &mut named(vec![("k", Value::from(2))]));
        let other_positional =
            hash_objects(&mut [Value::from(2)], &mut named(vec![("k", Value::from(2))]));
        let other_named =
            hash_objects(&mut [Value::from(1)], &mut named(vec![("k", Value::from(3))]));
        let other_key =
            hash_objects(&mut [Value::from(1)], &mut named(vec![("j", Value::from(2))]));
        assert_ne!(base, other_positional);
        assert_ne!(base, other_named);
        assert_ne!(base, other_key);
    }

    #[test]
    fn positional_order_matters_named_order_does_not() {
        let ab = hash_objects(&mut [Value::from("a"), Value::from("b")], &mut BTreeMap::new());
        let ba = hash_objects(&mut [Value::from("b"), Value::from("a")], &mut BTreeMap::new());
        assert_ne!(ab, ba);

        let mut first = BTreeMap::new();
        first.insert("x".to_owned(), Value::from(1));
        first.insert("y".to_owned(), Value::from(2));
        let mut second = BTreeMap::new();
        second.insert("y".to_owned(), Value::from(2));
        second.insert("x".to_owned(), Value::from(1));
        assert_eq!(hash_objects(&mut [], &mut first), hash_objects(&mut [], &mut second));
    }

    #[test]
    fn algorithms_differ() {
        let blake =
            hash_objects_with(DigestAlgorithm::Blake3, &mut [Value::from(1)], &mut BTreeMap::new());
        let sha =
            hash_objects_with(DigestAlgorithm::Sha256, &mut [Value::from(1)], &mut BTreeMap::new());
        assert_ne!(blake, sha);
        assert_eq!(sha.unwrap().len(), 64);
    }

    #[test]
    fn non_finite_floats_use_the_binary_fallback() {
        let a = hash_objects(&mut [Value::from(f64::NAN)], &mut BTreeMap::new());
        let b = hash_objects(&mut [Value::from(f64::NAN)], &mut BTreeMap::new());
        let inf = hash_objects(&mut [Value::from(f64::INFINITY)], &mut BTreeMap::new());
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, inf);
    }

    #[test]
    fn task_hash_restores_arguments() {
        let mut args = named(vec![("threshold", Value::from(0.5)), ("label", Value::from("x"))]);
        let key = task_input_hash("segment", b"fn segment() {}", &mut args).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args["threshold"], Value::from(0.5));

        let again = task_input_hash("segment", b"fn segment() {}", &mut args).unwrap();
        assert_eq!(key, again);
        let edited = task_input_hash("segment", b"fn segment() { 1 }", &mut args).unwrap();
        assert_ne!(key, edited);
        let renamed = task_input_hash("segment_v2", b"fn segment() {}", &mut args).unwrap();
        assert_ne!(key, renamed);
    }

    #[test]
    fn task_hash_matches_hash_objects_layout() {
        let mut args = named(vec![("n", Value::from(1))]);
        let via_task = task_input_hash("t", b"\x01\xff", &mut args);
        let direct = hash_objects(
            &mut [
                Value::from("t"),
                Value::from("01ff"),
                Value::map([("n", Value::from(1))]),
            ],
            &mut BTreeMap::new(),
        );
        assert_eq!(via_task, direct);
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(()).prop_map(|()| Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1e12f64..1e12).prop_map(Value::Float),
            "[a-z0-9]{0,12}".prop_map(Value::Str),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn hashing_is_deterministic_and_non_destructive(v in tree()) {
            let before = format!("{v:?}");
            let mut args = [v];
            let first = hash_objects(&mut args, &mut BTreeMap::new());
            let second = hash_objects(&mut args, &mut BTreeMap::new());
            prop_assert!(first.is_some());
            prop_assert_eq!(first, second);
            prop_assert_eq!(format!("{:?}", args[0]), before);
        }
    }
}
