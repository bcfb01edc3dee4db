//! decode(encode(x)) over real files for every built-in kind.

use cachet_codecs::{
    write_array, Cell, CsvSource, CsvTarget, DType, ImageTarget, Mode, NdArray, NumpyTarget,
    Table, ZarrCodec, ZarrSource,
};
use cachet_envelope::{decode, encode, from_str, to_string, EnvelopeError, Registry, Value};
use cachet_resource::{Handle, ResourceError};
use serde_json::json;
use std::fs;

fn table() -> Table {
    let mut t = Table::new(["col1", "col2"]);
    t.push_row(vec![Cell::Int(1), Cell::from("a")]).unwrap();
    t.push_row(vec![Cell::Int(2), Cell::from("b")]).unwrap();
    t.push_row(vec![Cell::Int(3), Cell::from("c")]).unwrap();
    t
}

#[test]
fn csv_target_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("table.csv");
    let mut target = CsvTarget::from_path(plain.to_str().unwrap()).unwrap();
    target.set_data(table());
    let mut value = Value::resource(target);

    let json = encode(&mut value).unwrap();
    assert_eq!(json["type_tag"], "cachet.csv.Target");
    let h1 = json["data"]["data_hash"].as_str().unwrap().to_owned();

    let original = value.downcast_ref::<CsvTarget>().unwrap();
    assert!(!original.is_loaded());
    let original_path = original.get_path().unwrap();
    assert_eq!(
        original_path,
        dir.path().join(format!("table-{h1}.csv"))
    );
    assert!(original_path.exists());
    assert!(!plain.exists());

    let mut decoded = decode(json, &Registry::builtin()).unwrap();
    let rebuilt = decoded.downcast_mut::<CsvTarget>().unwrap();
    assert_eq!(rebuilt.get_path().unwrap(), original_path);
    assert_eq!(rebuilt.get_name(), "table");
    assert_eq!(rebuilt.get_data(true).unwrap().as_ref(), &table());
}

#[test]
fn nested_arguments_roundtrip_through_text() {
    let dir = tempfile::tempdir().unwrap();
    let mut arr = NumpyTarget::from_path(dir.path().join("a.npy").to_str().unwrap()).unwrap();
    arr.set_data(NdArray::from_i64(vec![2], &[10, 20]).unwrap());
    let src = CsvSource::from_path("/data/raw/input.csv").unwrap();

    let mut value = Value::map([
        ("inputs", Value::from(vec![Value::resource(src), Value::from(3)])),
        ("array", Value::resource(arr)),
        ("label", Value::from("run")),
    ]);
    let text = to_string(&mut value).unwrap();
    let decoded = from_str(&text, &Registry::builtin()).unwrap();

    let Value::Map(map) = &decoded else {
        panic!("expected a map, got {decoded:?}");
    };
    assert_eq!(map["label"], Value::from("run"));
    let Value::List(inputs) = &map["inputs"] else {
        panic!("expected a list");
    };
    let src = inputs[0].downcast_ref::<CsvSource>().unwrap();
    assert_eq!(src.get_path(), std::path::Path::new("/data/raw/input.csv"));
    assert!(map["array"].downcast_ref::<NumpyTarget>().is_some());
}

#[test]
fn image_metadata_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut img = ImageTarget::from_path(dir.path().join("i.tif").to_str().unwrap()).unwrap();
    img.set_data(NdArray::zeros(DType::U8, vec![2, 2]));
    img.set_resolution(vec![1.0, 0.5]);
    let mut value = Value::resource(img);

    let json = encode(&mut value).unwrap();
    assert_eq!(json["data"]["metadata"], serde_json::Value::Null);
    assert_eq!(json["data"]["resolution"], json!([1.0, 0.5]));

    let decoded = decode(json, &Registry::builtin()).unwrap();
    let rebuilt = decoded.downcast_ref::<ImageTarget>().unwrap();
    assert_eq!(rebuilt.get_resolution(), Some(&[1.0, 0.5][..]));
    assert!(rebuilt.get_metadata().is_none());
}

#[test]
fn zarr_source_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("s.zarr");
    write_array(&store, "0", &NdArray::zeros(DType::U16, vec![12]), &[5]).unwrap();
    let codec = ZarrCodec::new("0", vec![-4], vec![12], Mode::R).unwrap();
    let mut value =
        Value::resource(ZarrSource::from_path_with(store.to_str().unwrap(), codec).unwrap());

    let json = encode(&mut value).unwrap();
    assert_eq!(json["type_tag"], "cachet.zarr.Source");
    assert_eq!(json["data"]["slices_start"], json!([-4]));

    let mut decoded = decode(json, &Registry::builtin()).unwrap();
    let src = decoded.downcast_mut::<ZarrSource>().unwrap();
    let data = src.get_data(true).unwrap();
    assert_eq!(data.as_region().unwrap().shape(), &[4]);
}

#[test]
fn tampered_file_fails_after_decode() {
    let dir = tempfile::tempdir().unwrap();
    let mut target = CsvTarget::from_path(dir.path().join("t.csv").to_str().unwrap()).unwrap();
    target.set_data(table());
    let mut value = Value::resource(target);
    let json = encode(&mut value).unwrap();

    let path = value.as_handle().unwrap().path().unwrap();
    fs::write(&path, ",col1,col2\n0,1,a\n1,2,b\n2,3,CHANGED\n").unwrap();

    let mut decoded = decode(json, &Registry::builtin()).unwrap();
    let err = decoded
        .downcast_mut::<CsvTarget>()
        .unwrap()
        .get_data(true)
        .unwrap_err();
    assert!(matches!(err, ResourceError::Integrity { .. }));
}

#[test]
fn unhashed_empty_target_cannot_be_encoded() {
    let mut value = Value::resource(CsvTarget::from_path("/tmp/never.csv").unwrap());
    assert!(matches!(
        encode(&mut value),
        Err(EnvelopeError::Resource(ResourceError::Precondition(_)))
    ));
}

#[test]
fn envelope_with_bad_fields_is_rejected() {
    let json = json!({"type_tag": "cachet.csv.Target", "data": {"location": 3}});
    assert!(matches!(
        decode(json, &Registry::builtin()),
        Err(EnvelopeError::Resource(ResourceError::InvalidField { .. }))
    ));
}

#[test]
fn handles_report_their_tags() {
    let value = Value::resource(CsvSource::from_path("/d/x.csv").unwrap());
    let handle: &dyn Handle = value.as_handle().unwrap();
    assert_eq!(handle.type_tag(), "cachet.csv.Source");
}
