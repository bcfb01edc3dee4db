use cachet_codecs::{NdArray, NumpyTarget};
use cachet_envelope::Value;
use cachet_hash::{hash_objects, task_input_hash};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::path::Path;

fn nested_arguments(dir: &Path, targets: usize) -> Vec<Value> {
    (0..targets)
        .map(|i| {
            let path = dir.join(format!("part{i}.npy"));
            let mut target = NumpyTarget::from_path(path.to_str().unwrap()).unwrap();
            let values: Vec<f64> = (0..4096).map(|v| (v * (i + 1)) as f64).collect();
            target.set_data(NdArray::from_f64(vec![64, 64], &values).unwrap());
            Value::map([
                ("index", Value::from(i as i64)),
                ("data", Value::resource(target)),
                ("tags", Value::from(vec![Value::from("a"), Value::from("b")])),
            ])
        })
        .collect()
}

fn bench_plain_arguments(c: &mut Criterion) {
    c.bench_function("hash_objects_plain_100", |b| {
        b.iter_with_setup(
            || {
                (0..100)
                    .map(|i| Value::from(format!("argument-{i}")))
                    .collect::<Vec<_>>()
            },
            |mut args| {
                hash_objects(&mut args, &mut BTreeMap::new()).unwrap();
            },
        );
    });
}

fn bench_nested_targets(c: &mut Criterion) {
    c.bench_function("hash_objects_nested_targets_8", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let args = nested_arguments(dir.path(), 8);
                (dir, args)
            },
            |(_dir, mut args)| {
                hash_objects(&mut args, &mut BTreeMap::new()).unwrap();
            },
        );
    });
}

fn bench_rehash_persisted(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut args = nested_arguments(dir.path(), 8);
    hash_objects(&mut args, &mut BTreeMap::new()).unwrap();

    c.bench_function("hash_objects_persisted_targets_8", |b| {
        b.iter(|| hash_objects(&mut args, &mut BTreeMap::new()).unwrap());
    });
}

fn bench_task_input_hash(c: &mut Criterion) {
    let code = vec![b'x'; 16 * 1024];
    c.bench_function("task_input_hash_16k_code", |b| {
        b.iter_with_setup(
            || BTreeMap::from([("threshold".to_owned(), Value::from(0.5))]),
            |mut args| task_input_hash("segment", &code, &mut args).unwrap(),
        );
    });
}

criterion_group!(
    benches,
    bench_plain_arguments,
    bench_nested_targets,
    bench_rehash_persisted,
    bench_task_input_hash,
);
criterion_main!(benches);
