use super::{json_pretty, load_document, resolve_algorithm, EXIT_SUCCESS};
use cachet_envelope::Value;
use cachet_hash::{hash_objects_with, task_input_hash_with, DigestAlgorithm};
use std::collections::BTreeMap;
use std::path::Path;

fn split(document: Value) -> (Vec<Value>, BTreeMap<String, Value>) {
    match document {
        Value::List(items) => (items, BTreeMap::new()),
        Value::Map(named) => (Vec::new(), named),
        other => (vec![other], BTreeMap::new()),
    }
}

pub fn run(
    file: &Path,
    algorithm: Option<DigestAlgorithm>,
    task: Option<(&str, &Path)>,
    config: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let algorithm = resolve_algorithm(algorithm, config)?;
    let document = load_document(file)?;

    let digest = if let Some((task_key, code_path)) = task {
        let code = std::fs::read(code_path)
            .map_err(|e| format!("failed to read '{}': {e}", code_path.display()))?;
        let Value::Map(mut arguments) = document else {
            return Err("task arguments must be a JSON object".to_owned());
        };
        task_input_hash_with(algorithm, task_key, &code, &mut arguments)
    } else {
        let (mut positional, mut named) = split(document);
        hash_objects_with(algorithm, &mut positional, &mut named)
    };

    let digest =
        digest.ok_or_else(|| format!("arguments in '{}' cannot be hashed", file.display()))?;
    if json {
        let payload = serde_json::json!({
            "algorithm": algorithm.as_str(),
            "digest": digest,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{digest}");
    }
    Ok(EXIT_SUCCESS)
}
