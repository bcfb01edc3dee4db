use super::{json_pretty, load_document, EXIT_SUCCESS};
use cachet_resource::Handle;
use serde_json::{json, Value as Json};
use std::path::Path;

fn entry(handle: &dyn Handle) -> Json {
    let path = handle.path().map(|p| p.display().to_string()).ok();
    let fields = handle.fingerprint().map_or(Json::Null, Json::Object);
    json!({
        "type_tag": handle.type_tag().as_str(),
        "path": path,
        "fields": fields,
    })
}

pub fn run(file: &Path, json: bool) -> Result<u8, String> {
    let document = load_document(file)?;
    let handles = document.handles();

    if json {
        let entries: Vec<Json> = handles.iter().map(|h| entry(*h)).collect();
        println!("{}", json_pretty(&json!({ "resources": entries }))?);
    } else if handles.is_empty() {
        println!("no resources in {}", file.display());
    } else {
        for handle in &handles {
            let path = handle
                .path()
                .map_or_else(|e| format!("(unresolved: {e})"), |p| p.display().to_string());
            println!("{:<24} {path}", handle.type_tag().as_str());
        }
    }
    Ok(EXIT_SUCCESS)
}
