use super::{json_pretty, load_document, EXIT_INTEGRITY, EXIT_SUCCESS};
use cachet_resource::verify_handles;
use std::path::Path;

pub fn run(file: &Path, json: bool) -> Result<u8, String> {
    let document = load_document(file)?;
    let report = verify_handles(document.handles());

    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| serde_json::json!({ "location": f.location, "reason": f.reason }))
            .collect();
        let payload = serde_json::json!({
            "checked": report.checked,
            "passed": report.passed,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "resource integrity: {}/{} resources passed",
            report.passed, report.checked
        );
        for f in &report.failed {
            println!("  FAIL {}: {}", f.location, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_INTEGRITY)
    }
}
