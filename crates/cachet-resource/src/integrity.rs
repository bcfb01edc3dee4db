use crate::handle::Handle;
use crate::ResourceError;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    /// File path, or the type tag when no path can be resolved.
    pub location: String,
    pub reason: String,
}

/// Re-read every handle and collect the ones whose backing file is missing,
/// unreadable, or no longer matches its recorded hash.
pub fn verify_handles<'a, I>(handles: I) -> IntegrityReport
where
    I: IntoIterator<Item = &'a dyn Handle>,
{
    let mut report = IntegrityReport::default();

    for handle in handles {
        report.checked += 1;
        let location = handle
            .path()
            .map_or_else(|_| handle.type_tag().into_inner(), |p| p.display().to_string());

        match handle.verify() {
            Ok(()) => report.passed += 1,
            Err(ResourceError::Integrity { actual, .. }) => {
                report.failed.push(IntegrityFailure {
                    location,
                    reason: format!("content hash mismatch: got {actual}"),
                });
            }
            Err(ResourceError::NotFound(_)) => {
                report.failed.push(IntegrityFailure {
                    location,
                    reason: "file does not exist".to_owned(),
                });
            }
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    location,
                    reason: format!("read error: {e}"),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, ContentHash};
    use crate::target::Target;
    use crate::types::DataHash;
    use serde_json::{Map, Value};
    use std::fs;
    use std::path::Path;

    #[derive(Debug, Default)]
    struct Raw;

    impl Codec for Raw {
        type Payload = Vec<u8>;
        const KIND: &'static str = "raw";

        fn read(&self, path: &Path) -> Result<Vec<u8>, ResourceError> {
            Ok(fs::read(path)?)
        }

        fn write(&self, path: &Path, payload: &Vec<u8>) -> Result<(), ResourceError> {
            Ok(fs::write(path, payload)?)
        }

        fn from_fields(_: &Map<String, Value>) -> Result<Self, ResourceError> {
            Ok(Self)
        }
    }

    impl ContentHash for Raw {
        fn hash(&self, payload: &Vec<u8>) -> DataHash {
            DataHash::new(blake3::hash(payload).to_hex().to_string())
        }
    }

    fn persisted(dir: &Path, name: &str, payload: &[u8]) -> Box<dyn Handle> {
        let mut t = Target::<Raw>::new(dir.to_str().unwrap(), name, ".raw").unwrap();
        t.set_data(payload.to_vec());
        t.serialize().unwrap();
        Box::new(t)
    }

    #[test]
    fn clean_targets_pass() {
        let dir = tempfile::tempdir().unwrap();
        let handles = [
            persisted(dir.path(), "a", b"data1"),
            persisted(dir.path(), "b", b"data2"),
        ];
        let report = verify_handles(handles.iter().map(|h| &**h));
        assert_eq!(report.checked, 2);
        assert_eq!(report.passed, 2);
        assert!(report.is_clean());
    }

    #[test]
    fn corrupted_target_detected() {
        let dir = tempfile::tempdir().unwrap();
        let handle = persisted(dir.path(), "a", b"original");
        let path = handle.path().unwrap();
        fs::write(&path, b"corrupted").unwrap();

        let report = verify_handles([&*handle]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].location, path.display().to_string());
        assert!(report.failed[0].reason.contains("mismatch"));
    }

    #[test]
    fn missing_target_detected() {
        let dir = tempfile::tempdir().unwrap();
        let handle = persisted(dir.path(), "a", b"gone");
        fs::remove_file(handle.path().unwrap()).unwrap();

        let report = verify_handles([&*handle]);
        assert_eq!(report.passed, 0);
        assert_eq!(report.failed[0].reason, "file does not exist");
    }

    #[test]
    fn unhashed_target_reports_tag() {
        let handle: Box<dyn Handle> = Box::new(Target::<Raw>::new("/tmp", "x", ".raw").unwrap());
        let report = verify_handles([&*handle]);
        assert_eq!(report.failed[0].location, "cachet.raw.Target");
    }

    #[test]
    fn empty_sweep_is_clean() {
        let report = verify_handles(std::iter::empty());
        assert_eq!(report.checked, 0);
        assert!(report.is_clean());
    }
}
