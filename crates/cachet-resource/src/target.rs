use crate::codec::ContentHash;
use crate::metadata::Metadata;
use crate::naming::target_path;
use crate::resource::Resource;
use crate::types::DataHash;
use crate::{fsync_dir, ResourceError};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A resource with content-addressed identity and write-once persistence.
///
/// Lifecycle: a payload is staged with [`set_data`](Self::set_data); the hash
/// is computed and the file written to `location/name-<hash>.ext` when the
/// target is serialized, after which the in-memory payload is released. A
/// later [`get_data`](Self::get_data) re-reads the file and refuses it unless
/// its recomputed hash equals the stored one.
///
/// The existence check before writing is not locked. Two writers racing on
/// the same hash both produce identical bytes; the loser's rename is
/// discarded.
#[derive(Debug)]
pub struct Target<C: ContentHash> {
    resource: Resource<C>,
    data_hash: Option<DataHash>,
    metadata: Metadata,
}

impl<C: ContentHash> Target<C> {
    pub fn with_codec(
        location: impl Into<String>,
        name: impl Into<String>,
        ext: impl Into<String>,
        codec: C,
    ) -> Result<Self, ResourceError> {
        Ok(Self::wrap(Resource::with_codec(location, name, ext, codec)?))
    }

    pub fn new(
        location: impl Into<String>,
        name: impl Into<String>,
        ext: impl Into<String>,
    ) -> Result<Self, ResourceError>
    where
        C: Default,
    {
        Ok(Self::wrap(Resource::new(location, name, ext)?))
    }

    pub fn from_path(path: &str) -> Result<Self, ResourceError>
    where
        C: Default,
    {
        Ok(Self::wrap(Resource::from_path(path)?))
    }

    pub fn from_path_with(path: &str, codec: C) -> Result<Self, ResourceError> {
        Ok(Self::wrap(Resource::from_path_with(path, codec)?))
    }

    fn wrap(resource: Resource<C>) -> Self {
        Self {
            resource,
            data_hash: None,
            metadata: Metadata::default(),
        }
    }

    /// Attach a previously computed hash, e.g. when rebuilding a persisted
    /// target without its payload.
    #[must_use]
    pub fn with_data_hash(mut self, hash: DataHash) -> Self {
        self.data_hash = Some(hash);
        self
    }

    pub fn location(&self) -> &str {
        self.resource.location()
    }

    pub fn get_name(&self) -> &str {
        self.resource.get_name()
    }

    pub fn ext(&self) -> &str {
        self.resource.ext()
    }

    pub fn codec(&self) -> &C {
        self.resource.codec()
    }

    pub fn data_hash(&self) -> Option<&DataHash> {
        self.data_hash.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.resource.is_loaded()
    }

    /// Stage a payload in memory. Hashing and persistence are deferred to
    /// [`serialize`](Self::serialize), so repeated staging is cheap.
    pub fn set_data(&mut self, payload: C::Payload) {
        self.resource.data = Some(payload);
    }

    /// Hash the staged payload. Without a payload the previous hash is kept.
    pub fn compute_data_hash(&mut self) {
        if let Some(data) = &self.resource.data {
            self.data_hash = Some(self.resource.codec().hash(data));
        }
    }

    pub fn get_path(&self) -> Result<PathBuf, ResourceError> {
        let hash = self.data_hash.as_ref().ok_or_else(|| {
            ResourceError::Precondition("data hash is unset; call set_data first".to_owned())
        })?;
        Ok(target_path(
            self.resource.location(),
            self.resource.get_name(),
            self.resource.ext(),
            hash,
        ))
    }

    /// Access the payload, re-reading and verifying it if it was released.
    pub fn get_data(&mut self, cache: bool) -> Result<Cow<'_, C::Payload>, ResourceError> {
        let payload = match self.resource.data.take() {
            Some(data) => data,
            None => {
                let loaded = self.load_verified()?;
                if !cache {
                    return Ok(Cow::Owned(loaded));
                }
                loaded
            }
        };
        Ok(Cow::Borrowed(&*self.resource.data.insert(payload)))
    }

    /// Read the persisted payload and check it against the stored hash.
    pub(crate) fn load_verified(&self) -> Result<C::Payload, ResourceError> {
        let path = self.get_path()?;
        if !path.exists() {
            return Err(ResourceError::NotFound(path));
        }
        debug!("reading {} target {}", C::KIND, path.display());
        let payload = self.resource.codec().read(&path)?;
        let actual = self.resource.codec().hash(&payload);
        match &self.data_hash {
            Some(expected) if *expected == actual => Ok(payload),
            expected => {
                let expected = expected.as_ref().map_or("", |h| h.as_str()).to_owned();
                warn!(
                    "hash mismatch for {}: expected {expected}, got {actual}",
                    path.display()
                );
                Err(ResourceError::Integrity {
                    path,
                    expected,
                    actual: actual.into_inner(),
                })
            }
        }
    }

    pub fn release_data(&mut self) -> Option<C::Payload> {
        self.resource.release_data()
    }

    /// Hash and write the staged payload. Returns the hash-derived path.
    ///
    /// An existing file at that path is never overwritten.
    pub fn persist(&mut self) -> Result<PathBuf, ResourceError> {
        self.compute_data_hash();
        let path = self.get_path()?;
        if let Some(data) = &self.resource.data {
            write_once(self.resource.codec(), &path, data)?;
        }
        Ok(path)
    }

    /// Persist, release the payload, and return the envelope fields.
    pub fn serialize(&mut self) -> Result<Map<String, Value>, ResourceError> {
        self.persist()?;
        self.release_data();
        Ok(self.fields(self.data_hash.as_ref()))
    }

    /// Envelope fields as they would be after [`serialize`](Self::serialize),
    /// without writing anything. The hash of a staged payload is computed but
    /// not stored.
    pub fn fingerprint(&self) -> Result<Map<String, Value>, ResourceError> {
        match (&self.resource.data, &self.data_hash) {
            (Some(data), _) => Ok(self.fields(Some(&self.resource.codec().hash(data)))),
            (None, Some(hash)) => Ok(self.fields(Some(hash))),
            (None, None) => Err(ResourceError::Precondition(
                "target has neither a payload nor a data hash".to_owned(),
            )),
        }
    }

    fn fields(&self, hash: Option<&DataHash>) -> Map<String, Value> {
        let mut fields = self.resource.serialize();
        fields.insert(
            "data_hash".to_owned(),
            hash.map_or(Value::Null, |h| Value::String(h.to_string())),
        );
        if C::CARRIES_METADATA {
            self.metadata.write_fields(&mut fields);
        }
        fields
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ResourceError> {
        let mut target = Self::wrap(Resource::from_fields(fields)?);
        target.data_hash = match fields.get("data_hash") {
            None | Some(Value::Null) => None,
            Some(Value::String(h)) => Some(DataHash::new(h.clone())),
            Some(other) => {
                return Err(ResourceError::InvalidField {
                    field: "data_hash".to_owned(),
                    reason: format!("expected a string or null, got {other}"),
                })
            }
        };
        if C::CARRIES_METADATA {
            target.metadata = Metadata::from_fields(fields)?;
        }
        Ok(target)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.get_metadata()
    }

    pub fn get_resolution(&self) -> Option<&[f64]> {
        self.metadata.get_resolution()
    }

    pub fn set_metadata(&mut self, metadata: Map<String, Value>) {
        self.metadata.metadata = Some(metadata);
    }

    pub fn set_resolution(&mut self, resolution: Vec<f64>) {
        self.metadata.resolution = Some(resolution);
    }
}

/// Write `payload` to `dest` unless something is already there.
///
/// The codec writes into a temporary file next to `dest`, which is then
/// renamed into place without clobbering.
fn write_once<C: ContentHash>(
    codec: &C,
    dest: &Path,
    payload: &C::Payload,
) -> Result<(), ResourceError> {
    if dest.exists() {
        debug!("{} already exists, skipping write", dest.display());
        return Ok(());
    }

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let tmp = NamedTempFile::new_in(&dir)?;
    codec.write(tmp.path(), payload)?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(dest) {
        Ok(_) => {}
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            debug!("{} was written concurrently, keeping existing file", dest.display());
            return Ok(());
        }
        Err(e) => return Err(ResourceError::Io(e.error)),
    }
    fsync_dir(&dir)?;
    debug!("persisted {} target {}", C::KIND, dest.display());
    Ok(())
}
