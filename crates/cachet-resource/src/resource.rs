use crate::codec::{check_extension, Codec};
use crate::naming::{resource_path, split_path};
use crate::ResourceError;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::debug;

/// A location-addressed, lazily loaded data handle.
///
/// The payload is read through the codec on first access and, when asked to,
/// kept on the instance. A resource never writes; see [`Target`](crate::Target)
/// for persistence.
#[derive(Debug)]
pub struct Resource<C: Codec> {
    location: String,
    name: String,
    ext: String,
    codec: C,
    pub(crate) data: Option<C::Payload>,
}

impl<C: Codec> Resource<C> {
    pub fn with_codec(
        location: impl Into<String>,
        name: impl Into<String>,
        ext: impl Into<String>,
        codec: C,
    ) -> Result<Self, ResourceError> {
        let ext = ext.into();
        check_extension::<C>(&ext)?;
        Ok(Self {
            location: location.into(),
            name: name.into(),
            ext,
            codec,
            data: None,
        })
    }

    pub fn new(
        location: impl Into<String>,
        name: impl Into<String>,
        ext: impl Into<String>,
    ) -> Result<Self, ResourceError>
    where
        C: Default,
    {
        Self::with_codec(location, name, ext, C::default())
    }

    /// Build a resource by splitting `path` into location, name and extension.
    pub fn from_path(path: &str) -> Result<Self, ResourceError>
    where
        C: Default,
    {
        Self::from_path_with(path, C::default())
    }

    pub fn from_path_with(path: &str, codec: C) -> Result<Self, ResourceError> {
        let parts = split_path(path);
        Self::with_codec(parts.location, parts.name, parts.ext, codec)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    #[inline]
    pub fn get_path(&self) -> PathBuf {
        resource_path(&self.location, &self.name, &self.ext)
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Access the payload.
    ///
    /// With `cache` the first read is kept and later calls borrow it. Without
    /// `cache` every call re-reads the backing file, which picks up changes
    /// made by other writers.
    pub fn get_data(&mut self, cache: bool) -> Result<Cow<'_, C::Payload>, ResourceError> {
        if !cache {
            return self.read_data().map(Cow::Owned);
        }
        let payload = match self.data.take() {
            Some(data) => data,
            None => self.read_data()?,
        };
        Ok(Cow::Borrowed(&*self.data.insert(payload)))
    }

    /// Drop the in-memory payload, returning it if one was held.
    pub fn release_data(&mut self) -> Option<C::Payload> {
        self.data.take()
    }

    pub(crate) fn read_data(&self) -> Result<C::Payload, ResourceError> {
        let path = self.get_path();
        if !path.exists() {
            return Err(ResourceError::NotFound(path));
        }
        debug!("reading {} resource {}", C::KIND, path.display());
        self.codec.read(&path)
    }

    /// Envelope fields. Never includes the payload.
    pub fn serialize(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("location".to_owned(), Value::String(self.location.clone()));
        fields.insert("name".to_owned(), Value::String(self.name.clone()));
        fields.insert("ext".to_owned(), Value::String(self.ext.clone()));
        fields.extend(self.codec.fields());
        fields
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, ResourceError> {
        Self::with_codec(
            str_field(fields, "location")?,
            str_field(fields, "name")?,
            str_field(fields, "ext")?,
            C::from_fields(fields)?,
        )
    }
}

pub(crate) fn str_field(fields: &Map<String, Value>, key: &str) -> Result<String, ResourceError> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ResourceError::InvalidField {
            field: key.to_owned(),
            reason: format!("expected a string, got {other}"),
        }),
        None => Err(ResourceError::missing_field(key)),
    }
}
