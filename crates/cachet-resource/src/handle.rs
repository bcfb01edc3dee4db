//! Type-erased access to resources and targets of any kind.
//!
//! The envelope serializer and the hasher walk argument graphs that mix
//! kinds, so they see every resource through [`Handle`]. Callers recover the
//! concrete type with [`downcast_ref`](dyn Handle::downcast_ref).

use crate::codec::{Codec, ContentHash};
use crate::resource::Resource;
use crate::target::Target;
use crate::types::TypeTag;
use crate::ResourceError;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::path::PathBuf;

/// Constructor stored in a type-tag registry.
pub type HandleFactory = fn(&Map<String, Value>) -> Result<Box<dyn Handle>, ResourceError>;

pub trait Handle: fmt::Debug + Any {
    fn type_tag(&self) -> TypeTag;

    /// Envelope fields. Targets persist and release their payload first.
    fn serialize(&mut self) -> Result<Map<String, Value>, ResourceError>;

    /// Envelope fields computed without side effects.
    fn fingerprint(&self) -> Result<Map<String, Value>, ResourceError>;

    fn path(&self) -> Result<PathBuf, ResourceError>;

    /// Re-read the backing file and, for targets, check its hash.
    fn verify(&self) -> Result<(), ResourceError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Handle {
    pub fn downcast_ref<T: Handle>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Handle>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    pub fn is<T: Handle>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

pub fn source_tag<C: Codec>() -> TypeTag {
    TypeTag::new(format!("cachet.{}.Source", C::KIND))
}

pub fn target_tag<C: Codec>() -> TypeTag {
    TypeTag::new(format!("cachet.{}.Target", C::KIND))
}

pub fn decode_source<C>(fields: &Map<String, Value>) -> Result<Box<dyn Handle>, ResourceError>
where
    C: Codec + 'static,
{
    Ok(Box::new(Resource::<C>::from_fields(fields)?))
}

pub fn decode_target<C>(fields: &Map<String, Value>) -> Result<Box<dyn Handle>, ResourceError>
where
    C: ContentHash + 'static,
{
    Ok(Box::new(Target::<C>::from_fields(fields)?))
}

impl<C: Codec + 'static> Handle for Resource<C> {
    fn type_tag(&self) -> TypeTag {
        source_tag::<C>()
    }

    fn serialize(&mut self) -> Result<Map<String, Value>, ResourceError> {
        Ok(Resource::serialize(self))
    }

    fn fingerprint(&self) -> Result<Map<String, Value>, ResourceError> {
        Ok(Resource::serialize(self))
    }

    fn path(&self) -> Result<PathBuf, ResourceError> {
        Ok(self.get_path())
    }

    fn verify(&self) -> Result<(), ResourceError> {
        self.read_data().map(drop)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C: ContentHash + 'static> Handle for Target<C> {
    fn type_tag(&self) -> TypeTag {
        target_tag::<C>()
    }

    fn serialize(&mut self) -> Result<Map<String, Value>, ResourceError> {
        Target::serialize(self)
    }

    fn fingerprint(&self) -> Result<Map<String, Value>, ResourceError> {
        Target::fingerprint(self)
    }

    fn path(&self) -> Result<PathBuf, ResourceError> {
        self.get_path()
    }

    fn verify(&self) -> Result<(), ResourceError> {
        self.load_verified().map(drop)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
