use cachet_codecs::{CsvCodec, ImageCodec, NpyCodec, ZarrCodec};
use cachet_resource::{
    decode_source, decode_target, source_tag, target_tag, Codec, ContentHash, HandleFactory,
    TypeTag,
};
use std::collections::BTreeMap;

/// Type tags the decoder knows how to turn back into resources.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, HandleFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in kind: sources and targets for csv, image and numpy, and
    /// the zarr source.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_kind::<CsvCodec>();
        registry.register_kind::<ImageCodec>();
        registry.register_kind::<NpyCodec>();
        registry.register_source::<ZarrCodec>();
        registry
    }

    /// Returns the factory previously registered under `tag`, if any.
    pub fn register(&mut self, tag: TypeTag, factory: HandleFactory) -> Option<HandleFactory> {
        self.factories.insert(tag.into_inner(), factory)
    }

    pub fn register_source<C: Codec + 'static>(&mut self) {
        self.register(source_tag::<C>(), decode_source::<C>);
    }

    pub fn register_kind<C: ContentHash + 'static>(&mut self) {
        self.register_source::<C>();
        self.register(target_tag::<C>(), decode_target::<C>);
    }

    pub fn get(&self, tag: &str) -> Option<HandleFactory> {
        self.factories.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
