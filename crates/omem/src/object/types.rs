//! Type registry - type tags to names and restore functions
//!
//! Restoring an image needs, for every record, a function that turns the
//! record payload back into an object. The built-in types register
//! themselves in [`TypeRegistry::with_builtins`]; a runtime registers its
//! own types with tags from [`TypeTag::FIRST_USER`] upwards.

use rustc_hash::FxHashMap;

use super::{HeapObject, TypeTag};
use crate::envelope::image::RecordReader;
use crate::error::Result;

/// Decodes one image record payload into an object
pub type RestoreFn = fn(&mut RecordReader<'_>) -> Result<Box<dyn HeapObject>>;

/// Registered metadata for one type tag
#[derive(Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub restore: RestoreFn,
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo").field("name", &self.name).finish()
    }
}

/// Map from type tag to [`TypeInfo`]
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: FxHashMap<TypeTag, TypeInfo>,
}

impl TypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in type registered
    pub fn with_builtins() -> Self {
        use super::builtin::{ArrayObject, BufferObject, StringObject};
        use crate::table::list::{ListObject, ListTable};
        use crate::table::map::{MapBucket, MapTable};

        let mut registry = Self::new();
        registry.register(TypeTag::STRING, "String", StringObject::restore);
        registry.register(TypeTag::ARRAY, "Array", ArrayObject::restore);
        registry.register(TypeTag::BUFFER, "Buffer", BufferObject::restore);
        registry.register(TypeTag::MAP_BUCKET, "MapBucket", MapBucket::restore);
        registry.register(TypeTag::MAP_TABLE, "MapTable", MapTable::restore);
        registry.register(TypeTag::LIST_TABLE, "ListTable", ListTable::restore);
        registry.register(TypeTag::LIST, "List", ListObject::restore);
        registry
    }

    /// Register a type, returning the previous registration for the tag
    pub fn register(
        &mut self,
        tag: TypeTag,
        name: &'static str,
        restore: RestoreFn,
    ) -> Option<TypeInfo> {
        self.types.insert(tag, TypeInfo { name, restore })
    }

    pub fn get(&self, tag: TypeTag) -> Option<&TypeInfo> {
        self.types.get(&tag)
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.types.contains_key(&tag)
    }

    /// Display name for a tag, falling back to the numeric form
    pub fn name_of(&self, tag: TypeTag) -> String {
        match self.types.get(&tag) {
            Some(info) => info.name.to_string(),
            None => tag.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
