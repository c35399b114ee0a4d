//! Type-name registry.
//!
//! Sequence files record the type names of their keys and values rather than any binary type identity. The
//! registry maps those names to zero-argument factories, so records can be reconstructed generically, and keeps
//! aliases for names that were renamed after files were written.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{Result, SeqFileError};
use crate::record::{Bytes, Int, Long, Null, Text, Writable};

type Factory = fn() -> Box<dyn Writable>;

fn factory<T: Writable + Default + 'static>() -> Box<dyn Writable> {
    Box::new(T::default())
}

/// Registry of record factories keyed by type name.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<&'static str, Factory>,
    names: HashMap<TypeId, &'static str>,
    aliases: HashMap<String, &'static str>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Creates a registry holding the built-in record types.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        registry
            .register::<Int>()
            .register::<Long>()
            .register::<Text>()
            .register::<Bytes>()
            .register::<Null>();

        return registry;
    }

    /// Registers a record type under the name it reports.
    pub fn register<T: Writable + Default + 'static>(&mut self) -> &mut Self {
        let name = T::default().type_name();
        self.factories.insert(name, factory::<T>);
        self.names.insert(TypeId::of::<T>(), name);

        return self;
    }

    /// Makes `alias` resolve to the registered type `name`.
    /// Used to keep reading files written before a type was renamed.
    pub fn add_alias(&mut self, alias: &str, name: &str) -> Result<&mut Self> {
        let (&name, _) = self
            .factories
            .get_key_value(name)
            .ok_or_else(|| SeqFileError::UnknownType(name.to_string()))?;
        self.aliases.insert(alias.to_string(), name);

        return Ok(self);
    }

    /// Returns the name a registered type is recorded under.
    pub fn name_for<T: 'static>(&self) -> Option<&'static str> {
        self.names.get(&TypeId::of::<T>()).copied()
    }

    /// Resolves a recorded type name, following aliases.
    pub fn canonical_name(&self, name: &str) -> Option<&'static str> {
        if let Some((&name, _)) = self.factories.get_key_value(name) {
            return Some(name);
        }
        self.aliases.get(name).copied()
    }

    /// Creates a default instance of the type recorded as `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Writable>> {
        let name = self
            .canonical_name(name)
            .ok_or_else(|| SeqFileError::UnknownType(name.to_string()))?;
        let factory = self.factories[name];

        return Ok(factory());
    }
}

#[cfg(test)]
mod test {
    use super::Registry;
    use crate::error::SeqFileError;
    use crate::record::{Int, Text, Writable};

    #[test]
    fn test_builtins() {
        let registry = Registry::with_builtins();

        assert_eq!(registry.name_for::<Int>(), Some("int"));
        assert_eq!(registry.name_for::<String>(), None);
        assert_eq!(registry.create("text").unwrap().type_name(), Text::default().type_name());
        assert!(matches!(registry.create("float"), Err(SeqFileError::UnknownType(name)) if name == "float"));
    }

    #[test]
    fn test_alias() {
        let mut registry = Registry::with_builtins();
        registry.add_alias("org.example.IntWritable", "int").unwrap();

        assert_eq!(registry.canonical_name("org.example.IntWritable"), Some("int"));
        assert_eq!(registry.create("org.example.IntWritable").unwrap().type_name(), "int");
        assert!(registry.add_alias("x", "missing").is_err());
    }
}
