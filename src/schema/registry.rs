//! Explicit registry of schemas, looked up by the name a file header declares

use super::header::header_schema;
use super::{Schema, SchemaDefinition};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Name → schema table handed to the parser and to persistent store opening.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
    header: Arc<Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Result<Self> {
        Ok(Self { schemas: HashMap::new(), header: header_schema()? })
    }

    /// Registry with the bundled demonstration schema already registered.
    pub fn with_demo() -> Result<Self> {
        let mut registry = Self::new()?;
        registry.register(super::demo::demo_schema()?);
        Ok(registry)
    }

    pub fn register(&mut self, schema: Arc<Schema>) {
        tracing::debug!("Registering schema {}", schema.name());
        self.schemas.insert(schema.name().to_ascii_uppercase(), schema);
    }

    /// Build and register a schema from a TOML or JSON description file.
    pub fn register_file(&mut self, path: &Path) -> Result<Arc<Schema>> {
        let schema = Arc::new(SchemaDefinition::from_path(path)?.build()?);
        self.register(schema.clone());
        Ok(schema)
    }

    /// Case-insensitive schema lookup.
    pub fn get(&self, name: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| Error::UnsupportedSchema(name.to_string()))
    }

    pub fn header_schema(&self) -> Arc<Schema> {
        self.header.clone()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.values().map(|s| s.name()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_unsupported() {
        let registry = SchemaRegistry::with_demo().unwrap();
        assert_eq!(registry.get("ifc_demo").unwrap().name(), "IFC_DEMO");
        assert!(matches!(registry.get("IFC2X3"), Err(Error::UnsupportedSchema(_))));
        assert_eq!(registry.names(), vec!["IFC_DEMO"]);
    }

    #[test]
    fn test_register_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.toml");
        std::fs::write(
            &path,
            "name = \"TINY\"\n[[entities]]\nname = \"Thing\"\nattributes = [{ name = \"Size\", type = \"REAL\" }]\n",
        )
        .unwrap();

        let mut registry = SchemaRegistry::new().unwrap();
        registry.register_file(&path).unwrap();
        let schema = registry.get("TINY").unwrap();
        assert!(schema.find("THING").is_some());
    }
}
