//! Bundled IFC-flavoured demonstration schema (`IFC_DEMO`)

use super::{Schema, SchemaDefinition};
use crate::Result;
use std::sync::Arc;

pub const DEMO_SCHEMA_NAME: &str = "IFC_DEMO";

const DEMO_DEFINITION: &str = include_str!("demo.toml");

pub fn demo_schema() -> Result<Arc<Schema>> {
    Ok(Arc::new(SchemaDefinition::from_toml_str(DEMO_DEFINITION)?.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_schema_builds() {
        let schema = demo_schema().unwrap();
        assert_eq!(schema.name(), DEMO_SCHEMA_NAME);
        assert!(schema.find("IfcProject").unwrap().is_entity());
        assert!(schema.find("IfcSIPrefix").unwrap().as_enumeration().is_some());
        assert!(schema.find("IfcLengthMeasure").unwrap().as_type().is_some());
    }
}
