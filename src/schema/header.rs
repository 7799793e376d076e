//! The fixed header section schema shared by every exchange file

use super::{Schema, SchemaDefinition};
use crate::Result;
use std::sync::Arc;

pub const HEADER_SCHEMA_NAME: &str = "HEADER_SECTION_SCHEMA";

pub const FILE_DESCRIPTION: &str = "FILE_DESCRIPTION";
pub const FILE_NAME: &str = "FILE_NAME";
pub const FILE_SCHEMA: &str = "FILE_SCHEMA";

const HEADER_DEFINITION: &str = r#"
name = "HEADER_SECTION_SCHEMA"

[[entities]]
name = "FILE_DESCRIPTION"
attributes = [
    { name = "description", type = "LIST [1:?] OF STRING" },
    { name = "implementation_level", type = "STRING" },
]

[[entities]]
name = "FILE_NAME"
attributes = [
    { name = "name", type = "STRING" },
    { name = "time_stamp", type = "STRING" },
    { name = "author", type = "LIST [1:?] OF STRING" },
    { name = "organization", type = "LIST [1:?] OF STRING" },
    { name = "preprocessor_version", type = "STRING" },
    { name = "originating_system", type = "STRING" },
    { name = "authorization", type = "STRING" },
]

[[entities]]
name = "FILE_SCHEMA"
attributes = [
    { name = "schema_identifiers", type = "LIST [1:?] OF STRING" },
]
"#;

/// Build the header schema. Cheap; every store builds its own copy.
pub fn header_schema() -> Result<Arc<Schema>> {
    Ok(Arc::new(SchemaDefinition::from_toml_str(HEADER_DEFINITION)?.build()?))
}
