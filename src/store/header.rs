//! File header - the three header-section records of a store

use crate::instance::{Instance, InstanceRef};
use crate::schema::header::{FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA};
use crate::schema::Schema;
use crate::value::AttributeValue;
use crate::Result;
use std::sync::Arc;

pub const DEFAULT_DESCRIPTION: &str = "ViewDefinition [CoordinationView]";
pub const DEFAULT_IMPLEMENTATION_LEVEL: &str = "2;1";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// `FILE_DESCRIPTION`, `FILE_NAME` and `FILE_SCHEMA` instances of the header schema.
#[derive(Debug, Clone)]
pub struct Header {
    file_description: InstanceRef,
    file_name: InstanceRef,
    file_schema: InstanceRef,
}

impl Header {
    /// Default header for a new file written against `schema_name`.
    pub fn new(header_schema: &Arc<Schema>, schema_name: &str) -> Result<Self> {
        let header = Self {
            file_description: Instance::new(header_schema, FILE_DESCRIPTION)?,
            file_name: Instance::new(header_schema, FILE_NAME)?,
            file_schema: Instance::new(header_schema, FILE_SCHEMA)?,
        };

        let software = format!("stepstore {}", env!("CARGO_PKG_VERSION"));
        header.set_description(vec![DEFAULT_DESCRIPTION.to_string()])?;
        header.set_implementation_level(DEFAULT_IMPLEMENTATION_LEVEL)?;
        header.set_name("")?;
        header.set_time_stamp(&chrono::Local::now().format(TIMESTAMP_FORMAT).to_string())?;
        header.set_author(vec![String::new()])?;
        header.set_organization(vec![String::new()])?;
        header.file_name.set(4, software.as_str())?;
        header.file_name.set(5, software.as_str())?;
        header.file_name.set(6, "")?;
        header.set_schema_identifiers(vec![schema_name.to_string()])?;
        Ok(header)
    }

    pub(crate) fn from_records(
        file_description: InstanceRef,
        file_name: InstanceRef,
        file_schema: InstanceRef,
    ) -> Self {
        Self { file_description, file_name, file_schema }
    }

    /// The records in file order.
    pub fn records(&self) -> [&InstanceRef; 3] {
        [&self.file_description, &self.file_name, &self.file_schema]
    }

    pub fn file_description(&self) -> &InstanceRef {
        &self.file_description
    }

    pub fn file_name(&self) -> &InstanceRef {
        &self.file_name
    }

    pub fn file_schema(&self) -> &InstanceRef {
        &self.file_schema
    }

    fn text(record: &InstanceRef, slot: usize) -> Result<Option<String>> {
        record.get_as::<Option<String>>(slot)
    }

    fn list(record: &InstanceRef, slot: usize) -> Result<Vec<String>> {
        Ok(record.get_as::<Option<Vec<String>>>(slot)?.unwrap_or_default())
    }

    pub fn description(&self) -> Result<Vec<String>> {
        Self::list(&self.file_description, 0)
    }

    pub fn set_description(&self, description: Vec<String>) -> Result<()> {
        self.file_description.set(0, description)
    }

    pub fn implementation_level(&self) -> Result<Option<String>> {
        Self::text(&self.file_description, 1)
    }

    pub fn set_implementation_level(&self, level: &str) -> Result<()> {
        self.file_description.set(1, level)
    }

    pub fn name(&self) -> Result<Option<String>> {
        Self::text(&self.file_name, 0)
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.file_name.set(0, name)
    }

    pub fn time_stamp(&self) -> Result<Option<String>> {
        Self::text(&self.file_name, 1)
    }

    pub fn set_time_stamp(&self, time_stamp: &str) -> Result<()> {
        self.file_name.set(1, time_stamp)
    }

    pub fn author(&self) -> Result<Vec<String>> {
        Self::list(&self.file_name, 2)
    }

    pub fn set_author(&self, author: Vec<String>) -> Result<()> {
        self.file_name.set(2, author)
    }

    pub fn organization(&self) -> Result<Vec<String>> {
        Self::list(&self.file_name, 3)
    }

    pub fn set_organization(&self, organization: Vec<String>) -> Result<()> {
        self.file_name.set(3, organization)
    }

    pub fn preprocessor_version(&self) -> Result<Option<String>> {
        Self::text(&self.file_name, 4)
    }

    pub fn originating_system(&self) -> Result<Option<String>> {
        Self::text(&self.file_name, 5)
    }

    pub fn authorization(&self) -> Result<Option<String>> {
        Self::text(&self.file_name, 6)
    }

    pub fn schema_identifiers(&self) -> Result<Vec<String>> {
        Self::list(&self.file_schema, 0)
    }

    pub fn set_schema_identifiers(&self, identifiers: Vec<String>) -> Result<()> {
        self.file_schema.set(0, identifiers)
    }

    /// The schema a file declares: the first `FILE_SCHEMA` identifier.
    pub fn schema_name(&self) -> Result<Option<String>> {
        Ok(self.schema_identifiers()?.into_iter().next())
    }

    /// Every value in file order, for copying a header between stores.
    pub(crate) fn values(&self) -> Result<[Vec<AttributeValue>; 3]> {
        Ok([
            self.file_description.values()?,
            self.file_name.values()?,
            self.file_schema.values()?,
        ])
    }
}
