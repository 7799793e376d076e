//! Parse Layer - exchange file decoding
//!
//! Decoding runs in stages:
//! - [`lexer`] turns bytes into tokens
//! - [`context`] groups the tokens of one record and builds its attribute storage
//! - [`streamer`] yields decoded records one at a time
//! - [`resolver`] patches deferred `#id` references once every record is known

pub mod context;
pub mod decoder;
pub mod header;
pub mod lexer;
pub mod resolver;
pub mod streamer;

pub use context::{PendingReference, PendingValue, ReferenceOrInstance};
pub use resolver::{BuilderState, ModelBuilder, ResolveStats};
pub use streamer::{InstanceStreamer, StreamedRecord};

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of opening an exchange file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    ReadError,
    NoHeader,
    UnsupportedSchema,
    InvalidSyntax,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::ReadError => "read_error",
            FileStatus::NoHeader => "no_header",
            FileStatus::UnsupportedSchema => "unsupported_schema",
            FileStatus::InvalidSyntax => "invalid_syntax",
        }
    }

    /// Status a failed load reports.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Io(_) => FileStatus::ReadError,
            Error::NoHeader(_) => FileStatus::NoHeader,
            Error::UnsupportedSchema(_) => FileStatus::UnsupportedSchema,
            _ => FileStatus::InvalidSyntax,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with `#id` references that name no instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedReferencePolicy {
    /// Log an error and leave the attribute blank
    #[default]
    Warn,
    /// Fail the load with [`Error::UnresolvedReference`]
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub unresolved_references: UnresolvedReferencePolicy,
    /// Size storage to the declared attribute count instead of the decoded count
    pub coerce_attribute_count: bool,
    /// Rescale length attributes when adding instances from another store
    pub calculate_unit_factors: bool,
    /// Records between progress log lines
    pub progress_interval: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            unresolved_references: UnresolvedReferencePolicy::Warn,
            coerce_attribute_count: true,
            calculate_unit_factors: true,
            progress_interval: 1000,
        }
    }
}
