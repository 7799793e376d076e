//! # stepstore - schema-typed STEP model store
//!
//! Decodes ISO 10303-21 ("STEP physical file") data into a graph of typed
//! instances, indexes it for id/guid/type/inverse access and can persist the
//! same graph in an SQLite-backed key-value store.
//!
//! stepstore provides:
//! - A hand-written tokenizer and attribute decoder with deferred reference resolution
//! - A tagged attribute representation backed by memory or by key-value records
//! - Forward and inverse relationship indices kept consistent under mutation
//! - Cross-store copy with identity remapping and length-unit rescaling
//! - A streaming reader for direct-to-database ingestion
//! - Serialization back to the textual exchange format

pub mod config;
pub mod instance;
pub mod parse;
pub mod schema;
pub mod storage;
pub mod store;
pub mod value;
pub mod writer;

// Re-exports for convenient access
pub use instance::{Instance, InstanceRef};
pub use parse::{FileStatus, InstanceStreamer, LoadOptions, UnresolvedReferencePolicy};
pub use schema::{Declaration, Schema, SchemaRegistry};
pub use storage::KvStore;
pub use store::{Store, UnitInfo};
pub use value::{ArgumentType, AttributeValue, BitString, EnumerationReference, Logical};

/// Result type alias for stepstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for stepstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid token at offset {offset}: expected {expected}")]
    InvalidToken { offset: usize, expected: &'static str },

    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("No valid header: {0}")]
    NoHeader(String),

    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Unknown declaration: {0}")]
    UnknownDeclaration(String),

    #[error("Entity {entity} has no attribute {attribute}")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Not an entity: {0}")]
    NotAnEntity(String),

    #[error("Instance #{0} not found")]
    InstanceNotFound(u32),

    #[error("Instance with GlobalId '{0}' not found")]
    GuidNotFound(String),

    #[error("Instance #{0} not part of this store")]
    NotInStore(u32),

    #[error("An instance with id {0} is already part of this store")]
    DuplicateId(u32),

    #[error("Cyclic dependency detected at instance #{0}")]
    CyclicDependency(u32),

    #[error("Attribute index {index} out of range for {entity}")]
    AttributeIndex { entity: String, index: usize },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Only finite values are allowed")]
    NonFiniteValue,

    #[error("Instance reference #{id} used by instance #{referrer} at attribute index {attribute} not found at offset {offset}")]
    UnresolvedReference { id: u32, referrer: u32, attribute: usize, offset: usize },

    #[error("Unable to map instance #{0} to store")]
    UnmappedInstance(u32),

    #[error("Incorrect reference: {0}")]
    IncorrectReference(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("The owning store has been dropped")]
    StoreDropped,

    #[error("Operation requires a persistent store")]
    NotPersistent,

    #[error("Schema definition error: {0}")]
    Definition(String),
}
