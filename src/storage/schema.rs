//! Database schema definitions

/// SQL to create the records table.
/// One ordered key-value table; every namespace shares it.
pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
) WITHOUT ROWID
"#;

/// Associative append: the store concatenates the operand onto the existing value.
pub const MERGE_RECORD: &str = r#"
INSERT INTO records (key, value) VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value = merge_append(records.value, excluded.value)
"#;

/// Name of the scalar function registered on every connection for [`MERGE_RECORD`].
pub const MERGE_FUNCTION: &str = "merge_append";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_RECORDS_TABLE]
}
