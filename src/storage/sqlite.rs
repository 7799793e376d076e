//! SQLite key-value implementation

use super::schema;
use crate::Result;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Ordered key-value store over a single SQLite table
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Register the merge function and create the records table
    fn initialize_schema(&self) -> Result<()> {
        self.conn.create_scalar_function(
            schema::MERGE_FUNCTION,
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let mut existing = ctx.get::<Option<Vec<u8>>>(0)?.unwrap_or_default();
                let operand = ctx.get::<Option<Vec<u8>>>(1)?.unwrap_or_default();
                existing.extend_from_slice(&operand);
                Ok(existing)
            },
        )?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Record Operations ==========

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Insert or replace a record
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO records (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Append `operand` to the stored value without reading it first
    pub fn merge(&self, key: &str, operand: &[u8]) -> Result<()> {
        self.conn.execute(schema::MERGE_RECORD, params![key, operand])?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM records WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM records WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// All records whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let upper = prefix_upper_bound(prefix);
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM records WHERE key >= ?1 AND key < ?2 ORDER BY key",
        )?;
        let records = stmt
            .query_map(params![prefix, upper], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let upper = prefix_upper_bound(prefix);
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM records WHERE key >= ?1 AND key < ?2 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix, upper], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Delete every record under `prefix`, returning how many were removed
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let upper = prefix_upper_bound(prefix);
        let removed = self.conn.execute(
            "DELETE FROM records WHERE key >= ?1 AND key < ?2",
            params![prefix, upper],
        )?;
        Ok(removed)
    }

    pub fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let upper = prefix_upper_bound(prefix);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE key >= ?1 AND key < ?2",
            params![prefix, upper],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction for bulk operations
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Delete all records
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM records", [])?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT substr(key, 1, 1), COUNT(*) FROM records GROUP BY 1")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stats = DbStats::default();
        for (namespace, count) in rows {
            let count = count as usize;
            match namespace.as_str() {
                "h" => stats.header = count,
                "i" => stats.entity = count,
                "t" => stats.type_instance = count,
                "v" => stats.inverse = count,
                "g" => stats.guid = count,
                _ => stats.other += count,
            }
        }
        Ok(stats)
    }
}

/// Smallest string greater than every string starting with `prefix`.
fn prefix_upper_bound(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0x7f {
            bytes.push(last + 1);
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    // Empty prefix: every key sorts below DEL.
    "\u{7f}".to_string()
}

/// Record counts per key namespace
#[derive(Debug, Clone, Default)]
pub struct DbStats {
    pub header: usize,
    pub entity: usize,
    /// Defined-type instance records and type index records
    pub type_instance: usize,
    pub inverse: usize,
    pub guid: usize,
    pub other: usize,
}

impl DbStats {
    pub fn total(&self) -> usize {
        self.header + self.entity + self.type_instance + self.inverse + self.guid + self.other
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Header records: {}", self.header)?;
        writeln!(f, "  Entity records: {}", self.entity)?;
        writeln!(f, "  Type records: {}", self.type_instance)?;
        writeln!(f, "  Inverse records: {}", self.inverse)?;
        writeln!(f, "  GlobalId records: {}", self.guid)?;
        write!(f, "  Total: {}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_crud() {
        let kv = KvStore::open_in_memory().unwrap();

        kv.put("i|1|0", b"abc").unwrap();
        assert_eq!(kv.get("i|1|0").unwrap().unwrap(), b"abc");
        assert!(kv.contains("i|1|0").unwrap());

        kv.put("i|1|0", b"xyz").unwrap();
        assert_eq!(kv.get("i|1|0").unwrap().unwrap(), b"xyz");

        kv.delete("i|1|0").unwrap();
        assert!(kv.get("i|1|0").unwrap().is_none());
        assert!(!kv.contains("i|1|0").unwrap());
    }

    #[test]
    fn test_merge_appends() {
        let kv = KvStore::open_in_memory().unwrap();

        kv.merge("v|1|2|3", &[1, 0, 0, 0]).unwrap();
        kv.merge("v|1|2|3", &[2, 0, 0, 0]).unwrap();
        assert_eq!(kv.get("v|1|2|3").unwrap().unwrap(), vec![1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_prefix_operations() {
        let kv = KvStore::open_in_memory().unwrap();

        kv.put("i|1|0", b"a").unwrap();
        kv.put("i|1|1", b"b").unwrap();
        kv.put("i|10|0", b"c").unwrap();
        kv.put("i|2|0", b"d").unwrap();

        let keys = kv.keys_with_prefix("i|1|").unwrap();
        assert_eq!(keys, vec!["i|1|0", "i|1|1"]);
        assert_eq!(kv.count_prefix("i|").unwrap(), 4);

        let records = kv.scan_prefix("i|2|").unwrap();
        assert_eq!(records, vec![("i|2|0".to_string(), b"d".to_vec())]);

        assert_eq!(kv.delete_prefix("i|1|").unwrap(), 2);
        assert_eq!(kv.count_prefix("i|").unwrap(), 2);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let kv = KvStore::open_in_memory().unwrap();

        kv.begin_transaction().unwrap();
        kv.put("g|abc", b"1").unwrap();
        kv.rollback().unwrap();
        assert!(kv.get("g|abc").unwrap().is_none());

        kv.begin_transaction().unwrap();
        kv.put("g|abc", b"1").unwrap();
        kv.commit().unwrap();
        assert!(kv.get("g|abc").unwrap().is_some());
    }

    #[test]
    fn test_stats_by_namespace() {
        let kv = KvStore::open_in_memory().unwrap();

        kv.put("h|FILE_NAME|0", b"x").unwrap();
        kv.put("i|1|_", b"x").unwrap();
        kv.put("i|1|0", b"x").unwrap();
        kv.put("t|4", b"x").unwrap();
        kv.put("g|abc", b"x").unwrap();

        let stats = kv.stats().unwrap();
        assert_eq!(stats.header, 1);
        assert_eq!(stats.entity, 2);
        assert_eq!(stats.type_instance, 1);
        assert_eq!(stats.guid, 1);
        assert_eq!(stats.total(), 5);
        assert!(stats.to_string().contains("Entity records: 2"));

        kv.clear_all().unwrap();
        assert_eq!(kv.stats().unwrap().total(), 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.db");
        {
            let kv = KvStore::open(&path).unwrap();
            kv.merge("t|3", &[7, 0, 0, 0]).unwrap();
        }
        let kv = KvStore::open(&path).unwrap();
        kv.merge("t|3", &[8, 0, 0, 0]).unwrap();
        assert_eq!(kv.get("t|3").unwrap().unwrap(), vec![7, 0, 0, 0, 8, 0, 0, 0]);
    }
}
