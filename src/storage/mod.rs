//! Storage Layer - attribute containers and SQLite-backed persistence
//!
//! Every instance keeps its attribute values in an [`AttributeStorage`]:
//! - [`InMemoryStorage`]: one value cell per slot
//! - [`PersistentStorage`]: one encoded record per slot in a [`KvStore`]
//!
//! The key-value store is a single ordered table; see [`keys`] for the layout.

pub mod codec;
pub mod keys;
pub mod schema;
pub mod sqlite;

pub use codec::RecordRef;
pub use keys::{RecordKey, RecordOwner};
pub use sqlite::{DbStats, KvStore};

use crate::instance::InstanceRef;
use crate::schema::Schema;
use crate::value::{ArgumentType, AttributeValue, FromAttribute};
use crate::Result;

/// Capability interface shared by both storage backends.
pub trait AttributeStorage {
    /// Number of attribute slots.
    fn size(&self) -> usize;

    /// Current value of a slot. Slots never written read as blank.
    fn get(&self, slot: usize) -> Result<AttributeValue>;

    fn set(&mut self, slot: usize, value: AttributeValue) -> Result<()>;

    /// Whether the slot currently holds a value of type `ty`.
    fn has(&self, slot: usize, ty: ArgumentType) -> Result<bool>;

    /// Run `f` on the current value of a slot.
    fn visit<R, F>(&self, slot: usize, f: F) -> Result<R>
    where
        Self: Sized,
        F: FnOnce(&AttributeValue) -> R,
    {
        let value = self.get(slot)?;
        Ok(f(&value))
    }

    fn get_as<T: FromAttribute>(&self, slot: usize) -> Result<T>
    where
        Self: Sized,
    {
        T::from_attribute(self.get(slot)?)
    }

    fn has_type<T: FromAttribute>(&self, slot: usize) -> Result<bool>
    where
        Self: Sized,
    {
        self.has(slot, T::ARGUMENT_TYPE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    values: Vec<AttributeValue>,
}

impl InMemoryStorage {
    /// Storage with `size` blank slots.
    pub fn new(size: usize) -> Self {
        Self { values: vec![AttributeValue::Blank; size] }
    }

    pub fn from_values(values: Vec<AttributeValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<AttributeValue> {
        self.values
    }

    /// Truncate or pad with blanks to exactly `size` slots.
    pub fn resize(&mut self, size: usize) {
        self.values.resize(size, AttributeValue::Blank);
    }
}

impl AttributeStorage for InMemoryStorage {
    fn size(&self) -> usize {
        self.values.len()
    }

    fn get(&self, slot: usize) -> Result<AttributeValue> {
        Ok(self.values.get(slot).cloned().unwrap_or_default())
    }

    fn set(&mut self, slot: usize, value: AttributeValue) -> Result<()> {
        if slot >= self.values.len() {
            self.values.resize(slot + 1, AttributeValue::Blank);
        }
        self.values[slot] = value;
        Ok(())
    }

    fn has(&self, slot: usize, ty: ArgumentType) -> Result<bool> {
        Ok(self
            .values
            .get(slot)
            .map(|v| v.argument_type() == ty)
            .unwrap_or(ty == ArgumentType::Blank))
    }

    fn visit<R, F>(&self, slot: usize, f: F) -> Result<R>
    where
        F: FnOnce(&AttributeValue) -> R,
    {
        match self.values.get(slot) {
            Some(value) => Ok(f(value)),
            None => Ok(f(&AttributeValue::Blank)),
        }
    }
}

/// Translates between live instances and their persistent addresses.
pub trait RecordResolver {
    /// Materialize a referenced instance.
    fn resolve(&self, record: RecordRef) -> Result<InstanceRef>;

    /// Persistent address of an instance owned by this store.
    fn reference(&self, instance: &InstanceRef) -> Result<RecordRef>;
}

/// View of one owner's records in a key-value store.
pub struct PersistentStorage<'a> {
    kv: &'a KvStore,
    owner: RecordOwner,
    size: usize,
    schema: &'a Schema,
    records: &'a dyn RecordResolver,
}

impl<'a> PersistentStorage<'a> {
    pub fn new(
        kv: &'a KvStore,
        owner: RecordOwner,
        size: usize,
        schema: &'a Schema,
        records: &'a dyn RecordResolver,
    ) -> Self {
        Self { kv, owner, size, schema, records }
    }

    fn key(&self, slot: usize) -> String {
        RecordKey::attribute(self.owner.clone(), slot).to_string()
    }

    /// Raw encoded record of a slot.
    pub fn raw(&self, slot: usize) -> Result<Option<Vec<u8>>> {
        self.kv.get(&self.key(slot))
    }
}

impl AttributeStorage for PersistentStorage<'_> {
    fn size(&self) -> usize {
        self.size
    }

    fn get(&self, slot: usize) -> Result<AttributeValue> {
        match self.raw(slot)? {
            Some(bytes) => codec::decode(&bytes, self.schema, |r| self.records.resolve(r)),
            None => Ok(AttributeValue::Blank),
        }
    }

    fn set(&mut self, slot: usize, value: AttributeValue) -> Result<()> {
        let key = self.key(slot);
        if value.is_blank() {
            return self.kv.delete(&key);
        }
        let bytes = codec::encode(&value, |i| self.records.reference(i))?;
        self.kv.put(&key, &bytes)
    }

    fn has(&self, slot: usize, ty: ArgumentType) -> Result<bool> {
        match self.raw(slot)? {
            Some(bytes) => Ok(codec::decode_tag(&bytes)? == ty),
            None => Ok(ty == ArgumentType::Blank),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;
    use crate::{Error, Logical};

    struct NoInstances;

    impl RecordResolver for NoInstances {
        fn resolve(&self, record: RecordRef) -> Result<InstanceRef> {
            Err(Error::CorruptRecord(format!("{:?}", record)))
        }

        fn reference(&self, instance: &InstanceRef) -> Result<RecordRef> {
            Err(Error::UnmappedInstance(instance.id()))
        }
    }

    #[test]
    fn test_in_memory_storage() {
        let mut storage = InMemoryStorage::new(2);
        assert_eq!(storage.size(), 2);
        assert!(storage.has(0, ArgumentType::Blank).unwrap());

        storage.set(1, AttributeValue::Double(2.5)).unwrap();
        assert_eq!(storage.get_as::<f64>(1).unwrap(), 2.5);
        assert!(storage.has_type::<f64>(1).unwrap());
        assert!(!storage.has_type::<i64>(1).unwrap());
        assert!(storage.visit(1, |v| matches!(v, AttributeValue::Double(_))).unwrap());

        // Reads past the end are blank, writes past the end grow.
        assert!(storage.get(5).unwrap().is_blank());
        storage.set(3, AttributeValue::Int(1)).unwrap();
        assert_eq!(storage.size(), 4);
    }

    #[test]
    fn test_persistent_storage() {
        let kv = KvStore::open_in_memory().unwrap();
        let schema = demo_schema().unwrap();
        let resolver = NoInstances;
        let mut storage = PersistentStorage::new(&kv, RecordOwner::Entity(5), 3, &schema, &resolver);

        assert!(storage.get(0).unwrap().is_blank());
        assert!(storage.has(0, ArgumentType::Blank).unwrap());

        storage.set(0, AttributeValue::String("2O2Fr$t4X7Zf8NOew3FLOH".into())).unwrap();
        storage.set(2, AttributeValue::Logical(Logical::Unknown)).unwrap();
        assert!(kv.contains("i|5|0").unwrap());
        assert_eq!(storage.get_as::<String>(0).unwrap(), "2O2Fr$t4X7Zf8NOew3FLOH");
        assert!(storage.has(2, ArgumentType::Logical).unwrap());
        assert_eq!(storage.get_as::<Logical>(2).unwrap(), Logical::Unknown);

        storage.set(0, AttributeValue::Blank).unwrap();
        assert!(!kv.contains("i|5|0").unwrap());
    }
}
