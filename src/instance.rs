//! Instance - a typed graph node
//!
//! An instance pairs a declaration with its attribute storage. Entity
//! instances get a store-assigned id when added to a [`Store`]; defined-type
//! instances never do and live inside the entity attributes that embed them.
//!
//! Instances hold a weak back-pointer to their store, so they never keep a
//! store alive and can still be inspected after removal.

use crate::schema::{Declaration, Schema};
use crate::storage::{AttributeStorage, InMemoryStorage, RecordOwner};
use crate::store::{Store, StoreCore};
use crate::value::{ArgumentType, AttributeValue, FromAttribute};
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to an instance. Identity comparisons use `Rc::ptr_eq`.
pub type InstanceRef = Rc<Instance>;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// Make sure identities handed out from now on are greater than `used`.
pub(crate) fn reserve_identities(used: u64) {
    NEXT_IDENTITY.fetch_max(used.saturating_add(1), Ordering::Relaxed);
}

#[derive(Debug)]
pub(crate) enum Storage {
    InMemory(InMemoryStorage),
    /// Records in the owning store's key-value backend
    Persistent { owner: RecordOwner, size: usize },
}

pub struct Instance {
    schema: Arc<Schema>,
    declaration: usize,
    identity: u64,
    id: Cell<u32>,
    storage: RefCell<Storage>,
    store: RefCell<Weak<StoreCore>>,
}

impl Instance {
    /// Unattached instance of an entity or defined type, all slots blank.
    pub fn new(schema: &Arc<Schema>, name: &str) -> Result<InstanceRef> {
        let decl = schema.declaration_by_name(name)?;
        if !decl.is_entity() && decl.as_type().is_none() {
            return Err(Error::NotAnEntity(decl.name().to_string()));
        }
        Ok(Self::from_storage(
            schema.clone(),
            decl.index_in_schema(),
            InMemoryStorage::new(decl.attribute_count()),
        ))
    }

    /// Defined-type instance wrapping a single value.
    pub fn new_type(schema: &Arc<Schema>, name: &str, value: impl Into<AttributeValue>) -> Result<InstanceRef> {
        let decl = schema.declaration_by_name(name)?;
        if decl.as_type().is_none() {
            return Err(Error::TypeMismatch {
                expected: "defined type".to_string(),
                found: decl.name().to_string(),
            });
        }
        Ok(Self::from_storage(
            schema.clone(),
            decl.index_in_schema(),
            InMemoryStorage::from_values(vec![value.into()]),
        ))
    }

    pub(crate) fn from_storage(schema: Arc<Schema>, declaration: usize, storage: InMemoryStorage) -> InstanceRef {
        Rc::new(Self {
            schema,
            declaration,
            identity: next_identity(),
            id: Cell::new(0),
            storage: RefCell::new(Storage::InMemory(storage)),
            store: RefCell::new(Weak::new()),
        })
    }

    /// Handle onto records that already exist in a persistent store.
    pub(crate) fn persistent(
        schema: Arc<Schema>,
        declaration: usize,
        identity: u64,
        id: u32,
        owner: RecordOwner,
        size: usize,
        store: Weak<StoreCore>,
    ) -> InstanceRef {
        Rc::new(Self {
            schema,
            declaration,
            identity,
            id: Cell::new(id),
            storage: RefCell::new(Storage::Persistent { owner, size }),
            store: RefCell::new(store),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn declaration(&self) -> &Declaration {
        self.schema.declaration(self.declaration)
    }

    pub fn declaration_index(&self) -> usize {
        self.declaration
    }

    pub fn name(&self) -> &str {
        self.declaration().name()
    }

    /// Process-wide unique identity, assigned at construction.
    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// Store id, 0 while unattached and for defined-type instances.
    pub fn id(&self) -> u32 {
        self.id.get()
    }

    pub(crate) fn set_id(&self, id: u32) {
        self.id.set(id);
    }

    pub fn is_entity(&self) -> bool {
        self.declaration().is_entity()
    }

    /// Whether this instance's declaration is `name` or one of its subtypes.
    pub fn is_a(&self, name: &str) -> bool {
        self.schema.is_a(self.declaration, name)
    }

    /// The store this instance belongs to, if it is alive.
    pub fn store(&self) -> Option<Store> {
        self.owning_core().map(Store::from_core)
    }

    pub fn is_attached(&self) -> bool {
        self.store.borrow().strong_count() > 0
    }

    pub(crate) fn owning_core(&self) -> Option<Rc<StoreCore>> {
        self.store.borrow().upgrade()
    }

    pub(crate) fn belongs_to(&self, core: &StoreCore) -> bool {
        std::ptr::eq(self.store.borrow().as_ptr(), core)
    }

    pub(crate) fn attach(&self, store: Weak<StoreCore>) {
        *self.store.borrow_mut() = store;
    }

    pub(crate) fn detach(&self) {
        *self.store.borrow_mut() = Weak::new();
    }

    pub(crate) fn is_persistent(&self) -> bool {
        matches!(&*self.storage.borrow(), Storage::Persistent { .. })
    }

    /// Point this instance at its persistent records from now on.
    pub(crate) fn switch_to_persistent(&self, owner: RecordOwner) {
        let size = self.attribute_count();
        *self.storage.borrow_mut() = Storage::Persistent { owner, size };
    }

    /// Copy persistent records into memory so the instance outlives its
    /// records. Embedded defined-type instances are copied along.
    pub(crate) fn materialize(&self) -> Result<()> {
        if !self.is_persistent() {
            return Ok(());
        }
        let values = self.values()?;
        for value in &values {
            for inner in value.instances() {
                if !inner.is_entity() {
                    inner.materialize()?;
                }
            }
        }
        *self.storage.borrow_mut() = Storage::InMemory(InMemoryStorage::from_values(values));
        Ok(())
    }

    /// Move the values out of in-memory storage, leaving blank slots behind.
    pub(crate) fn take_values(&self) -> Result<Vec<AttributeValue>> {
        let mut storage = self.storage.borrow_mut();
        match &mut *storage {
            Storage::InMemory(memory) => {
                let size = memory.size();
                Ok(std::mem::replace(memory, InMemoryStorage::new(size)).into_values())
            }
            Storage::Persistent { .. } => Err(Error::StoreDropped),
        }
    }

    fn with_storage<R>(&self, f: impl FnOnce(&mut dyn AttributeStorage) -> Result<R>) -> Result<R> {
        let (owner, size) = {
            let mut storage = self.storage.borrow_mut();
            match &mut *storage {
                Storage::InMemory(memory) => return f(memory),
                Storage::Persistent { owner, size } => (owner.clone(), *size),
            }
        };
        let core = self.owning_core().ok_or(Error::StoreDropped)?;
        let backend = core.persistent().ok_or(Error::NotPersistent)?;
        let mut storage = backend.storage(owner, size, &self.schema);
        f(&mut storage)
    }

    pub fn attribute_count(&self) -> usize {
        match &*self.storage.borrow() {
            Storage::InMemory(memory) => memory.size(),
            Storage::Persistent { size, .. } => *size,
        }
    }

    pub fn attribute_index(&self, name: &str) -> Result<usize> {
        self.declaration()
            .as_entity()
            .and_then(|e| e.attribute_index(name))
            .ok_or_else(|| Error::UnknownAttribute {
                entity: self.name().to_string(),
                attribute: name.to_string(),
            })
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.attribute_count() {
            return Err(Error::AttributeIndex { entity: self.name().to_string(), index: slot });
        }
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Result<AttributeValue> {
        self.check_slot(slot)?;
        self.raw_get(slot)
    }

    pub fn get_as<T: FromAttribute>(&self, slot: usize) -> Result<T> {
        T::from_attribute(self.get(slot)?)
    }

    pub fn get_by_name(&self, name: &str) -> Result<AttributeValue> {
        self.get(self.attribute_index(name)?)
    }

    pub fn has(&self, slot: usize, ty: ArgumentType) -> Result<bool> {
        self.check_slot(slot)?;
        self.with_storage(|s| s.has(slot, ty))
    }

    pub fn has_type<T: FromAttribute>(&self, slot: usize) -> Result<bool> {
        self.has(slot, T::ARGUMENT_TYPE)
    }

    pub fn visit<R>(&self, slot: usize, f: impl FnOnce(&AttributeValue) -> R) -> Result<R> {
        let value = self.get(slot)?;
        Ok(f(&value))
    }

    /// Every slot, in order.
    pub fn values(&self) -> Result<Vec<AttributeValue>> {
        (0..self.attribute_count()).map(|slot| self.raw_get(slot)).collect()
    }

    /// Assign a slot. For instances in a store the guid and inverse indices
    /// follow, and referenced instances from elsewhere are added first.
    pub fn set(&self, slot: usize, value: impl Into<AttributeValue>) -> Result<()> {
        let value = value.into();
        self.check_slot(slot)?;
        if !value.is_finite() {
            return Err(Error::NonFiniteValue);
        }
        match self.owning_core() {
            Some(core) if self.is_entity() && self.id() != 0 => core.set_attribute(self, slot, value),
            Some(core) => {
                // The inverse index keys on the owning entity, which a
                // defined-type instance does not know.
                if !self.is_entity()
                    && (value.instances().iter().any(|i| i.is_entity())
                        || self.raw_get(slot)?.instances().iter().any(|i| i.is_entity()))
                {
                    return Err(Error::IncorrectReference(format!(
                        "{} in a store holds entity references; assign the owning attribute instead",
                        self.name()
                    )));
                }
                let value = core.import_value(&value)?;
                self.raw_set(slot, value)
            }
            None => self.raw_set(slot, value),
        }
    }

    pub fn set_by_name(&self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        self.set(self.attribute_index(name)?, value)
    }

    pub fn unset(&self, slot: usize) -> Result<()> {
        self.set(slot, AttributeValue::Blank)
    }

    pub(crate) fn raw_get(&self, slot: usize) -> Result<AttributeValue> {
        self.with_storage(|s| s.get(slot))
    }

    /// Write a slot without touching any store index.
    pub(crate) fn raw_set(&self, slot: usize, value: AttributeValue) -> Result<()> {
        self.with_storage(|s| s.set(slot, value))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_entity() {
            write!(f, "#{}={}", self.id(), self.name())
        } else {
            write!(f, "{}<{}>", self.name(), self.identity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;

    #[test]
    fn test_new_instance_is_blank_and_unattached() {
        let schema = demo_schema().unwrap();
        let wall = Instance::new(&schema, "IfcWall").unwrap();

        assert!(wall.is_entity());
        assert_eq!(wall.id(), 0);
        assert!(!wall.is_attached());
        assert!(wall.store().is_none());
        assert_eq!(wall.attribute_count(), 7);
        assert!(wall.values().unwrap().iter().all(|v| v.is_blank()));
        assert!(wall.is_a("IfcRoot"));
        assert!(!wall.is_a("IfcSlab"));
    }

    #[test]
    fn test_identities_are_unique() {
        let schema = demo_schema().unwrap();
        let a = Instance::new(&schema, "IfcWall").unwrap();
        let b = Instance::new(&schema, "IfcWall").unwrap();
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_set_and_get_by_name() {
        let schema = demo_schema().unwrap();
        let wall = Instance::new(&schema, "IfcWall").unwrap();

        wall.set_by_name("Name", "Wall A").unwrap();
        assert_eq!(wall.get_as::<String>(1).unwrap(), "Wall A");
        assert_eq!(wall.get_by_name("name").unwrap(), AttributeValue::String("Wall A".into()));
        assert!(wall.has_type::<String>(1).unwrap());

        wall.unset(1).unwrap();
        assert!(wall.get(1).unwrap().is_blank());
    }

    #[test]
    fn test_invalid_access() {
        let schema = demo_schema().unwrap();
        let point = Instance::new(&schema, "IfcCartesianPoint").unwrap();

        assert!(matches!(point.get(1), Err(Error::AttributeIndex { .. })));
        assert!(matches!(point.get_by_name("Nope"), Err(Error::UnknownAttribute { .. })));
        assert!(matches!(
            point.set(0, vec![0.0, f64::INFINITY]),
            Err(Error::NonFiniteValue)
        ));
        assert!(Instance::new(&schema, "IfcUnitEnum").is_err());
        assert!(Instance::new(&schema, "IfcNothing").is_err());
    }

    #[test]
    fn test_defined_type_instance() {
        let schema = demo_schema().unwrap();
        let label = Instance::new_type(&schema, "IfcLabel", "hello").unwrap();

        assert!(!label.is_entity());
        assert_eq!(label.attribute_count(), 1);
        assert_eq!(label.get_as::<String>(0).unwrap(), "hello");
        assert!(format!("{:?}", label).starts_with("IfcLabel<"));
        assert!(Instance::new_type(&schema, "IfcWall", 1i64).is_err());
    }
}
