//! Persistent backend - the model held in a [`KvStore`]
//!
//! Attribute values, the declaration of every instance and all indices are
//! records (see [`crate::storage::keys`]). Instances are handles that read
//! and write those records; handed-out handles are cached per id and identity
//! so references compare by pointer as in memory.

use super::{Backend, Header, InverseEntry, ModelIndex, Store, StoreCore, guid_of};
use crate::instance::{Instance, InstanceRef, next_identity, reserve_identities};
use crate::parse::{InstanceStreamer, LoadOptions, PendingReference, PendingValue, ReferenceOrInstance};
use crate::schema::header::{FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA, header_schema};
use crate::schema::{Schema, SchemaRegistry};
use crate::storage::codec::{self, RecordRef};
use crate::storage::{KvStore, PersistentStorage, RecordKey, RecordOwner, RecordResolver};
use crate::value::AttributeValue;
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::Weak;
use std::sync::Arc;

const HEADER_RECORDS: [&str; 3] = [FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA];

pub struct PersistentBackend {
    kv: KvStore,
    schema: Arc<Schema>,
    store: Weak<StoreCore>,
    /// Entity handles by id
    entities: RefCell<HashMap<u32, InstanceRef>>,
    /// Defined-type handles by identity
    types: RefCell<HashMap<u64, InstanceRef>>,
    /// Number of entities on record, counted on first use
    count: Cell<Option<usize>>,
}

impl PersistentBackend {
    fn new(kv: KvStore, schema: Arc<Schema>, store: Weak<StoreCore>) -> Self {
        Self {
            kv,
            schema,
            store,
            entities: RefCell::new(HashMap::new()),
            types: RefCell::new(HashMap::new()),
            count: Cell::new(None),
        }
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub(crate) fn storage<'a>(&'a self, owner: RecordOwner, size: usize, schema: &'a Schema) -> PersistentStorage<'a> {
        PersistentStorage::new(&self.kv, owner, size, schema, self)
    }

    fn read_ids(&self, key: &RecordKey) -> Result<Vec<u32>> {
        match self.kv.get(&key.to_string())? {
            Some(bytes) => codec::decode_ids(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write_ids(&self, key: &RecordKey, ids: &[u32]) -> Result<()> {
        if ids.is_empty() {
            self.kv.delete(&key.to_string())
        } else {
            self.kv.put(&key.to_string(), &codec::encode_ids(ids))
        }
    }

    /// Drop one occurrence of `id` from a merged id list.
    fn remove_id(&self, key: &RecordKey, id: u32) -> Result<()> {
        let mut ids = self.read_ids(key)?;
        if let Some(pos) = ids.iter().position(|i| *i == id) {
            ids.remove(pos);
            self.write_ids(key, &ids)?;
        }
        Ok(())
    }

    fn declaration_of(&self, owner: RecordOwner) -> Result<Option<usize>> {
        let ids = self.read_ids(&RecordKey::Declaration(owner))?;
        Ok(ids.first().map(|d| *d as usize))
    }

    /// Record a defined-type instance of this store.
    pub(crate) fn register_type(&self, instance: &InstanceRef) -> Result<()> {
        let declaration = u32::try_from(instance.declaration_index())
            .map_err(|_| Error::CorruptRecord("Declaration index out of range".to_string()))?;
        self.kv.put(
            &RecordKey::Declaration(RecordOwner::Type(instance.identity())).to_string(),
            &codec::encode_ids(&[declaration]),
        )?;
        self.types.borrow_mut().insert(instance.identity(), instance.clone());
        Ok(())
    }

    /// Forget every cached handle. Handles held by callers stay valid.
    pub fn reset_identity_cache(&self) {
        self.entities.borrow_mut().clear();
        self.types.borrow_mut().clear();
    }

    /// Count entities again on next use, after a rolled back transaction.
    fn forget_count(&self) {
        self.count.set(None);
    }

    fn entity(&self, id: u32) -> Result<Option<InstanceRef>> {
        if let Some(instance) = self.entities.borrow().get(&id) {
            return Ok(Some(instance.clone()));
        }
        let Some(declaration) = self.declaration_of(RecordOwner::Entity(id))? else {
            return Ok(None);
        };
        let decl = self
            .schema
            .get(declaration)
            .ok_or_else(|| Error::CorruptRecord(format!("Unknown declaration {} for #{}", declaration, id)))?;
        if !decl.is_entity() {
            return Err(Error::IncorrectReference(format!("#{} is a {}", id, decl.name())));
        }
        let instance = Instance::persistent(
            self.schema.clone(),
            declaration,
            next_identity(),
            id,
            RecordOwner::Entity(id),
            decl.attribute_count(),
            self.store.clone(),
        );
        self.entities.borrow_mut().insert(id, instance.clone());
        Ok(Some(instance))
    }

    fn defined_type(&self, identity: u64) -> Result<InstanceRef> {
        if let Some(instance) = self.types.borrow().get(&identity) {
            return Ok(instance.clone());
        }
        let declaration = self
            .declaration_of(RecordOwner::Type(identity))?
            .ok_or_else(|| Error::CorruptRecord(format!("No declaration for type instance {}", identity)))?;
        let decl = self.schema.get(declaration).ok_or_else(|| {
            Error::CorruptRecord(format!("Unknown declaration {} for type instance {}", declaration, identity))
        })?;
        if decl.is_entity() {
            return Err(Error::IncorrectReference(format!(
                "Type instance {} is the entity {}",
                identity,
                decl.name()
            )));
        }
        let instance = Instance::persistent(
            self.schema.clone(),
            declaration,
            identity,
            0,
            RecordOwner::Type(identity),
            1,
            self.store.clone(),
        );
        self.types.borrow_mut().insert(identity, instance.clone());
        Ok(instance)
    }

    /// Highest entity id and type identity on record.
    fn max_used(&self) -> Result<(u32, u64)> {
        let mut max_id = 0;
        let mut max_identity = 0;
        for key in self.kv.keys_with_prefix("i|")?.into_iter().chain(self.kv.keys_with_prefix("t|")?) {
            match RecordKey::parse(&key)? {
                RecordKey::Declaration(RecordOwner::Entity(id)) => max_id = max_id.max(id),
                RecordKey::Declaration(RecordOwner::Type(identity)) => max_identity = max_identity.max(identity),
                _ => {}
            }
        }
        Ok((max_id, max_identity))
    }
}

impl RecordResolver for PersistentBackend {
    fn resolve(&self, record: RecordRef) -> Result<InstanceRef> {
        match record {
            RecordRef::Entity(id) => self.entity(id)?.ok_or(Error::InstanceNotFound(id)),
            RecordRef::Type(identity) => self.defined_type(identity),
        }
    }

    fn reference(&self, instance: &InstanceRef) -> Result<RecordRef> {
        let owned = self.store.upgrade().is_some_and(|core| instance.belongs_to(&core));
        match owned {
            true if instance.is_entity() => Ok(RecordRef::Entity(instance.id())),
            true => Ok(RecordRef::Type(instance.identity())),
            false => Err(Error::UnmappedInstance(instance.id())),
        }
    }
}

impl ModelIndex for PersistentBackend {
    fn instance(&self, id: u32) -> Result<Option<InstanceRef>> {
        self.entity(id)
    }

    fn contains(&self, id: u32) -> Result<bool> {
        if self.entities.borrow().contains_key(&id) {
            return Ok(true);
        }
        self.kv.contains(&RecordKey::Declaration(RecordOwner::Entity(id)).to_string())
    }

    fn ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for key in self.kv.keys_with_prefix("i|")? {
            if let RecordKey::Declaration(RecordOwner::Entity(id)) = RecordKey::parse(&key)? {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn len(&self) -> Result<usize> {
        if let Some(count) = self.count.get() {
            return Ok(count);
        }
        let count = self.ids()?.len();
        self.count.set(Some(count));
        Ok(count)
    }

    fn insert(&self, instance: &InstanceRef) -> Result<()> {
        let id = instance.id();
        let declaration = u32::try_from(instance.declaration_index())
            .map_err(|_| Error::CorruptRecord("Declaration index out of range".to_string()))?;
        let key = RecordKey::Declaration(RecordOwner::Entity(id)).to_string();
        if !self.kv.contains(&key)?
            && let Some(count) = self.count.get()
        {
            self.count.set(Some(count + 1));
        }
        self.kv.put(&key, &codec::encode_ids(&[declaration]))?;
        self.kv.merge(
            &RecordKey::TypeIndex(instance.declaration_index()).to_string(),
            &codec::encode_ids(&[id]),
        )?;
        self.entities.borrow_mut().insert(id, instance.clone());
        Ok(())
    }

    fn remove(&self, instance: &InstanceRef) -> Result<()> {
        let id = instance.id();
        if self.kv.contains(&RecordKey::Declaration(RecordOwner::Entity(id)).to_string())?
            && let Some(count) = self.count.get()
        {
            self.count.set(Some(count.saturating_sub(1)));
        }
        let key = RecordKey::TypeIndex(instance.declaration_index());
        let remaining: Vec<u32> = self.read_ids(&key)?.into_iter().filter(|i| *i != id).collect();
        self.write_ids(&key, &remaining)?;

        // Embedded defined-type instances go with their owner.
        for slot in 0..instance.attribute_count() {
            for inner in instance.raw_get(slot)?.instances() {
                if !inner.is_entity() {
                    self.kv.delete_prefix(&RecordOwner::Type(inner.identity()).prefix())?;
                    self.types.borrow_mut().remove(&inner.identity());
                }
            }
        }
        self.kv.delete_prefix(&RecordOwner::Entity(id).prefix())?;
        self.entities.borrow_mut().remove(&id);
        Ok(())
    }

    fn by_type(&self, declaration: usize) -> Result<Vec<InstanceRef>> {
        let ids: BTreeSet<u32> = self.read_ids(&RecordKey::TypeIndex(declaration))?.into_iter().collect();
        ids.into_iter()
            .map(|id| self.entity(id)?.ok_or(Error::InstanceNotFound(id)))
            .collect()
    }

    fn declarations_present(&self) -> Result<Vec<usize>> {
        let mut present = Vec::new();
        for (key, value) in self.kv.scan_prefix("t|")? {
            if let RecordKey::TypeIndex(declaration) = RecordKey::parse(&key)?
                && !value.is_empty()
            {
                present.push(declaration);
            }
        }
        present.sort_unstable();
        Ok(present)
    }

    fn guid(&self, guid: &str) -> Result<Option<u32>> {
        Ok(self.read_ids(&RecordKey::Guid(guid.to_string()))?.first().copied())
    }

    fn set_guid(&self, guid: &str, id: u32) -> Result<Option<u32>> {
        let previous = self.guid(guid)?;
        self.write_ids(&RecordKey::Guid(guid.to_string()), &[id])?;
        Ok(previous)
    }

    fn remove_guid(&self, guid: &str) -> Result<()> {
        self.kv.delete(&RecordKey::Guid(guid.to_string()).to_string())
    }

    fn add_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()> {
        let key = RecordKey::Inverse { target, declaration, attribute };
        self.kv.merge(&key.to_string(), &codec::encode_ids(&[source]))
    }

    fn remove_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()> {
        self.remove_id(&RecordKey::Inverse { target, declaration, attribute }, source)
    }

    fn inverses(&self, target: u32) -> Result<Vec<InverseEntry>> {
        let mut entries = Vec::new();
        for (key, value) in self.kv.scan_prefix(&RecordKey::inverse_prefix(target))? {
            if let RecordKey::Inverse { declaration, attribute, .. } = RecordKey::parse(&key)? {
                for source in codec::decode_ids(&value)? {
                    entries.push(InverseEntry { declaration, attribute, source });
                }
            }
        }
        Ok(entries)
    }

    fn remove_inverses_of(&self, target: u32) -> Result<()> {
        self.kv.delete_prefix(&RecordKey::inverse_prefix(target))?;
        Ok(())
    }
}

/// Counters of one [`Store::ingest`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub instances: usize,
    pub references: usize,
    pub redirected: usize,
    pub duplicates: usize,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ingestion:")?;
        writeln!(f, "  Instances: {}", self.instances)?;
        writeln!(f, "  References: {}", self.references)?;
        writeln!(f, "  Redirected: {}", self.redirected)?;
        write!(f, "  Duplicate definitions: {}", self.duplicates)
    }
}

fn header_handles(core: &StoreCore, header_schema: &Arc<Schema>) -> Result<[InstanceRef; 3]> {
    let handle = |name: &str| -> Result<InstanceRef> {
        let decl = header_schema.declaration_by_name(name)?;
        Ok(Instance::persistent(
            header_schema.clone(),
            decl.index_in_schema(),
            next_identity(),
            0,
            RecordOwner::Header(decl.name_uppercase()),
            decl.attribute_count(),
            core.weak(),
        ))
    };
    Ok([handle(HEADER_RECORDS[0])?, handle(HEADER_RECORDS[1])?, handle(HEADER_RECORDS[2])?])
}

fn install_header(core: &StoreCore, header_schema: &Arc<Schema>) -> Result<Header> {
    let [description, name, file_schema] = header_handles(core, header_schema)?;
    Ok(Header::from_records(description, name, file_schema))
}

impl StoreCore {
    fn kv(&self) -> Result<&KvStore> {
        Ok(self.persistent().ok_or(Error::NotPersistent)?.kv())
    }

    /// Store one pending reference of an ingested record as raw records.
    fn write_pending(
        &self,
        reference: PendingReference,
        values: &[AttributeValue],
        declaration: usize,
        stats: &mut IngestStats,
    ) -> Result<()> {
        let PendingReference { owner, attribute, value } = reference;
        let kv = self.kv()?;
        let mut targets = Vec::new();
        let mut record = |item: &ReferenceOrInstance| -> Result<RecordRef> {
            match item {
                ReferenceOrInstance::Reference { id, .. } => {
                    targets.push(*id);
                    Ok(RecordRef::Entity(*id))
                }
                ReferenceOrInstance::Instance(inner) => {
                    let inner = self.add(inner, None)?;
                    Ok(RecordRef::Type(inner.identity()))
                }
            }
        };
        let bytes = match &value {
            PendingValue::Single(item) => codec::encode_reference(record(item)?),
            PendingValue::List(items) => {
                let records = items.iter().map(&mut record).collect::<Result<Vec<_>>>()?;
                codec::encode_reference_list(&records)
            }
            PendingValue::ListOfLists(lists) => {
                let mut records = Vec::with_capacity(lists.len());
                for items in lists {
                    records.push(items.iter().map(&mut record).collect::<Result<Vec<_>>>()?);
                }
                codec::encode_reference_lists(&records)
            }
        };
        stats.references += targets.len();

        match values.get(attribute) {
            None | Some(AttributeValue::Blank) => {
                kv.put(&RecordKey::attribute(RecordOwner::Entity(owner), attribute).to_string(), &bytes)?;
                for target in targets {
                    self.index().add_inverse(target, declaration, attribute, owner)?;
                }
            }
            Some(AttributeValue::Instance(inner)) if !inner.is_entity() && inner.raw_get(0)?.is_blank() => {
                stats.redirected += 1;
                kv.put(&RecordKey::attribute(RecordOwner::Type(inner.identity()), 0).to_string(), &bytes)?;
                for target in targets {
                    self.index().add_inverse(target, declaration, attribute, owner)?;
                }
            }
            Some(_) => {
                stats.duplicates += 1;
                tracing::error!(
                    "Duplicate definition for instance reference at attribute index {} of instance #{}",
                    attribute,
                    owner
                );
            }
        }
        Ok(())
    }

    fn ingest_records(&self, streamer: &mut InstanceStreamer<'_>) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        while let Some(record) = streamer.read_record()? {
            let id = record.id;
            if let Some(existing) = self.index().instance(id)? {
                tracing::warn!("Overwriting instance #{}", id);
                self.process_deletion(&existing, &Default::default())?;
            }

            let size = self.schema().declaration(record.declaration).attribute_count();
            let instance = Instance::persistent(
                self.schema().clone(),
                record.declaration,
                next_identity(),
                id,
                RecordOwner::Entity(id),
                size,
                self.weak(),
            );
            self.observe_id(id);
            self.index().insert(&instance)?;

            let mut values = Vec::with_capacity(size);
            for (slot, value) in record.attributes.into_values().into_iter().take(size).enumerate() {
                let value = self.import_value(&value)?;
                if !value.is_blank() {
                    instance.raw_set(slot, value.clone())?;
                }
                values.push(value);
            }

            if self.is_rooted(record.declaration)
                && let Some(guid) = values.first().and_then(guid_of)
                && let Some(previous) = self.index().set_guid(&guid, id)?
                && previous != id
            {
                tracing::warn!("Duplicate GlobalId '{}'", guid);
            }

            for reference in record.references {
                self.write_pending(reference, &values, record.declaration, &mut stats)?;
            }
            stats.instances += 1;
        }
        Ok(stats)
    }
}

impl Store {
    /// Persistent store over an open key-value store, with a default header.
    pub fn persistent(kv: KvStore, schema: Arc<Schema>, options: LoadOptions) -> Result<Self> {
        let header_schema = header_schema()?;
        let defaults = Header::new(&header_schema, schema.name())?;
        let backend_schema = schema.clone();
        let store = Self::build(schema, header_schema.clone(), defaults.clone(), options, |this| {
            Backend::Persistent(PersistentBackend::new(kv, backend_schema, this.clone()))
        });
        let header = install_header(store.core(), &header_schema)?;
        *store.core().header.borrow_mut() = header;
        store.set_header(&defaults)?;
        Ok(store)
    }

    /// Create (or empty) a database file and open it as a persistent store.
    pub fn create_persistent(path: &Path, schema: Arc<Schema>) -> Result<Self> {
        let kv = KvStore::open(path)?;
        kv.clear_all()?;
        Self::persistent(kv, schema, LoadOptions::default())
    }

    /// Open an existing database file, picking its schema from the header.
    pub fn open_persistent(path: &Path, registry: &SchemaRegistry) -> Result<Self> {
        Self::open_kv(KvStore::open(path)?, registry)
    }

    pub fn open_kv(kv: KvStore, registry: &SchemaRegistry) -> Result<Self> {
        let header_schema = registry.header_schema();
        let key = RecordKey::attribute(RecordOwner::Header(FILE_SCHEMA.to_string()), 0).to_string();
        let bytes = kv
            .get(&key)?
            .ok_or_else(|| Error::NoHeader("Database has no FILE_SCHEMA record".to_string()))?;
        let identifiers = codec::decode(&bytes, &header_schema, |r| {
            Err(Error::CorruptRecord(format!("Unexpected reference {:?} in header", r)))
        })?;
        let name = match identifiers {
            AttributeValue::AggregateOfString(names) => names.into_iter().next(),
            _ => None,
        }
        .ok_or_else(|| Error::NoHeader("FILE_SCHEMA names no schema".to_string()))?;
        let schema = registry.get(&name)?;

        let placeholder = Header::new(&header_schema, schema.name())?;
        let backend_schema = schema.clone();
        let store = Self::build(schema, header_schema.clone(), placeholder, LoadOptions::default(), |this| {
            Backend::Persistent(PersistentBackend::new(kv, backend_schema, this.clone()))
        });
        let header = install_header(store.core(), &header_schema)?;
        *store.core().header.borrow_mut() = header;

        let backend = store.core().persistent().ok_or(Error::NotPersistent)?;
        let (max_id, max_identity) = backend.max_used()?;
        store.core().observe_id(max_id);
        reserve_identities(max_identity);
        tracing::info!("Opened persistent store with schema {} (max id #{})", name, max_id);
        Ok(store)
    }

    pub fn kv(&self) -> Result<&KvStore> {
        self.core().kv()
    }

    /// Drop cached persistent handles. No effect on in-memory stores.
    pub fn reset_identity_cache(&self) {
        if let Some(backend) = self.core().persistent() {
            backend.reset_identity_cache();
        }
    }

    /// Write every record of `streamer` straight into this persistent store.
    ///
    /// References are stored as they appear; references to ids the input
    /// never defines are not detected.
    pub fn ingest(&self, streamer: &mut InstanceStreamer<'_>) -> Result<IngestStats> {
        let kv = self.kv()?;
        if streamer.schema().name() != self.schema().name() {
            return Err(Error::SchemaMismatch {
                expected: self.schema().name().to_string(),
                found: streamer.schema().name().to_string(),
            });
        }

        kv.begin_transaction()?;
        let result = self
            .set_header(streamer.header())
            .and_then(|_| self.core().ingest_records(streamer));
        match result {
            Ok(stats) => {
                kv.commit()?;
                tracing::info!(
                    "Ingested {} instances ({} references)",
                    stats.instances,
                    stats.references
                );
                Ok(stats)
            }
            Err(e) => {
                kv.rollback()?;
                if let Some(backend) = self.core().persistent() {
                    backend.forget_count();
                }
                Err(e)
            }
        }
    }

    /// Copy the header and every entity of `source` into this store.
    pub fn import_into_persistent(&self, source: &Store) -> Result<usize> {
        let kv = self.kv()?;
        kv.begin_transaction()?;
        let result = (|| {
            self.set_header(&source.header())?;
            let mut count = 0;
            for instance in source.instances()? {
                self.add(&instance)?;
                count += 1;
            }
            Ok(count)
        })();
        match result {
            Ok(count) => {
                kv.commit()?;
                Ok(count)
            }
            Err(e) => {
                kv.rollback()?;
                if let Some(backend) = self.core().persistent() {
                    backend.forget_count();
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;
    use crate::store::tests::{POINT_SET, assert_inverse_symmetry, parse, spf};
    use std::rc::Rc;

    fn empty() -> Store {
        Store::persistent(KvStore::open_in_memory().unwrap(), demo_schema().unwrap(), LoadOptions::default())
            .unwrap()
    }

    const MODEL: &str = "#1=IFCCARTESIANPOINT((0.,0.));\n#2=IFCCARTESIANPOINT((1.,0.));\n\
        #3=IFCPOLYLINE((#1,#2));\n#4=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH','Wall',$,$,$,$,.STANDARD.);\n\
        #5=IFCMEASUREWITHUNIT(IFCLENGTHMEASURE(2.5),$);\n#6=IFCPOLYLOOP((#1,#2,#7));\n\
        #7=IFCCARTESIANPOINT((1.,1.));";

    fn ingested() -> Store {
        let registry = SchemaRegistry::with_demo().unwrap();
        let store = empty();
        let text = spf(MODEL);
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();
        store.ingest(&mut streamer).unwrap();
        store
    }

    #[test]
    fn test_default_header_is_persisted() {
        let store = empty();
        assert!(store.is_persistent());
        assert_eq!(store.header().schema_name().unwrap().as_deref(), Some("IFC_DEMO"));
        assert!(store.kv().unwrap().contains("h|FILE_SCHEMA|0").unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_create_and_read_back() {
        let store = empty();
        let point = store.create("IfcCartesianPoint").unwrap();
        point.set(0, vec![1.0, 2.0]).unwrap();
        let line = store.create("IfcPolyline").unwrap();
        line.set(0, vec![point.clone(), point.clone()]).unwrap();

        assert!(store.kv().unwrap().contains("i|2|0").unwrap());
        store.reset_identity_cache();
        let line = store.instance_by_id(2).unwrap();
        let points = line.get_as::<Vec<InstanceRef>>(0).unwrap();
        assert_eq!(points[0].id(), 1);
        assert!(Rc::ptr_eq(&points[0], &points[1]));
        assert_eq!(points[0].get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 2.0]);
        assert_eq!(store.instances_by_type("IfcRepresentationItem").unwrap().len(), 2);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_ingest() {
        let store = ingested();
        assert_eq!(store.ids().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(store.max_id(), 7);

        let wall = store.instance_by_guid("2O2Fr$t4X7Zf8NOew3FLOH").unwrap();
        assert_eq!(wall.get_as::<String>(1).unwrap(), "Wall");
        assert_eq!(wall.get_as::<String>(6).unwrap(), "STANDARD");

        // The forward reference to #7 resolves once the record exists.
        let polygon = store.instance_by_id(6).unwrap().get_as::<Vec<InstanceRef>>(0).unwrap();
        assert_eq!(polygon.iter().map(|p| p.id()).collect::<Vec<_>>(), vec![1, 2, 7]);
        assert_eq!(store.get_total_inverses(1).unwrap(), 2);
        assert_eq!(store.get_inverse(7, "IfcPolyLoop", Some(0)).unwrap()[0].id(), 6);

        let measure = store.instance_by_id(5).unwrap().get_as::<InstanceRef>(0).unwrap();
        assert!(!measure.is_entity());
        assert_eq!(measure.get_as::<f64>(0).unwrap(), 2.5);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_ingest_matches_in_memory_parse() {
        let persistent = ingested();
        let memory = parse(MODEL);
        assert_eq!(persistent.ids().unwrap(), memory.ids().unwrap());
        for id in memory.ids().unwrap() {
            assert_eq!(
                persistent.instance_by_id(id).unwrap().to_spf().unwrap(),
                memory.instance_by_id(id).unwrap().to_spf().unwrap()
            );
        }
    }

    #[test]
    fn test_remove_from_persistent_store() {
        let store = ingested();
        let point = store.instance_by_id(1).unwrap();
        store.remove(&point).unwrap();

        assert!(!store.kv().unwrap().contains("i|1|_").unwrap());
        assert_eq!(point.get_as::<Vec<f64>>(0).unwrap(), vec![0.0, 0.0]);
        let polyline = store.instance_by_id(3).unwrap().get_as::<Vec<InstanceRef>>(0).unwrap();
        assert_eq!(polyline.len(), 1);
        assert_eq!(store.instances_by_type_excl_subtypes("IfcCartesianPoint").unwrap().len(), 2);
        assert_inverse_symmetry(&store);

        let holder = store.instance_by_id(5).unwrap();
        let measure = holder.get_as::<InstanceRef>(0).unwrap();
        store.remove(&holder).unwrap();
        assert_eq!(measure.get_as::<f64>(0).unwrap(), 2.5);
        let prefix = RecordOwner::Type(measure.identity()).prefix();
        assert!(store.kv().unwrap().keys_with_prefix(&prefix).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.db");
        {
            let store = Store::create_persistent(&path, demo_schema().unwrap()).unwrap();
            let wall = store.create("IfcWall").unwrap();
            wall.set(0, "3vB2YO$MX4xv5uCqZZG05x").unwrap();
            store.header().set_name("reopened.ifc").unwrap();
        }

        let registry = SchemaRegistry::with_demo().unwrap();
        let store = Store::open_persistent(&path, &registry).unwrap();
        assert_eq!(store.header().name().unwrap().as_deref(), Some("reopened.ifc"));
        assert_eq!(store.instance_by_guid("3vB2YO$MX4xv5uCqZZG05x").unwrap().id(), 1);
        assert_eq!(store.create("IfcSlab").unwrap().id(), 2);
    }

    #[test]
    fn test_import_from_memory_store() {
        let memory = parse(MODEL);
        let store = empty();
        assert_eq!(store.import_into_persistent(&memory).unwrap(), 7);
        assert_eq!(store.len().unwrap(), 7);
        let wall = store.instance_by_guid("2O2Fr$t4X7Zf8NOew3FLOH").unwrap();
        assert!(wall.is_a("IfcWall"));
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_ingest_indexes_references_inside_defined_type() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let store = empty();
        let text = spf(POINT_SET);
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();
        let stats = store.ingest(&mut streamer).unwrap();
        assert_eq!(stats.redirected, 1);
        assert_eq!(store.get_inverse(3, "IfcPointSet", Some(0)).unwrap()[0].id(), 1);
        assert_inverse_symmetry(&store);

        store.remove(&store.instance_by_id(2).unwrap()).unwrap();
        store.reset_identity_cache();
        let list = store.instance_by_id(1).unwrap().get_as::<InstanceRef>(0).unwrap();
        let points = list.get_as::<Vec<InstanceRef>>(0).unwrap();
        assert_eq!(points.iter().map(|p| p.id()).collect::<Vec<_>>(), vec![3]);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_len_follows_inserts_and_removals() {
        let store = ingested();
        assert_eq!(store.len().unwrap(), 7);
        store.create("IfcWall").unwrap();
        assert_eq!(store.len().unwrap(), 8);
        store.remove(&store.instance_by_id(1).unwrap()).unwrap();
        assert_eq!(store.len().unwrap(), 7);
        assert_eq!(store.len().unwrap(), store.ids().unwrap().len());
    }

    #[test]
    fn test_copy_survives_identity_cache_reset() {
        let source = empty();
        let point = source.create("IfcCartesianPoint").unwrap();
        point.set(0, vec![1.0, 2.0]).unwrap();
        let target = Store::new(source.schema().clone()).unwrap();
        let copy = target.add(&point).unwrap();

        source.reset_identity_cache();
        let fresh = source.instance_by_id(point.id()).unwrap();
        assert!(!Rc::ptr_eq(&fresh, &point));
        assert!(Rc::ptr_eq(&target.add(&fresh).unwrap(), &copy));
        assert_eq!(target.len().unwrap(), 1);
    }

    #[test]
    fn test_ingest_requires_persistent_store() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let text = spf(MODEL);
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();
        assert!(matches!(store.ingest(&mut streamer), Err(Error::NotPersistent)));
    }
}
