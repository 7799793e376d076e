//! Model Store - the instance graph and its indices
//!
//! A [`Store`] owns every entity instance added to it and keeps four indices
//! consistent with the attribute values:
//! - id → instance
//! - GlobalId → instance (rooted entities only)
//! - declaration → ids
//! - (target, referrer declaration, attribute) → referrer ids
//!
//! Two backends implement [`ModelIndex`]: [`MemoryIndex`] keeps everything
//! in memory, [`PersistentBackend`] keeps values and indices in a
//! [`KvStore`](crate::storage::KvStore).

pub mod add;
pub mod header;
pub mod memory;
pub mod persistent;
pub mod remove;
pub mod traverse;
pub mod units;

pub use header::Header;
pub use memory::MemoryIndex;
pub use persistent::{IngestStats, PersistentBackend};
pub use units::UnitInfo;

use crate::instance::{Instance, InstanceRef};
use crate::parse::{InstanceStreamer, LoadOptions, ModelBuilder, ResolveStats};
use crate::schema::header::header_schema;
use crate::schema::{Declaration, DeclarationKind, Schema, SchemaRegistry};
use crate::storage::InMemoryStorage;
use crate::value::AttributeValue;
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One inverse index entry: `source` references the target at `attribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseEntry {
    /// `index_in_schema` of the referring entity
    pub declaration: usize,
    pub attribute: usize,
    pub source: u32,
}

/// Index operations both backends provide.
pub trait ModelIndex {
    fn instance(&self, id: u32) -> Result<Option<InstanceRef>>;
    fn contains(&self, id: u32) -> Result<bool>;
    /// All ids, ascending.
    fn ids(&self) -> Result<Vec<u32>>;
    fn len(&self) -> Result<usize>;

    /// Index an instance under its id and exact declaration.
    fn insert(&self, instance: &InstanceRef) -> Result<()>;
    fn remove(&self, instance: &InstanceRef) -> Result<()>;
    fn by_type(&self, declaration: usize) -> Result<Vec<InstanceRef>>;
    fn declarations_present(&self) -> Result<Vec<usize>>;

    fn guid(&self, guid: &str) -> Result<Option<u32>>;
    /// Map a GlobalId to `id`, returning the id it mapped to before.
    fn set_guid(&self, guid: &str, id: u32) -> Result<Option<u32>>;
    fn remove_guid(&self, guid: &str) -> Result<()>;

    fn add_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()>;
    /// Remove one occurrence of `source`.
    fn remove_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()>;
    fn inverses(&self, target: u32) -> Result<Vec<InverseEntry>>;
    fn remove_inverses_of(&self, target: u32) -> Result<()>;
}

pub(crate) enum Backend {
    Memory(MemoryIndex),
    Persistent(PersistentBackend),
}

/// Ids of the entities a value references, looking through defined-type
/// instances such as `IFCPOINTLIST((#1,#2))`.
pub(crate) fn entity_references(value: &AttributeValue) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for instance in value.instances() {
        if instance.is_entity() {
            ids.push(instance.id());
        } else {
            for inner in instance.values()? {
                ids.extend(entity_references(&inner)?);
            }
        }
    }
    Ok(ids)
}

/// GlobalId carried by a slot-0 value, directly or wrapped in a defined type.
pub(crate) fn guid_of(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::String(s) => Some(s.clone()),
        AttributeValue::Instance(t) if !t.is_entity() => t.get_as::<String>(0).ok(),
        _ => None,
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Where a copy made by `add` came from. Entities are known by store and id
/// so that fresh handles onto the same record map to the same copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Provenance {
    Entity { store: u64, id: u32 },
    Type(u64),
}

pub(crate) struct StoreCore {
    /// Process-wide unique number of this store
    serial: u64,
    schema: Arc<Schema>,
    header_schema: Arc<Schema>,
    header: RefCell<Header>,
    backend: Backend,
    max_id: Cell<u32>,
    /// Ids whose removal is deferred until `unbatch`
    batch: RefCell<Option<Vec<u32>>>,
    /// Copies made by `add`, by origin
    provenance: RefCell<HashMap<Provenance, InstanceRef>>,
    options: LoadOptions,
    this: Weak<StoreCore>,
}

impl StoreCore {
    pub(crate) fn index(&self) -> &dyn ModelIndex {
        match &self.backend {
            Backend::Memory(memory) => memory,
            Backend::Persistent(persistent) => persistent,
        }
    }

    pub(crate) fn persistent(&self) -> Option<&PersistentBackend> {
        match &self.backend {
            Backend::Persistent(persistent) => Some(persistent),
            Backend::Memory(_) => None,
        }
    }

    pub(crate) fn weak(&self) -> Weak<StoreCore> {
        self.this.clone()
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Origin key of `instance`, an instance of this store.
    pub(crate) fn provenance_of(&self, instance: &Instance) -> Provenance {
        if instance.is_entity() {
            Provenance::Entity { store: self.serial, id: instance.id() }
        } else {
            Provenance::Type(instance.identity())
        }
    }

    pub(crate) fn instance(&self, id: u32) -> Result<Option<InstanceRef>> {
        self.index().instance(id)
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.max_id.get() + 1
    }

    pub(crate) fn observe_id(&self, id: u32) {
        if id > self.max_id.get() {
            self.max_id.set(id);
        }
    }

    pub(crate) fn is_rooted(&self, declaration: usize) -> bool {
        self.schema
            .rooted_type()
            .is_some_and(|root| self.schema.is_subtype_of(declaration, root))
    }

    fn register_guid(&self, guid: &str, id: u32) -> Result<()> {
        if let Some(previous) = self.index().set_guid(guid, id)?
            && previous != id
        {
            tracing::warn!("Overwriting entry for GlobalId '{}'", guid);
        }
        Ok(())
    }

    fn unregister_guid(&self, guid: &str, id: u32) -> Result<()> {
        if self.index().guid(guid)? == Some(id) {
            self.index().remove_guid(guid)?;
        }
        Ok(())
    }

    /// Assign a slot of an entity in this store, keeping the guid and
    /// inverse indices in step. Instances from elsewhere are added first.
    pub(crate) fn set_attribute(&self, instance: &Instance, slot: usize, value: AttributeValue) -> Result<()> {
        let value = self.import_value(&value)?;
        let old = instance.raw_get(slot)?;
        let id = instance.id();
        let declaration = instance.declaration_index();
        let index = self.index();

        for target in entity_references(&old)? {
            index.remove_inverse(target, declaration, slot, id)?;
        }
        for target in entity_references(&value)? {
            index.add_inverse(target, declaration, slot, id)?;
        }

        if slot == 0 && self.is_rooted(declaration) {
            let old_guid = guid_of(&old);
            let new_guid = guid_of(&value);
            if old_guid != new_guid {
                if let Some(guid) = old_guid {
                    self.unregister_guid(&guid, id)?;
                }
                if let Some(guid) = new_guid {
                    self.register_guid(&guid, id)?;
                }
            }
        }

        instance.raw_set(slot, value)
    }

    /// Fill slot 0 of the defined-type instance `wrapper` held at `slot` of
    /// `host`. Entities it references are indexed under the host attribute.
    pub(crate) fn set_wrapped(
        &self,
        host: &Instance,
        slot: usize,
        wrapper: &InstanceRef,
        value: AttributeValue,
    ) -> Result<()> {
        let value = self.import_value(&value)?;
        let id = host.id();
        let declaration = host.declaration_index();
        let index = self.index();

        for target in entity_references(&host.raw_get(slot)?)? {
            index.remove_inverse(target, declaration, slot, id)?;
        }
        wrapper.raw_set(0, value)?;
        for target in entity_references(&host.raw_get(slot)?)? {
            index.add_inverse(target, declaration, slot, id)?;
        }
        Ok(())
    }

    /// Map every instance in `value` into this store.
    pub(crate) fn import_value(&self, value: &AttributeValue) -> Result<AttributeValue> {
        if !value.has_instances() {
            return Ok(value.clone());
        }
        value.map_instances(|instance| {
            if instance.belongs_to(self) {
                Ok(instance.clone())
            } else {
                self.add(instance, None)
            }
        })
    }

    /// Insert a freshly decoded record of an in-memory store.
    pub(crate) fn load_record(&self, id: u32, declaration: usize, attributes: InMemoryStorage) -> Result<InstanceRef> {
        if let Some(existing) = self.index().instance(id)? {
            tracing::warn!("Overwriting instance #{}", id);
            self.process_deletion(&existing, &Default::default())?;
        }

        let instance = Instance::from_storage(self.schema.clone(), declaration, attributes);
        instance.set_id(id);
        instance.attach(self.weak());
        self.observe_id(id);

        let values = instance.values()?;
        for (slot, value) in values.iter().enumerate() {
            for inner in value.instances() {
                if !inner.is_entity() {
                    inner.attach(self.weak());
                }
            }
            for target in entity_references(value)? {
                self.index().add_inverse(target, declaration, slot, id)?;
            }
        }
        self.index().insert(&instance)?;

        if self.is_rooted(declaration)
            && let Some(guid) = values.first().and_then(guid_of)
            && let Some(previous) = self.index().set_guid(&guid, id)?
            && previous != id
        {
            tracing::warn!("Duplicate GlobalId '{}'", guid);
        }
        Ok(instance)
    }

    /// Replace the header with a copy of `source`.
    pub(crate) fn replace_header(&self, source: &Header) -> Result<()> {
        match &self.backend {
            Backend::Memory(_) => {
                *self.header.borrow_mut() = source.clone();
                Ok(())
            }
            Backend::Persistent(_) => {
                let header = self.header.borrow().clone();
                for (record, values) in header.records().into_iter().zip(source.values()?) {
                    for (slot, value) in values.into_iter().enumerate() {
                        record.raw_set(slot, value)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Handle onto a model store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    core: Rc<StoreCore>,
}

impl Store {
    /// Empty in-memory store for `schema`.
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        Self::with_options(schema, LoadOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, options: LoadOptions) -> Result<Self> {
        let header_schema = header_schema()?;
        let header = Header::new(&header_schema, schema.name())?;
        Ok(Self::build(schema, header_schema, header, options, |_| {
            Backend::Memory(MemoryIndex::new())
        }))
    }

    pub(crate) fn build(
        schema: Arc<Schema>,
        header_schema: Arc<Schema>,
        header: Header,
        options: LoadOptions,
        backend: impl FnOnce(&Weak<StoreCore>) -> Backend,
    ) -> Self {
        let core = Rc::new_cyclic(|this| StoreCore {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            schema,
            header_schema,
            header: RefCell::new(header),
            backend: backend(this),
            max_id: Cell::new(0),
            batch: RefCell::new(None),
            provenance: RefCell::new(HashMap::new()),
            options,
            this: this.clone(),
        });
        Self { core }
    }

    pub(crate) fn from_core(core: Rc<StoreCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &StoreCore {
        &self.core
    }

    /// Decode an exchange file held in memory.
    pub fn parse(data: &str, registry: &SchemaRegistry) -> Result<Self> {
        Self::parse_bytes(data.as_bytes(), registry, LoadOptions::default())
    }

    pub fn parse_bytes(data: &[u8], registry: &SchemaRegistry, options: LoadOptions) -> Result<Self> {
        Self::parse_with_stats(data, registry, options).map(|(store, _)| store)
    }

    /// Like [`Store::parse_bytes`], also returning the reference resolution counters.
    pub fn parse_with_stats(
        data: &[u8],
        registry: &SchemaRegistry,
        options: LoadOptions,
    ) -> Result<(Self, ResolveStats)> {
        let mut streamer = InstanceStreamer::new(data, registry, options.clone())?;
        let store = Self::build(
            streamer.schema().clone(),
            registry.header_schema(),
            streamer.header().clone(),
            options.clone(),
            |_| Backend::Memory(MemoryIndex::new()),
        );

        let mut builder = ModelBuilder::new(options.unresolved_references);
        while let Some(record) = streamer.read_record()? {
            store
                .core
                .load_record(record.id, record.declaration, record.attributes)?;
            builder.push(record.references)?;
        }
        builder.finish_decoding();
        let stats = builder.resolve(&store)?;
        tracing::info!(
            "Loaded {} instances ({} references resolved, {} unresolved)",
            streamer.parsed(),
            stats.resolved,
            stats.unresolved
        );
        Ok((store, stats))
    }

    /// Read and decode an exchange file.
    pub fn load(path: &Path, registry: &SchemaRegistry, options: LoadOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse_bytes(&data, registry, options)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.core.schema
    }

    pub fn header_schema(&self) -> &Arc<Schema> {
        &self.core.header_schema
    }

    pub fn header(&self) -> Header {
        self.core.header.borrow().clone()
    }

    /// Copy the values of `header` into this store's header.
    pub fn set_header(&self, header: &Header) -> Result<()> {
        self.core.replace_header(header)
    }

    pub fn options(&self) -> &LoadOptions {
        &self.core.options
    }

    pub fn is_persistent(&self) -> bool {
        self.core.persistent().is_some()
    }

    /// Create a blank instance of an entity or defined type and add it.
    pub fn create(&self, name: &str) -> Result<InstanceRef> {
        let instance = Instance::new(&self.core.schema, name)?;
        self.add(&instance)
    }

    /// Add an instance and everything it references.
    ///
    /// Resident instances are returned as is. Unattached instances are
    /// adopted; instances of another store are copied, with length values
    /// rescaled to this store's length unit.
    pub fn add(&self, instance: &InstanceRef) -> Result<InstanceRef> {
        self.core.add(instance, None)
    }

    /// Like [`Store::add`], under a caller-chosen id.
    pub fn add_with_id(&self, instance: &InstanceRef, id: u32) -> Result<InstanceRef> {
        self.core.add(instance, Some(id))
    }

    pub fn remove(&self, instance: &InstanceRef) -> Result<()> {
        self.core.remove(instance)
    }

    /// Defer removals until [`Store::unbatch`].
    pub fn batch(&self) {
        self.core.batch()
    }

    pub fn unbatch(&self) -> Result<()> {
        self.core.unbatch()
    }

    pub fn instance_by_id(&self, id: u32) -> Result<InstanceRef> {
        self.core.instance(id)?.ok_or(Error::InstanceNotFound(id))
    }

    pub fn instance_by_guid(&self, guid: &str) -> Result<InstanceRef> {
        let id = self
            .core
            .index()
            .guid(guid)?
            .ok_or_else(|| Error::GuidNotFound(guid.to_string()))?;
        self.instance_by_id(id)
    }

    fn entity_declaration(&self, name: &str) -> Result<&Declaration> {
        let decl = self.core.schema.declaration_by_name(name)?;
        match decl.kind() {
            DeclarationKind::Entity(_) => Ok(decl),
            _ => Err(Error::NotAnEntity(decl.name().to_string())),
        }
    }

    /// Instances of `name` and of its subtypes, by id.
    pub fn instances_by_type(&self, name: &str) -> Result<Vec<InstanceRef>> {
        let decl = self.entity_declaration(name)?;
        let mut out = Vec::new();
        for declaration in self.core.schema.subtype_tree(decl.index_in_schema()) {
            out.extend(self.core.index().by_type(declaration)?);
        }
        out.sort_by_key(|i| i.id());
        Ok(out)
    }

    pub fn instances_by_type_excl_subtypes(&self, name: &str) -> Result<Vec<InstanceRef>> {
        let decl = self.entity_declaration(name)?;
        self.core.index().by_type(decl.index_in_schema())
    }

    fn referrers(&self, entries: impl Iterator<Item = InverseEntry>) -> Result<Vec<InstanceRef>> {
        let mut ids: Vec<u32> = entries.map(|e| e.source).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(|id| self.instance_by_id(id)).collect()
    }

    /// Every instance that references `id`, each once.
    pub fn instances_by_reference(&self, id: u32) -> Result<Vec<InstanceRef>> {
        self.referrers(self.core.index().inverses(id)?.into_iter())
    }

    /// Instances of `name` (or a subtype) referencing `id`, optionally only
    /// at one attribute index.
    pub fn get_inverse(&self, id: u32, name: &str, attribute: Option<usize>) -> Result<Vec<InstanceRef>> {
        let decl = self.entity_declaration(name)?;
        let tree = self.core.schema.subtype_tree(decl.index_in_schema());
        let entries = self.core.index().inverses(id)?;
        self.referrers(entries.into_iter().filter(|e| {
            tree.contains(&e.declaration) && attribute.is_none_or(|a| a == e.attribute)
        }))
    }

    pub fn get_total_inverses(&self, id: u32) -> Result<usize> {
        Ok(self.instances_by_reference(id)?.len())
    }

    pub fn len(&self) -> Result<usize> {
        self.core.index().len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn ids(&self) -> Result<Vec<u32>> {
        self.core.index().ids()
    }

    /// All entities, by id.
    pub fn instances(&self) -> Result<Vec<InstanceRef>> {
        self.ids()?.into_iter().map(|id| self.instance_by_id(id)).collect()
    }

    /// Declarations with at least one instance.
    pub fn declarations_present(&self) -> Result<Vec<&Declaration>> {
        Ok(self
            .core
            .index()
            .declarations_present()?
            .into_iter()
            .map(|d| self.core.schema.declaration(d))
            .collect())
    }

    pub fn max_id(&self) -> u32 {
        self.core.max_id.get()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("schema", &self.core.schema.name())
            .field("persistent", &self.is_persistent())
            .field("max_id", &self.max_id())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;

    pub(crate) fn spf(data: &str) -> String {
        format!(
            "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n\
             FILE_NAME('test.ifc','2024-01-01T00:00:00',(''),(''),'','','');\n\
             FILE_SCHEMA(('IFC_DEMO'));\nENDSEC;\nDATA;\n{}\nENDSEC;\nEND-ISO-10303-21;\n",
            data
        )
    }

    /// A point set whose points sit inside an `IfcPointList` defined type.
    pub(crate) const POINT_SET: &str = "#1=IFCPOINTSET(IFCPOINTLIST((#2,#3)),$);\n\
        #2=IFCCARTESIANPOINT((0.,0.));\n#3=IFCCARTESIANPOINT((1.,0.));";

    pub(crate) fn parse(data: &str) -> Store {
        let registry = SchemaRegistry::with_demo().unwrap();
        Store::parse(&spf(data), &registry).unwrap()
    }

    /// Every forward entity reference, also those inside defined-type
    /// instances, has a matching inverse entry, and back.
    pub(crate) fn assert_inverse_symmetry(store: &Store) {
        let mut forward = Vec::new();
        for instance in store.instances().unwrap() {
            for (slot, value) in instance.values().unwrap().iter().enumerate() {
                for target in entity_references(value).unwrap() {
                    forward.push((target, instance.declaration_index(), slot, instance.id()));
                }
            }
        }
        let mut inverse = Vec::new();
        for id in store.ids().unwrap() {
            for e in store.core().index().inverses(id).unwrap() {
                inverse.push((id, e.declaration, e.attribute, e.source));
            }
        }
        forward.sort_unstable();
        inverse.sort_unstable();
        assert_eq!(forward, inverse);
    }

    #[test]
    fn test_forward_reference_resolution() {
        let store = parse("#1=IFCFACEBOUND(#2,.T.);\n#2=IFCPOLYLOOP($);");
        let bound = store.instance_by_id(1).unwrap();
        let target = bound.get_as::<InstanceRef>(0).unwrap();
        assert_eq!(target.id(), 2);
        assert!(Rc::ptr_eq(&target, &store.instance_by_id(2).unwrap()));
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_type_queries() {
        let store = parse(
            "#1=IFCWALL('a',$,$,$,$,$,$);\n#2=IFCSLAB('b',$,$,$,$,$,$);\n#3=IFCCARTESIANPOINT((0.,0.));",
        );
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.instances_by_type("IfcElement").unwrap().len(), 2);
        assert_eq!(store.instances_by_type("IfcWall").unwrap()[0].id(), 1);
        assert!(store.instances_by_type_excl_subtypes("IfcElement").unwrap().is_empty());
        assert!(matches!(store.instances_by_type("IfcLabel"), Err(Error::NotAnEntity(_))));
        assert!(matches!(store.instances_by_type("IfcNothing"), Err(Error::UnknownDeclaration(_))));

        let names: Vec<&str> = store.declarations_present().unwrap().iter().map(|d| d.name()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"IfcSlab"));
    }

    #[test]
    fn test_guid_index() {
        let store = parse("#1=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,$,$,$,$,$);");
        let wall = store.instance_by_guid("2O2Fr$t4X7Zf8NOew3FLOH").unwrap();
        assert_eq!(wall.id(), 1);

        wall.set(0, "3vB2YO$MX4xv5uCqZZG05x").unwrap();
        assert!(matches!(
            store.instance_by_guid("2O2Fr$t4X7Zf8NOew3FLOH"),
            Err(Error::GuidNotFound(_))
        ));
        assert_eq!(store.instance_by_guid("3vB2YO$MX4xv5uCqZZG05x").unwrap().id(), 1);
    }

    #[test]
    fn test_duplicate_id_in_input_overwrites() {
        let store = parse("#1=IFCCARTESIANPOINT((0.,0.));\n#1=IFCCARTESIANPOINT((1.,1.));");
        assert_eq!(store.len().unwrap(), 1);
        let point = store.instance_by_id(1).unwrap();
        assert_eq!(point.get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_inverse_queries() {
        let store = parse(
            "#1=IFCCARTESIANPOINT((0.,0.));\n#2=IFCCARTESIANPOINT((1.,0.));\n\
             #3=IFCPOLYLINE((#1,#2));\n#4=IFCPOLYLOOP((#1,#2,#1));\n#5=IFCFACEBOUND(#4,.T.);",
        );
        assert_eq!(store.get_total_inverses(1).unwrap(), 2);
        assert_eq!(store.get_inverse(1, "IfcPolyline", None).unwrap()[0].id(), 3);
        assert_eq!(store.get_inverse(1, "IfcRepresentationItem", Some(0)).unwrap().len(), 2);
        assert!(store.get_inverse(1, "IfcPolyline", Some(1)).unwrap().is_empty());
        assert_eq!(store.instances_by_reference(4).unwrap()[0].id(), 5);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_set_keeps_inverses_consistent() {
        let store = parse(
            "#1=IFCPOLYLOOP($);\n#2=IFCPOLYLOOP($);\n#3=IFCFACEBOUND(#1,.T.);",
        );
        let bound = store.instance_by_id(3).unwrap();
        bound.set(0, store.instance_by_id(2).unwrap()).unwrap();
        assert!(store.instances_by_reference(1).unwrap().is_empty());
        assert_eq!(store.instances_by_reference(2).unwrap()[0].id(), 3);
        assert_inverse_symmetry(&store);

        bound.unset(0).unwrap();
        assert!(store.instances_by_reference(2).unwrap().is_empty());
    }

    #[test]
    fn test_references_inside_defined_type_are_indexed() {
        let store = parse(POINT_SET);
        assert_eq!(store.get_inverse(2, "IfcPointSet", Some(0)).unwrap()[0].id(), 1);
        assert_eq!(store.instances_by_reference(3).unwrap()[0].id(), 1);
        assert_inverse_symmetry(&store);

        let set = store.instance_by_id(1).unwrap();
        let list = set.get_as::<InstanceRef>(0).unwrap();
        assert!(matches!(list.set(0, AttributeValue::Blank), Err(Error::IncorrectReference(_))));

        let point = store.create("IfcCartesianPoint").unwrap();
        let replacement = Instance::new_type(store.schema(), "IfcPointList", vec![point.clone()]).unwrap();
        set.set(0, replacement).unwrap();
        assert!(store.instances_by_reference(2).unwrap().is_empty());
        assert_eq!(store.instances_by_reference(point.id()).unwrap()[0].id(), 1);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_create() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let wall = store.create("IfcWall").unwrap();
        let slab = store.create("IfcSlab").unwrap();
        assert_eq!((wall.id(), slab.id()), (1, 2));
        assert_eq!(store.max_id(), 2);
        assert!(wall.store().is_some());

        let label = store.create("IfcLabel").unwrap();
        assert_eq!(label.id(), 0);
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.create("IfcUnitEnum").is_err());
    }

    #[test]
    fn test_parsed_header() {
        let store = parse("");
        assert!(store.is_empty().unwrap());
        assert_eq!(store.header().name().unwrap().as_deref(), Some("test.ifc"));
        assert_eq!(store.header().schema_name().unwrap().as_deref(), Some("IFC_DEMO"));
    }
}
