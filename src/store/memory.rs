//! In-memory model index
//!
//! Holds every entity of a store by id, plus the type, guid and inverse
//! indices. Values live in the instances themselves.

use super::{InverseEntry, ModelIndex};
use crate::instance::InstanceRef;
use crate::Result;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Index of an in-memory store.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    /// All entities indexed by store id
    by_id: RefCell<BTreeMap<u32, InstanceRef>>,
    /// Ids indexed by exact declaration
    by_type: RefCell<HashMap<usize, BTreeSet<u32>>>,
    /// Ids of rooted entities indexed by GlobalId
    by_guid: RefCell<HashMap<String, u32>>,
    /// Referrer ids indexed by (target, referrer declaration, attribute)
    inverses: RefCell<BTreeMap<(u32, usize, usize), Vec<u32>>>,
}

impl MemoryIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelIndex for MemoryIndex {
    fn instance(&self, id: u32) -> Result<Option<InstanceRef>> {
        Ok(self.by_id.borrow().get(&id).cloned())
    }

    fn contains(&self, id: u32) -> Result<bool> {
        Ok(self.by_id.borrow().contains_key(&id))
    }

    fn ids(&self) -> Result<Vec<u32>> {
        Ok(self.by_id.borrow().keys().copied().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.by_id.borrow().len())
    }

    fn insert(&self, instance: &InstanceRef) -> Result<()> {
        let id = instance.id();
        self.by_type
            .borrow_mut()
            .entry(instance.declaration_index())
            .or_default()
            .insert(id);
        self.by_id.borrow_mut().insert(id, instance.clone());
        Ok(())
    }

    fn remove(&self, instance: &InstanceRef) -> Result<()> {
        let id = instance.id();
        let mut by_type = self.by_type.borrow_mut();
        if let Some(ids) = by_type.get_mut(&instance.declaration_index()) {
            ids.remove(&id);
            if ids.is_empty() {
                by_type.remove(&instance.declaration_index());
            }
        }
        self.by_id.borrow_mut().remove(&id);
        Ok(())
    }

    fn by_type(&self, declaration: usize) -> Result<Vec<InstanceRef>> {
        let by_id = self.by_id.borrow();
        Ok(self
            .by_type
            .borrow()
            .get(&declaration)
            .map(|ids| ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn declarations_present(&self) -> Result<Vec<usize>> {
        let mut present: Vec<usize> = self.by_type.borrow().keys().copied().collect();
        present.sort_unstable();
        Ok(present)
    }

    fn guid(&self, guid: &str) -> Result<Option<u32>> {
        Ok(self.by_guid.borrow().get(guid).copied())
    }

    fn set_guid(&self, guid: &str, id: u32) -> Result<Option<u32>> {
        Ok(self.by_guid.borrow_mut().insert(guid.to_string(), id))
    }

    fn remove_guid(&self, guid: &str) -> Result<()> {
        self.by_guid.borrow_mut().remove(guid);
        Ok(())
    }

    fn add_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()> {
        self.inverses
            .borrow_mut()
            .entry((target, declaration, attribute))
            .or_default()
            .push(source);
        Ok(())
    }

    fn remove_inverse(&self, target: u32, declaration: usize, attribute: usize, source: u32) -> Result<()> {
        let mut inverses = self.inverses.borrow_mut();
        let key = (target, declaration, attribute);
        if let Some(sources) = inverses.get_mut(&key) {
            if let Some(pos) = sources.iter().position(|s| *s == source) {
                sources.remove(pos);
            }
            if sources.is_empty() {
                inverses.remove(&key);
            }
        }
        Ok(())
    }

    fn inverses(&self, target: u32) -> Result<Vec<InverseEntry>> {
        Ok(self
            .inverses
            .borrow()
            .range((target, 0, 0)..=(target, usize::MAX, usize::MAX))
            .flat_map(|((_, declaration, attribute), sources)| {
                sources.iter().map(|source| InverseEntry {
                    declaration: *declaration,
                    attribute: *attribute,
                    source: *source,
                })
            })
            .collect())
    }

    fn remove_inverses_of(&self, target: u32) -> Result<()> {
        self.inverses
            .borrow_mut()
            .retain(|(t, _, _), _| *t != target);
        Ok(())
    }
}
