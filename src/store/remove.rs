//! Removing instances
//!
//! Every referrer loses its reference to the removed instance first:
//! - a direct reference becomes blank
//! - a list drops the element, and an emptied optional list becomes blank
//! - a list of lists drops the element from each inner list
//! - a defined-type instance around such a value is replaced by a rewritten copy
//!
//! Inside a batch, removals are only recorded; [`StoreCore::unbatch`] then
//! processes them together without rewriting references between members.

use super::{StoreCore, entity_references, guid_of};
use crate::instance::{Instance, InstanceRef};
use crate::value::AttributeValue;
use crate::{Error, Result};
use std::collections::HashSet;

/// `instance` with references to `id` taken out, `None` when nothing is left.
/// A defined-type instance that held one is replaced by a rewritten copy.
fn strip(instance: &InstanceRef, id: u32, optional: bool) -> Result<Option<InstanceRef>> {
    if instance.is_entity() {
        return Ok((instance.id() != id).then(|| instance.clone()));
    }
    let inner = instance.get(0)?;
    if !entity_references(&inner)?.contains(&id) {
        return Ok(Some(instance.clone()));
    }
    match without(&inner, id, optional)? {
        AttributeValue::Blank => Ok(None),
        stripped => Instance::new_type(instance.schema(), instance.name(), stripped).map(Some),
    }
}

/// `value` with every reference to `id` taken out.
fn without(value: &AttributeValue, id: u32, optional: bool) -> Result<AttributeValue> {
    Ok(match value {
        AttributeValue::Instance(i) => match strip(i, id, optional)? {
            Some(kept) => AttributeValue::Instance(kept),
            None => AttributeValue::Blank,
        },
        AttributeValue::AggregateOfInstance(items) => {
            let mut remaining = Vec::with_capacity(items.len());
            for item in items {
                remaining.extend(strip(item, id, false)?);
            }
            if remaining.is_empty() && optional {
                AttributeValue::Blank
            } else {
                AttributeValue::AggregateOfInstance(remaining)
            }
        }
        AttributeValue::AggregateOfAggregateOfInstance(lists) => {
            let mut outer = Vec::with_capacity(lists.len());
            for items in lists {
                let mut remaining = Vec::with_capacity(items.len());
                for item in items {
                    remaining.extend(strip(item, id, false)?);
                }
                outer.push(remaining);
            }
            AttributeValue::AggregateOfAggregateOfInstance(outer)
        }
        other => other.clone(),
    })
}

impl StoreCore {
    pub(crate) fn remove(&self, instance: &InstanceRef) -> Result<()> {
        let id = instance.id();
        if id == 0 || !instance.belongs_to(self) || !self.index().contains(id)? {
            return Err(Error::NotInStore(id));
        }
        if let Some(batch) = self.batch.borrow_mut().as_mut() {
            if !batch.contains(&id) {
                batch.push(id);
            }
            return Ok(());
        }
        self.process_deletion(instance, &HashSet::new())
    }

    pub(crate) fn batch(&self) {
        let mut batch = self.batch.borrow_mut();
        if batch.is_none() {
            *batch = Some(Vec::new());
        }
    }

    pub(crate) fn unbatch(&self) -> Result<()> {
        let Some(ids) = self.batch.borrow_mut().take() else {
            return Ok(());
        };
        let skip: HashSet<u32> = ids.iter().copied().collect();
        for id in &ids {
            if let Some(instance) = self.index().instance(*id)? {
                self.process_deletion(&instance, &skip)?;
            }
        }
        tracing::debug!("Removed {} instances in batch", ids.len());
        Ok(())
    }

    /// Unlink and drop one instance. Referrers listed in `skip` are left alone.
    pub(crate) fn process_deletion(&self, instance: &InstanceRef, skip: &HashSet<u32>) -> Result<()> {
        let id = instance.id();
        let index = self.index();

        let mut referrers: Vec<u32> = index.inverses(id)?.into_iter().map(|e| e.source).collect();
        referrers.sort_unstable();
        referrers.dedup();
        for source in referrers {
            if source == id || skip.contains(&source) {
                continue;
            }
            let Some(referrer) = index.instance(source)? else {
                continue;
            };
            let optional: Vec<bool> = referrer
                .declaration()
                .as_entity()
                .map(|e| e.all_attributes().iter().map(|a| a.optional).collect())
                .unwrap_or_default();
            for (slot, value) in referrer.values()?.iter().enumerate() {
                if !entity_references(value)?.contains(&id) {
                    continue;
                }
                let optional = optional.get(slot).copied().unwrap_or(false);
                self.set_attribute(&referrer, slot, without(value, id, optional)?)?;
            }
        }

        let values = instance.values()?;
        if self.is_rooted(instance.declaration_index())
            && let Some(guid) = values.first().and_then(guid_of)
            && index.guid(&guid)? == Some(id)
        {
            index.remove_guid(&guid)?;
        }
        let declaration = instance.declaration_index();
        for (slot, value) in values.iter().enumerate() {
            for target in entity_references(value)? {
                index.remove_inverse(target, declaration, slot, id)?;
            }
        }
        index.remove_inverses_of(id)?;

        instance.materialize()?;
        index.remove(instance)?;
        self.provenance
            .borrow_mut()
            .retain(|_, copy| !std::rc::Rc::ptr_eq(copy, instance));
        instance.detach();
        tracing::trace!("Removed #{}", id);
        Ok(())
    }
}
