//! Deferred reference resolution
//!
//! [`ModelBuilder`] collects the [`PendingReference`]s of every decoded
//! record and patches them into the store once decoding is complete:
//!
//! ```text
//! Decoding --finish_decoding--> PendingResolution --resolve--> Resolved
//! ```

use super::context::{PendingReference, PendingValue, ReferenceOrInstance};
use super::UnresolvedReferencePolicy;
use crate::instance::InstanceRef;
use crate::store::Store;
use crate::value::AttributeValue;
use crate::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Decoding,
    PendingResolution,
    Resolved,
}

/// Outcome counters of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub resolved: usize,
    pub unresolved: usize,
    pub duplicates: usize,
    /// References written into slot 0 of a defined-type instance
    pub redirected: usize,
}

impl fmt::Display for ResolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reference Resolution:")?;
        writeln!(f, "  Resolved: {}", self.resolved)?;
        writeln!(f, "  Unresolved: {}", self.unresolved)?;
        writeln!(f, "  Duplicate definitions: {}", self.duplicates)?;
        write!(f, "  Redirected: {}", self.redirected)
    }
}

pub struct ModelBuilder {
    state: BuilderState,
    pending: Vec<PendingReference>,
    policy: UnresolvedReferencePolicy,
}

impl ModelBuilder {
    pub fn new(policy: UnresolvedReferencePolicy) -> Self {
        Self { state: BuilderState::Decoding, pending: Vec::new(), policy }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Number of collected, not yet resolved references.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, references: impl IntoIterator<Item = PendingReference>) -> Result<()> {
        if self.state != BuilderState::Decoding {
            return Err(Error::Parse("References pushed after decoding finished".to_string()));
        }
        self.pending.extend(references);
        Ok(())
    }

    pub fn finish_decoding(&mut self) {
        if self.state == BuilderState::Decoding {
            self.state = BuilderState::PendingResolution;
        }
    }

    /// Patch every collected reference into `store`.
    ///
    /// A reference only fills a blank slot. When the slot holds a defined-type
    /// instance with a blank value, the reference fills that value instead.
    pub fn resolve(&mut self, store: &Store) -> Result<ResolveStats> {
        if self.state != BuilderState::PendingResolution {
            return Err(Error::Parse(format!("Cannot resolve references in state {:?}", self.state)));
        }

        let mut stats = ResolveStats::default();
        for reference in std::mem::take(&mut self.pending) {
            self.resolve_one(store, reference, &mut stats)?;
        }
        self.state = BuilderState::Resolved;
        tracing::debug!(
            "Resolved {} references ({} unresolved)",
            stats.resolved,
            stats.unresolved
        );
        Ok(stats)
    }

    fn lookup(
        &self,
        store: &Store,
        owner: u32,
        attribute: usize,
        item: &ReferenceOrInstance,
        stats: &mut ResolveStats,
    ) -> Result<Option<InstanceRef>> {
        let (id, offset) = match item {
            ReferenceOrInstance::Instance(instance) => return Ok(Some(instance.clone())),
            ReferenceOrInstance::Reference { id, offset } => (*id, *offset),
        };
        match store.instance_by_id(id) {
            Ok(instance) => {
                stats.resolved += 1;
                Ok(Some(instance))
            }
            Err(Error::InstanceNotFound(_)) => {
                stats.unresolved += 1;
                let error = Error::UnresolvedReference { id, referrer: owner, attribute, offset };
                tracing::error!("{}", error);
                match self.policy {
                    UnresolvedReferencePolicy::Warn => Ok(None),
                    UnresolvedReferencePolicy::Error => Err(error),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_one(&self, store: &Store, reference: PendingReference, stats: &mut ResolveStats) -> Result<()> {
        let PendingReference { owner, attribute, value } = reference;
        let Ok(referrer) = store.instance_by_id(owner) else {
            tracing::warn!("Referring instance #{} is no longer part of the store", owner);
            return Ok(());
        };

        let value = match value {
            PendingValue::Single(item) => match self.lookup(store, owner, attribute, &item, stats)? {
                Some(target) => AttributeValue::Instance(target),
                None => return Ok(()),
            },
            PendingValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.extend(self.lookup(store, owner, attribute, item, stats)?);
                }
                AttributeValue::AggregateOfInstance(out)
            }
            PendingValue::ListOfLists(lists) => {
                let mut out = Vec::with_capacity(lists.len());
                for items in &lists {
                    let mut inner = Vec::with_capacity(items.len());
                    for item in items {
                        inner.extend(self.lookup(store, owner, attribute, item, stats)?);
                    }
                    out.push(inner);
                }
                AttributeValue::AggregateOfAggregateOfInstance(out)
            }
        };

        match referrer.get(attribute)? {
            AttributeValue::Blank => referrer.set(attribute, value),
            AttributeValue::Instance(inner) if !inner.is_entity() && inner.get(0)?.is_blank() => {
                stats.redirected += 1;
                store.core().set_wrapped(&referrer, attribute, &inner, value)
            }
            _ => {
                stats.duplicates += 1;
                tracing::error!(
                    "Duplicate definition for instance reference at attribute index {} of instance #{}",
                    attribute,
                    owner
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;

    fn reference(owner: u32, attribute: usize, id: u32) -> PendingReference {
        PendingReference {
            owner,
            attribute,
            value: PendingValue::Single(ReferenceOrInstance::Reference { id, offset: 0 }),
        }
    }

    #[test]
    fn test_state_machine() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let mut builder = ModelBuilder::new(UnresolvedReferencePolicy::Warn);
        assert_eq!(builder.state(), BuilderState::Decoding);
        assert!(builder.resolve(&store).is_err());

        builder.push(vec![reference(1, 0, 2)]).unwrap();
        builder.finish_decoding();
        assert!(builder.push(Vec::new()).is_err());

        let stats = builder.resolve(&store).unwrap();
        assert_eq!(builder.state(), BuilderState::Resolved);
        assert_eq!(stats, ResolveStats::default());
    }

    #[test]
    fn test_first_writer_wins() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let loop_ = store.create("IfcPolyLoop").unwrap();
        let other = store.create("IfcPolyLoop").unwrap();
        let bound = store.create("IfcFaceBound").unwrap();

        let mut builder = ModelBuilder::new(UnresolvedReferencePolicy::Warn);
        builder
            .push(vec![reference(bound.id(), 0, loop_.id()), reference(bound.id(), 0, other.id())])
            .unwrap();
        builder.finish_decoding();
        let stats = builder.resolve(&store).unwrap();

        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(bound.get_as::<InstanceRef>(0).unwrap().id(), loop_.id());
    }

    #[test]
    fn test_unresolved_policy() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let bound = store.create("IfcFaceBound").unwrap();

        let mut builder = ModelBuilder::new(UnresolvedReferencePolicy::Warn);
        builder.push(vec![reference(bound.id(), 0, 99)]).unwrap();
        builder.finish_decoding();
        let stats = builder.resolve(&store).unwrap();
        assert_eq!(stats.unresolved, 1);
        assert!(bound.get(0).unwrap().is_blank());

        let mut builder = ModelBuilder::new(UnresolvedReferencePolicy::Error);
        builder.push(vec![reference(bound.id(), 0, 99)]).unwrap();
        builder.finish_decoding();
        assert!(matches!(
            builder.resolve(&store),
            Err(Error::UnresolvedReference { id: 99, attribute: 0, .. })
        ));
    }

    #[test]
    fn test_redirect_into_defined_type() {
        let schema = demo_schema().unwrap();
        let store = Store::new(schema.clone()).unwrap();
        let point = store.create("IfcCartesianPoint").unwrap();
        let measure = store.create("IfcMeasureWithUnit").unwrap();
        let label = crate::Instance::new_type(&schema, "IfcLabel", AttributeValue::Blank).unwrap();
        measure.set(0, AttributeValue::Instance(label.clone())).unwrap();

        let mut builder = ModelBuilder::new(UnresolvedReferencePolicy::Warn);
        builder.push(vec![reference(measure.id(), 0, point.id())]).unwrap();
        builder.finish_decoding();
        let stats = builder.resolve(&store).unwrap();

        assert_eq!(stats.redirected, 1);
        let inner = measure.get_as::<InstanceRef>(0).unwrap();
        assert_eq!(inner.get_as::<InstanceRef>(0).unwrap().id(), point.id());
    }
}
