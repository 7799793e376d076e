//! Adding instances: adoption, cross-store copy and unit rescaling

use super::StoreCore;
use super::units::length_unit_factor;
use crate::instance::{Instance, InstanceRef};
use crate::storage::{InMemoryStorage, RecordOwner};
use crate::value::AttributeValue;
use crate::{Error, Result};
use std::cell::Cell;

/// Length factor between a source store and this one, computed on first use.
struct LengthFactor<'a> {
    core: &'a StoreCore,
    source: Option<std::rc::Rc<StoreCore>>,
    factor: Cell<Option<f64>>,
}

impl LengthFactor<'_> {
    fn get(&self) -> Result<f64> {
        if let Some(factor) = self.factor.get() {
            return Ok(factor);
        }
        let factor = match &self.source {
            Some(source) if self.core.options().calculate_unit_factors => {
                match (length_unit_factor(source)?, length_unit_factor(self.core)?) {
                    (Some(from), Some(to)) if to != 0.0 => from / to,
                    _ => 1.0,
                }
            }
            _ => 1.0,
        };
        self.factor.set(Some(factor));
        Ok(factor)
    }
}

impl StoreCore {
    /// Add `instance` with everything it references.
    pub(crate) fn add(&self, instance: &InstanceRef, id: Option<u32>) -> Result<InstanceRef> {
        if instance.schema().name() != self.schema().name() {
            return Err(Error::SchemaMismatch {
                expected: self.schema().name().to_string(),
                found: instance.schema().name().to_string(),
            });
        }
        if instance.belongs_to(self) {
            return Ok(instance.clone());
        }
        let source = instance.owning_core();
        let origin = source.as_ref().map(|core| core.provenance_of(instance));
        if let Some(origin) = &origin
            && let Some(copy) = self.provenance.borrow().get(origin)
            && copy.belongs_to(self)
            && copy.declaration_index() == instance.declaration_index()
        {
            return Ok(copy.clone());
        }
        if let Some(id) = id
            && self.index().contains(id)?
        {
            return Err(Error::DuplicateId(id));
        }

        let (target, values) = match &source {
            Some(_) => {
                let decl = self.schema().declaration_by_name(instance.name())?;
                let copy = Instance::from_storage(
                    self.schema().clone(),
                    decl.index_in_schema(),
                    InMemoryStorage::new(instance.attribute_count()),
                );
                (copy, instance.values()?)
            }
            None => (instance.clone(), instance.take_values()?),
        };
        if let Some(origin) = origin {
            self.provenance.borrow_mut().insert(origin, target.clone());
        }

        if target.is_entity() {
            let id = id.unwrap_or_else(|| self.next_id());
            target.set_id(id);
            self.observe_id(id);
            target.attach(self.weak());
            if self.persistent().is_some() {
                target.switch_to_persistent(RecordOwner::Entity(id));
            }
            self.index().insert(&target)?;

            let factor = LengthFactor { core: self, source, factor: Cell::new(None) };
            let parameters = self.schema().parameter_types(target.declaration_index());
            for (slot, value) in values.into_iter().enumerate() {
                if value.is_blank() {
                    continue;
                }
                let scale = factor.source.is_some()
                    && parameters
                        .get(slot)
                        .is_some_and(|p| self.schema().is_length_measure(p));
                let value = if scale { value.scaled(factor.get()?) } else { value };
                self.set_attribute(&target, slot, value)?;
            }
        } else {
            target.attach(self.weak());
            if let Some(persistent) = self.persistent() {
                target.switch_to_persistent(RecordOwner::Type(target.identity()));
                persistent.register_type(&target)?;
            }
            for (slot, value) in values.into_iter().enumerate() {
                let value: AttributeValue = self.import_value(&value)?;
                target.raw_set(slot, value)?;
            }
        }

        tracing::trace!("Added {:?}", target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::{POINT_SET, assert_inverse_symmetry, parse};
    use crate::schema::demo::demo_schema;
    use crate::schema::SchemaRegistry;
    use crate::value::AttributeValue;
    use crate::{Error, Instance, InstanceRef, Store};
    use std::rc::Rc;

    const UNITS_METRE: &str = "#1=IFCPROJECT('p',$,$,$,$,$,#2);\n#2=IFCUNITASSIGNMENT((#3));\n\
        #3=IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.);";
    const UNITS_MILLIMETRE: &str = "#1=IFCPROJECT('p',$,$,$,$,$,#2);\n#2=IFCUNITASSIGNMENT((#3));\n\
        #3=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);";

    #[test]
    fn test_add_is_idempotent() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let wall = store.create("IfcWall").unwrap();
        let again = store.add(&wall).unwrap();
        assert!(Rc::ptr_eq(&wall, &again));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_adopts_unattached_graph() {
        let schema = demo_schema().unwrap();
        let store = Store::new(schema.clone()).unwrap();
        let point = Instance::new(&schema, "IfcCartesianPoint").unwrap();
        point.set(0, vec![1.0, 2.0]).unwrap();
        let line = Instance::new(&schema, "IfcPolyline").unwrap();
        line.set(0, vec![point.clone(), point.clone()]).unwrap();

        let added = store.add(&line).unwrap();
        assert!(Rc::ptr_eq(&added, &line));
        assert_eq!(store.len().unwrap(), 2);
        assert!(point.store().is_some());
        assert_ne!(point.id(), 0);
        assert_eq!(point.get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 2.0]);
        assert_eq!(store.get_total_inverses(point.id()).unwrap(), 1);
        assert_inverse_symmetry(&store);
    }

    #[test]
    fn test_copy_indexes_references_inside_defined_type() {
        let source = parse(POINT_SET);
        let target = Store::new(source.schema().clone()).unwrap();
        let copy = target.add(&source.instance_by_id(1).unwrap()).unwrap();
        assert_eq!(target.len().unwrap(), 3);

        let list = copy.get_as::<InstanceRef>(0).unwrap();
        let points = list.get_as::<Vec<InstanceRef>>(0).unwrap();
        assert!(points.iter().all(|p| p.store().is_some() && !p.belongs_to(source.core())));
        let referrers = target.get_inverse(points[0].id(), "IfcPointSet", Some(0)).unwrap();
        assert!(Rc::ptr_eq(&referrers[0], &copy));
        assert_inverse_symmetry(&target);
    }

    #[test]
    fn test_add_with_explicit_id() {
        let schema = demo_schema().unwrap();
        let store = Store::new(schema.clone()).unwrap();
        let wall = Instance::new(&schema, "IfcWall").unwrap();
        store.add_with_id(&wall, 10).unwrap();
        assert_eq!(wall.id(), 10);
        assert_eq!(store.create("IfcSlab").unwrap().id(), 11);

        let other = Instance::new(&schema, "IfcWall").unwrap();
        assert!(matches!(store.add_with_id(&other, 10), Err(Error::DuplicateId(10))));
    }

    #[test]
    fn test_schema_mismatch() {
        let store = Store::new(demo_schema().unwrap()).unwrap();
        let header = crate::schema::header::header_schema().unwrap();
        let record = Instance::new(&header, "FILE_NAME").unwrap();
        assert!(matches!(store.add(&record), Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_copy_between_stores() {
        let source = parse("#1=IFCCARTESIANPOINT((1.,2.));\n#2=IFCPOLYLINE((#1,#1));");
        let target = Store::new(source.schema().clone()).unwrap();
        target.create("IfcWall").unwrap();

        let line = source.instance_by_id(2).unwrap();
        let copy = target.add(&line).unwrap();
        assert!(!Rc::ptr_eq(&copy, &line));
        assert_eq!(target.len().unwrap(), 3);
        assert_eq!(source.len().unwrap(), 2);

        // Both list entries map to one copy of the point.
        let points = copy.get_as::<Vec<InstanceRef>>(0).unwrap();
        assert!(Rc::ptr_eq(&points[0], &points[1]));
        assert!(Rc::ptr_eq(&points[0], &target.instance_by_id(points[0].id()).unwrap()));

        // A second add returns the same copy.
        assert!(Rc::ptr_eq(&target.add(&line).unwrap(), &copy));
        assert_inverse_symmetry(&target);
    }

    #[test]
    fn test_length_values_are_rescaled() {
        let source = parse(&format!("{}\n#10=IFCCARTESIANPOINT((1.,2.5));", UNITS_METRE));
        let target = parse(UNITS_MILLIMETRE);

        let point = source.instance_by_id(10).unwrap();
        let copy = target.add(&point).unwrap();
        let coordinates = copy.get_as::<Vec<f64>>(0).unwrap();
        assert!((coordinates[0] - 1000.0).abs() < 1e-9);
        assert!((coordinates[1] - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_rescale_disabled() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let source = parse(&format!("{}\n#10=IFCCARTESIANPOINT((1.,2.5));", UNITS_METRE));
        let options = crate::LoadOptions { calculate_unit_factors: false, ..Default::default() };
        let target = Store::parse_bytes(
            crate::store::tests::spf(UNITS_MILLIMETRE).as_bytes(),
            &registry,
            options,
        )
        .unwrap();

        let copy = target.add(&source.instance_by_id(10).unwrap()).unwrap();
        assert_eq!(copy.get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 2.5]);
    }

    #[test]
    fn test_set_foreign_reference_adds_it() {
        let source = parse("#1=IFCPOLYLOOP($);");
        let target = Store::new(source.schema().clone()).unwrap();
        let bound = target.create("IfcFaceBound").unwrap();

        bound.set(0, source.instance_by_id(1).unwrap()).unwrap();
        assert_eq!(target.len().unwrap(), 2);
        let inner = bound.get_as::<InstanceRef>(0).unwrap();
        assert!(Rc::ptr_eq(&inner, &target.instance_by_id(inner.id()).unwrap()));
        assert_eq!(target.instances_by_reference(inner.id()).unwrap()[0].id(), bound.id());
    }

    #[test]
    fn test_defined_type_values_are_adopted() {
        let schema = demo_schema().unwrap();
        let store = Store::new(schema.clone()).unwrap();
        let property = store.create("IfcPropertySingleValue").unwrap();
        let value = Instance::new_type(&schema, "IfcLengthMeasure", 2.5).unwrap();
        property.set(1, AttributeValue::Instance(value.clone())).unwrap();

        assert!(value.is_attached());
        assert_eq!(value.id(), 0);
        assert_eq!(store.len().unwrap(), 1);
    }
}
