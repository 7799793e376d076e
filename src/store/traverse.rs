//! Walks over the forward references of an instance
//!
//! Only entities are listed. Defined-type instances are looked through
//! without costing a level, so a reference held by an `IfcValue` select
//! counts the same as a direct one.

use super::Store;
use crate::instance::InstanceRef;
use crate::Result;
use std::collections::HashSet;

struct Walk {
    max_depth: Option<usize>,
    visited: HashSet<u64>,
    /// Instances by the depth they were first reached at
    levels: Vec<Vec<InstanceRef>>,
    order: Vec<InstanceRef>,
}

impl Walk {
    fn new(max_depth: i32) -> Self {
        Self {
            max_depth: usize::try_from(max_depth).ok(),
            visited: HashSet::new(),
            levels: Vec::new(),
            order: Vec::new(),
        }
    }

    fn visit(&mut self, instance: &InstanceRef, depth: usize) -> Result<()> {
        if !self.visited.insert(instance.identity()) {
            return Ok(());
        }
        if instance.is_entity() {
            if self.levels.len() <= depth {
                self.levels.resize_with(depth + 1, Vec::new);
            }
            self.levels[depth].push(instance.clone());
            self.order.push(instance.clone());
            if self.max_depth.is_some_and(|max| depth >= max) {
                return Ok(());
            }
        }
        let next = if instance.is_entity() { depth + 1 } else { depth };
        for value in instance.values()? {
            for child in value.instances() {
                self.visit(&child, next)?;
            }
        }
        Ok(())
    }
}

impl Store {
    /// Depth-first walk from `root`, `root` first.
    ///
    /// `max_depth` limits the number of hops; 0 yields only `root` and a
    /// negative value walks the whole reachable graph.
    pub fn traverse(&self, root: &InstanceRef, max_depth: i32) -> Result<Vec<InstanceRef>> {
        let mut walk = Walk::new(max_depth);
        walk.visit(root, 0)?;
        Ok(walk.order)
    }

    /// Like [`Store::traverse`], grouped by the depth at which each instance
    /// was first reached and concatenated in depth order.
    pub fn traverse_breadth_first(&self, root: &InstanceRef, max_depth: i32) -> Result<Vec<InstanceRef>> {
        let mut walk = Walk::new(max_depth);
        walk.visit(root, 0)?;
        Ok(walk.levels.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::parse;

    const MODEL: &str = "#1=IFCCARTESIANPOINT((0.,0.));\n#2=IFCCARTESIANPOINT((1.,0.));\n\
        #3=IFCPOLYLOOP((#1,#2,#1));\n#4=IFCFACEBOUND(#3,.T.);\n\
        #5=IFCWALL('w',$,$,$,#4,$,$);\n#6=IFCRELAGGREGATES('r',$,$,#5,(#5,#7));\n\
        #7=IFCSLAB('s',$,$,$,$,$,$);";

    fn ids(instances: Vec<crate::InstanceRef>) -> Vec<u32> {
        instances.iter().map(|i| i.id()).collect()
    }

    #[test]
    fn test_depth_first() {
        let store = parse(MODEL);
        let root = store.instance_by_id(6).unwrap();
        assert_eq!(ids(store.traverse(&root, -1).unwrap()), vec![6, 5, 4, 3, 1, 2, 7]);
        assert_eq!(ids(store.traverse(&root, 0).unwrap()), vec![6]);
        assert_eq!(ids(store.traverse(&root, 1).unwrap()), vec![6, 5, 7]);
    }

    #[test]
    fn test_breadth_first() {
        let store = parse(MODEL);
        let root = store.instance_by_id(6).unwrap();
        assert_eq!(
            ids(store.traverse_breadth_first(&root, -1).unwrap()),
            vec![6, 5, 7, 4, 3, 1, 2]
        );
        assert_eq!(ids(store.traverse_breadth_first(&root, 2).unwrap()), vec![6, 5, 7, 4]);
    }

    #[test]
    fn test_cycles_terminate() {
        let store = parse(
            "#1=IFCRELAGGREGATES('a',$,$,#2,(#2));\n#2=IFCPROJECT('p',$,$,$,$,$,$);",
        );
        let project = store.instance_by_id(2).unwrap();
        let rel = store.instance_by_id(1).unwrap();
        // Values are not checked against the declared type, which makes a cycle easy.
        project.set(6, rel.clone()).unwrap();
        assert_eq!(ids(store.traverse(&rel, -1).unwrap()), vec![1, 2]);
        assert_eq!(ids(store.traverse(&project, -1).unwrap()), vec![2, 1]);
    }

    #[test]
    fn test_looks_through_defined_types() {
        let store = parse(
            "#1=IFCCARTESIANPOINT((0.,0.));\n#2=IFCMEASUREWITHUNIT(IFCLENGTHMEASURE(1.),#3);\n\
             #3=IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.);",
        );
        let root = store.instance_by_id(2).unwrap();
        assert_eq!(ids(store.traverse(&root, -1).unwrap()), vec![2, 3]);
        assert_eq!(ids(store.traverse(&root, 1).unwrap()), vec![2, 3]);
    }
}
