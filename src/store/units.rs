//! Unit lookup through the project's unit assignment

use super::{Store, StoreCore};
use crate::instance::InstanceRef;
use crate::value::AttributeValue;
use crate::Result;

/// A named unit of the project and its magnitude relative to the SI base.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub unit: Option<InstanceRef>,
    pub factor: f64,
}

impl Default for UnitInfo {
    fn default() -> Self {
        Self { unit: None, factor: 1.0 }
    }
}

pub fn prefix_factor(prefix: &str) -> f64 {
    match prefix {
        "EXA" => 1e18,
        "PETA" => 1e15,
        "TERA" => 1e12,
        "GIGA" => 1e9,
        "MEGA" => 1e6,
        "KILO" => 1e3,
        "HECTO" => 1e2,
        "DECA" => 1e1,
        "DECI" => 1e-1,
        "CENTI" => 1e-2,
        "MILLI" => 1e-3,
        "MICRO" => 1e-6,
        "NANO" => 1e-9,
        "PICO" => 1e-12,
        "FEMTO" => 1e-15,
        "ATTO" => 1e-18,
        _ => 1.0,
    }
}

fn attribute(instance: &InstanceRef, name: &str) -> Result<Option<AttributeValue>> {
    match instance.attribute_index(name) {
        Ok(slot) => Ok(Some(instance.get(slot)?)),
        Err(_) => Ok(None),
    }
}

fn reference(instance: &InstanceRef, name: &str) -> Result<Option<InstanceRef>> {
    Ok(match attribute(instance, name)? {
        Some(AttributeValue::Instance(i)) => Some(i),
        _ => None,
    })
}

fn literal(instance: &InstanceRef, name: &str) -> Result<Option<String>> {
    Ok(match attribute(instance, name)? {
        Some(AttributeValue::Enumeration(e)) => Some(e.literal().to_string()),
        _ => None,
    })
}

/// Real value of a measure, either plain or wrapped in a defined type.
fn measure(value: &AttributeValue) -> Result<Option<f64>> {
    Ok(match value {
        AttributeValue::Double(d) => Some(*d),
        AttributeValue::Int(i) => Some(*i as f64),
        AttributeValue::Instance(inner) if !inner.is_entity() => measure(&inner.get(0)?)?,
        _ => None,
    })
}

fn si_prefix(unit: &InstanceRef) -> Result<f64> {
    Ok(literal(unit, "Prefix")?.map(|p| prefix_factor(&p)).unwrap_or(1.0))
}

fn project(store: &Store) -> Result<Option<InstanceRef>> {
    for name in ["IfcProject", "IfcContext"] {
        if store.schema().find(name).is_none() {
            continue;
        }
        let mut roots = store.instances_by_type(name)?;
        if roots.len() == 1 {
            return Ok(roots.pop());
        }
        if !roots.is_empty() {
            tracing::warn!("Found {} instances of {}, expected one", roots.len(), name);
            return Ok(None);
        }
    }
    Ok(None)
}

impl Store {
    /// The project's unit of `kind` (e.g. `LENGTHUNIT`) and its SI factor.
    ///
    /// Yields no unit and a factor of 1.0 when the model has no single
    /// project or the project assigns no unit of that kind. With several
    /// units of one kind the last one in the assignment is used.
    pub fn get_unit(&self, kind: &str) -> Result<UnitInfo> {
        let Some(project) = project(self)? else {
            return Ok(UnitInfo::default());
        };
        let Some(assignment) = reference(&project, "UnitsInContext")? else {
            return Ok(UnitInfo::default());
        };
        let units = match attribute(&assignment, "Units")? {
            Some(AttributeValue::AggregateOfInstance(units)) => units,
            _ => Vec::new(),
        };

        // A later assignment of the same kind overrides an earlier one.
        let mut found: Option<UnitInfo> = None;
        for unit in units {
            if !unit.is_a("IfcNamedUnit") || literal(&unit, "UnitType")?.as_deref() != Some(kind) {
                continue;
            }

            let factor = if unit.is_a("IfcConversionBasedUnit") {
                let mut factor = 1.0;
                if let Some(conversion) = reference(&unit, "ConversionFactor")? {
                    if let Some(value) = attribute(&conversion, "ValueComponent")?
                        && let Some(magnitude) = measure(&value)?
                    {
                        factor *= magnitude;
                    }
                    if let Some(base) = reference(&conversion, "UnitComponent")?
                        && base.is_a("IfcSIUnit")
                    {
                        factor *= si_prefix(&base)?;
                    }
                }
                factor
            } else if unit.is_a("IfcSIUnit") {
                si_prefix(&unit)?
            } else {
                continue;
            };
            if found.is_some() {
                tracing::debug!("{} assigned more than once, #{} replaces earlier ones", kind, unit.id());
            }
            found = Some(UnitInfo { unit: Some(unit), factor });
        }
        Ok(found.unwrap_or_default())
    }
}

/// Length factor of a store, if it declares a length unit.
pub(crate) fn length_unit_factor(core: &StoreCore) -> Result<Option<f64>> {
    let Some(rc) = core.weak().upgrade() else {
        return Ok(None);
    };
    let info = Store::from_core(rc).get_unit("LENGTHUNIT")?;
    Ok(info.unit.map(|_| info.factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::parse;

    const PROJECT: &str = "#1=IFCPROJECT('p',$,$,$,$,$,#2);\n#2=IFCUNITASSIGNMENT((#4,#3));\n";

    #[test]
    fn test_si_length_unit() {
        let store = parse(&format!(
            "{}#3=IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.);\n#4=IFCSIUNIT(*,.PLANEANGLEUNIT.,$,.RADIAN.);",
            PROJECT
        ));
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert_eq!(info.unit.unwrap().id(), 3);
        assert_eq!(info.factor, 1.0);
    }

    #[test]
    fn test_prefixed_length_unit() {
        let store = parse(&format!(
            "{}#3=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);\n#4=IFCSIUNIT(*,.AREAUNIT.,$,.SQUARE_METRE.);",
            PROJECT
        ));
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert_eq!(info.unit.unwrap().id(), 3);
        assert!((info.factor - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_conversion_based_unit() {
        let store = parse(&format!(
            "{}#3=IFCCONVERSIONBASEDUNIT(#5,.LENGTHUNIT.,'FOOT',#6);\n\
             #4=IFCSIUNIT(*,.AREAUNIT.,$,.SQUARE_METRE.);\n\
             #5=IFCDIMENSIONALEXPONENTS(1,0,0,0,0,0,0);\n\
             #6=IFCMEASUREWITHUNIT(IFCLENGTHMEASURE(304.8),#7);\n\
             #7=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);",
            PROJECT
        ));
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert_eq!(info.unit.unwrap().id(), 3);
        assert!((info.factor - 0.3048).abs() < 1e-9);
    }

    #[test]
    fn test_missing_project_or_unit() {
        let store = parse("#1=IFCCARTESIANPOINT((0.,0.));");
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert!(info.unit.is_none());
        assert_eq!(info.factor, 1.0);

        let store = parse(&format!("{}#3=IFCSIUNIT(*,.AREAUNIT.,$,.SQUARE_METRE.);\n#4=IFCSIUNIT(*,.TIMEUNIT.,$,.SECOND.);", PROJECT));
        assert!(store.get_unit("LENGTHUNIT").unwrap().unit.is_none());
    }

    #[test]
    fn test_last_unit_of_a_kind_wins() {
        let store = parse(&format!(
            "{}#3=IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.);\n#4=IFCSIUNIT(*,.LENGTHUNIT.,.CENTI.,.METRE.);",
            PROJECT
        ));
        // PROJECT assigns (#4,#3), so #3 comes last.
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert_eq!(info.unit.unwrap().id(), 3);
        assert_eq!(info.factor, 1.0);

        let store = parse(
            "#1=IFCPROJECT('p',$,$,$,$,$,#2);\n#2=IFCUNITASSIGNMENT((#3,#4));\n\
             #3=IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.);\n#4=IFCSIUNIT(*,.LENGTHUNIT.,.CENTI.,.METRE.);",
        );
        let info = store.get_unit("LENGTHUNIT").unwrap();
        assert_eq!(info.unit.unwrap().id(), 4);
        assert!((info.factor - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_prefix_factors() {
        assert_eq!(prefix_factor("KILO"), 1e3);
        assert_eq!(prefix_factor("ATTO"), 1e-18);
        assert_eq!(prefix_factor("UNKNOWN"), 1.0);
    }
}
