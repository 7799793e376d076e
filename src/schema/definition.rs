//! Schema descriptions - TOML/JSON documents that build a [`Schema`]
//!
//! ```toml
//! name = "IFC_DEMO"
//! rooted_type = "IfcRoot"
//!
//! [[types]]
//! name = "IfcLabel"
//! type = "STRING"
//!
//! [[entities]]
//! name = "IfcPolyline"
//! attributes = [{ name = "Points", type = "LIST [2:?] OF IfcCartesianPoint" }]
//! ```

use super::{
    AggregateKind, AggregationType, Attribute, DeclarationKind, EnumerationDeclaration,
    ParameterType, Schema, SelectDeclaration, SimpleType, TypeDeclaration, entity_declaration,
    enumeration_declaration, finalize_entities,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaDefinition {
    pub name: String,
    /// Entity whose first attribute is the GlobalId
    #[serde(default)]
    pub rooted_type: Option<String>,
    /// Defined type whose values are rescaled between length units
    #[serde(default)]
    pub length_measure: Option<String>,
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
    #[serde(default)]
    pub enumerations: Vec<EnumerationDefinition>,
    #[serde(default)]
    pub selects: Vec<SelectDefinition>,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationDefinition {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectDefinition {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub supertype: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    /// Inherited attributes redeclared as derived (`*`) on this entity
    #[serde(default)]
    pub derived: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub optional: bool,
}

impl SchemaDefinition {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Definition(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Definition(e.to_string()))
    }

    /// Load a description file, picking the format from the extension (`.json` or TOML).
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    /// Resolve all names and build the immutable declaration table.
    ///
    /// Declarations are numbered types first, then enumerations, selects and
    /// entities, each group in document order.
    pub fn build(&self) -> Result<Schema> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.types.iter().map(|t| t.name.as_str()));
        names.extend(self.enumerations.iter().map(|e| e.name.as_str()));
        names.extend(self.selects.iter().map(|s| s.name.as_str()));
        names.extend(self.entities.iter().map(|e| e.name.as_str()));

        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_ascii_uppercase(), i))
            .collect();
        let resolve = |name: &str| -> Result<usize> {
            index
                .get(&name.to_ascii_uppercase())
                .copied()
                .ok_or_else(|| Error::Definition(format!("Unknown type name {}", name)))
        };

        let mut kinds: Vec<(String, DeclarationKind)> = Vec::with_capacity(names.len());
        for t in &self.types {
            let declared_type = parse_type_expression(&t.ty, &resolve)?;
            kinds.push((t.name.clone(), DeclarationKind::Type(TypeDeclaration { declared_type })));
        }
        for e in &self.enumerations {
            let items: Vec<Arc<str>> = e.items.iter().map(|i| Arc::from(i.to_ascii_uppercase())).collect();
            let decl: EnumerationDeclaration = enumeration_declaration(items);
            kinds.push((e.name.clone(), DeclarationKind::Enumeration(decl)));
        }
        for s in &self.selects {
            let items = s.items.iter().map(|i| resolve(i)).collect::<Result<Vec<_>>>()?;
            kinds.push((s.name.clone(), DeclarationKind::Select(SelectDeclaration { items })));
        }

        let entity_base = kinds.len();
        let mut derived = HashMap::new();
        for (offset, e) in self.entities.iter().enumerate() {
            let supertype = e.supertype.as_deref().map(&resolve).transpose()?;
            let attributes = e
                .attributes
                .iter()
                .map(|a| {
                    Ok(Attribute {
                        name: a.name.clone(),
                        ty: parse_type_expression(&a.ty, &resolve)?,
                        optional: a.optional,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if !e.derived.is_empty() {
                derived.insert(entity_base + offset, e.derived.clone());
            }
            kinds.push((
                e.name.clone(),
                DeclarationKind::Entity(entity_declaration(supertype, e.is_abstract, attributes)),
            ));
        }

        finalize_entities(&mut kinds, &derived)?;
        Schema::from_parts(
            self.name.clone(),
            kinds,
            self.rooted_type.as_deref(),
            self.length_measure.as_deref(),
        )
    }
}

/// Parse an EXPRESS-like type expression such as `LIST [2:?] OF IfcCartesianPoint`.
pub fn parse_type_expression<F>(expr: &str, resolve: &F) -> Result<ParameterType>
where
    F: Fn(&str) -> Result<usize>,
{
    let spaced = expr.replace('[', " [ ").replace(']', " ] ").replace(':', " : ");
    let words: Vec<&str> = spaced.split_whitespace().collect();
    let (ty, rest) = parse_words(&words, resolve)?;
    if !rest.is_empty() {
        return Err(Error::Definition(format!("Trailing input in type expression '{}'", expr)));
    }
    Ok(ty)
}

fn parse_words<'w, F>(words: &'w [&'w str], resolve: &F) -> Result<(ParameterType, &'w [&'w str])>
where
    F: Fn(&str) -> Result<usize>,
{
    let (first, rest) = words
        .split_first()
        .ok_or_else(|| Error::Definition("Empty type expression".to_string()))?;

    if let Ok(kind) = first.parse::<AggregateKind>() {
        let (lower, upper, rest) = match rest {
            ["[", lower, ":", upper, "]", tail @ ..] => {
                let lower = lower
                    .parse::<i64>()
                    .map_err(|_| Error::Definition(format!("Invalid lower bound {}", lower)))?;
                let upper = if *upper == "?" {
                    None
                } else {
                    Some(
                        upper
                            .parse::<i64>()
                            .map_err(|_| Error::Definition(format!("Invalid upper bound {}", upper)))?,
                    )
                };
                (lower, upper, tail)
            }
            tail => (0, None, tail),
        };
        let rest = match rest {
            [of, tail @ ..] if of.eq_ignore_ascii_case("OF") => tail,
            _ => return Err(Error::Definition(format!("Expected OF after {}", first))),
        };
        let (element, rest) = parse_words(rest, resolve)?;
        return Ok((
            ParameterType::Aggregation(AggregationType { kind, lower, upper, element: Box::new(element) }),
            rest,
        ));
    }

    if let Ok(simple) = first.parse::<SimpleType>() {
        return Ok((ParameterType::Simple(simple), rest));
    }

    Ok((ParameterType::Named(resolve(first)?), rest))
}
