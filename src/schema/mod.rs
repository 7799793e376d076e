//! Declaration registry - type metadata consumed by the parser and the store
//!
//! A [`Schema`] is a dense table of declarations:
//! - entities (ordered attributes, supertype, subtypes, derived slots)
//! - defined types (a named wrapper around one parameter type)
//! - enumerations (ordered literals)
//! - selects (a choice between other declarations)
//!
//! Schemas are immutable once built and shared as `Arc<Schema>`.

pub mod definition;
pub mod demo;
pub mod header;
pub mod registry;

pub use definition::SchemaDefinition;
pub use registry::SchemaRegistry;

use crate::value::ArgumentType;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// EXPRESS simple types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    Integer,
    Real,
    Number,
    Boolean,
    Logical,
    String,
    Binary,
}

impl SimpleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleType::Integer => "INTEGER",
            SimpleType::Real => "REAL",
            SimpleType::Number => "NUMBER",
            SimpleType::Boolean => "BOOLEAN",
            SimpleType::Logical => "LOGICAL",
            SimpleType::String => "STRING",
            SimpleType::Binary => "BINARY",
        }
    }

    pub fn argument_type(&self) -> ArgumentType {
        match self {
            SimpleType::Integer => ArgumentType::Int,
            SimpleType::Real | SimpleType::Number => ArgumentType::Double,
            SimpleType::Boolean => ArgumentType::Bool,
            SimpleType::Logical => ArgumentType::Logical,
            SimpleType::String => ArgumentType::String,
            SimpleType::Binary => ArgumentType::Binary,
        }
    }
}

impl FromStr for SimpleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INTEGER" => Ok(SimpleType::Integer),
            "REAL" => Ok(SimpleType::Real),
            "NUMBER" => Ok(SimpleType::Number),
            "BOOLEAN" => Ok(SimpleType::Boolean),
            "LOGICAL" => Ok(SimpleType::Logical),
            "STRING" => Ok(SimpleType::String),
            "BINARY" => Ok(SimpleType::Binary),
            _ => Err(Error::Definition(format!("Unknown simple type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    List,
    Set,
    Bag,
    Array,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::List => "LIST",
            AggregateKind::Set => "SET",
            AggregateKind::Bag => "BAG",
            AggregateKind::Array => "ARRAY",
        }
    }
}

impl FromStr for AggregateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LIST" => Ok(AggregateKind::List),
            "SET" => Ok(AggregateKind::Set),
            "BAG" => Ok(AggregateKind::Bag),
            "ARRAY" => Ok(AggregateKind::Array),
            _ => Err(Error::Definition(format!("Unknown aggregate kind: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationType {
    pub kind: AggregateKind,
    pub lower: i64,
    /// `None` for an unbounded (`?`) upper bound
    pub upper: Option<i64>,
    pub element: Box<ParameterType>,
}

/// Type of an attribute or of the value wrapped by a defined type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    Simple(SimpleType),
    /// Reference to another declaration by `index_in_schema`
    Named(usize),
    Aggregation(AggregationType),
}

impl ParameterType {
    pub fn as_aggregation(&self) -> Option<&AggregationType> {
        match self {
            ParameterType::Aggregation(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: ParameterType,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct EntityDeclaration {
    pub supertype: Option<usize>,
    pub subtypes: Vec<usize>,
    pub is_abstract: bool,
    /// Attributes declared on this entity only
    pub attributes: Vec<Attribute>,
    all_attributes: Vec<Attribute>,
    derived: Vec<bool>,
}

impl EntityDeclaration {
    /// Inherited and own attributes, in slot order.
    pub fn all_attributes(&self) -> &[Attribute] {
        &self.all_attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.all_attributes.len()
    }

    /// Whether the slot is redeclared as derived somewhere up the subtype chain.
    pub fn is_derived(&self, slot: usize) -> bool {
        self.derived.get(slot).copied().unwrap_or(false)
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.all_attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    pub declared_type: ParameterType,
}

#[derive(Debug, Clone)]
pub struct EnumerationDeclaration {
    items: Vec<Arc<str>>,
}

impl EnumerationDeclaration {
    pub fn items(&self) -> &[Arc<str>] {
        &self.items
    }

    pub fn index_of(&self, literal: &str) -> Option<usize> {
        self.items.iter().position(|i| i.eq_ignore_ascii_case(literal))
    }
}

#[derive(Debug, Clone)]
pub struct SelectDeclaration {
    pub items: Vec<usize>,
}

#[derive(Debug, Clone)]
pub enum DeclarationKind {
    Entity(EntityDeclaration),
    Type(TypeDeclaration),
    Enumeration(EnumerationDeclaration),
    Select(SelectDeclaration),
}

/// One entity, defined type, enumeration or select of a schema.
#[derive(Debug, Clone)]
pub struct Declaration {
    name: String,
    index: usize,
    kind: DeclarationKind,
}

impl Declaration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_uppercase(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    /// Dense position of this declaration in its schema.
    pub fn index_in_schema(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &DeclarationKind {
        &self.kind
    }

    pub fn as_entity(&self) -> Option<&EntityDeclaration> {
        match &self.kind {
            DeclarationKind::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeDeclaration> {
        match &self.kind {
            DeclarationKind::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&EnumerationDeclaration> {
        match &self.kind {
            DeclarationKind::Enumeration(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, DeclarationKind::Entity(_))
    }

    /// Number of attribute slots an instance of this declaration carries.
    pub fn attribute_count(&self) -> usize {
        match &self.kind {
            DeclarationKind::Entity(e) => e.attribute_count(),
            _ => 1,
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Immutable declaration table for one schema.
#[derive(Debug)]
pub struct Schema {
    name: String,
    declarations: Vec<Declaration>,
    by_name: HashMap<String, usize>,
    rooted_type: Option<usize>,
    length_measure: Option<usize>,
}

impl Schema {
    pub(crate) fn from_parts(
        name: String,
        declarations: Vec<(String, DeclarationKind)>,
        rooted_type: Option<&str>,
        length_measure: Option<&str>,
    ) -> Result<Self> {
        let declarations: Vec<Declaration> = declarations
            .into_iter()
            .enumerate()
            .map(|(index, (name, kind))| Declaration { name, index, kind })
            .collect();

        let mut by_name = HashMap::with_capacity(declarations.len());
        for decl in &declarations {
            if by_name.insert(decl.name_uppercase(), decl.index).is_some() {
                return Err(Error::Definition(format!("Duplicate declaration {}", decl.name)));
            }
        }

        let lookup = |name: Option<&str>| -> Result<Option<usize>> {
            name.map(|n| {
                by_name
                    .get(&n.to_ascii_uppercase())
                    .copied()
                    .ok_or_else(|| Error::Definition(format!("Unknown declaration {}", n)))
            })
            .transpose()
        };
        let rooted_type = lookup(rooted_type)?;
        let length_measure = lookup(length_measure)?;

        Ok(Self { name, declarations, by_name, rooted_type, length_measure })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Declaration by `index_in_schema`. Indices originate from this schema.
    pub fn declaration(&self, index: usize) -> &Declaration {
        &self.declarations[index]
    }

    pub fn get(&self, index: usize) -> Option<&Declaration> {
        self.declarations.get(index)
    }

    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<&Declaration> {
        self.by_name
            .get(&name.to_ascii_uppercase())
            .map(|i| &self.declarations[*i])
    }

    pub fn declaration_by_name(&self, name: &str) -> Result<&Declaration> {
        self.find(name)
            .ok_or_else(|| Error::UnknownDeclaration(name.to_string()))
    }

    /// The designated root entity whose first attribute is a GlobalId.
    pub fn rooted_type(&self) -> Option<usize> {
        self.rooted_type
    }

    /// Whether `decl` is `ancestor` or one of its (transitive) subtypes.
    pub fn is_subtype_of(&self, decl: usize, ancestor: usize) -> bool {
        let mut current = Some(decl);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.declarations[index].as_entity().and_then(|e| e.supertype);
        }
        false
    }

    /// Like [`Schema::is_subtype_of`], by ancestor name. Unknown names never match.
    pub fn is_a(&self, decl: usize, ancestor: &str) -> bool {
        self.find(ancestor)
            .map(|a| self.is_subtype_of(decl, a.index))
            .unwrap_or(false)
    }

    /// Parameter type per slot for instances of `decl`.
    pub fn parameter_types(&self, decl: usize) -> Vec<&ParameterType> {
        match &self.declarations[decl].kind {
            DeclarationKind::Entity(e) => e.all_attributes.iter().map(|a| &a.ty).collect(),
            DeclarationKind::Type(t) => vec![&t.declared_type],
            DeclarationKind::Enumeration(_) | DeclarationKind::Select(_) => Vec::new(),
        }
    }

    /// The value type a parameter type decodes into.
    pub fn argument_type(&self, ty: &ParameterType) -> ArgumentType {
        match ty {
            ParameterType::Simple(s) => s.argument_type(),
            ParameterType::Named(index) => match &self.declarations[*index].kind {
                DeclarationKind::Entity(_) => ArgumentType::EntityInstance,
                DeclarationKind::Type(t) => self.argument_type(&t.declared_type),
                DeclarationKind::Enumeration(_) => ArgumentType::Enumeration,
                DeclarationKind::Select(_) => ArgumentType::Unknown,
            },
            ParameterType::Aggregation(a) => self.argument_type(&a.element).make_aggregate(),
        }
    }

    /// Follows defined types down to the aggregation they wrap, if any.
    pub fn aggregation<'a>(&'a self, ty: &'a ParameterType) -> Option<&'a AggregationType> {
        match ty {
            ParameterType::Aggregation(a) => Some(a),
            ParameterType::Named(index) => match &self.declarations[*index].kind {
                DeclarationKind::Type(t) => self.aggregation(&t.declared_type),
                _ => None,
            },
            ParameterType::Simple(_) => None,
        }
    }

    /// The enumeration declaration a parameter type resolves to, if any.
    pub fn enumeration_of(&self, ty: &ParameterType) -> Option<&Declaration> {
        match ty {
            ParameterType::Named(index) => {
                let decl = &self.declarations[*index];
                match &decl.kind {
                    DeclarationKind::Enumeration(_) => Some(decl),
                    DeclarationKind::Type(t) => self.enumeration_of(&t.declared_type),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Whether values of this parameter type are lengths (directly or as aggregate elements).
    pub fn is_length_measure(&self, ty: &ParameterType) -> bool {
        let Some(length) = self.length_measure else {
            return false;
        };
        match ty {
            ParameterType::Named(index) => *index == length,
            ParameterType::Aggregation(a) => self.is_length_measure(&a.element),
            ParameterType::Simple(_) => false,
        }
    }

    /// Every declaration reachable downwards through subtype links, `decl` included.
    pub fn subtype_tree(&self, decl: usize) -> Vec<usize> {
        let mut out = vec![decl];
        let mut i = 0;
        while i < out.len() {
            if let Some(e) = self.declarations[out[i]].as_entity() {
                out.extend(e.subtypes.iter().copied());
            }
            i += 1;
        }
        out
    }
}

/// Builds the flattened attribute tables once all own attributes are known.
pub(crate) fn entity_declaration(
    supertype: Option<usize>,
    is_abstract: bool,
    attributes: Vec<Attribute>,
) -> EntityDeclaration {
    EntityDeclaration {
        supertype,
        subtypes: Vec::new(),
        is_abstract,
        attributes,
        all_attributes: Vec::new(),
        derived: Vec::new(),
    }
}

pub(crate) fn enumeration_declaration(items: Vec<Arc<str>>) -> EnumerationDeclaration {
    EnumerationDeclaration { items }
}

/// Fills `subtypes`, `all_attributes` and `derived` on every entity.
pub(crate) fn finalize_entities(
    kinds: &mut [(String, DeclarationKind)],
    derived_names: &HashMap<usize, Vec<String>>,
) -> Result<()> {
    let len = kinds.len();

    for index in 0..len {
        let supertype = match &kinds[index].1 {
            DeclarationKind::Entity(e) => e.supertype,
            _ => continue,
        };
        if let Some(parent) = supertype {
            match kinds.get_mut(parent).map(|k| &mut k.1) {
                Some(DeclarationKind::Entity(p)) => p.subtypes.push(index),
                _ => {
                    return Err(Error::Definition(format!(
                        "Supertype of {} is not an entity",
                        kinds[index].0
                    )));
                }
            }
        }
    }

    for index in 0..len {
        if !matches!(kinds[index].1, DeclarationKind::Entity(_)) {
            continue;
        }
        // Walk up to the root collecting the chain, then flatten root first.
        let mut chain = vec![index];
        let mut seen = 0;
        while let Some(DeclarationKind::Entity(e)) = chain.last().map(|i| &kinds[*i].1) {
            let Some(parent) = e.supertype else { break };
            seen += 1;
            if seen > len {
                return Err(Error::Definition(format!(
                    "Cyclic supertype chain at {}",
                    kinds[index].0
                )));
            }
            chain.push(parent);
        }

        let mut all = Vec::new();
        let mut derived_for = Vec::new();
        for ancestor in chain.iter().rev() {
            if let DeclarationKind::Entity(e) = &kinds[*ancestor].1 {
                all.extend(e.attributes.iter().cloned());
            }
            if let Some(names) = derived_names.get(ancestor) {
                derived_for.extend(names.iter().cloned());
            }
        }
        let mut derived = vec![false; all.len()];
        for name in &derived_for {
            let slot = all
                .iter()
                .position(|a: &Attribute| a.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    Error::Definition(format!(
                        "Derived attribute {} not found on {}",
                        name, kinds[index].0
                    ))
                })?;
            derived[slot] = true;
        }

        if let DeclarationKind::Entity(e) = &mut kinds[index].1 {
            e.all_attributes = all;
            e.derived = derived;
        }
    }
    Ok(())
}
