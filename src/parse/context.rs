//! Instance builder - turns the tokens of one attribute list into storage
//!
//! Parsing happens in two steps. [`InstanceBuilder::read_arguments`] groups
//! the tokens between the outer parentheses into a [`ParseContext`] tree,
//! building inline defined-type instances (`IFCLABEL('x')`) on the way.
//! [`InstanceBuilder::construct`] then walks that tree next to the declared
//! attribute types and produces a fixed-size [`InMemoryStorage`]. `#id`
//! references cannot be resolved yet; they are returned as
//! [`PendingReference`]s and their slots are left blank.

use super::lexer::{Lexer, Token, TokenKind};
use crate::instance::{Instance, InstanceRef};
use crate::schema::{Declaration, DeclarationKind, ParameterType, Schema};
use crate::storage::{AttributeStorage, InMemoryStorage};
use crate::value::{ArgumentType, AttributeValue, BitString, EnumerationReference, Logical};
use crate::{Error, Result};
use std::sync::Arc;

/// A deferred reference, or an instance that was already built inline.
#[derive(Debug, Clone)]
pub enum ReferenceOrInstance {
    Reference { id: u32, offset: usize },
    Instance(InstanceRef),
}

#[derive(Debug, Clone)]
pub enum PendingValue {
    Single(ReferenceOrInstance),
    List(Vec<ReferenceOrInstance>),
    ListOfLists(Vec<Vec<ReferenceOrInstance>>),
}

/// References that fill `attribute` of instance `owner` once resolved.
#[derive(Debug, Clone)]
pub struct PendingReference {
    pub owner: u32,
    pub attribute: usize,
    pub value: PendingValue,
}

impl PendingReference {
    /// Referenced ids, in order of appearance.
    pub fn ids(&self) -> Vec<u32> {
        let id = |r: &ReferenceOrInstance| match r {
            ReferenceOrInstance::Reference { id, .. } => Some(*id),
            ReferenceOrInstance::Instance(_) => None,
        };
        match &self.value {
            PendingValue::Single(r) => id(r).into_iter().collect(),
            PendingValue::List(v) => v.iter().filter_map(id).collect(),
            PendingValue::ListOfLists(v) => v.iter().flatten().filter_map(id).collect(),
        }
    }
}

#[derive(Debug)]
pub enum ContextItem {
    Token(Token),
    Nested(ParseContext),
    Instance(InstanceRef),
}

/// The items of one parenthesized list. Commas are not kept.
#[derive(Debug, Default)]
pub struct ParseContext {
    items: Vec<ContextItem>,
}

impl ParseContext {
    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
    Int,
    Double,
    String,
    Binary,
    Reference,
}

impl ElementKind {
    fn unify(self, other: ElementKind) -> Option<ElementKind> {
        use ElementKind::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Int, Double) | (Double, Int) => Some(Double),
            _ => None,
        }
    }
}

enum Element {
    Int(i64),
    Double(f64),
    String(String),
    Binary(BitString),
    Reference(ReferenceOrInstance),
}

impl Element {
    fn kind(&self) -> ElementKind {
        match self {
            Element::Int(_) => ElementKind::Int,
            Element::Double(_) => ElementKind::Double,
            Element::String(_) => ElementKind::String,
            Element::Binary(_) => ElementKind::Binary,
            Element::Reference(_) => ElementKind::Reference,
        }
    }
}

/// Collected elements of one flat list, classified by kind.
enum FlatList {
    Int(Vec<i64>),
    Double(Vec<f64>),
    String(Vec<String>),
    Binary(Vec<BitString>),
    Reference(Vec<ReferenceOrInstance>),
}

impl FlatList {
    fn from_elements(elements: Vec<Element>, kind: ElementKind) -> Option<Self> {
        macro_rules! collect {
            ($variant:ident) => {
                elements
                    .into_iter()
                    .map(|e| match e {
                        Element::$variant(v) => Some(v),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .map(FlatList::$variant)
            };
        }
        match kind {
            ElementKind::Int => collect!(Int),
            ElementKind::Double => elements
                .into_iter()
                .map(|e| match e {
                    Element::Double(d) => Some(d),
                    Element::Int(i) => Some(i as f64),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(FlatList::Double),
            ElementKind::String => collect!(String),
            ElementKind::Binary => collect!(Binary),
            ElementKind::Reference => collect!(Reference),
        }
    }

    fn into_doubles(self) -> Option<Vec<f64>> {
        match self {
            FlatList::Double(v) => Some(v),
            FlatList::Int(v) => Some(v.into_iter().map(|i| i as f64).collect()),
            _ => None,
        }
    }
}

fn all_instances(refs: &[ReferenceOrInstance]) -> Option<Vec<InstanceRef>> {
    refs.iter()
        .map(|r| match r {
            ReferenceOrInstance::Instance(i) => Some(i.clone()),
            ReferenceOrInstance::Reference { .. } => None,
        })
        .collect()
}

/// Empty list value matching the declared aggregate type.
fn empty_aggregate(ty: ArgumentType) -> AttributeValue {
    use ArgumentType as T;
    match ty {
        T::AggregateOfInt => AttributeValue::AggregateOfInt(Vec::new()),
        T::AggregateOfDouble => AttributeValue::AggregateOfDouble(Vec::new()),
        T::AggregateOfString => AttributeValue::AggregateOfString(Vec::new()),
        T::AggregateOfBinary => AttributeValue::AggregateOfBinary(Vec::new()),
        T::AggregateOfEntityInstance => AttributeValue::AggregateOfInstance(Vec::new()),
        T::AggregateOfAggregateOfInt => AttributeValue::AggregateOfAggregateOfInt(Vec::new()),
        T::AggregateOfAggregateOfDouble => AttributeValue::AggregateOfAggregateOfDouble(Vec::new()),
        T::AggregateOfAggregateOfString => AttributeValue::AggregateOfAggregateOfString(Vec::new()),
        T::AggregateOfAggregateOfBinary => AttributeValue::AggregateOfAggregateOfBinary(Vec::new()),
        T::AggregateOfAggregateOfEntityInstance => {
            AttributeValue::AggregateOfAggregateOfInstance(Vec::new())
        }
        T::EmptyAggregateOfAggregate => AttributeValue::EmptyAggregateOfAggregate,
        _ => AttributeValue::EmptyAggregate,
    }
}

pub struct InstanceBuilder<'l, 'd> {
    lexer: &'l mut Lexer<'d>,
    schema: &'l Arc<Schema>,
}

impl<'l, 'd> InstanceBuilder<'l, 'd> {
    pub fn new(lexer: &'l mut Lexer<'d>, schema: &'l Arc<Schema>) -> Self {
        Self { lexer, schema }
    }

    /// Read an attribute list whose opening parenthesis was just consumed,
    /// up to and including the matching closing parenthesis.
    pub fn read_arguments(
        &mut self,
        owner: u32,
        pending: &mut Vec<PendingReference>,
    ) -> Result<ParseContext> {
        self.load(owner, None, pending)
    }

    fn load(
        &mut self,
        owner: u32,
        host_attribute: Option<usize>,
        pending: &mut Vec<PendingReference>,
    ) -> Result<ParseContext> {
        let mut context = ParseContext::default();
        let mut attribute = host_attribute.unwrap_or(0);
        loop {
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::None => return Err(Error::UnexpectedEof(token.start)),
                TokenKind::Operator(b')') => return Ok(context),
                TokenKind::Operator(b'(') => {
                    let nested = self.load(owner, Some(attribute), pending)?;
                    context.items.push(ContextItem::Nested(nested));
                }
                TokenKind::Operator(b',') => {
                    if host_attribute.is_none() {
                        attribute += 1;
                    }
                }
                TokenKind::Operator(b';') | TokenKind::Operator(b'=') => {
                    return Err(Error::InvalidToken { offset: token.start, expected: "')'" });
                }
                TokenKind::Keyword => {
                    let item = self.inline_instance(token, owner, attribute, pending)?;
                    context.items.push(item);
                }
                _ => context.items.push(ContextItem::Token(token)),
            }
        }
    }

    /// `KEYWORD(value)` inside an attribute list: a defined-type literal.
    fn inline_instance(
        &mut self,
        keyword: Token,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> Result<ContextItem> {
        let blank = ContextItem::Token(Token {
            kind: TokenKind::Operator(b'$'),
            start: keyword.start,
            end: keyword.end,
        });
        let name = self.lexer.keyword(&keyword)?;

        let open = self.lexer.next_token()?;
        if !open.is_operator(b'(') {
            tracing::error!(
                "Expected '(' after '{}' at offset {} in instance #{}",
                name,
                keyword.start,
                owner
            );
            self.lexer.seek(open.start);
            return Ok(blank);
        }

        let schema = self.schema;
        let inner = self.load(owner, Some(attribute), pending)?;
        match schema.find(&name) {
            Some(decl) if matches!(decl.kind(), DeclarationKind::Type(_)) => {
                let storage = self.construct_type(inner, decl, owner, attribute, pending)?;
                Ok(ContextItem::Instance(Instance::from_storage(
                    schema.clone(),
                    decl.index_in_schema(),
                    storage,
                )))
            }
            Some(decl) => {
                tracing::error!(
                    "{} used as inline value at offset {} in instance #{} is not a defined type",
                    decl.name(),
                    keyword.start,
                    owner
                );
                Ok(blank)
            }
            None => {
                tracing::error!(
                    "Unknown type '{}' at offset {} in instance #{}",
                    name,
                    keyword.start,
                    owner
                );
                Ok(blank)
            }
        }
    }

    fn construct_type(
        &self,
        context: ParseContext,
        decl: &Declaration,
        owner: u32,
        host_attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> Result<InMemoryStorage> {
        let params = self.schema.parameter_types(decl.index_in_schema());
        let mut storage = InMemoryStorage::new(1);
        if let Some(item) = context.items.into_iter().next() {
            let value = self.dispatch(item, params.first().copied(), owner, host_attribute, pending);
            storage.set(0, value)?;
        }
        Ok(storage)
    }

    /// Build the storage of an entity instance from its attribute list.
    ///
    /// With `coerce`, the storage has exactly the declared number of slots;
    /// otherwise it has one slot per decoded value.
    pub fn construct(
        &self,
        context: ParseContext,
        decl: &Declaration,
        owner: u32,
        coerce: bool,
        pending: &mut Vec<PendingReference>,
    ) -> Result<InMemoryStorage> {
        if !decl.is_entity() {
            return self.construct_type(context, decl, owner, 0, pending);
        }

        let expected = decl.attribute_count();
        let found = context.len();
        if found != expected {
            tracing::warn!(
                "Expected {} attribute values, found {} for instance #{}",
                expected,
                found,
                owner
            );
        }

        let params = self.schema.parameter_types(decl.index_in_schema());
        let size = if coerce { expected } else { found };
        let mut storage = InMemoryStorage::new(size);
        for (slot, item) in context.items.into_iter().enumerate().take(size) {
            let value = self.dispatch(item, params.get(slot).copied(), owner, slot, pending);
            storage.set(slot, value)?;
        }
        Ok(storage)
    }

    fn dispatch(
        &self,
        item: ContextItem,
        param: Option<&ParameterType>,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> AttributeValue {
        match item {
            ContextItem::Token(token) => self.dispatch_token(token, param, owner, attribute, pending),
            ContextItem::Nested(context) => {
                self.dispatch_aggregate(context, param, owner, attribute, pending)
            }
            ContextItem::Instance(instance) => AttributeValue::Instance(instance),
        }
    }

    fn declared_type(&self, param: Option<&ParameterType>) -> ArgumentType {
        param
            .map(|p| self.schema.argument_type(p))
            .unwrap_or(ArgumentType::Unknown)
    }

    fn dispatch_token(
        &self,
        token: Token,
        param: Option<&ParameterType>,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> AttributeValue {
        match token.kind {
            TokenKind::Operator(b'*') => AttributeValue::Derived,
            TokenKind::Operator(_) | TokenKind::None | TokenKind::Keyword => AttributeValue::Blank,
            TokenKind::Identifier(id) => {
                pending.push(PendingReference {
                    owner,
                    attribute,
                    value: PendingValue::Single(ReferenceOrInstance::Reference {
                        id,
                        offset: token.start,
                    }),
                });
                AttributeValue::Blank
            }
            TokenKind::Int(i) => {
                if self.declared_type(param) == ArgumentType::Double {
                    AttributeValue::Double(i as f64)
                } else {
                    AttributeValue::Int(i)
                }
            }
            TokenKind::Float(d) => AttributeValue::Double(d),
            TokenKind::Bool(logical) => match (self.declared_type(param), logical) {
                (ArgumentType::Logical, l) => AttributeValue::Logical(l),
                (_, Logical::True) => AttributeValue::Bool(true),
                (_, Logical::False) => AttributeValue::Bool(false),
                (_, Logical::Unknown) => AttributeValue::Logical(Logical::Unknown),
            },
            TokenKind::String => match self.lexer.string_value(&token) {
                Ok(s) => AttributeValue::String(s),
                Err(e) => {
                    tracing::error!("Invalid string at offset {} in instance #{}: {}", token.start, owner, e);
                    AttributeValue::Blank
                }
            },
            TokenKind::Binary => match self.lexer.binary_value(&token) {
                Ok(bits) => AttributeValue::Binary(bits),
                Err(e) => {
                    tracing::error!("Invalid binary at offset {} in instance #{}: {}", token.start, owner, e);
                    AttributeValue::Blank
                }
            },
            TokenKind::Enumeration => {
                let literal = self.lexer.enumeration_value(&token).unwrap_or_default();
                match param.and_then(|p| self.enumeration_literal(p, &literal)) {
                    Some(e) => AttributeValue::Enumeration(e),
                    None => {
                        tracing::error!(
                            "Invalid enumeration literal '{}' at offset {} in instance #{}",
                            literal,
                            token.start,
                            owner
                        );
                        AttributeValue::Blank
                    }
                }
            }
        }
    }

    /// Find `literal` in the enumeration a parameter type denotes, looking
    /// through select alternatives as well.
    fn enumeration_literal(&self, param: &ParameterType, literal: &str) -> Option<EnumerationReference> {
        if let Some(decl) = self.schema.enumeration_of(param) {
            let items = decl.as_enumeration()?.items();
            let index = decl.as_enumeration()?.index_of(literal)?;
            return Some(EnumerationReference::new(
                decl.index_in_schema(),
                index,
                items[index].clone(),
            ));
        }
        if let ParameterType::Named(index) = param
            && let DeclarationKind::Select(select) = self.schema.declaration(*index).kind()
        {
            return select
                .items
                .iter()
                .find_map(|item| self.enumeration_literal(&ParameterType::Named(*item), literal));
        }
        None
    }

    fn element(&self, item: &ContextItem, owner: u32) -> Option<Element> {
        match item {
            ContextItem::Instance(i) => Some(Element::Reference(ReferenceOrInstance::Instance(i.clone()))),
            ContextItem::Nested(_) => None,
            ContextItem::Token(token) => match token.kind {
                TokenKind::Int(i) => Some(Element::Int(i)),
                TokenKind::Float(d) => Some(Element::Double(d)),
                TokenKind::Identifier(id) => Some(Element::Reference(ReferenceOrInstance::Reference {
                    id,
                    offset: token.start,
                })),
                TokenKind::String => match self.lexer.string_value(token) {
                    Ok(s) => Some(Element::String(s)),
                    Err(e) => {
                        tracing::error!("Invalid string at offset {} in instance #{}: {}", token.start, owner, e);
                        None
                    }
                },
                TokenKind::Binary => self.lexer.binary_value(token).ok().map(Element::Binary),
                _ => None,
            },
        }
    }

    /// Classify the items of a list that contains no nested lists.
    /// `None` when the items do not share one element kind.
    fn flat_list(&self, context: &ParseContext, owner: u32, promote: bool) -> Option<FlatList> {
        let elements = context
            .items
            .iter()
            .map(|item| self.element(item, owner))
            .collect::<Option<Vec<_>>>()?;
        let mut kind = elements
            .iter()
            .map(Element::kind)
            .try_fold(None, |acc: Option<ElementKind>, k| match acc {
                None => Some(Some(k)),
                Some(a) => a.unify(k).map(Some),
            })??;
        if promote && kind == ElementKind::Int {
            kind = ElementKind::Double;
        }
        FlatList::from_elements(elements, kind)
    }

    fn dispatch_aggregate(
        &self,
        context: ParseContext,
        param: Option<&ParameterType>,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> AttributeValue {
        let declared = self.declared_type(param);
        if context.is_empty() {
            return empty_aggregate(declared);
        }

        let nested = context.items.iter().filter(|i| matches!(i, ContextItem::Nested(_))).count();
        let value = if nested == 0 {
            self.flat_aggregate(&context, declared, owner, attribute, pending)
        } else if nested == context.len() {
            self.nested_aggregate(context, declared, owner, attribute, pending)
        } else {
            None
        };
        value.unwrap_or_else(|| {
            tracing::error!(
                "Inconsistent aggregate valuation for attribute {} of instance #{}",
                attribute,
                owner
            );
            AttributeValue::Blank
        })
    }

    fn flat_aggregate(
        &self,
        context: &ParseContext,
        declared: ArgumentType,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> Option<AttributeValue> {
        let promote = declared == ArgumentType::AggregateOfDouble;
        Some(match self.flat_list(context, owner, promote)? {
            FlatList::Int(v) => AttributeValue::AggregateOfInt(v),
            FlatList::Double(v) => AttributeValue::AggregateOfDouble(v),
            FlatList::String(v) => AttributeValue::AggregateOfString(v),
            FlatList::Binary(v) => AttributeValue::AggregateOfBinary(v),
            FlatList::Reference(refs) => match all_instances(&refs) {
                Some(instances) => AttributeValue::AggregateOfInstance(instances),
                None => {
                    pending.push(PendingReference { owner, attribute, value: PendingValue::List(refs) });
                    AttributeValue::Blank
                }
            },
        })
    }

    fn nested_aggregate(
        &self,
        context: ParseContext,
        declared: ArgumentType,
        owner: u32,
        attribute: usize,
        pending: &mut Vec<PendingReference>,
    ) -> Option<AttributeValue> {
        let promote = declared == ArgumentType::AggregateOfAggregateOfDouble;

        // Leading empty lists carry no type; they are counted and filled in
        // once a non-empty inner list decides the element kind.
        let mut leading_empty = 0;
        let mut inner: Vec<FlatList> = Vec::new();
        let mut kind: Option<ElementKind> = None;
        for item in &context.items {
            let ContextItem::Nested(list) = item else {
                return None;
            };
            if list.items.iter().any(|i| matches!(i, ContextItem::Nested(_))) {
                tracing::error!(
                    "Aggregates nested deeper than two levels are not supported (instance #{})",
                    owner
                );
                return None;
            }
            if list.is_empty() {
                match kind {
                    None => leading_empty += 1,
                    Some(k) => inner.push(FlatList::from_elements(Vec::new(), k)?),
                }
                continue;
            }
            let flat = self.flat_list(list, owner, promote)?;
            let k = match &flat {
                FlatList::Int(_) => ElementKind::Int,
                FlatList::Double(_) => ElementKind::Double,
                FlatList::String(_) => ElementKind::String,
                FlatList::Binary(_) => ElementKind::Binary,
                FlatList::Reference(_) => ElementKind::Reference,
            };
            kind = Some(match kind {
                None => k,
                Some(existing) => existing.unify(k)?,
            });
            inner.push(flat);
        }

        let Some(kind) = kind else {
            return Some(empty_aggregate(declared));
        };

        macro_rules! lists {
            ($variant:ident) => {{
                let mut out = vec![Vec::new(); leading_empty];
                for list in inner {
                    match list {
                        FlatList::$variant(v) => out.push(v),
                        _ => return None,
                    }
                }
                out
            }};
        }

        Some(match kind {
            ElementKind::Int => AttributeValue::AggregateOfAggregateOfInt(lists!(Int)),
            ElementKind::Double => {
                let mut out = vec![Vec::new(); leading_empty];
                for list in inner {
                    out.push(list.into_doubles()?);
                }
                AttributeValue::AggregateOfAggregateOfDouble(out)
            }
            ElementKind::String => AttributeValue::AggregateOfAggregateOfString(lists!(String)),
            ElementKind::Binary => AttributeValue::AggregateOfAggregateOfBinary(lists!(Binary)),
            ElementKind::Reference => {
                let refs: Vec<Vec<ReferenceOrInstance>> = lists!(Reference);
                match refs.iter().map(|r| all_instances(r)).collect::<Option<Vec<_>>>() {
                    Some(instances) => AttributeValue::AggregateOfAggregateOfInstance(instances),
                    None => {
                        pending.push(PendingReference {
                            owner,
                            attribute,
                            value: PendingValue::ListOfLists(refs),
                        });
                        AttributeValue::Blank
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;

    /// Parse `args` (the text after the opening parenthesis) as attributes of `entity`.
    fn build(entity: &str, args: &str) -> (InMemoryStorage, Vec<PendingReference>) {
        let schema = demo_schema().unwrap();
        let mut lexer = Lexer::new(args.as_bytes());
        let mut pending = Vec::new();
        let mut builder = InstanceBuilder::new(&mut lexer, &schema);
        let context = builder.read_arguments(1, &mut pending).unwrap();
        let decl = schema.declaration_by_name(entity).unwrap();
        let storage = builder.construct(context, decl, 1, true, &mut pending).unwrap();
        (storage, pending)
    }

    #[test]
    fn test_scalar_attributes() {
        let (storage, pending) = build(
            "IfcWall",
            "'2O2Fr$t4X7Zf8NOew3FLOH',$,'it''s',$,#5,*,.STANDARD.);",
        );
        assert_eq!(storage.size(), 7);
        assert_eq!(storage.get_as::<String>(0).unwrap(), "2O2Fr$t4X7Zf8NOew3FLOH");
        assert!(storage.get(1).unwrap().is_blank());
        assert_eq!(storage.get_as::<String>(2).unwrap(), "it's");
        assert!(storage.get(4).unwrap().is_blank());
        assert_eq!(storage.get(5).unwrap(), AttributeValue::Derived);
        match storage.get(6).unwrap() {
            AttributeValue::Enumeration(e) => assert_eq!(e.literal(), "STANDARD"),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].owner, 1);
        assert_eq!(pending[0].attribute, 4);
        assert_eq!(pending[0].ids(), vec![5]);
    }

    #[test]
    fn test_integer_promotion() {
        let (storage, _) = build("IfcCartesianPoint", "(0,1.5,2));");
        assert_eq!(storage.get_as::<Vec<f64>>(0).unwrap(), vec![0.0, 1.5, 2.0]);

        let (storage, _) = build("IfcCartesianPoint", "(1,2));");
        assert_eq!(storage.get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 2.0]);

        let (storage, _) = build("IfcIndexedPolygonalFace", "(1,2,3));");
        assert_eq!(storage.get_as::<Vec<i64>>(0).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_nested_aggregates() {
        let (storage, _) = build("IfcCartesianPointList3D", "((),(0,0,1),(1.,2.,3.)));");
        assert_eq!(
            storage.get_as::<Vec<Vec<f64>>>(0).unwrap(),
            vec![vec![], vec![0.0, 0.0, 1.0], vec![1.0, 2.0, 3.0]]
        );

        let (storage, pending) = build("IfcBSplineSurface", "1,1,((#1,#2),(#3,#4)));");
        assert!(storage.get(2).unwrap().is_blank());
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].value, PendingValue::ListOfLists(ref v) if v.len() == 2));
        assert_eq!(pending[0].ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reference_list_is_deferred() {
        let (storage, pending) = build("IfcPolyline", "(#2,#3));");
        assert!(storage.get(0).unwrap().is_blank());
        assert_eq!(pending[0].attribute, 0);
        assert!(matches!(pending[0].value, PendingValue::List(ref v) if v.len() == 2));
    }

    #[test]
    fn test_inconsistent_aggregate_is_blank() {
        let (storage, _) = build("IfcCartesianPoint", "(1.,'a'));");
        assert!(storage.get(0).unwrap().is_blank());
    }

    #[test]
    fn test_empty_aggregate_is_typed() {
        let (storage, _) = build("IfcPostalAddress", "$,());");
        assert_eq!(storage.get(1).unwrap(), AttributeValue::AggregateOfString(Vec::new()));

        let (storage, _) = build("IfcPolyline", "());");
        assert_eq!(storage.get(0).unwrap(), AttributeValue::AggregateOfInstance(Vec::new()));

        let (storage, _) = build("IfcPixelTexture", "1,1,());");
        assert_eq!(storage.get(2).unwrap(), AttributeValue::AggregateOfBinary(Vec::new()));
    }

    #[test]
    fn test_inline_defined_type() {
        let (storage, pending) = build("IfcPropertySingleValue", "'Width',IFCLENGTHMEASURE(2));");
        assert!(pending.is_empty());
        let value = storage.get_as::<InstanceRef>(1).unwrap();
        assert_eq!(value.name(), "IfcLengthMeasure");
        assert!(!value.is_entity());
        assert_eq!(value.get_as::<f64>(0).unwrap(), 2.0);
    }

    #[test]
    fn test_unknown_keyword_becomes_blank() {
        let (storage, _) = build("IfcPropertySingleValue", "'Width',IFCNOSUCHTYPE(2));");
        assert!(storage.get(1).unwrap().is_blank());

        let (storage, _) = build("IfcPropertySingleValue", "'Width',IFCWALL(2));");
        assert!(storage.get(1).unwrap().is_blank());
    }

    #[test]
    fn test_logical_and_boolean() {
        let (storage, _) = build("IfcBSplineCurve", "3,(#1,#2),.U.,.F.);");
        assert_eq!(storage.get_as::<Logical>(2).unwrap(), Logical::Unknown);
        assert_eq!(storage.get_as::<Logical>(3).unwrap(), Logical::False);

        let (storage, _) = build("IfcFaceBound", "#1,.T.);");
        assert!(storage.get_as::<bool>(1).unwrap());
    }

    #[test]
    fn test_invalid_enumeration_literal() {
        let (storage, _) = build("IfcSlab", "'g',$,$,$,$,$,.SIDEWAYS.);");
        assert!(storage.get(6).unwrap().is_blank());
    }

    #[test]
    fn test_count_mismatch_is_coerced() {
        let (storage, _) = build("IfcCartesianPoint", "(1.,2.),$,$);");
        assert_eq!(storage.size(), 1);

        let (storage, _) = build("IfcFaceBound", "#1);");
        assert_eq!(storage.size(), 2);
        assert!(storage.get(1).unwrap().is_blank());
    }

    #[test]
    fn test_unterminated_list_is_an_error() {
        let schema = demo_schema().unwrap();
        let mut lexer = Lexer::new(b"1,2");
        let mut pending = Vec::new();
        let mut builder = InstanceBuilder::new(&mut lexer, &schema);
        assert!(matches!(
            builder.read_arguments(1, &mut pending),
            Err(Error::UnexpectedEof(_))
        ));
    }
}
