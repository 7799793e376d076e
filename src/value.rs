//! Attribute values - the closed set of things an attribute slot can hold
//!
//! Every storage backend reads and writes [`AttributeValue`]. The matching
//! [`ArgumentType`] is the type tag used for probing (`has`) and as the first
//! byte of a persistent record.

use crate::instance::InstanceRef;
use crate::{Error, Result};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

/// Type tag of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentType {
    Blank,
    Derived,
    Int,
    Bool,
    Logical,
    Double,
    String,
    Binary,
    Enumeration,
    EntityInstance,
    EmptyAggregate,
    AggregateOfInt,
    AggregateOfDouble,
    AggregateOfString,
    AggregateOfBinary,
    AggregateOfEntityInstance,
    EmptyAggregateOfAggregate,
    AggregateOfAggregateOfInt,
    AggregateOfAggregateOfDouble,
    AggregateOfAggregateOfString,
    AggregateOfAggregateOfBinary,
    AggregateOfAggregateOfEntityInstance,
    /// Used for parameter types that do not map onto a single value type (selects).
    Unknown,
}

impl ArgumentType {
    /// Get the string representation of the argument type
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentType::Blank => "NULL",
            ArgumentType::Derived => "DERIVED",
            ArgumentType::Int => "INT",
            ArgumentType::Bool => "BOOL",
            ArgumentType::Logical => "LOGICAL",
            ArgumentType::Double => "DOUBLE",
            ArgumentType::String => "STRING",
            ArgumentType::Binary => "BINARY",
            ArgumentType::Enumeration => "ENUMERATION",
            ArgumentType::EntityInstance => "ENTITY_INSTANCE",
            ArgumentType::EmptyAggregate => "EMPTY_AGGREGATE",
            ArgumentType::AggregateOfInt => "AGGREGATE_OF_INT",
            ArgumentType::AggregateOfDouble => "AGGREGATE_OF_DOUBLE",
            ArgumentType::AggregateOfString => "AGGREGATE_OF_STRING",
            ArgumentType::AggregateOfBinary => "AGGREGATE_OF_BINARY",
            ArgumentType::AggregateOfEntityInstance => "AGGREGATE_OF_ENTITY_INSTANCE",
            ArgumentType::EmptyAggregateOfAggregate => "EMPTY_AGGREGATE_OF_AGGREGATE",
            ArgumentType::AggregateOfAggregateOfInt => "AGGREGATE_OF_AGGREGATE_OF_INT",
            ArgumentType::AggregateOfAggregateOfDouble => "AGGREGATE_OF_AGGREGATE_OF_DOUBLE",
            ArgumentType::AggregateOfAggregateOfString => "AGGREGATE_OF_AGGREGATE_OF_STRING",
            ArgumentType::AggregateOfAggregateOfBinary => "AGGREGATE_OF_AGGREGATE_OF_BINARY",
            ArgumentType::AggregateOfAggregateOfEntityInstance => {
                "AGGREGATE_OF_AGGREGATE_OF_ENTITY_INSTANCE"
            }
            ArgumentType::Unknown => "UNKNOWN",
        }
    }

    /// Get all argument types, in tag order
    pub fn all() -> &'static [ArgumentType] {
        use ArgumentType::*;
        &[
            Blank,
            Derived,
            Int,
            Bool,
            Logical,
            Double,
            String,
            Binary,
            Enumeration,
            EntityInstance,
            EmptyAggregate,
            AggregateOfInt,
            AggregateOfDouble,
            AggregateOfString,
            AggregateOfBinary,
            AggregateOfEntityInstance,
            EmptyAggregateOfAggregate,
            AggregateOfAggregateOfInt,
            AggregateOfAggregateOfDouble,
            AggregateOfAggregateOfString,
            AggregateOfAggregateOfBinary,
            AggregateOfAggregateOfEntityInstance,
            Unknown,
        ]
    }

    /// Single byte tag used as the first byte of encoded records.
    pub fn tag(&self) -> u8 {
        let position = Self::all().iter().position(|t| t == self).unwrap_or(0);
        b'A' + position as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        tag.checked_sub(b'A')
            .and_then(|i| Self::all().get(i as usize))
            .copied()
    }

    /// The aggregate type whose elements are of this type.
    pub fn make_aggregate(&self) -> ArgumentType {
        use ArgumentType::*;
        match self {
            Int => AggregateOfInt,
            Double => AggregateOfDouble,
            String => AggregateOfString,
            Binary => AggregateOfBinary,
            EntityInstance => AggregateOfEntityInstance,
            EmptyAggregate => EmptyAggregateOfAggregate,
            AggregateOfInt => AggregateOfAggregateOfInt,
            AggregateOfDouble => AggregateOfAggregateOfDouble,
            AggregateOfString => AggregateOfAggregateOfString,
            AggregateOfBinary => AggregateOfAggregateOfBinary,
            AggregateOfEntityInstance => AggregateOfAggregateOfEntityInstance,
            _ => Unknown,
        }
    }

    /// The element type of an aggregate type, `Unknown` otherwise.
    pub fn element(&self) -> ArgumentType {
        use ArgumentType::*;
        match self {
            AggregateOfInt => Int,
            AggregateOfDouble => Double,
            AggregateOfString => String,
            AggregateOfBinary => Binary,
            AggregateOfEntityInstance => EntityInstance,
            AggregateOfAggregateOfInt => AggregateOfInt,
            AggregateOfAggregateOfDouble => AggregateOfDouble,
            AggregateOfAggregateOfString => AggregateOfString,
            AggregateOfAggregateOfBinary => AggregateOfBinary,
            AggregateOfAggregateOfEntityInstance => AggregateOfEntityInstance,
            _ => Unknown,
        }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state logical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logical {
    False,
    True,
    Unknown,
}

impl Logical {
    pub fn as_u8(&self) -> u8 {
        match self {
            Logical::False => 0,
            Logical::True => 1,
            Logical::Unknown => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Logical::False),
            1 => Some(Logical::True),
            2 => Some(Logical::Unknown),
            _ => None,
        }
    }
}

impl From<bool> for Logical {
    fn from(value: bool) -> Self {
        if value { Logical::True } else { Logical::False }
    }
}

/// Ordered sequence of bits, as carried by `"..."` binary tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitString {
    bits: Vec<bool>,
}

impl BitString {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Decode token content (without quotes): one digit with the number of
    /// unused leading bits, followed by hex digits, most significant first.
    pub fn from_hex(content: &str) -> Result<Self> {
        let mut chars = content.chars();
        let pad = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .filter(|n| *n <= 3)
            .ok_or_else(|| Error::Parse(format!("Invalid binary literal \"{}\"", content)))?
            as usize;

        let mut bits = Vec::with_capacity(content.len().saturating_sub(1) * 4);
        for c in chars {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| Error::Parse(format!("Invalid binary literal \"{}\"", content)))?;
            for shift in (0..4).rev() {
                bits.push((nibble >> shift) & 1 == 1);
            }
        }
        if pad > bits.len() {
            return Err(Error::Parse(format!("Invalid binary literal \"{}\"", content)));
        }
        bits.drain(..pad);
        Ok(Self { bits })
    }

    /// Encode as pad digit followed by hex digits (inverse of [`BitString::from_hex`]).
    pub fn to_hex(&self) -> String {
        let pad = (4 - self.bits.len() % 4) % 4;
        let mut out = String::with_capacity(1 + (self.bits.len() + pad) / 4);
        out.push(char::from(b'0' + pad as u8));

        let padded: Vec<bool> = std::iter::repeat_n(false, pad)
            .chain(self.bits.iter().copied())
            .collect();
        for chunk in padded.chunks(4) {
            let nibble = chunk.iter().fold(0u32, |acc, b| (acc << 1) | u32::from(*b));
            if let Some(c) = char::from_digit(nibble, 16) {
                out.push(c.to_ascii_uppercase());
            }
        }
        out
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BitString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::Parse(format!("Invalid bit '{}'", other))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

/// A literal of an enumeration declaration.
#[derive(Debug, Clone)]
pub struct EnumerationReference {
    /// `index_in_schema` of the enumeration declaration
    pub declaration: usize,
    /// Position of the literal within the enumeration
    pub index: usize,
    literal: Arc<str>,
}

impl EnumerationReference {
    pub fn new(declaration: usize, index: usize, literal: Arc<str>) -> Self {
        Self { declaration, index, literal }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }
}

impl PartialEq for EnumerationReference {
    fn eq(&self, other: &Self) -> bool {
        self.declaration == other.declaration && self.index == other.index
    }
}

/// The value held by one attribute slot.
#[derive(Clone, Default)]
pub enum AttributeValue {
    #[default]
    Blank,
    Derived,
    Int(i64),
    Bool(bool),
    Logical(Logical),
    Double(f64),
    String(String),
    Binary(BitString),
    Enumeration(EnumerationReference),
    Instance(InstanceRef),
    EmptyAggregate,
    AggregateOfInt(Vec<i64>),
    AggregateOfDouble(Vec<f64>),
    AggregateOfString(Vec<String>),
    AggregateOfBinary(Vec<BitString>),
    AggregateOfInstance(Vec<InstanceRef>),
    EmptyAggregateOfAggregate,
    AggregateOfAggregateOfInt(Vec<Vec<i64>>),
    AggregateOfAggregateOfDouble(Vec<Vec<f64>>),
    AggregateOfAggregateOfString(Vec<Vec<String>>),
    AggregateOfAggregateOfBinary(Vec<Vec<BitString>>),
    AggregateOfAggregateOfInstance(Vec<Vec<InstanceRef>>),
}

impl AttributeValue {
    pub fn argument_type(&self) -> ArgumentType {
        match self {
            AttributeValue::Blank => ArgumentType::Blank,
            AttributeValue::Derived => ArgumentType::Derived,
            AttributeValue::Int(_) => ArgumentType::Int,
            AttributeValue::Bool(_) => ArgumentType::Bool,
            AttributeValue::Logical(_) => ArgumentType::Logical,
            AttributeValue::Double(_) => ArgumentType::Double,
            AttributeValue::String(_) => ArgumentType::String,
            AttributeValue::Binary(_) => ArgumentType::Binary,
            AttributeValue::Enumeration(_) => ArgumentType::Enumeration,
            AttributeValue::Instance(_) => ArgumentType::EntityInstance,
            AttributeValue::EmptyAggregate => ArgumentType::EmptyAggregate,
            AttributeValue::AggregateOfInt(_) => ArgumentType::AggregateOfInt,
            AttributeValue::AggregateOfDouble(_) => ArgumentType::AggregateOfDouble,
            AttributeValue::AggregateOfString(_) => ArgumentType::AggregateOfString,
            AttributeValue::AggregateOfBinary(_) => ArgumentType::AggregateOfBinary,
            AttributeValue::AggregateOfInstance(_) => ArgumentType::AggregateOfEntityInstance,
            AttributeValue::EmptyAggregateOfAggregate => ArgumentType::EmptyAggregateOfAggregate,
            AttributeValue::AggregateOfAggregateOfInt(_) => ArgumentType::AggregateOfAggregateOfInt,
            AttributeValue::AggregateOfAggregateOfDouble(_) => {
                ArgumentType::AggregateOfAggregateOfDouble
            }
            AttributeValue::AggregateOfAggregateOfString(_) => {
                ArgumentType::AggregateOfAggregateOfString
            }
            AttributeValue::AggregateOfAggregateOfBinary(_) => {
                ArgumentType::AggregateOfAggregateOfBinary
            }
            AttributeValue::AggregateOfAggregateOfInstance(_) => {
                ArgumentType::AggregateOfAggregateOfEntityInstance
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, AttributeValue::Blank)
    }

    /// All instances referenced by this value, in order of appearance.
    pub fn instances(&self) -> Vec<InstanceRef> {
        match self {
            AttributeValue::Instance(i) => vec![i.clone()],
            AttributeValue::AggregateOfInstance(v) => v.clone(),
            AttributeValue::AggregateOfAggregateOfInstance(v) => v.iter().flatten().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether this value holds any instance reference.
    pub fn has_instances(&self) -> bool {
        match self {
            AttributeValue::Instance(_) => true,
            AttributeValue::AggregateOfInstance(v) => !v.is_empty(),
            AttributeValue::AggregateOfAggregateOfInstance(v) => v.iter().any(|inner| !inner.is_empty()),
            _ => false,
        }
    }

    /// Replace every referenced instance through `f`, leaving non-reference values untouched.
    pub fn map_instances<F>(&self, mut f: F) -> Result<AttributeValue>
    where
        F: FnMut(&InstanceRef) -> Result<InstanceRef>,
    {
        Ok(match self {
            AttributeValue::Instance(i) => AttributeValue::Instance(f(i)?),
            AttributeValue::AggregateOfInstance(v) => {
                AttributeValue::AggregateOfInstance(v.iter().map(&mut f).collect::<Result<_>>()?)
            }
            AttributeValue::AggregateOfAggregateOfInstance(v) => {
                let mut outer = Vec::with_capacity(v.len());
                for inner in v {
                    outer.push(inner.iter().map(&mut f).collect::<Result<Vec<_>>>()?);
                }
                AttributeValue::AggregateOfAggregateOfInstance(outer)
            }
            other => other.clone(),
        })
    }

    /// Multiply real valued content by `factor` (scalars, lists and lists of lists).
    pub fn scaled(&self, factor: f64) -> AttributeValue {
        match self {
            AttributeValue::Double(d) => AttributeValue::Double(d * factor),
            AttributeValue::AggregateOfDouble(v) => {
                AttributeValue::AggregateOfDouble(v.iter().map(|d| d * factor).collect())
            }
            AttributeValue::AggregateOfAggregateOfDouble(v) => AttributeValue::AggregateOfAggregateOfDouble(
                v.iter().map(|inner| inner.iter().map(|d| d * factor).collect()).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Whether every real contained in this value is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            AttributeValue::Double(d) => d.is_finite(),
            AttributeValue::AggregateOfDouble(v) => v.iter().all(|d| d.is_finite()),
            AttributeValue::AggregateOfAggregateOfDouble(v) => v.iter().flatten().all(|d| d.is_finite()),
            _ => true,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        fn same(a: &[InstanceRef], b: &[InstanceRef]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
        }
        match (self, other) {
            (Blank, Blank) | (Derived, Derived) => true,
            (EmptyAggregate, EmptyAggregate) => true,
            (EmptyAggregateOfAggregate, EmptyAggregateOfAggregate) => true,
            (Int(a), Int(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Logical(a), Logical(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Enumeration(a), Enumeration(b)) => a == b,
            (Instance(a), Instance(b)) => Rc::ptr_eq(a, b),
            (AggregateOfInt(a), AggregateOfInt(b)) => a == b,
            (AggregateOfDouble(a), AggregateOfDouble(b)) => a == b,
            (AggregateOfString(a), AggregateOfString(b)) => a == b,
            (AggregateOfBinary(a), AggregateOfBinary(b)) => a == b,
            (AggregateOfInstance(a), AggregateOfInstance(b)) => same(a, b),
            (AggregateOfAggregateOfInt(a), AggregateOfAggregateOfInt(b)) => a == b,
            (AggregateOfAggregateOfDouble(a), AggregateOfAggregateOfDouble(b)) => a == b,
            (AggregateOfAggregateOfString(a), AggregateOfAggregateOfString(b)) => a == b,
            (AggregateOfAggregateOfBinary(a), AggregateOfAggregateOfBinary(b)) => a == b,
            (AggregateOfAggregateOfInstance(a), AggregateOfAggregateOfInstance(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same(x, y))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AttributeValue::*;
        match self {
            Blank => f.write_str("$"),
            Derived => f.write_str("*"),
            Int(i) => write!(f, "{}", i),
            Bool(b) => write!(f, "{}", b),
            Logical(l) => write!(f, "{:?}", l),
            Double(d) => write!(f, "{:?}", d),
            String(s) => write!(f, "{:?}", s),
            Binary(b) => write!(f, "\"{}\"", b.to_hex()),
            Enumeration(e) => write!(f, ".{}.", e.literal()),
            Instance(i) => write!(f, "{:?}", i),
            EmptyAggregate | EmptyAggregateOfAggregate => f.write_str("()"),
            AggregateOfInt(v) => f.debug_list().entries(v).finish(),
            AggregateOfDouble(v) => f.debug_list().entries(v).finish(),
            AggregateOfString(v) => f.debug_list().entries(v).finish(),
            AggregateOfBinary(v) => f.debug_list().entries(v.iter().map(BitString::to_hex)).finish(),
            AggregateOfInstance(v) => f.debug_list().entries(v).finish(),
            AggregateOfAggregateOfInt(v) => f.debug_list().entries(v).finish(),
            AggregateOfAggregateOfDouble(v) => f.debug_list().entries(v).finish(),
            AggregateOfAggregateOfString(v) => f.debug_list().entries(v).finish(),
            AggregateOfAggregateOfBinary(v) => f.debug_list().entries(v).finish(),
            AggregateOfAggregateOfInstance(v) => f.debug_list().entries(v).finish(),
        }
    }
}

/// Typed extraction from an attribute value.
pub trait FromAttribute: Sized {
    /// The tag `has::<Self>` checks for.
    const ARGUMENT_TYPE: ArgumentType;

    fn from_attribute(value: AttributeValue) -> Result<Self>;
}

fn mismatch<T>(expected: ArgumentType, found: &AttributeValue) -> Result<T> {
    Err(Error::TypeMismatch {
        expected: expected.to_string(),
        found: found.argument_type().to_string(),
    })
}

macro_rules! scalar_from_attribute {
    ($ty:ty, $tag:ident, $variant:ident) => {
        impl FromAttribute for $ty {
            const ARGUMENT_TYPE: ArgumentType = ArgumentType::$tag;

            fn from_attribute(value: AttributeValue) -> Result<Self> {
                match value {
                    AttributeValue::$variant(v) => Ok(v),
                    other => mismatch(Self::ARGUMENT_TYPE, &other),
                }
            }
        }

        impl From<$ty> for AttributeValue {
            fn from(value: $ty) -> Self {
                AttributeValue::$variant(value)
            }
        }
    };
}

macro_rules! aggregate_from_attribute {
    ($ty:ty, $tag:ident, $variant:ident, $empty:ident) => {
        impl FromAttribute for $ty {
            const ARGUMENT_TYPE: ArgumentType = ArgumentType::$tag;

            fn from_attribute(value: AttributeValue) -> Result<Self> {
                match value {
                    AttributeValue::$variant(v) => Ok(v),
                    AttributeValue::$empty => Ok(Vec::new()),
                    other => mismatch(Self::ARGUMENT_TYPE, &other),
                }
            }
        }

        impl From<$ty> for AttributeValue {
            fn from(value: $ty) -> Self {
                AttributeValue::$variant(value)
            }
        }
    };
}

scalar_from_attribute!(i64, Int, Int);
scalar_from_attribute!(bool, Bool, Bool);
scalar_from_attribute!(Logical, Logical, Logical);
scalar_from_attribute!(f64, Double, Double);
scalar_from_attribute!(BitString, Binary, Binary);
scalar_from_attribute!(EnumerationReference, Enumeration, Enumeration);
scalar_from_attribute!(InstanceRef, EntityInstance, Instance);

aggregate_from_attribute!(Vec<i64>, AggregateOfInt, AggregateOfInt, EmptyAggregate);
aggregate_from_attribute!(Vec<f64>, AggregateOfDouble, AggregateOfDouble, EmptyAggregate);
aggregate_from_attribute!(Vec<String>, AggregateOfString, AggregateOfString, EmptyAggregate);
aggregate_from_attribute!(Vec<BitString>, AggregateOfBinary, AggregateOfBinary, EmptyAggregate);
aggregate_from_attribute!(
    Vec<InstanceRef>,
    AggregateOfEntityInstance,
    AggregateOfInstance,
    EmptyAggregate
);
aggregate_from_attribute!(
    Vec<Vec<i64>>,
    AggregateOfAggregateOfInt,
    AggregateOfAggregateOfInt,
    EmptyAggregateOfAggregate
);
aggregate_from_attribute!(
    Vec<Vec<f64>>,
    AggregateOfAggregateOfDouble,
    AggregateOfAggregateOfDouble,
    EmptyAggregateOfAggregate
);
aggregate_from_attribute!(
    Vec<Vec<String>>,
    AggregateOfAggregateOfString,
    AggregateOfAggregateOfString,
    EmptyAggregateOfAggregate
);
aggregate_from_attribute!(
    Vec<Vec<BitString>>,
    AggregateOfAggregateOfBinary,
    AggregateOfAggregateOfBinary,
    EmptyAggregateOfAggregate
);
aggregate_from_attribute!(
    Vec<Vec<InstanceRef>>,
    AggregateOfAggregateOfEntityInstance,
    AggregateOfAggregateOfInstance,
    EmptyAggregateOfAggregate
);

// Enumeration literals read as strings as well.
impl FromAttribute for String {
    const ARGUMENT_TYPE: ArgumentType = ArgumentType::String;

    fn from_attribute(value: AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::String(s) => Ok(s),
            AttributeValue::Enumeration(e) => Ok(e.literal().to_string()),
            other => mismatch(Self::ARGUMENT_TYPE, &other),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl<T: FromAttribute> FromAttribute for Option<T> {
    const ARGUMENT_TYPE: ArgumentType = T::ARGUMENT_TYPE;

    fn from_attribute(value: AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::Blank | AttributeValue::Derived => Ok(None),
            other => T::from_attribute(other).map(Some),
        }
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttributeValue::Blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable_and_reversible() {
        assert_eq!(ArgumentType::Blank.tag(), b'A');
        assert_eq!(ArgumentType::Int.tag(), b'C');
        for ty in ArgumentType::all() {
            assert_eq!(ArgumentType::from_tag(ty.tag()), Some(*ty));
        }
        assert_eq!(ArgumentType::from_tag(b'a'), None);
    }

    #[test]
    fn test_make_aggregate_and_element() {
        assert_eq!(ArgumentType::Double.make_aggregate(), ArgumentType::AggregateOfDouble);
        assert_eq!(
            ArgumentType::AggregateOfDouble.make_aggregate(),
            ArgumentType::AggregateOfAggregateOfDouble
        );
        assert_eq!(ArgumentType::AggregateOfAggregateOfInt.element(), ArgumentType::AggregateOfInt);
        assert_eq!(ArgumentType::Bool.make_aggregate(), ArgumentType::Unknown);
    }

    #[test]
    fn test_bitstring_hex() {
        let bits = BitString::from_hex("0F0").unwrap();
        assert_eq!(bits.len(), 8);
        assert_eq!(bits.to_string(), "11110000");
        assert_eq!(bits.to_hex(), "0F0");

        let bits = BitString::from_hex("31").unwrap();
        assert_eq!(bits.to_string(), "1");
        assert_eq!(bits.to_hex(), "31");

        assert!(BitString::from_hex("4A").is_err());
        assert!(BitString::from_hex("0G").is_err());
        assert!(BitString::from_hex("").is_err());
    }

    #[test]
    fn test_bitstring_from_str() {
        let bits: BitString = "101".parse().unwrap();
        assert_eq!(bits.bits(), &[true, false, true]);
        assert_eq!(bits.to_hex(), "15");
        assert!("102".parse::<BitString>().is_err());
    }

    #[test]
    fn test_typed_extraction() {
        assert_eq!(i64::from_attribute(AttributeValue::Int(3)).unwrap(), 3);
        assert!(f64::from_attribute(AttributeValue::Int(3)).is_err());
        assert_eq!(
            Vec::<f64>::from_attribute(AttributeValue::EmptyAggregate).unwrap(),
            Vec::<f64>::new()
        );
        assert_eq!(Option::<i64>::from_attribute(AttributeValue::Blank).unwrap(), None);

        let e = EnumerationReference::new(4, 1, Arc::from("METRE"));
        assert_eq!(String::from_attribute(AttributeValue::Enumeration(e)).unwrap(), "METRE");
    }

    #[test]
    fn test_scaling_and_finiteness() {
        let v = AttributeValue::AggregateOfAggregateOfDouble(vec![vec![1.0, 2.0]]);
        assert_eq!(
            v.scaled(1000.0),
            AttributeValue::AggregateOfAggregateOfDouble(vec![vec![1000.0, 2000.0]])
        );
        assert_eq!(AttributeValue::Int(2).scaled(10.0), AttributeValue::Int(2));
        assert!(!AttributeValue::AggregateOfDouble(vec![1.0, f64::NAN]).is_finite());
        assert!(AttributeValue::String("x".into()).is_finite());
    }
}
