//! Byte encoding of attribute values for persistent records
//!
//! A record starts with the [`ArgumentType::tag`] byte. Payloads are little
//! endian. Instance references are `i` + u32 id (entities) or `t` + u64
//! identity (defined-type instances). Aggregates carry a u32 element count;
//! string and binary elements carry a u32 byte length.

use crate::instance::InstanceRef;
use crate::schema::Schema;
use crate::value::{ArgumentType, AttributeValue, BitString, EnumerationReference, Logical};
use crate::{Error, Result};

/// Persistent address of a referenced instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordRef {
    Entity(u32),
    Type(u64),
}

const ENTITY_REF: u8 = b'i';
const TYPE_REF: u8 = b't';

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::CorruptRecord(format!("Length {} does not fit a record", len)))?;
    push_u32(out, len);
    Ok(())
}

fn push_ref(out: &mut Vec<u8>, record: RecordRef) {
    match record {
        RecordRef::Entity(id) => {
            out.push(ENTITY_REF);
            push_u32(out, id);
        }
        RecordRef::Type(identity) => {
            out.push(TYPE_REF);
            out.extend_from_slice(&identity.to_le_bytes());
        }
    }
}

fn push_bits(out: &mut Vec<u8>, bits: &BitString) {
    out.extend(bits.bits().iter().map(|b| if *b { b'1' } else { b'0' }));
}

fn push_list<T>(
    out: &mut Vec<u8>,
    items: &[T],
    mut each: impl FnMut(&mut Vec<u8>, &T) -> Result<()>,
) -> Result<()> {
    push_len(out, items.len())?;
    for item in items {
        each(out, item)?;
    }
    Ok(())
}

fn push_string_element(out: &mut Vec<u8>, s: &String) -> Result<()> {
    push_len(out, s.len())?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn push_binary_element(out: &mut Vec<u8>, b: &BitString) -> Result<()> {
    push_len(out, b.len())?;
    push_bits(out, b);
    Ok(())
}

/// Encode a value. Instances are translated through `reference`.
pub fn encode<F>(value: &AttributeValue, mut reference: F) -> Result<Vec<u8>>
where
    F: FnMut(&InstanceRef) -> Result<RecordRef>,
{
    use AttributeValue::*;

    let mut out = vec![value.argument_type().tag()];
    match value {
        Blank | Derived | EmptyAggregate | EmptyAggregateOfAggregate => {}
        Int(i) => out.extend_from_slice(&i.to_le_bytes()),
        Bool(b) => out.push(u8::from(*b)),
        Logical(l) => out.push(l.as_u8()),
        Double(d) => out.extend_from_slice(&d.to_le_bytes()),
        String(s) => out.extend_from_slice(s.as_bytes()),
        Binary(b) => push_bits(&mut out, b),
        Enumeration(e) => {
            push_len(&mut out, e.declaration)?;
            push_len(&mut out, e.index)?;
        }
        Instance(i) => push_ref(&mut out, reference(i)?),
        AggregateOfInt(v) => push_list(&mut out, v, |o, i| {
            o.extend_from_slice(&i.to_le_bytes());
            Ok(())
        })?,
        AggregateOfDouble(v) => push_list(&mut out, v, |o, d| {
            o.extend_from_slice(&d.to_le_bytes());
            Ok(())
        })?,
        AggregateOfString(v) => push_list(&mut out, v, push_string_element)?,
        AggregateOfBinary(v) => push_list(&mut out, v, push_binary_element)?,
        AggregateOfInstance(v) => push_list(&mut out, v, |o, i| {
            push_ref(o, reference(i)?);
            Ok(())
        })?,
        AggregateOfAggregateOfInt(v) => push_list(&mut out, v, |o, inner| {
            push_list(o, inner, |o, i| {
                o.extend_from_slice(&i.to_le_bytes());
                Ok(())
            })
        })?,
        AggregateOfAggregateOfDouble(v) => push_list(&mut out, v, |o, inner| {
            push_list(o, inner, |o, d| {
                o.extend_from_slice(&d.to_le_bytes());
                Ok(())
            })
        })?,
        AggregateOfAggregateOfString(v) => {
            push_list(&mut out, v, |o, inner| push_list(o, inner, push_string_element))?
        }
        AggregateOfAggregateOfBinary(v) => {
            push_list(&mut out, v, |o, inner| push_list(o, inner, push_binary_element))?
        }
        AggregateOfAggregateOfInstance(v) => push_list(&mut out, v, |o, inner| {
            push_list(o, inner, |o, i| {
                push_ref(o, reference(i)?);
                Ok(())
            })
        })?,
    }
    Ok(out)
}

/// Encode an unresolved reference by raw record address.
pub fn encode_reference(record: RecordRef) -> Vec<u8> {
    let mut out = vec![ArgumentType::EntityInstance.tag()];
    push_ref(&mut out, record);
    out
}

pub fn encode_reference_list(records: &[RecordRef]) -> Vec<u8> {
    let mut out = vec![ArgumentType::AggregateOfEntityInstance.tag()];
    push_u32(&mut out, records.len() as u32);
    for r in records {
        push_ref(&mut out, *r);
    }
    out
}

pub fn encode_reference_lists(records: &[Vec<RecordRef>]) -> Vec<u8> {
    let mut out = vec![ArgumentType::AggregateOfAggregateOfEntityInstance.tag()];
    push_u32(&mut out, records.len() as u32);
    for inner in records {
        push_u32(&mut out, inner.len() as u32);
        for r in inner {
            push_ref(&mut out, *r);
        }
    }
    out
}

/// Type tag of an encoded value without decoding its payload.
pub fn decode_tag(bytes: &[u8]) -> Result<ArgumentType> {
    bytes
        .first()
        .and_then(|t| ArgumentType::from_tag(*t))
        .ok_or_else(|| Error::CorruptRecord("Missing or invalid type tag".to_string()))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| Error::CorruptRecord(format!("Record truncated at byte {}", self.pos)))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos.min(self.bytes.len())..];
        self.pos = self.bytes.len();
        rest
    }

    fn reference(&mut self) -> Result<RecordRef> {
        match self.u8()? {
            ENTITY_REF => Ok(RecordRef::Entity(self.u32()?)),
            TYPE_REF => Ok(RecordRef::Type(u64::from_le_bytes(self.array()?))),
            other => Err(Error::CorruptRecord(format!("Invalid reference marker {:#04x}", other))),
        }
    }

    fn string(&mut self, len: usize) -> Result<String> {
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|e| Error::CorruptRecord(format!("Invalid UTF-8 in string record: {}", e)))
    }

    fn bits(&mut self, len: usize) -> Result<BitString> {
        bits_from(self.take(len)?)
    }

    fn list<T>(&mut self, mut each: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let n = self.len()?;
        let mut out = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            out.push(each(self)?);
        }
        Ok(out)
    }
}

fn bits_from(bytes: &[u8]) -> Result<BitString> {
    bytes
        .iter()
        .map(|b| match b {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(Error::CorruptRecord(format!("Invalid bit {:#04x}", other))),
        })
        .collect::<Result<Vec<_>>>()
        .map(BitString::new)
}

/// Decode a record. Enumeration literals are looked up in `schema`, instance
/// references are materialized through `resolve`.
pub fn decode<F>(bytes: &[u8], schema: &Schema, mut resolve: F) -> Result<AttributeValue>
where
    F: FnMut(RecordRef) -> Result<InstanceRef>,
{
    use ArgumentType as T;

    let tag = decode_tag(bytes)?;
    let mut r = Reader { bytes, pos: 1 };
    Ok(match tag {
        T::Blank | T::Unknown => AttributeValue::Blank,
        T::Derived => AttributeValue::Derived,
        T::EmptyAggregate => AttributeValue::EmptyAggregate,
        T::EmptyAggregateOfAggregate => AttributeValue::EmptyAggregateOfAggregate,
        T::Int => AttributeValue::Int(r.i64()?),
        T::Bool => AttributeValue::Bool(r.u8()? != 0),
        T::Logical => {
            let raw = r.u8()?;
            AttributeValue::Logical(
                Logical::from_u8(raw)
                    .ok_or_else(|| Error::CorruptRecord(format!("Invalid logical {}", raw)))?,
            )
        }
        T::Double => AttributeValue::Double(r.f64()?),
        T::String => {
            let rest = r.rest();
            AttributeValue::String(
                String::from_utf8(rest.to_vec())
                    .map_err(|e| Error::CorruptRecord(format!("Invalid UTF-8 in string record: {}", e)))?,
            )
        }
        T::Binary => AttributeValue::Binary(bits_from(r.rest())?),
        T::Enumeration => {
            let declaration = r.len()?;
            let index = r.len()?;
            let literal = schema
                .get(declaration)
                .and_then(|d| d.as_enumeration())
                .and_then(|e| e.items().get(index))
                .cloned()
                .ok_or_else(|| {
                    Error::CorruptRecord(format!(
                        "Enumeration literal {} of declaration {} not in schema {}",
                        index,
                        declaration,
                        schema.name()
                    ))
                })?;
            AttributeValue::Enumeration(EnumerationReference::new(declaration, index, literal))
        }
        T::EntityInstance => AttributeValue::Instance(resolve(r.reference()?)?),
        T::AggregateOfInt => AttributeValue::AggregateOfInt(r.list(|r| r.i64())?),
        T::AggregateOfDouble => AttributeValue::AggregateOfDouble(r.list(|r| r.f64())?),
        T::AggregateOfString => AttributeValue::AggregateOfString(r.list(|r| {
            let n = r.len()?;
            r.string(n)
        })?),
        T::AggregateOfBinary => AttributeValue::AggregateOfBinary(r.list(|r| {
            let n = r.len()?;
            r.bits(n)
        })?),
        T::AggregateOfEntityInstance => {
            let refs = r.list(|r| r.reference())?;
            AttributeValue::AggregateOfInstance(refs.into_iter().map(&mut resolve).collect::<Result<_>>()?)
        }
        T::AggregateOfAggregateOfInt => {
            AttributeValue::AggregateOfAggregateOfInt(r.list(|r| r.list(|r| r.i64()))?)
        }
        T::AggregateOfAggregateOfDouble => {
            AttributeValue::AggregateOfAggregateOfDouble(r.list(|r| r.list(|r| r.f64()))?)
        }
        T::AggregateOfAggregateOfString => AttributeValue::AggregateOfAggregateOfString(r.list(|r| {
            r.list(|r| {
                let n = r.len()?;
                r.string(n)
            })
        })?),
        T::AggregateOfAggregateOfBinary => AttributeValue::AggregateOfAggregateOfBinary(r.list(|r| {
            r.list(|r| {
                let n = r.len()?;
                r.bits(n)
            })
        })?),
        T::AggregateOfAggregateOfEntityInstance => {
            let refs = r.list(|r| r.list(|r| r.reference()))?;
            let mut outer = Vec::with_capacity(refs.len());
            for inner in refs {
                outer.push(inner.into_iter().map(&mut resolve).collect::<Result<Vec<_>>>()?);
            }
            AttributeValue::AggregateOfAggregateOfInstance(outer)
        }
    })
}

/// Record addresses held by an encoded value, without materializing them.
pub fn decode_references(bytes: &[u8]) -> Result<Vec<RecordRef>> {
    let mut r = Reader { bytes, pos: 1 };
    Ok(match decode_tag(bytes)? {
        ArgumentType::EntityInstance => vec![r.reference()?],
        ArgumentType::AggregateOfEntityInstance => r.list(|r| r.reference())?,
        ArgumentType::AggregateOfAggregateOfEntityInstance => {
            r.list(|r| r.list(|r| r.reference()))?.into_iter().flatten().collect()
        }
        _ => Vec::new(),
    })
}

/// Concatenated little-endian u32s, the layout merged index records use.
pub fn encode_ids(ids: &[u32]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

pub fn decode_ids(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::CorruptRecord(format!(
            "Id list of {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn encode_identity(identity: u64) -> Vec<u8> {
    identity.to_le_bytes().to_vec()
}

pub fn decode_identity(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::CorruptRecord(format!("Identity record of {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::demo::demo_schema;

    fn no_refs(_: &InstanceRef) -> Result<RecordRef> {
        Err(Error::UnmappedInstance(0))
    }

    fn no_resolve(r: RecordRef) -> Result<InstanceRef> {
        Err(Error::CorruptRecord(format!("unexpected {:?}", r)))
    }

    #[test]
    fn test_scalar_layout() {
        let bytes = encode(&AttributeValue::Int(-2), no_refs).unwrap();
        assert_eq!(bytes[0], ArgumentType::Int.tag());
        assert_eq!(&bytes[1..], &(-2i64).to_le_bytes());

        let bytes = encode(&AttributeValue::String("Wall".into()), no_refs).unwrap();
        assert_eq!(&bytes[1..], b"Wall");

        let bits: BitString = "101".parse().unwrap();
        let bytes = encode(&AttributeValue::Binary(bits), no_refs).unwrap();
        assert_eq!(&bytes[1..], b"101");
    }

    #[test]
    fn test_nested_values_decode() {
        let schema = demo_schema().unwrap();
        let values = vec![
            AttributeValue::Logical(Logical::Unknown),
            AttributeValue::AggregateOfString(vec!["a".into(), "".into(), "bc".into()]),
            AttributeValue::AggregateOfAggregateOfDouble(vec![vec![0.5, 1.0], vec![]]),
            AttributeValue::AggregateOfAggregateOfBinary(vec![vec!["10".parse().unwrap()]]),
            AttributeValue::EmptyAggregateOfAggregate,
            AttributeValue::Derived,
        ];
        for value in values {
            let bytes = encode(&value, no_refs).unwrap();
            assert_eq!(decode(&bytes, &schema, no_resolve).unwrap(), value);
        }
    }

    #[test]
    fn test_enumeration_uses_schema_literal() {
        let schema = demo_schema().unwrap();
        let decl = schema.declaration_by_name("IfcUnitEnum").unwrap();
        let index = decl.as_enumeration().unwrap().index_of("LENGTHUNIT").unwrap();
        let literal = decl.as_enumeration().unwrap().items()[index].clone();
        let value = AttributeValue::Enumeration(EnumerationReference::new(
            decl.index_in_schema(),
            index,
            literal,
        ));

        let bytes = encode(&value, no_refs).unwrap();
        match decode(&bytes, &schema, no_resolve).unwrap() {
            AttributeValue::Enumeration(e) => assert_eq!(e.literal(), "LENGTHUNIT"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reference_records() {
        let bytes = encode_reference_lists(&[
            vec![RecordRef::Entity(3), RecordRef::Type(99)],
            vec![RecordRef::Entity(4)],
        ]);
        assert_eq!(decode_tag(&bytes).unwrap(), ArgumentType::AggregateOfAggregateOfEntityInstance);
        assert_eq!(
            decode_references(&bytes).unwrap(),
            vec![RecordRef::Entity(3), RecordRef::Type(99), RecordRef::Entity(4)]
        );
        assert_eq!(
            decode_references(&encode_reference(RecordRef::Entity(7))).unwrap(),
            vec![RecordRef::Entity(7)]
        );
        assert_eq!(
            decode_references(&encode_reference_list(&[RecordRef::Entity(1)])).unwrap(),
            vec![RecordRef::Entity(1)]
        );
    }

    #[test]
    fn test_id_lists() {
        let bytes = encode_ids(&[1, 70000]);
        assert_eq!(decode_ids(&bytes).unwrap(), vec![1, 70000]);
        assert!(decode_ids(&bytes[..5]).is_err());
        assert_eq!(decode_identity(&encode_identity(42)).unwrap(), 42);
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let schema = demo_schema().unwrap();
        let bytes = encode(&AttributeValue::AggregateOfInt(vec![1, 2]), no_refs).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1], &schema, no_resolve),
            Err(Error::CorruptRecord(_))
        ));
        assert!(decode_tag(&[]).is_err());
    }
}
