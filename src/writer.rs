//! Serialization back to the exchange format

use crate::instance::{Instance, InstanceRef};
use crate::parse::decoder;
use crate::store::Store;
use crate::value::{AttributeValue, Logical};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

/// A real with a mandatory decimal point and an upper-case exponent.
pub fn format_real(value: f64) -> String {
    let text = format!("{:?}", value);
    let (mantissa, exponent) = match text.split_once('e') {
        Some((m, e)) => (m.to_string(), Some(e.to_string())),
        None => (text, None),
    };
    let mut out = if mantissa.contains('.') {
        mantissa
    } else {
        format!("{}.", mantissa)
    };
    if let Some(exponent) = exponent {
        out.push('E');
        out.push_str(&exponent);
    }
    out
}

fn logical(value: Logical) -> &'static str {
    match value {
        Logical::True => ".T.",
        Logical::False => ".F.",
        Logical::Unknown => ".U.",
    }
}

fn list<I: IntoIterator>(
    out: &mut String,
    items: I,
    mut item: impl FnMut(&mut String, I::Item) -> Result<()>,
) -> Result<()> {
    out.push('(');
    for (i, value) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        item(out, value)?;
    }
    out.push(')');
    Ok(())
}

fn reference(out: &mut String, instance: &InstanceRef) -> Result<()> {
    if instance.is_entity() {
        let _ = write!(out, "#{}", instance.id());
        return Ok(());
    }
    out.push_str(&instance.declaration().name_uppercase());
    out.push('(');
    value(out, &instance.get(0)?)?;
    out.push(')');
    Ok(())
}

fn value(out: &mut String, v: &AttributeValue) -> Result<()> {
    match v {
        AttributeValue::Blank => out.push('$'),
        AttributeValue::Derived => out.push('*'),
        AttributeValue::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        AttributeValue::Bool(b) => out.push_str(if *b { ".T." } else { ".F." }),
        AttributeValue::Logical(l) => out.push_str(logical(*l)),
        AttributeValue::Double(d) => out.push_str(&format_real(*d)),
        AttributeValue::String(s) => out.push_str(&decoder::encode(s)),
        AttributeValue::Binary(b) => {
            let _ = write!(out, "\"{}\"", b.to_hex());
        }
        AttributeValue::Enumeration(e) => {
            let _ = write!(out, ".{}.", e.literal());
        }
        AttributeValue::Instance(i) => reference(out, i)?,
        AttributeValue::EmptyAggregate | AttributeValue::EmptyAggregateOfAggregate => out.push_str("()"),
        AttributeValue::AggregateOfInt(items) => list(out, items, |o, i| {
            let _ = write!(o, "{}", i);
            Ok(())
        })?,
        AttributeValue::AggregateOfDouble(items) => list(out, items, |o, d| {
            o.push_str(&format_real(*d));
            Ok(())
        })?,
        AttributeValue::AggregateOfString(items) => list(out, items, |o, s| {
            o.push_str(&decoder::encode(s));
            Ok(())
        })?,
        AttributeValue::AggregateOfBinary(items) => list(out, items, |o, b| {
            let _ = write!(o, "\"{}\"", b.to_hex());
            Ok(())
        })?,
        AttributeValue::AggregateOfInstance(items) => list(out, items, reference)?,
        AttributeValue::AggregateOfAggregateOfInt(lists) => list(out, lists, |o, l| {
            value(o, &AttributeValue::AggregateOfInt(l.clone()))
        })?,
        AttributeValue::AggregateOfAggregateOfDouble(lists) => list(out, lists, |o, l| {
            value(o, &AttributeValue::AggregateOfDouble(l.clone()))
        })?,
        AttributeValue::AggregateOfAggregateOfString(lists) => list(out, lists, |o, l| {
            value(o, &AttributeValue::AggregateOfString(l.clone()))
        })?,
        AttributeValue::AggregateOfAggregateOfBinary(lists) => list(out, lists, |o, l| {
            value(o, &AttributeValue::AggregateOfBinary(l.clone()))
        })?,
        AttributeValue::AggregateOfAggregateOfInstance(lists) => {
            list(out, lists, |o, l| list(o, l, reference))?
        }
    }
    Ok(())
}

impl Instance {
    /// Parenthesized argument list; blank derived slots render as `*`.
    fn arguments(&self, out: &mut String) -> Result<()> {
        let entity = self.declaration().as_entity();
        out.push('(');
        for (slot, v) in self.values()?.iter().enumerate() {
            if slot > 0 {
                out.push(',');
            }
            if v.is_blank() && entity.is_some_and(|e| e.is_derived(slot)) {
                out.push('*');
            } else {
                value(out, v)?;
            }
        }
        out.push(')');
        Ok(())
    }

    /// The record as it appears in a file: `#12=IFCWALL(...)` for an
    /// entity, `IFCLABEL('x')` for a defined-type instance. Header records
    /// render without id.
    pub fn to_spf(&self) -> Result<String> {
        let mut out = String::new();
        let name = self.declaration().name_uppercase();
        if self.is_entity() && self.id() != 0 {
            let _ = write!(out, "#{}={}", self.id(), name);
            self.arguments(&mut out)?;
        } else if self.is_entity() {
            out.push_str(&name);
            self.arguments(&mut out)?;
        } else {
            out.push_str(&name);
            out.push('(');
            value(&mut out, &self.get(0)?)?;
            out.push(')');
        }
        Ok(out)
    }
}

impl Store {
    /// Write the whole model, entities sorted by id.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "ISO-10303-21;")?;
        writeln!(out, "HEADER;")?;
        for record in self.header().records() {
            writeln!(out, "{};", record.to_spf()?)?;
        }
        writeln!(out, "ENDSEC;")?;
        writeln!(out, "DATA;")?;
        let mut written = 0usize;
        for instance in self.instances()? {
            writeln!(out, "{};", instance.to_spf()?)?;
            written += 1;
        }
        writeln!(out, "ENDSEC;")?;
        writeln!(out, "END-ISO-10303-21;")?;
        tracing::debug!("Wrote {} instances", written);
        Ok(())
    }

    pub fn to_spf_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Entities ordered so that every referenced entity precedes its referrers.
    pub fn topological_order(&self) -> Result<Vec<InstanceRef>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Open,
            Done,
        }

        fn targets(instance: &InstanceRef) -> Result<Vec<InstanceRef>> {
            let mut found = Vec::new();
            let mut pending = instance.values()?;
            while let Some(v) = pending.pop() {
                for child in v.instances() {
                    if child.is_entity() {
                        found.push(child);
                    } else {
                        pending.extend(child.values()?);
                    }
                }
            }
            found.sort_by_key(|i| i.id());
            Ok(found)
        }

        let mut marks: HashMap<u32, Mark> = HashMap::new();
        let mut order = Vec::new();
        for root in self.instances()? {
            if marks.contains_key(&root.id()) {
                continue;
            }
            // Explicit stack of (instance, children still to visit)
            let mut stack: Vec<(InstanceRef, Vec<InstanceRef>)> = Vec::new();
            marks.insert(root.id(), Mark::Open);
            let mut children = targets(&root)?;
            children.reverse();
            stack.push((root, children));

            while let Some((_, children)) = stack.last_mut() {
                match children.pop() {
                    Some(child) => match marks.get(&child.id()) {
                        Some(Mark::Done) => {}
                        Some(Mark::Open) => return Err(Error::CyclicDependency(child.id())),
                        None => {
                            marks.insert(child.id(), Mark::Open);
                            let mut next = targets(&child)?;
                            next.reverse();
                            stack.push((child, next));
                        }
                    },
                    None => {
                        if let Some((done, _)) = stack.pop() {
                            marks.insert(done.id(), Mark::Done);
                            order.push(done);
                        }
                    }
                }
            }
        }
        Ok(order)
    }
}
