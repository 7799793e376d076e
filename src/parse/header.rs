//! Header section reader
//!
//! Expects `ISO-10303-21;` and `HEADER;`, then `FILE_DESCRIPTION`,
//! `FILE_NAME` and `FILE_SCHEMA` in that order, then `ENDSEC;` and `DATA;`.
//! Leaves the lexer positioned at the first data record.

use super::context::InstanceBuilder;
use super::lexer::{Lexer, TokenKind};
use crate::instance::{Instance, InstanceRef};
use crate::schema::header::{FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA};
use crate::schema::Schema;
use crate::store::Header;
use crate::{Error, Result};
use std::sync::Arc;

pub const MAGIC: &str = "ISO-10303-21";

const RECORDS: [&str; 3] = [FILE_DESCRIPTION, FILE_NAME, FILE_SCHEMA];

fn expect_keyword(lexer: &mut Lexer<'_>, expected: &str) -> Result<()> {
    let token = lexer.next_token()?;
    let found = if token.is_keyword() { lexer.keyword(&token)? } else { lexer.text(&token) };
    if found != expected {
        return Err(Error::NoHeader(format!(
            "Expected {} at offset {}, found '{}'",
            expected, token.start, found
        )));
    }
    expect_operator(lexer, b';')
}

fn expect_operator(lexer: &mut Lexer<'_>, op: u8) -> Result<()> {
    let token = lexer.next_token()?;
    if !token.is_operator(op) {
        return Err(Error::NoHeader(format!(
            "Expected '{}' at offset {}",
            char::from(op),
            token.start
        )));
    }
    Ok(())
}

/// Read one `KEYWORD(...);` record of the header schema.
fn read_record(lexer: &mut Lexer<'_>, schema: &Arc<Schema>, name: &str) -> Result<InstanceRef> {
    let decl = schema.declaration_by_name(name)?;
    let mut pending = Vec::new();
    let mut builder = InstanceBuilder::new(lexer, schema);
    let context = builder.read_arguments(0, &mut pending)?;
    let storage = builder.construct(context, decl, 0, true, &mut pending)?;
    if !pending.is_empty() {
        tracing::warn!("Ignoring instance references in header record {}", name);
    }
    expect_operator(lexer, b';')?;
    Ok(Instance::from_storage(schema.clone(), decl.index_in_schema(), storage))
}

/// Skip an unexpected record up to its terminating `;`.
fn skip_record(lexer: &mut Lexer<'_>) -> Result<()> {
    loop {
        let token = lexer.next_token()?;
        match token.kind {
            TokenKind::None => return Err(Error::UnexpectedEof(token.start)),
            TokenKind::Operator(b';') => return Ok(()),
            _ => {}
        }
    }
}

/// Read the header section with the header schema `schema`.
pub fn read_header(lexer: &mut Lexer<'_>, schema: &Arc<Schema>) -> Result<Header> {
    read_sections(lexer, schema).map_err(|e| match e {
        Error::NoHeader(_) => e,
        other => Error::NoHeader(other.to_string()),
    })
}

fn read_sections(lexer: &mut Lexer<'_>, schema: &Arc<Schema>) -> Result<Header> {
    expect_keyword(lexer, MAGIC)?;
    expect_keyword(lexer, "HEADER")?;

    let mut records: Vec<InstanceRef> = Vec::with_capacity(RECORDS.len());
    loop {
        let token = lexer.next_token()?;
        if !token.is_keyword() {
            return Err(Error::NoHeader(format!("Expected header record at offset {}", token.start)));
        }
        let keyword = lexer.keyword(&token)?;
        if keyword == "ENDSEC" {
            expect_operator(lexer, b';')?;
            break;
        }

        expect_operator(lexer, b'(')?;
        match RECORDS.get(records.len()) {
            Some(expected) if keyword == *expected => {
                records.push(read_record(lexer, schema, expected)?);
            }
            Some(expected) => {
                return Err(Error::NoHeader(format!(
                    "Expected {} at offset {}, found {}",
                    expected, token.start, keyword
                )));
            }
            None => {
                tracing::warn!("Skipping additional header record {} at offset {}", keyword, token.start);
                skip_record(lexer)?;
            }
        }
    }

    expect_keyword(lexer, "DATA")?;

    let mut records = records.into_iter();
    match (records.next(), records.next(), records.next()) {
        (Some(description), Some(name), Some(file_schema)) => {
            Ok(Header::from_records(description, name, file_schema))
        }
        _ => Err(Error::NoHeader("Incomplete header section".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::header::header_schema;

    const HEADER: &str = "ISO-10303-21;\nHEADER;\n\
        FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n\
        FILE_NAME('wall.ifc','2024-01-01T00:00:00',('me'),('org'),'pre','sys','');\n\
        FILE_SCHEMA(('IFC_DEMO'));\n\
        ENDSEC;\nDATA;\n#1=IFCWALL('g',$,$,$,$,$,$);";

    #[test]
    fn test_read_header() {
        let schema = header_schema().unwrap();
        let mut lexer = Lexer::new(HEADER.as_bytes());
        let header = read_header(&mut lexer, &schema).unwrap();

        assert_eq!(header.schema_name().unwrap().as_deref(), Some("IFC_DEMO"));
        assert_eq!(header.name().unwrap().as_deref(), Some("wall.ifc"));
        assert_eq!(header.implementation_level().unwrap().as_deref(), Some("2;1"));
        assert_eq!(header.organization().unwrap(), vec!["org".to_string()]);

        // Positioned at the first data record.
        let token = lexer.next_token().unwrap();
        assert_eq!(token.identifier(), Some(1));
    }

    #[test]
    fn test_missing_magic() {
        let schema = header_schema().unwrap();
        let mut lexer = Lexer::new(b"HEADER;\nENDSEC;\nDATA;\n");
        assert!(matches!(read_header(&mut lexer, &schema), Err(Error::NoHeader(_))));
    }

    #[test]
    fn test_records_out_of_order() {
        let schema = header_schema().unwrap();
        let text = "ISO-10303-21;HEADER;FILE_SCHEMA(('IFC_DEMO'));ENDSEC;DATA;";
        let mut lexer = Lexer::new(text.as_bytes());
        assert!(matches!(read_header(&mut lexer, &schema), Err(Error::NoHeader(_))));
    }

    #[test]
    fn test_extra_record_is_skipped() {
        let schema = header_schema().unwrap();
        let text = "ISO-10303-21;HEADER;FILE_DESCRIPTION((''),'2;1');\
            FILE_NAME('','',(''),(''),'','','');FILE_SCHEMA(('IFC_DEMO'));\
            FILE_POPULATION('x');ENDSEC;DATA;";
        let mut lexer = Lexer::new(text.as_bytes());
        let header = read_header(&mut lexer, &schema).unwrap();
        assert_eq!(header.schema_identifiers().unwrap(), vec!["IFC_DEMO".to_string()]);
    }
}
