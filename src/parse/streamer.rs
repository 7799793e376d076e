//! Record-at-a-time reader over the data section
//!
//! The streamer keeps no decoded record after handing it out. References to
//! other records travel with each record as [`PendingReference`]s; the
//! consumer decides how to resolve them.

use super::context::{InstanceBuilder, PendingReference};
use super::header::read_header;
use super::lexer::{Lexer, Token, TokenKind};
use super::{FileStatus, LoadOptions};
use crate::schema::{Schema, SchemaRegistry};
use crate::storage::InMemoryStorage;
use crate::store::Header;
use crate::{Error, Result};
use std::sync::Arc;

/// One decoded `#id=NAME(...);` record.
#[derive(Debug)]
pub struct StreamedRecord {
    pub id: u32,
    /// `index_in_schema` of the entity declaration
    pub declaration: usize,
    pub attributes: InMemoryStorage,
    pub references: Vec<PendingReference>,
}

pub struct InstanceStreamer<'d> {
    lexer: Lexer<'d>,
    schema: Arc<Schema>,
    header: Header,
    options: LoadOptions,
    status: FileStatus,
    parsed: usize,
    finished: bool,
}

impl<'d> InstanceStreamer<'d> {
    /// Read the header of `data` and pick its schema from `registry`.
    pub fn new(data: &'d [u8], registry: &SchemaRegistry, options: LoadOptions) -> Result<Self> {
        let mut lexer = Lexer::new(data);
        let header = read_header(&mut lexer, &registry.header_schema())?;
        let name = header
            .schema_name()?
            .ok_or_else(|| Error::NoHeader("FILE_SCHEMA names no schema".to_string()))?;
        let schema = registry.get(&name)?;
        tracing::debug!("Reading data section with schema {}", schema.name());

        Ok(Self {
            lexer,
            schema,
            header,
            options,
            status: FileStatus::Success,
            parsed: 0,
            finished: false,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    /// Records handed out so far.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    /// Byte offset of the cursor.
    pub fn offset(&self) -> usize {
        self.lexer.offset()
    }

    pub fn len(&self) -> usize {
        self.lexer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexer.is_empty()
    }

    fn fail(&mut self, error: Error) -> Error {
        self.status = FileStatus::InvalidSyntax;
        self.finished = true;
        error
    }

    fn next_token(&mut self) -> Result<Token> {
        self.lexer.next_token().map_err(|e| self.fail(e))
    }

    fn skip_to_semicolon(&mut self) -> Result<()> {
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::None => return Err(self.fail(Error::UnexpectedEof(token.start))),
                TokenKind::Operator(b';') => return Ok(()),
                _ => {}
            }
        }
    }

    /// Next data record, or `None` at `ENDSEC` / end of input.
    ///
    /// Malformed records are logged and skipped. An error is returned only
    /// when the input cannot be tokenized any further.
    pub fn read_record(&mut self) -> Result<Option<StreamedRecord>> {
        while !self.finished {
            let token = self.next_token()?;
            let id = match token.kind {
                TokenKind::None => {
                    self.finished = true;
                    break;
                }
                TokenKind::Identifier(id) => id,
                TokenKind::Keyword => {
                    let keyword = self.lexer.keyword(&token)?;
                    if keyword == "ENDSEC" {
                        self.finished = true;
                        break;
                    }
                    tracing::error!("Unexpected keyword {} at offset {}", keyword, token.start);
                    self.skip_to_semicolon()?;
                    continue;
                }
                _ => {
                    tracing::error!("Unexpected token at offset {}", token.start);
                    self.skip_to_semicolon()?;
                    continue;
                }
            };

            let eq = self.next_token()?;
            if !eq.is_operator(b'=') {
                tracing::error!("Expected '=' after #{} at offset {}", id, eq.start);
                self.skip_to_semicolon()?;
                continue;
            }

            let name_token = self.next_token()?;
            if name_token.is_operator(b'(') {
                tracing::error!("Complex instance #{} is not supported, skipping", id);
                self.skip_to_semicolon()?;
                continue;
            }
            let name = self.lexer.keyword(&name_token).unwrap_or_default();
            let declaration = match self.schema.find(&name) {
                Some(decl) if decl.is_entity() => decl.index_in_schema(),
                _ => {
                    tracing::error!(
                        "Unknown entity type '{}' for instance #{} at offset {}",
                        name,
                        id,
                        name_token.start
                    );
                    self.skip_to_semicolon()?;
                    continue;
                }
            };

            let open = self.next_token()?;
            if !open.is_operator(b'(') {
                tracing::error!("Expected '(' for instance #{} at offset {}", id, open.start);
                self.skip_to_semicolon()?;
                continue;
            }

            match self.read_arguments(id, declaration) {
                Ok(record) => {
                    let close = self.next_token()?;
                    if !close.is_operator(b';') {
                        tracing::warn!("Missing ';' after instance #{} at offset {}", id, close.start);
                        self.lexer.seek(close.start);
                    }
                    self.parsed += 1;
                    let interval = self.options.progress_interval;
                    if interval > 0 && self.parsed % interval == 0 {
                        tracing::debug!("Parsed {} instances", self.parsed);
                    }
                    return Ok(Some(record));
                }
                // The list was cut short by a ';', which ends the record.
                Err(e @ Error::InvalidToken { .. }) => {
                    tracing::error!("Skipping instance #{}: {}", id, e);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(None)
    }

    fn read_arguments(&mut self, id: u32, declaration: usize) -> Result<StreamedRecord> {
        let decl = self.schema.declaration(declaration);
        let mut references = Vec::new();
        let mut builder = InstanceBuilder::new(&mut self.lexer, &self.schema);
        let context = builder.read_arguments(id, &mut references)?;
        let attributes = builder.construct(
            context,
            decl,
            id,
            self.options.coerce_attribute_count,
            &mut references,
        )?;
        Ok(StreamedRecord { id, declaration, attributes, references })
    }
}

impl Iterator for InstanceStreamer<'_> {
    type Item = Result<StreamedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AttributeStorage;

    fn file(data: &str) -> String {
        format!(
            "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\n\
             FILE_NAME('','',(''),(''),'','','');\nFILE_SCHEMA(('IFC_DEMO'));\nENDSEC;\n\
             DATA;\n{}\nENDSEC;\nEND-ISO-10303-21;\n",
            data
        )
    }

    #[test]
    fn test_streams_records_in_order() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let text = file("#1=IFCCARTESIANPOINT((0.,0.,0.));\n#2=IFCPOLYLINE((#1,#3));\n#3=IFCCARTESIANPOINT((1.,0.,0.));");
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();

        let first = streamer.read_record().unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(streamer.schema().declaration(first.declaration).name(), "IfcCartesianPoint");
        assert!(first.references.is_empty());

        let second = streamer.read_record().unwrap().unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.references[0].ids(), vec![1, 3]);

        assert_eq!(streamer.by_ref().count(), 1);
        assert_eq!(streamer.parsed(), 3);
        assert_eq!(streamer.status(), FileStatus::Success);
        assert!(streamer.read_record().unwrap().is_none());
    }

    #[test]
    fn test_unsupported_schema() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let text = file("").replace("IFC_DEMO", "IFC2X3");
        assert!(matches!(
            InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()),
            Err(Error::UnsupportedSchema(_))
        ));
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let text = file(
            "#1=IFCNOTHING(1);\n#2=(IFCA()IFCB());\n#3=IFCCARTESIANPOINT((1.,2.;\n#4=IFCCARTESIANPOINT((1.,2.));",
        );
        let streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();
        let records: Vec<StreamedRecord> = streamer.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 4);
        assert_eq!(records[0].attributes.get_as::<Vec<f64>>(0).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_truncated_input_is_a_syntax_error() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let text = file("").replace("ENDSEC;\nEND-ISO-10303-21;\n", "#1=IFCCARTESIANPOINT((1.,");
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, LoadOptions::default()).unwrap();
        assert!(streamer.read_record().is_err());
        assert_eq!(streamer.status(), FileStatus::InvalidSyntax);
        assert!(streamer.read_record().unwrap().is_none());
    }

    #[test]
    fn test_uncoerced_attribute_count() {
        let registry = SchemaRegistry::with_demo().unwrap();
        let text = file("#1=IFCCARTESIANPOINT((1.,2.),$);");
        let options = LoadOptions { coerce_attribute_count: false, ..LoadOptions::default() };
        let mut streamer = InstanceStreamer::new(text.as_bytes(), &registry, options).unwrap();
        let record = streamer.read_record().unwrap().unwrap();
        assert_eq!(record.attributes.size(), 2);
    }
}
