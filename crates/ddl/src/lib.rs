pub mod emit;
pub mod object;
pub mod order;
pub mod quoting;

pub use object::DdlObject;
pub use order::{DependencyGraph, OrderError};

use std::io::{self, Write};

use gpbackup_archive::Section;

/// Renders `object`, writes its statements to `writer`, and registers the
/// resulting byte range as one TOC entry. This is the single choke point
/// between the text-formatting layer (`emit`/`object`) and the archive
/// layer (`gpbackup_archive::Section`), per §4.B: "writes text into the
/// pre-data or post-data file, and registers a TOC entry whose byte range
/// spans exactly the written statements for that object."
pub fn emit_into<W: Write>(
    object: &DdlObject,
    writer: &mut W,
    section: &mut Section,
) -> Result<(), EmitError> {
    let statements = object.render();
    if statements.is_empty() {
        return Ok(());
    }
    let text = statements.concat();
    writer.write_all(text.as_bytes())?;
    section.record(object.schema(), object.name(), object.kind(), text.len() as u64)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Archive(#[from] gpbackup_archive::ArchiveError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_emit_into_writes_and_records_toc_entry() {
        let object = DdlObject::Schema("analytics".to_string());
        let mut buffer = Vec::new();
        let mut section = Section::new();

        emit_into(&object, &mut buffer, &mut section).unwrap();

        assert_eq!(buffer, b"CREATE SCHEMA analytics;\n");
        let entries = section.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_byte, 0);
        assert_eq!(entries[0].end_byte, buffer.len() as u64);
    }

    #[test]
    fn test_emit_into_skips_empty_render_without_toc_entry() {
        let sequence = gpbackup_catalog::Sequence {
            relation: gpbackup_catalog::Relation {
                schema_oid: 1,
                relation_oid: 2,
                schema_name: "public".to_string(),
                relation_name: "s".to_string(),
                kind: gpbackup_catalog::RelationKind::Sequence,
                depends_upon: vec![],
                inherits: vec![],
            },
            definition: gpbackup_catalog::SequenceDefinition {
                last_val: 1,
                increment: 1,
                max_val: 9223372036854775807,
                min_val: 1,
                cache_val: 1,
                is_cycled: false,
                is_called: false,
            },
            owning_column: None,
        };
        let object = DdlObject::SequenceOwnedBy(sequence);
        let mut buffer = Vec::new();
        let mut section = Section::new();

        emit_into(&object, &mut buffer, &mut section).unwrap();
        assert!(buffer.is_empty());
        assert!(section.into_entries().is_empty());
    }
}
