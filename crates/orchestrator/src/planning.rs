//! Restore planning: turns a resolved table set plus a TOC into the
//! ordered list of data entries a restore actually moves, per §4.D
//! "table-level ordering follows TOC order on restore."

use std::collections::BTreeSet;

use gpbackup_archive::{DataEntry, Toc};

/// Filters `toc`'s data entries down to `included` (qualified
/// `schema.name`), preserving the TOC's own ordering.
pub fn plan_restore(toc: &Toc, included: &BTreeSet<String>) -> Vec<DataEntry> {
    toc.data_entries
        .iter()
        .filter(|entry| included.contains(&format!("{}.{}", entry.schema, entry.name)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(schema: &str, name: &str, oid: u32) -> DataEntry {
        DataEntry {
            relation_oid: oid,
            schema: schema.to_string(),
            name: name.to_string(),
            single_file_range: None,
            ancestor: None,
        }
    }

    #[test]
    fn test_plan_restore_filters_and_preserves_toc_order() {
        let toc = Toc {
            data_entries: vec![
                entry("public", "foo", 1),
                entry("public", "bar", 2),
                entry("schema2", "baz", 3),
            ],
            ..Default::default()
        };
        let included: BTreeSet<String> =
            ["public.foo".to_string(), "schema2.baz".to_string()].into();

        let plan = plan_restore(&toc, &included);
        let names: Vec<&str> = plan.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "baz"]);
    }
}
