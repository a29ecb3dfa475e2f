//! Include/exclude resolution, per §4.F: "include filters and exclude
//! filters are disjoint; specifying any `include-*` implies an empty
//! universe augmented by includes, whereas `exclude-*` subtracts from the
//! full universe. For a leaf partition in a leaf-data backup, the parent
//! table is implicitly included. Conflicts ... fail with `InvalidFilter`
//! before any work begins."

use std::collections::{BTreeSet, HashMap};

use gpbackup_archive::FilterSet;

use crate::error::Error;

/// Resolves the final set of qualified table names (`schema.table`) a run
/// will touch. `leaf_partition_parents` maps a leaf partition's qualified
/// name to its parent's, and is only consulted when `leaf_partition_data`
/// is set.
pub fn resolve_tables(
    filters: &FilterSet,
    all_tables: &BTreeSet<String>,
    leaf_partition_parents: &HashMap<String, String>,
    leaf_partition_data: bool,
) -> Result<BTreeSet<String>, Error> {
    check_disjoint("schema", &filters.include_schemas, &filters.exclude_schemas)?;
    check_disjoint("table", &filters.include_tables, &filters.exclude_tables)?;

    let mut universe: BTreeSet<String> = if !filters.include_schemas.is_empty()
        || !filters.include_tables.is_empty()
    {
        let mut included: BTreeSet<String> = all_tables
            .iter()
            .filter(|t| {
                let schema = schema_of(t);
                filters.include_schemas.contains(schema)
            })
            .cloned()
            .collect();
        included.extend(
            filters
                .include_tables
                .iter()
                .filter(|t| all_tables.contains(*t))
                .cloned(),
        );
        included
    } else {
        all_tables.clone()
    };

    universe.retain(|t| {
        let schema = schema_of(t);
        !filters.exclude_schemas.contains(schema) && !filters.exclude_tables.contains(t)
    });

    if leaf_partition_data {
        let parents: Vec<String> = universe
            .iter()
            .filter_map(|t| leaf_partition_parents.get(t).cloned())
            .collect();
        universe.extend(parents);
    }

    Ok(universe)
}

fn schema_of(qualified: &str) -> &str {
    qualified.split_once('.').map(|(schema, _)| schema).unwrap_or(qualified)
}

fn check_disjoint(
    kind: &str,
    include: &BTreeSet<String>,
    exclude: &BTreeSet<String>,
) -> Result<(), Error> {
    let overlap: Vec<&String> = include.intersection(exclude).collect();
    if !overlap.is_empty() {
        return Err(Error::Config(format!(
            "InvalidFilter: {kind} name(s) in both include and exclude lists: {overlap:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn tables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_filters_returns_full_universe() {
        let all = tables(&["public.foo", "public.bar"]);
        let resolved = resolve_tables(&FilterSet::default(), &all, &HashMap::new(), false).unwrap();
        assert_eq!(resolved, all);
    }

    #[test]
    fn test_include_schema_restricts_universe() {
        let all = tables(&["public.foo", "schema2.bar"]);
        let filters = FilterSet {
            include_schemas: ["public".to_string()].into(),
            ..Default::default()
        };
        let resolved = resolve_tables(&filters, &all, &HashMap::new(), false).unwrap();
        assert_eq!(resolved, tables(&["public.foo"]));
    }

    #[test]
    fn test_exclude_table_subtracts_from_full_universe() {
        let all = tables(&["public.foo", "public.bar"]);
        let filters = FilterSet {
            exclude_tables: ["public.bar".to_string()].into(),
            ..Default::default()
        };
        let resolved = resolve_tables(&filters, &all, &HashMap::new(), false).unwrap();
        assert_eq!(resolved, tables(&["public.foo"]));
    }

    #[test]
    fn test_conflicting_filters_are_rejected() {
        let all = tables(&["public.foo"]);
        let filters = FilterSet {
            include_tables: ["public.foo".to_string()].into(),
            exclude_tables: ["public.foo".to_string()].into(),
            ..Default::default()
        };
        assert!(resolve_tables(&filters, &all, &HashMap::new(), false).is_err());
    }

    #[test]
    fn test_leaf_partition_data_implicitly_includes_parent() {
        let all = tables(&["public.sales_2026", "public.sales"]);
        let filters = FilterSet {
            include_tables: ["public.sales_2026".to_string()].into(),
            ..Default::default()
        };
        let mut parents = HashMap::new();
        parents.insert("public.sales_2026".to_string(), "public.sales".to_string());

        let resolved = resolve_tables(&filters, &all, &parents, true).unwrap();
        assert!(resolved.contains("public.sales"));
    }
}
