//! Table DDL (regular and external), per §4.B step 9.

use gpbackup_catalog::{quote_ident, Relation, TableDefinition};

pub fn render(relation: &Relation, table: &TableDefinition) -> Vec<String> {
    table
        .check_invariant()
        .expect("probe-constructed TableDefinition must satisfy its invariant");

    let mut statements = Vec::new();
    statements.push(render_create(relation, table));
    statements.extend(render_column_alters(relation, table));
    statements
}

fn render_create(relation: &Relation, table: &TableDefinition) -> String {
    let qualified = relation.qualified_name();
    let columns = table
        .columns
        .iter()
        .filter(|c| !c.is_dropped)
        .map(render_column)
        .collect::<Vec<_>>()
        .join(", ");

    if table.is_external {
        let external = table
            .external
            .as_ref()
            .expect("invariant guarantees external descriptor is present");
        return render_external_create(&qualified, &columns, external);
    }

    let mut sql = format!("CREATE TABLE {qualified} ({columns})");
    if !relation.inherits.is_empty() {
        sql.push_str(&format!(" INHERITS ({})", relation.inherits.join(", ")));
    }
    if !table.storage_options.is_empty() {
        sql.push_str(&format!(" WITH ({})", table.storage_options));
    }
    if !table.distribution_policy.is_empty() {
        sql.push(' ');
        sql.push_str(&table.distribution_policy);
    }
    if !table.partition_def.is_empty() {
        sql.push(' ');
        sql.push_str(&table.partition_def);
    }
    sql.push_str(";\n");
    sql
}

fn render_external_create(
    qualified: &str,
    columns: &str,
    external: &gpbackup_catalog::ExternalTableDefinition,
) -> String {
    let locations = if !external.location_uris.is_empty() {
        format!(
            "LOCATION ({})",
            external
                .location_uris
                .iter()
                .map(|uri| format!("'{uri}'"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        format!("EXECUTE '{}' ON {}", external.command, external.execute_on)
    };

    let mut sql = format!(
        "CREATE EXTERNAL TABLE {qualified} ({columns}) {locations} FORMAT '{}' ({})",
        external.format_type, external.format_opts
    );
    if let Some(limit) = external.reject_limit {
        sql.push_str(&format!(" SEGMENT REJECT LIMIT {limit}"));
    }
    if let Some(error_table) = &external.error_table {
        sql.push_str(&format!(" LOG ERRORS INTO {error_table}"));
    }
    sql.push_str(";\n");
    sql
}

fn render_column(column: &gpbackup_catalog::ColumnDefinition) -> String {
    let mut clause = format!("{} {}", quote_ident(&column.name), column.type_name);
    if column.has_default {
        clause.push_str(&format!(" DEFAULT {}", column.default_value));
    }
    if column.not_null {
        clause.push_str(" NOT NULL");
    }
    clause
}

/// Per-column `ALTER ... SET STATISTICS` / `SET STORAGE`, emitted after the
/// `CREATE TABLE` per §4.B step 9. `-1` is the catalog's "inherit default"
/// sentinel and is skipped.
fn render_column_alters(relation: &Relation, table: &TableDefinition) -> Vec<String> {
    let qualified = relation.qualified_name();
    let mut statements = Vec::new();
    for column in &table.columns {
        if column.is_dropped {
            continue;
        }
        let ident = quote_ident(&column.name);
        if column.stat_target != -1 {
            statements.push(format!(
                "ALTER TABLE ONLY {qualified} ALTER COLUMN {ident} SET STATISTICS {};\n",
                column.stat_target
            ));
        }
        if !column.storage_type.is_empty() {
            statements.push(format!(
                "ALTER TABLE ONLY {qualified} ALTER COLUMN {ident} SET STORAGE {};\n",
                column.storage_type
            ));
        }
    }
    statements
}

#[cfg(test)]
mod test {
    use super::*;
    use gpbackup_catalog::ColumnDefinition;

    fn relation() -> Relation {
        Relation {
            schema_oid: 1,
            relation_oid: 2,
            schema_name: "public".to_string(),
            relation_name: "foo".to_string(),
            kind: gpbackup_catalog::RelationKind::Table,
            depends_upon: vec![],
            inherits: vec![],
        }
    }

    fn column(name: &str, ty: &str) -> ColumnDefinition {
        ColumnDefinition {
            name: name.to_string(),
            type_name: ty.to_string(),
            has_default: false,
            default_value: String::new(),
            not_null: false,
            stat_target: -1,
            storage_type: String::new(),
            encoding: String::new(),
            is_dropped: false,
            comment: String::new(),
        }
    }

    #[test]
    fn test_render_basic_table() {
        let table = TableDefinition {
            columns: vec![column("id", "integer"), column("name", "text")],
            distribution_policy: "DISTRIBUTED BY (id)".to_string(),
            ..Default::default()
        };
        let statements = render(&relation(), &table);
        assert_eq!(
            statements[0],
            "CREATE TABLE public.foo (id integer, name text) DISTRIBUTED BY (id);\n"
        );
    }

    #[test]
    fn test_render_skips_dropped_columns_in_create_but_keeps_numbering_intent() {
        let mut dropped = column("old_col", "text");
        dropped.is_dropped = true;
        let table = TableDefinition {
            columns: vec![column("id", "integer"), dropped],
            ..Default::default()
        };
        let statements = render(&relation(), &table);
        assert!(!statements[0].contains("old_col"));
    }

    #[test]
    fn test_render_column_alters() {
        let mut stats_col = column("payload", "text");
        stats_col.stat_target = 500;
        stats_col.storage_type = "EXTERNAL".to_string();
        let table = TableDefinition {
            columns: vec![stats_col],
            ..Default::default()
        };
        let statements = render(&relation(), &table);
        assert!(statements.contains(
            &"ALTER TABLE ONLY public.foo ALTER COLUMN payload SET STATISTICS 500;\n".to_string()
        ));
        assert!(statements.contains(
            &"ALTER TABLE ONLY public.foo ALTER COLUMN payload SET STORAGE EXTERNAL;\n".to_string()
        ));
    }

    #[test]
    fn test_render_external_table() {
        let table = TableDefinition {
            columns: vec![column("id", "integer")],
            is_external: true,
            external: Some(gpbackup_catalog::ExternalTableDefinition {
                location_uris: vec!["gpfdist://host:8080/data.csv".to_string()],
                format_type: "CSV".to_string(),
                format_opts: "DELIMITER ','".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let statements = render(&relation(), &table);
        assert!(statements[0].starts_with("CREATE EXTERNAL TABLE public.foo (id integer) LOCATION"));
    }
}
