//! Planner statistics DDL for `--with-stats`, per spec's statistics-file
//! support: a relation-level row/page estimate update plus one
//! `pg_restore_attribute_stats`-style call per column, grounded on the
//! same `UPDATE pg_class` + per-column restore shape
//! `original_source/backup/statistics.go` produces.

use gpbackup_catalog::{quote_ident, Relation, TableStatistics};

pub fn render(relation: &Relation, stats: &TableStatistics) -> Vec<String> {
    let qualified = relation.qualified_name();
    let mut statements = vec![format!(
        "UPDATE pg_class SET reltuples = {}, relpages = {} WHERE oid = '{}'::regclass;\n",
        stats.row_count, stats.page_count, qualified
    )];

    for column in &stats.columns {
        statements.push(format!(
            "SELECT pg_catalog.pg_restore_attribute_stats('{qualified}'::regclass, {}, \
             'null_frac', {}::real, 'n_distinct', {}::real);\n",
            quote_ident(&column.column_name),
            column.null_frac,
            column.n_distinct,
        ));
    }

    statements
}

#[cfg(test)]
mod test {
    use super::*;
    use gpbackup_catalog::{ColumnStatistics, RelationKind};

    fn relation() -> Relation {
        Relation {
            schema_oid: 1,
            relation_oid: 16412,
            schema_name: "public".to_string(),
            relation_name: "orders".to_string(),
            kind: RelationKind::Table,
            depends_upon: vec![],
            inherits: vec![],
        }
    }

    #[test]
    fn test_render_relation_stats_and_columns() {
        let stats = TableStatistics {
            relation_oid: 16412,
            row_count: 1000,
            page_count: 12,
            columns: vec![ColumnStatistics {
                column_name: "id".to_string(),
                null_frac: 0.0,
                n_distinct: -1.0,
            }],
        };
        let rendered = render(&relation(), &stats);
        assert_eq!(
            rendered[0],
            "UPDATE pg_class SET reltuples = 1000, relpages = 12 WHERE oid = 'public.orders'::regclass;\n"
        );
        assert!(rendered[1].contains("pg_restore_attribute_stats"));
        assert!(rendered[1].contains("n_distinct"));
    }

    #[test]
    fn test_render_omits_column_calls_when_no_column_stats() {
        let stats = TableStatistics { relation_oid: 16412, row_count: 0, page_count: 0, columns: vec![] };
        assert_eq!(render(&relation(), &stats).len(), 1);
    }
}
