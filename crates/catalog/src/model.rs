use serde::{Deserialize, Serialize};

/// The catalog's `pg_class.relkind` values this probe distinguishes between,
/// narrowed to the kinds the DDL emitter treats differently (§4.B groups
/// tables, views, and sequences into separate emission steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Table,
    View,
    Sequence,
    ForeignTable,
}

impl RelationKind {
    /// Maps a raw `pg_class.relkind` character to its `RelationKind`.
    /// Kinds this probe doesn't distinguish (indexes, composite types'
    /// backing relations, etc) never reach here: `fetch_relations` filters
    /// to `r`/`v`/`S`/`f` in SQL.
    pub fn from_relkind(relkind: char) -> Option<Self> {
        match relkind {
            'r' => Some(RelationKind::Table),
            'v' => Some(RelationKind::View),
            'S' => Some(RelationKind::Sequence),
            'f' => Some(RelationKind::ForeignTable),
            _ => None,
        }
    }
}

/// Relation identifies a table, view, or sequence in the source catalog.
/// Immutable after construction by the probe and shared read-only among
/// the DDL emitter's passes, per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub schema_oid: u32,
    pub relation_oid: u32,
    pub schema_name: String,
    pub relation_name: String,
    pub kind: RelationKind,
    /// Oids this relation's DDL must be emitted after.
    pub depends_upon: Vec<u32>,
    /// Parent table names for `INHERITS`, already schema-qualified and quoted.
    pub inherits: Vec<String>,
}

impl Relation {
    /// Renders the fully-qualified, quoted `schema.relation` form used in
    /// every emitted statement, per §3 "Qualified name is always emitted
    /// fully and quoted."
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.schema_name),
            quote_ident(&self.relation_name)
        )
    }
}

/// Quotes an identifier with double quotes, doubling any embedded quote --
/// the same escaping pg_dump and psql use for identifiers that aren't
/// already simple lowercase words.
pub fn quote_ident(ident: &str) -> String {
    let needs_quoting = ident.is_empty()
        || !ident
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase() || c == '_')
            .unwrap_or(false)
        || !ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !needs_quoting {
        return ident.to_string();
    }
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub type_name: String,
    pub has_default: bool,
    pub default_value: String,
    pub not_null: bool,
    /// -1 means "inherit the default", matching the catalog sentinel.
    pub stat_target: i32,
    pub storage_type: String,
    pub encoding: String,
    pub is_dropped: bool,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTableDefinition {
    pub location_uris: Vec<String>,
    pub execute_on: String,
    pub format_type: String,
    pub format_opts: String,
    pub command: String,
    pub reject_limit: Option<i32>,
    pub error_table: Option<String>,
}

/// TableDefinition owns everything needed to emit a `CREATE TABLE`, per §3.
/// Invariant: if `is_external` is true, `external` is populated and
/// `partition_def` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub columns: Vec<ColumnDefinition>,
    pub distribution_policy: String,
    pub partition_def: String,
    pub partition_template_def: String,
    pub storage_options: String,
    pub tablespace: String,
    pub is_external: bool,
    pub external: Option<ExternalTableDefinition>,
}

impl TableDefinition {
    /// Enforces the §3 TableDefinition invariant. Probes constructing a
    /// `TableDefinition` should call this before handing it to the emitter.
    pub fn check_invariant(&self) -> Result<(), &'static str> {
        if self.is_external {
            if self.external.is_none() {
                return Err("external table is missing its external descriptor");
            }
            if !self.partition_def.is_empty() {
                return Err("external table must not carry partition definition text");
            }
        }
        Ok(())
    }
}

/// Metadata is applied to an object keyed by `(class_oid, object_oid)`:
/// owner, comment, ACL, and security label. Applied exactly once, after the
/// object's own definition and before later dependent objects, per §3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub owner: Option<String>,
    pub comment: Option<String>,
    pub acl: Vec<String>,
    pub security_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub last_val: i64,
    pub increment: i64,
    pub max_val: i64,
    pub min_val: i64,
    pub cache_val: i64,
    pub is_cycled: bool,
    pub is_called: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub relation: Relation,
    pub definition: SequenceDefinition,
    /// Schema-qualified, quoted column this sequence is `OWNED BY`, if any.
    pub owning_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub schema_name: String,
    pub function_name: String,
    pub function_oid: u32,
    pub arguments: String,
    pub ident_args: String,
    pub result_type: String,
    pub returns_set: bool,
    pub language: String,
    pub function_body: String,
    /// `-` or empty when unused, matching pg_proc.probin's historical sentinel.
    pub binary_path: String,
    pub sql_usage: String,
    pub volatility: String,
    pub is_strict: bool,
    pub is_security_definer: bool,
    pub cost: f64,
    pub num_rows: f64,
    pub config_clauses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDefinition {
    pub schema_name: String,
    pub aggregate_name: String,
    pub arguments: String,
    pub ident_args: String,
    pub is_ordered: bool,
    pub transition_function: u32,
    pub transition_data_type: String,
    pub preliminary_function: Option<u32>,
    pub final_function: Option<u32>,
    pub initial_value: Option<String>,
    pub sort_operator: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastDefinition {
    pub source_type: String,
    pub target_type: String,
    pub function_schema: Option<String>,
    pub function_name: Option<String>,
    pub function_args: String,
    /// One of `a` (assignment), `i` (implicit), `e` (explicit, the default).
    pub cast_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Base,
    Composite,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub schema_name: String,
    pub type_name: String,
    pub kind: TypeKind,
    /// Only set for `Composite`: one attribute per row, grouped by the
    /// caller on `(schema_name, type_name)` runs per §4.A.
    pub attribute_name: Option<String>,
    pub attribute_type: Option<String>,
    /// Only set for `Enum`.
    pub enum_labels: Vec<String>,
    pub owner: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceduralLanguage {
    pub name: String,
    pub owner: Option<String>,
    pub handler_function: Option<u32>,
    pub is_trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub schema_name: String,
    pub view_name: String,
    pub oid: u32,
    pub definition: String,
}

/// A table constraint, emitted after its table and views exist, per §4.B
/// step 11: non-foreign-key constraints first, foreign keys last, each
/// group sorted lexicographically by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    pub schema_name: String,
    pub relation_name: String,
    pub constraint_name: String,
    pub is_foreign_key: bool,
    /// The full clause after `ADD CONSTRAINT <name>`, e.g.
    /// `PRIMARY KEY (id)` or `FOREIGN KEY (customer_id) REFERENCES
    /// public.customer(id)`.
    pub definition: String,
}

/// A single append-optimized table's modification counter at a point in
/// time, used by the orchestrator's incremental resolution (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoModificationCount {
    pub relation_oid: u32,
    pub modcount: i64,
    pub is_append_optimized: bool,
}

/// One column's planner statistics, as `--with-stats` persists them to the
/// statistics file and a restore replays them with `pg_restore_attribute_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub column_name: String,
    pub null_frac: f64,
    pub n_distinct: f64,
}

/// A table's planner statistics: the relation-level row/page estimates
/// plus per-column statistics, per spec's `--with-stats` support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub relation_oid: u32,
    pub row_count: i64,
    pub page_count: i64,
    pub columns: Vec<ColumnStatistics>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_quote_ident_only_quotes_when_needed() {
        assert_eq!(quote_ident("foo"), "foo");
        assert_eq!(quote_ident("Foo"), "\"Foo\"");
        assert_eq!(quote_ident("foo bar"), "\"foo bar\"");
        assert_eq!(quote_ident("she said \"hi\""), "\"she said \"\"hi\"\"\"");
    }

    #[test]
    fn test_relation_qualified_name() {
        let relation = Relation {
            schema_oid: 1,
            relation_oid: 2,
            schema_name: "public".into(),
            relation_name: "Sales".into(),
            kind: RelationKind::Table,
            depends_upon: vec![],
            inherits: vec![],
        };
        assert_eq!(relation.qualified_name(), "public.\"Sales\"");
    }

    #[test]
    fn test_table_definition_invariant() {
        let mut def = TableDefinition::default();
        def.is_external = true;
        assert!(def.check_invariant().is_err());

        def.external = Some(ExternalTableDefinition::default());
        assert!(def.check_invariant().is_ok());

        def.partition_def = "PARTITION BY RANGE (id)".into();
        assert!(def.check_invariant().is_err());
    }
}
