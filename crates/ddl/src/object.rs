//! The tagged-variant emitter, per §9: "polymorphic emitters ... expressed
//! as ... a tagged variant with a per-variant emitter -- not inheritance.
//! Adding a new object kind means adding one variant and one function."

use std::collections::HashMap;

use gpbackup_catalog::{
    AggregateDefinition, CastDefinition, ConstraintDefinition, FunctionDefinition, Metadata,
    ProceduralLanguage, Relation, Sequence, TableDefinition, TableStatistics, TypeDefinition, View,
};

use crate::emit;

#[derive(Debug, Clone)]
pub enum DdlObject {
    Schema(String),
    Language(ProceduralLanguage),
    ShellType { schema: String, name: String },
    Function(FunctionDefinition),
    BaseType(TypeDefinition),
    CompositeType { schema: String, name: String, sql: String },
    EnumType(TypeDefinition),
    Cast(CastDefinition),
    Aggregate {
        definition: AggregateDefinition,
        function_names: HashMap<u32, String>,
    },
    SequenceDefinition(Sequence),
    SequenceOwnedBy(Sequence),
    Table { relation: Relation, table: TableDefinition },
    View(View),
    Constraint(ConstraintDefinition),
    Metadata { object_clause: String, schema: String, name: String, metadata: Metadata },
    Statistics { relation: Relation, stats: TableStatistics },
}

impl DdlObject {
    /// The TOC `kind` string for this object.
    pub fn kind(&self) -> &'static str {
        match self {
            DdlObject::Schema(_) => "SCHEMA",
            DdlObject::Language(_) => "LANGUAGE",
            DdlObject::ShellType { .. } => "TYPE",
            DdlObject::Function(_) => "FUNCTION",
            DdlObject::BaseType(_) => "TYPE",
            DdlObject::CompositeType { .. } => "TYPE",
            DdlObject::EnumType(_) => "TYPE",
            DdlObject::Cast(_) => "CAST",
            DdlObject::Aggregate { .. } => "AGGREGATE",
            DdlObject::SequenceDefinition(_) => "SEQUENCE",
            DdlObject::SequenceOwnedBy(_) => "SEQUENCE OWNED BY",
            DdlObject::Table { .. } => "TABLE",
            DdlObject::View(_) => "VIEW",
            DdlObject::Constraint(_) => "CONSTRAINT",
            DdlObject::Metadata { .. } => "METADATA",
            DdlObject::Statistics { .. } => "STATISTICS",
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            DdlObject::Schema(name) => name,
            DdlObject::Language(_) => "",
            DdlObject::ShellType { schema, .. } => schema,
            DdlObject::Function(f) => &f.schema_name,
            DdlObject::BaseType(t) | DdlObject::EnumType(t) => &t.schema_name,
            DdlObject::CompositeType { schema, .. } => schema,
            DdlObject::Cast(_) => "",
            DdlObject::Aggregate { definition, .. } => &definition.schema_name,
            DdlObject::SequenceDefinition(s) | DdlObject::SequenceOwnedBy(s) => {
                &s.relation.schema_name
            }
            DdlObject::Table { relation, .. } => &relation.schema_name,
            DdlObject::View(v) => &v.schema_name,
            DdlObject::Constraint(c) => &c.schema_name,
            DdlObject::Metadata { schema, .. } => schema,
            DdlObject::Statistics { relation, .. } => &relation.schema_name,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DdlObject::Schema(name) => name,
            DdlObject::Language(l) => &l.name,
            DdlObject::ShellType { name, .. } => name,
            DdlObject::Function(f) => &f.function_name,
            DdlObject::BaseType(t) | DdlObject::EnumType(t) => &t.type_name,
            DdlObject::CompositeType { name, .. } => name,
            DdlObject::Cast(c) => &c.target_type,
            DdlObject::Aggregate { definition, .. } => &definition.aggregate_name,
            DdlObject::SequenceDefinition(s) | DdlObject::SequenceOwnedBy(s) => {
                &s.relation.relation_name
            }
            DdlObject::Table { relation, .. } => &relation.relation_name,
            DdlObject::View(v) => &v.view_name,
            DdlObject::Constraint(c) => &c.constraint_name,
            DdlObject::Metadata { name, .. } => name,
            DdlObject::Statistics { relation, .. } => &relation.relation_name,
        }
    }

    /// Renders every statement belonging to this object, in emission order.
    /// The TOC entry for the object spans the concatenation of all of them,
    /// per §4.B: "registers a TOC entry whose byte range spans exactly the
    /// written statements for that object."
    pub fn render(&self) -> Vec<String> {
        match self {
            DdlObject::Schema(name) => vec![emit::schema::render(name)],
            DdlObject::Language(language) => vec![emit::language::render(language)],
            DdlObject::ShellType { schema, name } => {
                vec![emit::function::render_shell_type(schema, name)]
            }
            DdlObject::Function(function) => vec![emit::function::render(function)],
            DdlObject::BaseType(type_def) => vec![emit::types::render_base(type_def)],
            DdlObject::CompositeType { sql, .. } => vec![sql.clone()],
            DdlObject::EnumType(type_def) => vec![emit::types::render_enum(type_def)],
            DdlObject::Cast(cast) => vec![emit::cast_aggregate::render_cast(cast)],
            DdlObject::Aggregate {
                definition,
                function_names,
            } => {
                let resolve = |oid: u32| {
                    function_names
                        .get(&oid)
                        .cloned()
                        .unwrap_or_else(|| oid.to_string())
                };
                vec![emit::cast_aggregate::render_aggregate(definition, &resolve)]
            }
            DdlObject::SequenceDefinition(sequence) => {
                vec![emit::sequence::render_definition(sequence)]
            }
            DdlObject::SequenceOwnedBy(sequence) => {
                emit::sequence::render_owned_by(sequence).into_iter().collect()
            }
            DdlObject::Table { relation, table } => emit::table::render(relation, table),
            DdlObject::View(view) => vec![emit::view::render(view)],
            DdlObject::Constraint(constraint) => {
                emit::constraint::render_ordered(std::slice::from_ref(constraint))
            }
            DdlObject::Metadata {
                object_clause,
                metadata,
                ..
            } => emit::metadata::render(object_clause, metadata),
            DdlObject::Statistics { relation, stats } => emit::statistics::render(relation, stats),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_schema_object_round_trips_kind_and_name() {
        let object = DdlObject::Schema("analytics".to_string());
        assert_eq!(object.kind(), "SCHEMA");
        assert_eq!(object.name(), "analytics");
        assert_eq!(object.render(), vec!["CREATE SCHEMA analytics;\n"]);
    }

    #[test]
    fn test_sequence_owned_by_renders_nothing_without_owning_column() {
        let sequence = Sequence {
            relation: Relation {
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
        assert!(object.render().is_empty());
    }
}
