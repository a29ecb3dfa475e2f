//! Sequence DDL, per §4.B step 8 (definition only) and step 13 (`OWNED BY`,
//! emitted post-data once tables exist).

use gpbackup_catalog::{quote_ident, Sequence};

const DEFAULT_MAX_VAL_ASCENDING: i64 = 9223372036854775807;
const DEFAULT_MIN_VAL_ASCENDING: i64 = 1;
const DEFAULT_MAX_VAL_DESCENDING: i64 = -1;
const DEFAULT_MIN_VAL_DESCENDING: i64 = -9223372036854775807;

pub fn render_definition(sequence: &Sequence) -> String {
    let qualified = format!(
        "{}.{}",
        quote_ident(&sequence.relation.schema_name),
        quote_ident(&sequence.relation.relation_name)
    );
    let def = &sequence.definition;
    let ascending = def.increment > 0;

    let mut clauses = vec![format!("INCREMENT BY {}", def.increment)];

    // START WITH is omitted once the sequence has already been advanced
    // past its initial value.
    if !def.is_called {
        clauses.push(format!("START WITH {}", def.last_val));
    }

    let default_max = if ascending {
        DEFAULT_MAX_VAL_ASCENDING
    } else {
        DEFAULT_MAX_VAL_DESCENDING
    };
    if def.max_val != default_max {
        clauses.push(format!("MAXVALUE {}", def.max_val));
    }

    let default_min = if ascending {
        DEFAULT_MIN_VAL_ASCENDING
    } else {
        DEFAULT_MIN_VAL_DESCENDING
    };
    if def.min_val != default_min {
        clauses.push(format!("MINVALUE {}", def.min_val));
    }

    clauses.push(format!("CACHE {}", def.cache_val));
    if def.is_cycled {
        clauses.push("CYCLE".to_string());
    }

    format!("CREATE SEQUENCE {qualified} {};\n", clauses.join(" "))
}

pub fn render_owned_by(sequence: &Sequence) -> Option<String> {
    let owning_column = sequence.owning_column.as_ref()?;
    let qualified = format!(
        "{}.{}",
        quote_ident(&sequence.relation.schema_name),
        quote_ident(&sequence.relation.relation_name)
    );
    Some(format!("ALTER SEQUENCE {qualified} OWNED BY {owning_column};\n"))
}

#[cfg(test)]
mod test {
    use super::*;
    use gpbackup_catalog::{Relation, SequenceDefinition};

    fn sample(def: SequenceDefinition) -> Sequence {
        Sequence {
            relation: Relation {
                schema_oid: 1,
                relation_oid: 2,
                schema_name: "public".to_string(),
                relation_name: "my_seq".to_string(),
                kind: gpbackup_catalog::RelationKind::Sequence,
                depends_upon: vec![],
                inherits: vec![],
            },
            definition: def,
            owning_column: None,
        }
    }

    #[test]
    fn test_default_ascending_bounds_are_elided() {
        let sequence = sample(SequenceDefinition {
            last_val: 1,
            increment: 1,
            max_val: DEFAULT_MAX_VAL_ASCENDING,
            min_val: DEFAULT_MIN_VAL_ASCENDING,
            cache_val: 1,
            is_cycled: false,
            is_called: false,
        });
        let rendered = render_definition(&sequence);
        assert!(!rendered.contains("MAXVALUE"));
        assert!(!rendered.contains("MINVALUE"));
        assert!(rendered.contains("START WITH 1"));
    }

    #[test]
    fn test_start_with_elided_when_called() {
        let sequence = sample(SequenceDefinition {
            last_val: 42,
            increment: 1,
            max_val: DEFAULT_MAX_VAL_ASCENDING,
            min_val: DEFAULT_MIN_VAL_ASCENDING,
            cache_val: 1,
            is_cycled: false,
            is_called: true,
        });
        assert!(!render_definition(&sequence).contains("START WITH"));
    }

    #[test]
    fn test_non_default_bounds_are_kept() {
        let sequence = sample(SequenceDefinition {
            last_val: 1,
            increment: 1,
            max_val: 1000,
            min_val: 1,
            cache_val: 1,
            is_cycled: false,
            is_called: false,
        });
        let rendered = render_definition(&sequence);
        assert!(rendered.contains("MAXVALUE 1000"));
    }

    #[test]
    fn test_render_owned_by() {
        let mut sequence = sample(SequenceDefinition {
            last_val: 1,
            increment: 1,
            max_val: DEFAULT_MAX_VAL_ASCENDING,
            min_val: DEFAULT_MIN_VAL_ASCENDING,
            cache_val: 1,
            is_cycled: false,
            is_called: false,
        });
        assert!(render_owned_by(&sequence).is_none());

        sequence.owning_column = Some("public.foo.id".to_string());
        assert_eq!(
            render_owned_by(&sequence).unwrap(),
            "ALTER SEQUENCE public.my_seq OWNED BY public.foo.id;\n"
        );
    }
}
