//! Casts, aggregates, per §4.B step 7, and aggregate DDL shape per
//! `original_source/backup/predata_nontable.go:PrintCreateAggregateStatements`.

use gpbackup_catalog::{quote_ident, AggregateDefinition, CastDefinition};

pub fn render_cast(cast: &CastDefinition) -> String {
    let function_clause = match (&cast.function_schema, &cast.function_name) {
        (Some(schema), Some(name)) => format!(
            "WITH FUNCTION {}.{}({})",
            quote_ident(schema),
            quote_ident(name),
            cast.function_args
        ),
        _ => "WITHOUT FUNCTION".to_string(),
    };
    let context = match cast.cast_context.as_str() {
        "a" => " AS ASSIGNMENT",
        "i" => " AS IMPLICIT",
        _ => "",
    };
    format!(
        "CREATE CAST ({} AS {}) {function_clause}{context};\n",
        cast.source_type, cast.target_type
    )
}

/// `func_oids` resolves the transition/preliminary/final function oids
/// recorded on the aggregate to their already-emitted qualified names,
/// per §2's note that aggregate rendering depends on a name map built
/// earlier in emission.
pub fn render_aggregate(
    aggregate: &AggregateDefinition,
    func_oids: &dyn Fn(u32) -> String,
) -> String {
    let qualified = format!(
        "{}.{}",
        quote_ident(&aggregate.schema_name),
        quote_ident(&aggregate.aggregate_name)
    );
    let ordered = if aggregate.is_ordered { "ORDERED " } else { "" };

    let mut params = vec![
        format!("SFUNC = {}", func_oids(aggregate.transition_function)),
        format!("STYPE = {}", aggregate.transition_data_type),
    ];
    if let Some(oid) = aggregate.preliminary_function {
        params.push(format!("PREFUNC = {}", func_oids(oid)));
    }
    if let Some(oid) = aggregate.final_function {
        params.push(format!("FINALFUNC = {}", func_oids(oid)));
    }
    if let Some(initial) = &aggregate.initial_value {
        params.push(format!("INITCOND = '{}'", initial.replace('\'', "''")));
    }
    if let Some(oid) = aggregate.sort_operator {
        params.push(format!("SORTOP = {}", func_oids(oid)));
    }

    format!(
        "CREATE {ordered}AGGREGATE {qualified}({}) ({});\n",
        aggregate.ident_args,
        params.join(", ")
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_cast_with_function() {
        let cast = CastDefinition {
            source_type: "int4".to_string(),
            target_type: "text".to_string(),
            function_schema: Some("pg_catalog".to_string()),
            function_name: Some("int4_to_text".to_string()),
            function_args: "int4".to_string(),
            cast_context: "a".to_string(),
        };
        assert_eq!(
            render_cast(&cast),
            "CREATE CAST (int4 AS text) WITH FUNCTION pg_catalog.int4_to_text(int4) AS ASSIGNMENT;\n"
        );
    }

    #[test]
    fn test_render_cast_without_function() {
        let cast = CastDefinition {
            source_type: "mytype".to_string(),
            target_type: "othertype".to_string(),
            function_schema: None,
            function_name: None,
            function_args: String::new(),
            cast_context: "e".to_string(),
        };
        assert_eq!(
            render_cast(&cast),
            "CREATE CAST (mytype AS othertype) WITHOUT FUNCTION;\n"
        );
    }

    #[test]
    fn test_render_aggregate_mandatory_and_optional_fields() {
        let aggregate = AggregateDefinition {
            schema_name: "public".to_string(),
            aggregate_name: "my_sum".to_string(),
            arguments: "integer".to_string(),
            ident_args: "integer".to_string(),
            is_ordered: false,
            transition_function: 10,
            transition_data_type: "integer".to_string(),
            preliminary_function: Some(11),
            final_function: None,
            initial_value: Some("0".to_string()),
            sort_operator: None,
        };
        let names = |oid: u32| format!("public.func_{oid}");
        let rendered = render_aggregate(&aggregate, &names);
        assert_eq!(
            rendered,
            "CREATE AGGREGATE public.my_sum(integer) (SFUNC = public.func_10, STYPE = integer, PREFUNC = public.func_11, INITCOND = '0');\n"
        );
    }
}
