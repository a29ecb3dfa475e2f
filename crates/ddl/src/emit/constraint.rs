//! Constraint DDL, per §4.B step 11: non-foreign-key constraints emitted
//! before foreign keys (so a restore never references a not-yet-created
//! table's key), each group sorted lexicographically by constraint name.

use gpbackup_catalog::{quote_ident, ConstraintDefinition};

/// Orders `constraints` per the step-11 rule and renders each as an
/// `ALTER TABLE ... ADD CONSTRAINT ...` statement, in emission order.
pub fn render_ordered(constraints: &[ConstraintDefinition]) -> Vec<String> {
    let mut ordered: Vec<&ConstraintDefinition> = constraints.iter().collect();
    ordered.sort_by(|a, b| {
        a.is_foreign_key
            .cmp(&b.is_foreign_key)
            .then_with(|| a.constraint_name.cmp(&b.constraint_name))
    });
    ordered.into_iter().map(render_one).collect()
}

fn render_one(constraint: &ConstraintDefinition) -> String {
    format!(
        "ALTER TABLE {}.{} ADD CONSTRAINT {} {};\n",
        quote_ident(&constraint.schema_name),
        quote_ident(&constraint.relation_name),
        quote_ident(&constraint.constraint_name),
        constraint.definition
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn constraint(name: &str, is_fk: bool) -> ConstraintDefinition {
        ConstraintDefinition {
            schema_name: "public".to_string(),
            relation_name: "orders".to_string(),
            constraint_name: name.to_string(),
            is_foreign_key: is_fk,
            definition: "CHECK (true)".to_string(),
        }
    }

    #[test]
    fn test_non_fk_constraints_precede_fk_constraints() {
        let constraints = vec![
            constraint("zzz_fk", true),
            constraint("aaa_check", false),
            constraint("mmm_fk", true),
            constraint("bbb_check", false),
        ];
        let rendered = render_ordered(&constraints);
        assert!(rendered[0].contains("aaa_check"));
        assert!(rendered[1].contains("bbb_check"));
        assert!(rendered[2].contains("mmm_fk"));
        assert!(rendered[3].contains("zzz_fk"));
    }
}
