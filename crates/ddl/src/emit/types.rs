//! Base, composite, and enum type DDL, per §4.B step 6.

use gpbackup_catalog::{quote_ident, TypeDefinition, TypeKind};
use itertools::Itertools;

/// Base types are assumed already shell-declared (§4.B step 4) and have
/// their `input`/`output` functions defined (step 5); here we only need the
/// trailing attachment, which in practice is a `CREATE TYPE ... (...)`
/// parameter list the probe hands us pre-rendered is out of scope for this
/// emitter layer -- callers of a base type variant pass the full parameter
/// clause as `attribute_type` on a `Base`-kind `TypeDefinition` for
/// simplicity, matching how `predata_nontable.go` treats both uniformly as
/// "the type's defining clause."
pub fn render_base(type_def: &TypeDefinition) -> String {
    let qualified = qualified(type_def);
    let params = type_def.attribute_type.as_deref().unwrap_or_default();
    format!("CREATE TYPE {qualified} ({params});\n")
}

pub fn render_enum(type_def: &TypeDefinition) -> String {
    let qualified = qualified(type_def);
    let labels = type_def
        .enum_labels
        .iter()
        .map(|label| format!("'{}'", label.replace('\'', "''")))
        .join(", ");
    format!("CREATE TYPE {qualified} AS ENUM ({labels});\n")
}

/// Groups successive composite-type attribute records sharing `(schema,
/// name)` into one `CREATE TYPE ... AS (...)` statement, per §4.B:
/// "while successive records share (schema, name), accumulate their
/// attribute definitions, then emit a single CREATE TYPE." The caller must
/// supply `records` already sorted so that a type's rows are contiguous;
/// this is a single pass over that order, not a lookahead search.
pub fn render_composite_types(records: &[TypeDefinition]) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    for (_, group) in &records
        .iter()
        .group_by(|r| (r.schema_name.clone(), r.type_name.clone()))
    {
        let group: Vec<&TypeDefinition> = group.collect();
        let first = group[0];
        let qualified = qualified(first);
        let attributes = group
            .iter()
            .filter_map(|r| {
                let name = r.attribute_name.as_deref()?;
                let ty = r.attribute_type.as_deref()?;
                Some(format!("{} {}", quote_ident(name), ty))
            })
            .join(", ");
        out.push((
            first.schema_name.clone(),
            first.type_name.clone(),
            format!("CREATE TYPE {qualified} AS ({attributes});\n"),
        ));
    }
    out
}

fn qualified(type_def: &TypeDefinition) -> String {
    format!(
        "{}.{}",
        quote_ident(&type_def.schema_name),
        quote_ident(&type_def.type_name)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn composite_row(schema: &str, name: &str, attr: &str, ty: &str) -> TypeDefinition {
        TypeDefinition {
            schema_name: schema.to_string(),
            type_name: name.to_string(),
            kind: TypeKind::Composite,
            attribute_name: Some(attr.to_string()),
            attribute_type: Some(ty.to_string()),
            enum_labels: Vec::new(),
            owner: None,
            comment: None,
        }
    }

    #[test]
    fn test_render_enum() {
        let type_def = TypeDefinition {
            schema_name: "public".to_string(),
            type_name: "mood".to_string(),
            kind: TypeKind::Enum,
            attribute_name: None,
            attribute_type: None,
            enum_labels: vec!["sad".to_string(), "ok".to_string()],
            owner: None,
            comment: None,
        };
        assert_eq!(
            render_enum(&type_def),
            "CREATE TYPE public.mood AS ENUM ('sad', 'ok');\n"
        );
    }

    #[test]
    fn test_render_composite_types_groups_by_schema_and_name() {
        let records = vec![
            composite_row("public", "point3d", "x", "numeric"),
            composite_row("public", "point3d", "y", "numeric"),
            composite_row("public", "point3d", "z", "numeric"),
            composite_row("public", "segment", "a", "public.point3d"),
            composite_row("public", "segment", "b", "public.point3d"),
        ];

        let grouped = render_composite_types(&records);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].1, "point3d");
        assert_eq!(
            grouped[0].2,
            "CREATE TYPE public.point3d AS (x numeric, y numeric, z numeric);\n"
        );
        assert_eq!(grouped[1].1, "segment");
    }
}
