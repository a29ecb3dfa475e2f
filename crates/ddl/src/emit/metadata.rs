//! Object metadata (owner, comment, ACL, security label), per §4.B step 12:
//! applied post-creation, in that fixed order.

use gpbackup_catalog::Metadata;

/// `object_clause` is the already-qualified `ON <kind> <name>` target, e.g.
/// `TABLE public.foo` or `FUNCTION public.add_one(integer)`.
pub fn render(object_clause: &str, metadata: &Metadata) -> Vec<String> {
    let mut statements = Vec::new();

    if let Some(owner) = &metadata.owner {
        statements.push(format!("ALTER {object_clause} OWNER TO {owner};\n"));
    }
    if let Some(comment) = &metadata.comment {
        statements.push(format!(
            "COMMENT ON {object_clause} IS '{}';\n",
            comment.replace('\'', "''")
        ));
    }
    for grant in &metadata.acl {
        statements.push(format!("GRANT {grant} ON {object_clause};\n"));
    }
    if let Some(label) = &metadata.security_label {
        statements.push(format!(
            "SECURITY LABEL ON {object_clause} IS '{}';\n",
            label.replace('\'', "''")
        ));
    }

    statements
}
