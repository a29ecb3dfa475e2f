use gpbackup_catalog::quote_ident;

/// `public` is ensured by the restore target already, per §4.B step 2, so
/// callers filter it out of the candidate list before reaching this
/// function; it does not check for `public` itself.
pub fn render(schema_name: &str) -> String {
    format!("CREATE SCHEMA {};\n", quote_ident(schema_name))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_schema() {
        assert_eq!(render("schema2"), "CREATE SCHEMA schema2;\n");
        assert_eq!(render("My Schema"), "CREATE SCHEMA \"My Schema\";\n");
    }
}
