use gpbackup_catalog::{quote_ident, View};

pub fn render(view: &View) -> String {
    format!(
        "CREATE VIEW {}.{} AS {};\n",
        quote_ident(&view.schema_name),
        quote_ident(&view.view_name),
        view.definition
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_view() {
        let view = View {
            schema_name: "public".to_string(),
            view_name: "active_customers".to_string(),
            oid: 1,
            definition: "SELECT * FROM public.customers WHERE active".to_string(),
        };
        assert_eq!(
            render(&view),
            "CREATE VIEW public.active_customers AS SELECT * FROM public.customers WHERE active;\n"
        );
    }
}
