//! Function DDL, per §4.B plus the supplemented modifier-ordering and
//! body-printing rules grounded on `original_source/backup/predata_nontable.go`
//! (`PrintFunctionModifiers`, `PrintFunctionBodyOrPath`).

use gpbackup_catalog::{quote_ident, FunctionDefinition};

use crate::quoting::dollar_quote;

/// Pre-declares a base type's shape before its `input`/`output` functions
/// exist, per §4.B step 4. Only base types need this; composite and enum
/// types are fully defined in one statement.
pub fn render_shell_type(schema_name: &str, type_name: &str) -> String {
    format!(
        "CREATE TYPE {}.{};\n",
        quote_ident(schema_name),
        quote_ident(type_name)
    )
}

pub fn render(function: &FunctionDefinition) -> String {
    let qualified = format!(
        "{}.{}",
        quote_ident(&function.schema_name),
        quote_ident(&function.function_name)
    );

    let body = render_body_or_path(function);
    let modifiers = render_modifiers(function);

    format!(
        "CREATE FUNCTION {qualified}({}) RETURNS {}{} AS\n{body}\nLANGUAGE {}{};\n",
        function.arguments,
        if function.returns_set { "SETOF " } else { "" },
        function.result_type,
        function.language,
        modifiers,
    )
}

/// `c`/`internal` languages print an object-file path pair rather than
/// dollar-quoted source; everything else is always dollar-quoted.
fn render_body_or_path(function: &FunctionDefinition) -> String {
    if is_compiled_language(&function.language) {
        format!(
            "'{}', '{}'",
            function.binary_path, function.function_body
        )
    } else {
        dollar_quote(&function.function_body)
    }
}

fn is_compiled_language(language: &str) -> bool {
    matches!(language, "c" | "internal")
}

/// Builds the modifier suffix in the fixed order: SQL usage, volatility,
/// STRICT, SECURITY DEFINER, COST, ROWS, config GUCs.
fn render_modifiers(function: &FunctionDefinition) -> String {
    let mut modifiers = String::new();

    if !function.sql_usage.is_empty() {
        modifiers.push(' ');
        modifiers.push_str(&function.sql_usage);
    }
    if function.volatility != "VOLATILE" && !function.volatility.is_empty() {
        modifiers.push(' ');
        modifiers.push_str(&function.volatility);
    }
    if function.is_strict {
        modifiers.push_str(" STRICT");
    }
    if function.is_security_definer {
        modifiers.push_str(" SECURITY DEFINER");
    }
    if let Some(cost) = render_cost(function) {
        modifiers.push_str(" COST ");
        modifiers.push_str(&cost);
    }
    if let Some(rows) = render_rows(function) {
        modifiers.push_str(" ROWS ");
        modifiers.push_str(&rows);
    }
    for clause in &function.config_clauses {
        modifiers.push(' ');
        modifiers.push_str(clause);
    }

    modifiers
}

/// Omit `COST` when it equals the language-family default: `1` for
/// `c`/`internal`, `100` otherwise.
fn render_cost(function: &FunctionDefinition) -> Option<String> {
    let default = if is_compiled_language(&function.language) {
        1.0
    } else {
        100.0
    };
    if function.cost == default {
        None
    } else {
        Some(format_numeric(function.cost))
    }
}

/// Omit `ROWS` for non-set-returning functions, and for set-returning
/// functions whose estimate is the default `0` or `1000`.
fn render_rows(function: &FunctionDefinition) -> Option<String> {
    if !function.returns_set {
        return None;
    }
    if function.num_rows == 0.0 || function.num_rows == 1000.0 {
        None
    } else {
        Some(format_numeric(function.num_rows))
    }
}

fn format_numeric(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> FunctionDefinition {
        FunctionDefinition {
            schema_name: "public".to_string(),
            function_name: "add_one".to_string(),
            function_oid: 100,
            arguments: "x integer".to_string(),
            ident_args: "integer".to_string(),
            result_type: "integer".to_string(),
            returns_set: false,
            language: "plpgsql".to_string(),
            function_body: "BEGIN RETURN x + 1; END;".to_string(),
            binary_path: String::new(),
            sql_usage: String::new(),
            volatility: "VOLATILE".to_string(),
            is_strict: false,
            is_security_definer: false,
            cost: 100.0,
            num_rows: 0.0,
            config_clauses: Vec::new(),
        }
    }

    #[test]
    fn test_render_default_cost_and_volatility_are_omitted() {
        let rendered = render(&sample());
        assert!(!rendered.contains("COST"));
        assert!(!rendered.contains("VOLATILE"));
        assert!(rendered.contains("$$BEGIN RETURN x + 1; END;$$"));
    }

    #[test]
    fn test_render_modifier_order() {
        let mut function = sample();
        function.sql_usage = "CONTAINS SQL".to_string();
        function.volatility = "IMMUTABLE".to_string();
        function.is_strict = true;
        function.is_security_definer = true;
        function.cost = 50.0;
        function.returns_set = true;
        function.num_rows = 500.0;

        let rendered = render(&function);
        let suffix = rendered.split("LANGUAGE plpgsql").nth(1).unwrap();
        let usage_pos = suffix.find("CONTAINS SQL").unwrap();
        let volatility_pos = suffix.find("IMMUTABLE").unwrap();
        let strict_pos = suffix.find("STRICT").unwrap();
        let security_pos = suffix.find("SECURITY DEFINER").unwrap();
        let cost_pos = suffix.find("COST").unwrap();
        let rows_pos = suffix.find("ROWS").unwrap();

        assert!(usage_pos < volatility_pos);
        assert!(volatility_pos < strict_pos);
        assert!(strict_pos < security_pos);
        assert!(security_pos < cost_pos);
        assert!(cost_pos < rows_pos);
    }

    #[test]
    fn test_render_compiled_language_uses_path_pair() {
        let mut function = sample();
        function.language = "c".to_string();
        function.binary_path = "$libdir/myext".to_string();
        function.function_body = "myext_add_one".to_string();
        function.cost = 1.0;

        let rendered = render(&function);
        assert!(rendered.contains("'$libdir/myext', 'myext_add_one'"));
        assert!(!rendered.contains("COST"));
    }

    #[test]
    fn test_render_shell_type() {
        assert_eq!(render_shell_type("public", "box3d"), "CREATE TYPE public.box3d;\n");
    }
}
