use gpbackup_catalog::ProceduralLanguage;

pub fn render(language: &ProceduralLanguage) -> String {
    let trusted = if language.is_trusted { "TRUSTED " } else { "" };
    format!("CREATE {trusted}PROCEDURAL LANGUAGE {};\n", language.name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_trusted_language() {
        let language = ProceduralLanguage {
            name: "plpgsql".to_string(),
            owner: None,
            handler_function: Some(1),
            is_trusted: true,
        };
        assert_eq!(
            render(&language),
            "CREATE TRUSTED PROCEDURAL LANGUAGE plpgsql;\n"
        );
    }

    #[test]
    fn test_render_untrusted_language() {
        let language = ProceduralLanguage {
            name: "plperlu".to_string(),
            owner: None,
            handler_function: Some(2),
            is_trusted: false,
        };
        assert_eq!(render(&language), "CREATE PROCEDURAL LANGUAGE plperlu;\n");
    }
}
