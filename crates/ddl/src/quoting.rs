//! Dollar-quoting for function bodies, per §4.B: "function bodies are
//! always dollar-quoted with a tag that does not appear in the body; if it
//! does, lengthen the tag until unique."

/// Wraps `body` in a dollar-quoted string using the shortest tag from the
/// sequence `""`, `"x"`, `"xx"`, ... that does not occur in `body`.
pub fn dollar_quote(body: &str) -> String {
    let mut tag = String::new();
    loop {
        let delimiter = format!("${tag}$");
        if !body.contains(&delimiter) {
            return format!("{delimiter}{body}{delimiter}");
        }
        tag.push('x');
    }
}
