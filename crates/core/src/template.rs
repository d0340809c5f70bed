//! Minimal `{{ field }}` substitution for user-authored text.
//!
//! Contract terms and notification emails carry placeholders like
//! `{{ doc.party_name }}`. This deliberately stops at dotted-path
//! substitution: no conditionals, no loops. Unknown paths render as an
//! empty string rather than failing the save.

use serde_json::Value as JsonValue;

/// Render `template`, replacing every `{{ path.to.field }}` with the value
/// found at that dotted path in `context`.
///
/// Scalars render via `to_string` (strings unquoted); missing paths and
/// non-scalar values render empty.
pub fn render(template: &str, context: &JsonValue) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];

        match after.find("}}") {
            Some(close) => {
                let path = after[..close].trim();
                out.push_str(&lookup(context, path));
                rest = &after[close + 2..];
            }
            None => {
                // Unterminated placeholder; emit verbatim.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn lookup(context: &JsonValue, path: &str) -> String {
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) => current = v,
            None => return String::new(),
        }
    }

    match current {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_dotted_paths() {
        let ctx = json!({"doc": {"party_name": "Rosewood Farms", "qty": 3}});
        let rendered = render(
            "Agreement with {{ doc.party_name }} for {{doc.qty}} lots.",
            &ctx,
        );
        assert_eq!(rendered, "Agreement with Rosewood Farms for 3 lots.");
    }

    #[test]
    fn unknown_paths_render_empty() {
        let ctx = json!({"doc": {}});
        assert_eq!(render("[{{ doc.missing }}]", &ctx), "[]");
    }

    #[test]
    fn unterminated_placeholder_is_left_verbatim() {
        let ctx = json!({});
        assert_eq!(render("broken {{ tail", &ctx), "broken {{ tail");
    }

    #[test]
    fn plain_text_passes_through() {
        let ctx = json!({});
        assert_eq!(render("no placeholders here", &ctx), "no placeholders here");
    }
}
