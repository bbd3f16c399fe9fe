use crate::condition::{lookup, scalar_str};
use serde_json::Value;

/// Substitute `{{dot.path}}` placeholders in a notification message
/// template against the event's JSON rendering.
///
/// Unresolved placeholders (and explicit nulls) substitute to the
/// empty string; rendering never fails.
pub fn render(template: &str, event: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let field = after[..end].trim();
                match lookup(event, field) {
                    Some(Value::Null) | None => {}
                    Some(value) => out.push_str(&scalar_str(value)),
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unbalanced braces: emit the remainder verbatim.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
