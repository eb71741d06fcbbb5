//! Drive search query construction
//!
//! String literals in a Drive `q` expression are single-quoted; `'` and `\`
//! inside them must be backslash-escaped.

/// Escapes a value for use inside a single-quoted query literal
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Non-trashed children of `parent` named exactly `name`, of any kind
pub fn child_named(parent: &str, name: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and trashed = false",
        escape(name),
        escape(parent)
    )
}

/// Every non-trashed child of `parent`
pub fn children_of(parent: &str) -> String {
    format!("'{}' in parents and trashed = false", escape(parent))
}
