//! `${NAME}` substitution over a parsed JSON tree.
//!
//! Only string leaves are inspected and only the first well-formed token in
//! each string is considered. A set variable replaces the token in place; an
//! unset one leaves the whole string untouched and is reported back to the
//! caller so it can be logged.

use std::ops::Range;

use serde_json::Value;

/// Output of [`resolve_placeholders`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    /// Variable names that were referenced but not set, in tree order.
    pub unresolved: Vec<String>,
}

/// Walk `value` and substitute placeholders using `lookup`.
///
/// Non-string scalars pass through; arrays and objects keep their shape.
pub fn resolve_placeholders(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Resolved {
    let mut unresolved = Vec::new();
    let value = walk(value, lookup, &mut unresolved);
    Resolved { value, unresolved }
}

fn walk(
    value: Value,
    lookup: &dyn Fn(&str) -> Option<String>,
    unresolved: &mut Vec<String>,
) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, lookup, unresolved)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| walk(item, lookup, unresolved))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, walk(item, lookup, unresolved)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute(
    s: String,
    lookup: &dyn Fn(&str) -> Option<String>,
    unresolved: &mut Vec<String>,
) -> String {
    let Some((range, name)) = find_token(&s) else {
        return s;
    };
    let name = name.to_string();

    match lookup(&name) {
        Some(val) => {
            let mut out = String::with_capacity(s.len() - range.len() + val.len());
            out.push_str(&s[..range.start]);
            out.push_str(&val);
            out.push_str(&s[range.end..]);
            out
        }
        None => {
            unresolved.push(name);
            s
        }
    }
}

/// Locate the first `${NAME}` token. Returns the byte range of the whole
/// token and the variable name.
fn find_token(s: &str) -> Option<(Range<usize>, &str)> {
    let mut from = 0;
    while let Some(offset) = s[from..].find("${") {
        let start = from + offset;
        let name_start = start + 2;
        let len = s[name_start..].find('}')?;
        let name = &s[name_start..name_start + len];
        if is_var_name(name) {
            return Some((start..name_start + len + 1, name));
        }
        from = name_start;
    }
    None
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
