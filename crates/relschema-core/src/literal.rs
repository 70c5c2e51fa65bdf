//! Literal rendering for migration source text.
//!
//! Strings are single-quoted, arrays are rendered inline between brackets and
//! objects are rendered with one key-value pair per line so generated files
//! diff cleanly under version control.

use serde_json::{Map, Value};

/// Number of spaces added per nesting level.
pub const INDENT: usize = 2;

/// Column definition key whose string value is emitted as a bare symbol
/// (`INTEGER`, `ENUM('a', 'b')`) instead of a quoted string.
pub const SYMBOL_KEY: &str = "type";

/// Quotes a string with single quotes, escaping `\` and `'`.
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Returns true if `key` can be written without quotes.
#[must_use]
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Renders an object key.
#[must_use]
pub fn render_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Renders a JSON value as a literal. `indent` is the column of the line the
/// value starts on.
#[must_use]
pub fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(|v| render_value(v, indent)).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => render_object(map, indent),
    }
}

/// Renders an object, one key-value pair per line with trailing commas.
#[must_use]
pub fn render_object(map: &Map<String, Value>, indent: usize) -> String {
    render_entries(map, indent, false)
}

/// Renders a column definition. Only its own `type` becomes a bare symbol;
/// nested values are rendered as plain literals.
#[must_use]
pub fn render_column(definition: &Map<String, Value>, indent: usize) -> String {
    render_entries(definition, indent, true)
}

/// Renders a `{ <column>: <definition> }` block.
#[must_use]
pub fn render_columns<'a>(
    columns: impl IntoIterator<Item = (&'a str, Map<String, Value>)>,
    indent: usize,
) -> String {
    let pad = " ".repeat(indent + INDENT);
    let mut out = String::new();
    for (name, definition) in columns {
        let rendered = render_column(&definition, indent + INDENT);
        out.push_str(&format!("{pad}{}: {rendered},\n", render_key(name)));
    }
    if out.is_empty() {
        return "{}".to_string();
    }
    format!("{{\n{out}{}}}", " ".repeat(indent))
}

fn render_entries(map: &Map<String, Value>, indent: usize, symbols: bool) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }
    let pad = " ".repeat(indent + INDENT);
    let mut out = String::from("{\n");
    for (key, value) in map {
        let rendered = match (key.as_str(), value) {
            (SYMBOL_KEY, Value::String(symbol)) if symbols => symbol.clone(),
            _ => render_value(value, indent + INDENT),
        };
        out.push_str(&format!("{pad}{}: {rendered},\n", render_key(key)));
    }
    out.push_str(&" ".repeat(indent));
    out.push('}');
    out
}

/// Splits a comma-separated list of single-quoted strings, as found inside
/// `ENUM(...)`.
pub(crate) fn parse_quoted_list(input: &str) -> Option<Vec<String>> {
    let mut values = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.next() {
            None => return Some(values),
            Some('\'') => {}
            Some(_) => return None,
        }
        let mut current = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => current.push('\n'),
                    other => current.push(other),
                },
                '\'' => break,
                c => current.push(c),
            }
        }
        values.push(current);
    }
}
