// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `.each` table expansion: tagged-template row parsing and the two
//! mutually exclusive description-interpolation modes.

use crate::errors::TemplateShapeError;
use serde_json::{Map, Value};

/// One expanded row of a `.each` table.
///
/// `values` holds the positional parameters printf mode consumes in
/// order; `named` holds the JSON object `$name.path` resolution walks.
/// For a tagged-template row these are two views of the same data (the
/// columns, named by heading); for a plain `.each(cases...)` row, `named`
/// is the case itself (or `Value::Null` if the case isn't an object) and
/// `values` is the case's array elements, or a single-element vec if the
/// case isn't an array.
#[derive(Clone, Debug)]
pub struct EachRow {
    pub values: Vec<Value>,
    pub named: Value,
    pub index: usize,
}

impl EachRow {
    pub fn as_value(&self) -> Value {
        self.named.clone()
    }
}

/// A parsed `.each` input, ready to be expanded into registrations.
#[derive(Clone, Debug)]
pub struct EachTable {
    rows: Vec<EachRow>,
}

impl EachTable {
    /// Builds a table from `test.each(cases...)`: each case is its own
    /// row, not column-split.
    pub fn from_cases(cases: Vec<Value>) -> Self {
        let rows = cases
            .into_iter()
            .enumerate()
            .map(|(index, case)| {
                let values = match &case {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                EachRow {
                    values,
                    named: case,
                    index,
                }
            })
            .collect();
        Self { rows }
    }

    /// Builds a table from a tagged template: `first_fragment` is split by
    /// `|` to obtain column headings (trimmed, non-empty); `flat_values`
    /// is the full, row-major sequence of interpolated values. The input
    /// length must be a multiple of the heading count, otherwise this
    /// returns a [`TemplateShapeError`].
    pub fn from_tagged(first_fragment: &str, flat_values: Vec<Value>) -> Result<Self, TemplateShapeError> {
        let headings: Vec<String> = first_fragment
            .split('|')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        if headings.is_empty() || flat_values.len() % headings.len() != 0 {
            return Err(TemplateShapeError {
                heading_count: headings.len(),
                value_count: flat_values.len(),
                headings,
            });
        }

        let rows = flat_values
            .chunks(headings.len())
            .enumerate()
            .map(|(index, chunk)| {
                let mut named = Map::new();
                for (heading, value) in headings.iter().zip(chunk) {
                    named.insert(heading.clone(), value.clone());
                }
                EachRow {
                    values: chunk.to_vec(),
                    named: Value::Object(named),
                    index,
                }
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn rows(&self) -> impl Iterator<Item = &EachRow> {
        self.rows.iter()
    }
}

/// True iff `template` contains any of the printf tokens `%[psdifjo#]`.
/// A literal `%%` on its own does not count as a token here -- the
/// caller checks for `%%` separately when deciding the interpolation
/// mode.
pub fn has_printf_token(template: &str) -> bool {
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(&next) = bytes.get(i + 1) {
                if matches!(next, b'p' | b's' | b'd' | b'i' | b'f' | b'j' | b'o' | b'#') {
                    return true;
                }
            }
        }
        i += 1;
    }
    false
}

/// Printf-mode description interpolation.
///
/// Consumes `row.values` positionally for `%s %d %f %i %j %o %p %#`;
/// `%%` is a literal `%`. Tokens beyond the available positional
/// parameters are left as-is (mirrors the common printf convention of
/// not erroring on under-supply, since the original source's template
/// strings are user-authored and we never want expansion itself to
/// panic the registration phase).
pub fn interpolate_printf(template: &str, row: &EachRow, index: usize) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut arg_cursor = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('#') => {
                chars.next();
                out.push_str(&index.to_string());
            }
            Some(token @ ('p' | 's' | 'd' | 'i' | 'f' | 'j' | 'o')) => {
                chars.next();
                let value = row.values.get(arg_cursor);
                arg_cursor += 1;
                out.push_str(&format_printf_token(token, value));
            }
            _ => out.push('%'),
        }
    }
    out
}

fn format_printf_token(token: char, value: Option<&Value>) -> String {
    let Some(value) = value else {
        return format!("%{token}");
    };
    match token {
        's' => value_to_display_string(value),
        'd' | 'f' => value
            .as_f64()
            .map(|n| n.to_string())
            .unwrap_or_else(|| value_to_display_string(value)),
        'i' => value
            .as_f64()
            .map(|n| (n.floor() as i64).to_string())
            .unwrap_or_else(|| value_to_display_string(value)),
        'j' => serde_json::to_string(value).unwrap_or_default(),
        'o' => json_type_tag(value).to_string(),
        'p' => serde_json::to_string_pretty(value)
            .map(|s| s.replace("  ", "    "))
            .unwrap_or_default(),
        _ => value_to_display_string(value),
    }
}

fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Variable-mode description interpolation.
///
/// `$name.path.to` resolves against `row.named`; `$#` resolves to the row
/// index; unresolved tokens are left verbatim; non-scalar values are
/// JSON-encoded with one level of collapsing (a nested object/array one
/// level deep becomes the `"[Object]"` placeholder).
pub fn interpolate_variable(template: &str, row: &EachRow, index: usize) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'#') {
            out.push_str(&index.to_string());
            i += 2;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && is_path_char(bytes[end]) {
            end += 1;
        }
        if end == start {
            // `$` followed by nothing path-like: leave verbatim.
            out.push('$');
            i += 1;
            continue;
        }
        let path = &template[start..end];
        match resolve_path(&row.named, path) {
            Some(value) => out.push_str(&render_variable_value(&value)),
            None => {
                out.push('$');
                out.push_str(path);
            }
        }
        i = end;
    }
    out
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

fn render_variable_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(_) | Value::Bool(_) | Value::Null => value_to_display_string(value),
        Value::Object(_) => "[Object]".to_string(),
        Value::Array(_) => "[Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_template_splits_headings_and_rows() {
        let table = EachTable::from_tagged(
            "a|b|expected",
            vec![
                json!(1),
                json!(2),
                json!(3),
                json!(2),
                json!(3),
                json!(5),
            ],
        )
        .unwrap();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].named, json!({"a": 1, "b": 2, "expected": 3}));
        assert_eq!(rows[1].named, json!({"a": 2, "b": 3, "expected": 5}));
    }

    #[test]
    fn shape_mismatch_errors() {
        let err = EachTable::from_tagged("a|b", vec![json!(1), json!(2), json!(3)]).unwrap_err();
        assert_eq!(err.heading_count, 2);
        assert_eq!(err.value_count, 3);
    }

    #[test]
    fn variable_mode_resolves_dotted_path_and_row_index() {
        let table = EachTable::from_tagged("a|b", vec![json!(1), json!({"c": 2})]).unwrap();
        let row = table.rows().next().unwrap();
        let out = interpolate_variable("$a plus $b.c at $#", row, 0);
        assert_eq!(out, "1 plus 2 at 0");
    }

    #[test]
    fn variable_mode_leaves_unresolved_tokens_verbatim() {
        let table = EachTable::from_tagged("a", vec![json!(1)]).unwrap();
        let row = table.rows().next().unwrap();
        assert_eq!(interpolate_variable("$missing", row, 0), "$missing");
    }

    #[test]
    fn variable_mode_collapses_nested_object() {
        let table = EachTable::from_tagged("a", vec![json!({"nested": true})]).unwrap();
        let row = table.rows().next().unwrap();
        assert_eq!(interpolate_variable("$a", row, 0), "[Object]");
    }

    #[test]
    fn printf_mode_consumes_positional_params_in_order() {
        let table = EachTable::from_cases(vec![json!([1, 2])]);
        let row = table.rows().next().unwrap();
        assert_eq!(interpolate_printf("%d + %d", row, 0), "1 + 2");
    }

    #[test]
    fn printf_percent_literal_and_row_index() {
        let table = EachTable::from_cases(vec![json!(1)]);
        let row = table.rows().next().unwrap();
        assert_eq!(interpolate_printf("100%% at row %#", row, 3), "100% at row 3");
    }

    #[test]
    fn has_printf_token_detects_tokens_and_not_bare_dollar() {
        assert!(has_printf_token("%d squared"));
        assert!(!has_printf_token("100%%"), "a bare %% is not itself a printf token; the caller checks for it separately");
        assert!(!has_printf_token("$n squared"));
    }

    #[test]
    fn printf_wins_when_both_dollar_and_percent_token_present() {
        // A template mixing "$n" and "%i" is still printf mode: %i alone
        // is enough to win, %% is not required.
        assert!(has_printf_token("$n squared is %i"));
    }
}
