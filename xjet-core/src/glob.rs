// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The glob-to-regex compiler.
//!
//! `*` matches within one path segment, `**` matches zero or more
//! segments, `?` matches a single character, `[set]`/`[^set]` match
//! character classes, `{a,b}` alternates. Compiled to a regex anchored at
//! `^...$`.

use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a glob pattern.
#[derive(Debug, Error)]
pub enum GlobError {
    #[error("unterminated character class starting at byte {0}")]
    UnterminatedClass(usize),
    #[error("unterminated brace alternation starting at byte {0}")]
    UnterminatedBrace(usize),
    #[error("compiled pattern is not a valid regex: {0}")]
    Regex(#[from] regex::Error),
}

/// Compiles `pattern` into an anchored regex implementing the glob
/// contract described above.
pub fn compile(pattern: &str) -> Result<Regex, GlobError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    translate(pattern, &mut out)?;
    out.push('$');
    Ok(Regex::new(&out)?)
}

fn translate(pattern: &str, out: &mut String) -> Result<(), GlobError> {
    let bytes: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            '*' => {
                if bytes.get(i + 1) == Some(&'*') {
                    // `**`: zero or more path segments, including the
                    // separators between them.
                    out.push_str("(?:.*)?");
                    i += 2;
                    // Swallow a following `/` so `**/` doesn't force an
                    // extra separator when it matched zero segments.
                    if bytes.get(i) == Some(&'/') {
                        i += 1;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let start = i;
                let mut j = i + 1;
                let negate = bytes.get(j) == Some(&'^');
                if negate {
                    j += 1;
                }
                let class_start = j;
                while j < bytes.len() && bytes[j] != ']' {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(GlobError::UnterminatedClass(start));
                }
                out.push('[');
                if negate {
                    out.push('^');
                }
                for c in &bytes[class_start..j] {
                    if *c == '\\' || *c == ']' {
                        out.push('\\');
                    }
                    out.push(*c);
                }
                out.push(']');
                i = j + 1;
            }
            '{' => {
                let start = i;
                let mut j = i + 1;
                let mut depth = 1;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        j += 1;
                    }
                }
                if j >= bytes.len() {
                    return Err(GlobError::UnterminatedBrace(start));
                }
                let inner: String = bytes[i + 1..j].iter().collect();
                out.push_str("(?:");
                for (idx, alt) in inner.split(',').enumerate() {
                    if idx > 0 {
                        out.push('|');
                    }
                    translate(alt, out)?;
                }
                out.push(')');
                i = j + 1;
            }
            c if is_regex_meta(c) => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(())
}

fn is_regex_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '|' | '^' | '$' | '\\'
    )
}
