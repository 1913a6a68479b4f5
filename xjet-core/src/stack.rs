// Copyright (c) The xjet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source-map-aware stack decoration.
//!
//! Resolves a parsed stack trace against a [`sourcemap::SourceMap`],
//! drops frames considered noise, and produces a highlighted code
//! excerpt for the first resolvable frame. The actual syntax highlighter
//! is an external collaborator; this module calls out to a pluggable
//! [`Highlighter`] rather than embedding one.

use serde::{Deserialize, Serialize};
use sourcemap::SourceMap;

/// One frame of a parsed stack trace, before source-map resolution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawFrame {
    pub file: String,
    pub function: String,
    pub line: u32,
    pub column: u32,
}

impl RawFrame {
    fn is_empty(&self) -> bool {
        self.file.is_empty() && self.function.is_empty() && self.line == 0 && self.column == 0
    }
}

/// A frame after source-map resolution, with an optional highlighted code
/// excerpt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub source_file: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
    pub code_excerpt: Option<String>,
}

/// Options governing which frames survive the drop rules.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecoratorOptions {
    /// Keep frames from the host runtime's own built-ins (files prefixed
    /// `node:`).
    pub active_native: bool,
    /// Keep frames belonging to the framework's own bundle or its
    /// "shared" framework files.
    pub include_framework: bool,
    /// The framework's own bundle file, compared for exact equality.
    pub framework_bundle_file: Option<String>,
}

/// The decorator's output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecoratedStack {
    pub formatted_stack: String,
    pub code_excerpt: Option<String>,
    pub first_frame_line: Option<u32>,
    pub first_frame_column: Option<u32>,
}

/// Produces a highlighted code excerpt for a resolved source position.
/// The real syntax highlighter lives outside this crate; tests and
/// headless consumers can supply [`PlainHighlighter`].
pub trait Highlighter {
    fn highlight(&self, source: &str, line: u32, column: u32) -> Option<String>;
}

/// A highlighter that returns the raw source line unmodified, used when no
/// real highlighter is wired in.
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, source: &str, line: u32, _column: u32) -> Option<String> {
        source.lines().nth(line.saturating_sub(1) as usize).map(str::to_string)
    }
}

fn should_drop(frame: &RawFrame, options: &DecoratorOptions) -> bool {
    if frame.file.starts_with("node:") && !options.active_native {
        return true;
    }
    if let Some(bundle) = &options.framework_bundle_file {
        if &frame.file == bundle && !options.include_framework {
            return true;
        }
    }
    if frame.file == "evalmachine.<anonymous>" && frame.function.is_empty() {
        return true;
    }
    if frame.is_empty() {
        return true;
    }
    false
}

fn is_shared_framework_source(source_file: &str) -> bool {
    // Any resolved source path containing a "shared" framework segment
    // is treated as internal plumbing.
    source_file.contains("/shared/") || source_file.contains("\\shared\\")
}

/// Decorates `frames` against `source_map`, applying the drop rules and
/// producing a highlighted excerpt for the first resolvable frame.
/// `error_name` and `error_message` drive the `TypeError` rewrite; the
/// (possibly rewritten) message is returned alongside the formatted
/// stack.
pub fn decorate(
    frames: &[RawFrame],
    source_map: Option<&SourceMap>,
    options: &DecoratorOptions,
    highlighter: &dyn Highlighter,
    error_name: &str,
    error_message: &str,
) -> (DecoratedStack, String) {
    let mut resolved_frames = Vec::new();

    for frame in frames {
        if should_drop(frame, options) {
            continue;
        }

        let resolved = source_map.and_then(|map| map.lookup_token(frame.line, frame.column)).map(|token| {
            ResolvedFrame {
                source_file: token.get_source().unwrap_or(&frame.file).to_string(),
                line: token.get_src_line() + 1,
                column: token.get_src_col(),
                name: token.get_name().map(str::to_string),
                code_excerpt: None,
            }
        });

        let resolved = match resolved {
            Some(r) => r,
            None => ResolvedFrame {
                source_file: frame.file.clone(),
                line: frame.line,
                column: frame.column,
                name: None,
                code_excerpt: None,
            },
        };

        if is_shared_framework_source(&resolved.source_file) && !options.include_framework {
            continue;
        }

        resolved_frames.push(resolved);
    }

    let mut first_frame_line = None;
    let mut first_frame_column = None;
    let mut code_excerpt = None;

    for frame in &mut resolved_frames {
        if code_excerpt.is_none() {
            if let Some(source) = source_map.and_then(|map| {
                map.sources().zip(map.source_contents()).find_map(|(name, content)| {
                    if name == frame.source_file {
                        content
                    } else {
                        None
                    }
                })
            }) {
                if let Some(excerpt) = highlighter.highlight(source, frame.line, frame.column) {
                    frame.code_excerpt = Some(excerpt.clone());
                    code_excerpt = Some(excerpt);
                    first_frame_line = Some(frame.line);
                    first_frame_column = Some(frame.column);
                }
            }
        }
    }

    let message = if error_name == "TypeError" {
        resolved_frames
            .first()
            .and_then(|f| f.name.as_ref())
            .map(|name| rewrite_first_token(error_message, name))
            .unwrap_or_else(|| error_message.to_string())
    } else {
        error_message.to_string()
    };

    let formatted_stack = format_frames(error_name, &message, &resolved_frames);

    (
        DecoratedStack {
            formatted_stack,
            code_excerpt,
            first_frame_line,
            first_frame_column,
        },
        message,
    )
}

/// Prepends `name` to `message`, rewriting the first whitespace-delimited
/// token.
fn rewrite_first_token(message: &str, name: &str) -> String {
    match message.split_once(char::is_whitespace) {
        Some((_, rest)) => format!("{name} {rest}"),
        None => name.to_string(),
    }
}

fn format_frames(error_name: &str, message: &str, frames: &[ResolvedFrame]) -> String {
    let mut out = format!("{error_name}: {message}");
    for frame in frames {
        let name = frame.name.as_deref().unwrap_or("<anonymous>");
        out.push_str(&format!("\n    at {name} ({}:{}:{})", frame.source_file, frame.line, frame.column));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(file: &str, function: &str, line: u32, column: u32) -> RawFrame {
        RawFrame {
            file: file.to_string(),
            function: function.to_string(),
            line,
            column,
        }
    }

    #[test]
    fn drops_node_internal_frames_unless_active_native() {
        let frames = vec![frame("node:internal/process", "run", 1, 1)];
        let options = DecoratorOptions::default();
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert!(!decorated.formatted_stack.contains("node:internal"));
    }

    #[test]
    fn keeps_node_internal_frames_when_active_native() {
        let frames = vec![frame("node:internal/process", "run", 1, 1)];
        let options = DecoratorOptions {
            active_native: true,
            ..Default::default()
        };
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert!(decorated.formatted_stack.contains("node:internal"));
    }

    #[test]
    fn drops_framework_bundle_frames_by_default() {
        let frames = vec![frame("bundle.js", "dispatch", 5, 2)];
        let options = DecoratorOptions {
            framework_bundle_file: Some("bundle.js".to_string()),
            ..Default::default()
        };
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert!(!decorated.formatted_stack.contains("bundle.js"));
    }

    #[test]
    fn drops_evalmachine_frames_with_empty_function() {
        let frames = vec![frame("evalmachine.<anonymous>", "", 1, 1)];
        let options = DecoratorOptions::default();
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert!(!decorated.formatted_stack.contains("evalmachine"));
    }

    #[test]
    fn drops_fully_empty_frames() {
        let frames = vec![RawFrame::default()];
        let options = DecoratorOptions::default();
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert_eq!(decorated.formatted_stack, "Error: boom");
    }

    #[test]
    fn type_error_prepends_resolved_name_to_message() {
        let message = rewrite_first_token("undefined is not a function", "login");
        assert_eq!(message, "login is not a function");
    }

    #[test]
    fn surviving_frame_is_rendered_in_formatted_stack() {
        let frames = vec![frame("suite.ts", "runsTest", 10, 4)];
        let options = DecoratorOptions::default();
        let (decorated, _) = decorate(&frames, None, &options, &PlainHighlighter, "Error", "boom");
        assert!(decorated.formatted_stack.contains("suite.ts:10:4"));
    }
}
