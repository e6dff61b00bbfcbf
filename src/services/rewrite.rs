//! In-process text rewrites applied by the preparation steps.
//!
//! All rewrites work line by line on the whole file content and never fail;
//! reading and writing the working file is up to the pipeline.

use regex::Regex;

/// Text rewrites over C preprocessor directives and whitespace
///
/// Patterns are compiled once in [`TextRewriter::new`] and shared by every
/// file of a run.
pub struct TextRewriter {
    /// `#ifdef NAME` with whatever follows the name.
    ifdef_pattern: Regex,

    /// `#ifndef NAME` with whatever follows the name.
    ifndef_pattern: Regex,

    /// Any directive, capturing its name.
    directive_pattern: Regex,

    /// Opening of an include guard in either spelling.
    guard_open_pattern: Regex,

    /// `#define NAME`, capturing the name.
    define_pattern: Regex,
}

const CONDITIONAL_DIRECTIVES: [&str; 6] = ["if", "ifdef", "ifndef", "elif", "else", "endif"];

impl TextRewriter {
    pub fn new() -> Self {
        Self {
            ifdef_pattern: Regex::new(r"(?m)^([ \t]*#[ \t]*)ifdef[ \t]+(\w+)")
                .expect("Invalid ifdef regex"),
            ifndef_pattern: Regex::new(r"(?m)^([ \t]*#[ \t]*)ifndef[ \t]+(\w+)")
                .expect("Invalid ifndef regex"),
            directive_pattern: Regex::new(r"^[ \t]*#[ \t]*(\w*)").expect("Invalid directive regex"),
            guard_open_pattern: Regex::new(
                r"^[ \t]*#[ \t]*(?:ifndef[ \t]+(\w+)|if[ \t]*![ \t]*defined[ \t]*\(?[ \t]*(\w+)[ \t]*\)?)[ \t]*$",
            )
            .expect("Invalid include guard regex"),
            define_pattern: Regex::new(r"^[ \t]*#[ \t]*define[ \t]+(\w+)")
                .expect("Invalid define regex"),
        }
    }

    /// Join preprocessor directives continued with a trailing backslash.
    ///
    /// The continuation lines are appended to the directive, separated by a
    /// single space. Ordinary code lines are left alone.
    pub fn join_multiline_macros(&self, content: &str) -> String {
        let mut output = String::with_capacity(content.len());
        let mut pending: Option<String> = None;

        for line in content.split_inclusive('\n') {
            let body = strip_newline(line);

            let joined = match pending.take() {
                Some(mut directive) => {
                    directive.push(' ');
                    directive.push_str(body.trim_start());
                    directive
                }
                None if is_directive(body) => body.to_string(),
                None => {
                    output.push_str(line);
                    continue;
                }
            };

            match joined.trim_end().strip_suffix('\\') {
                Some(head) if line.ends_with('\n') => {
                    pending = Some(head.trim_end().to_string());
                }
                _ => {
                    output.push_str(joined.trim_end_matches('\\'));
                    output.push_str(line_ending(line));
                }
            }
        }

        // File ended inside a continued directive.
        if let Some(directive) = pending {
            output.push_str(&directive);
            output.push('\n');
        }
        output
    }

    /// Drop blank lines, squeeze whitespace runs to one space and trim lines.
    ///
    /// `#  if` style directives lose the blanks after the hash.
    pub fn squeeze_whitespace(&self, content: &str) -> String {
        let mut output = String::with_capacity(content.len());

        for line in content.split_inclusive('\n') {
            if is_blank(line) {
                continue;
            }

            let line = match line.strip_prefix('#') {
                Some(rest) if rest.starts_with([' ', '\t']) => {
                    format!("#{}", rest.trim_start_matches(is_py_space))
                }
                _ => line.to_string(),
            };

            let mut first = true;
            for word in line.split(is_py_space).filter(|w| !w.is_empty()) {
                if !first {
                    output.push(' ');
                }
                output.push_str(word);
                first = false;
            }
            output.push('\n');
        }
        output
    }

    /// `#ifdef X` becomes `#if defined(X)`, `#ifndef X` becomes `#if !defined(X)`.
    pub fn rewrite_ifdefs(&self, content: &str) -> String {
        let rewritten = self
            .ifndef_pattern
            .replace_all(content, "${1}if !defined(${2})");
        self.ifdef_pattern
            .replace_all(&rewritten, "${1}if defined(${2})")
            .into_owned()
    }

    /// Remove the include guard of a header, if it has one.
    ///
    /// A guard is a leading `#ifndef X` (or `#if !defined(X)`) directly
    /// followed by `#define X`, whose matching `#endif` is the last
    /// non-blank line. Anything else is returned unchanged.
    pub fn remove_include_guards(&self, content: &str) -> String {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut significant = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !is_blank(line))
            .map(|(i, _)| i);

        let (Some(open), Some(define)) = (significant.next(), significant.next()) else {
            return content.to_string();
        };

        let Some(guard) = self
            .guard_open_pattern
            .captures(strip_newline(lines[open]))
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
        else {
            return content.to_string();
        };

        let defines_guard = self
            .define_pattern
            .captures(lines[define])
            .is_some_and(|caps| &caps[1] == guard);
        if !defines_guard {
            return content.to_string();
        }

        let Some(close) = self.matching_endif(&lines, open) else {
            return content.to_string();
        };
        if lines[close + 1..].iter().any(|line| !is_blank(line)) {
            return content.to_string();
        }

        lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != open && *i != define && *i != close)
            .map(|(_, line)| *line)
            .collect()
    }

    /// Keep conditional directives and code, drop every other directive line.
    pub fn keep_conditional_directives(&self, content: &str) -> String {
        content
            .split_inclusive('\n')
            .filter(|line| match self.directive_name(line) {
                Some(name) => CONDITIONAL_DIRECTIVES.contains(&name),
                None => true,
            })
            .collect()
    }

    /// Drop every whitespace-only line.
    pub fn delete_empty_lines(&self, content: &str) -> String {
        content
            .split_inclusive('\n')
            .filter(|line| !is_blank(line))
            .collect()
    }

    fn directive_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.directive_pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Index of the `#endif` closing the conditional opened at `open`.
    fn matching_endif(&self, lines: &[&str], open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, line) in lines.iter().enumerate().skip(open) {
            match self.directive_name(line) {
                Some("if" | "ifdef" | "ifndef") => depth += 1,
                Some("endif") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl Default for TextRewriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whitespace as C source files use it, including vertical tab and form feed.
fn is_py_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

fn is_blank(line: &str) -> bool {
    !line.is_empty() && line.chars().all(is_py_space)
}

fn is_directive(line: &str) -> bool {
    line.trim_start_matches([' ', '\t']).starts_with('#')
}

fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn line_ending(line: &str) -> &str {
    &line[strip_newline(line).len()..]
}
